use actix_identity::Identity;
use actix_session::Session;
use actix_web::{
    get, post,
    web::{self, Bytes, Data},
    HttpMessage, HttpRequest, HttpResponse, Responder,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tera::Context;

use crate::{
    catalog::{Category, Condition, ItemStatus, ItemType, Size},
    errors::{AppError, AuthErrorCode},
    marketplace::{self, ListingPolicy},
    navigation::{Navigator, Page},
    storage,
    structs::{ItemFilter, ItemValidationError, NewItem, User},
    AppState, TEMPLATES,
};

/// How many listings the landing page shows.
const FEATURED_ITEMS: usize = 6;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(index_handler)
        .service(login_handler)
        .service(login_form_handler)
        .service(register_handler)
        .service(register_form_handler)
        .service(logout_handler)
        .service(dashboard_handler)
        .service(items_handler)
        // must precede /items/{id}
        .service(add_item_handler)
        .service(add_item_form_handler)
        .service(item_detail_handler)
        .service(swap_request_handler)
        .service(redeem_handler)
        .service(swap_action_handler)
        .service(upload_handler)
        .service(admin_handler)
        .service(admin_item_status_handler)
        .service(admin_item_delete_handler)
        .service(admin_user_flag_handler)
        .service(admin_user_points_handler)
        .service(back_handler);
}

fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header(("Location", location))
        .finish()
}

fn render(template: &str, context: &Context) -> Result<HttpResponse, AppError> {
    let rendered = TEMPLATES.render(template, context).map_err(|e| {
        log::error!("Failed to render template: {}", e);
        AppError::TemplateError(e)
    })?;
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(rendered))
}

fn base_context(title: &str, user: Option<&User>) -> Context {
    let mut context = Context::new();
    context.insert("title", title);
    context.insert("user", &user);
    context.insert("version", env!("CARGO_PKG_VERSION"));
    context
}

/// Signed-in user, if any. A session pointing at a vanished user counts as signed out.
async fn current_user(state: &AppState, identity: Option<Identity>) -> Result<Option<User>, AppError> {
    let Some(identity) = identity else {
        return Ok(None);
    };
    let id = identity.id()?;
    match state.store.get_user(&id).await {
        Ok(user) => Ok(Some(user)),
        Err(AppError::NotFound(_)) => {
            log::warn!("Session refers to unknown user {}, logging out", id);
            identity.logout();
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

async fn require_user(state: &AppState, identity: Option<Identity>) -> Result<User, AppError> {
    current_user(state, identity)
        .await?
        .ok_or(AppError::Unauthenticated)
}

/// Navigation history from the session. A history that no longer decodes starts over.
fn load_navigator(session: &Session) -> Navigator {
    match session.get::<Navigator>(Navigator::SESSION_KEY) {
        Ok(nav) => nav.unwrap_or_default(),
        Err(e) => {
            log::warn!("Discarding unreadable navigation history: {}", e);
            Navigator::default()
        }
    }
}

/// Record a page view in the session's navigation history.
fn visit(session: &Session, page: Page) -> Result<(), AppError> {
    let mut nav = load_navigator(session);
    nav.navigate(page);
    session.insert(Navigator::SESSION_KEY, nav)?;
    Ok(())
}

fn policy(state: &AppState) -> ListingPolicy {
    ListingPolicy {
        rule: state.config.points_rule,
        bonus: state.config.listing_bonus,
    }
}

#[get("/")]
pub async fn index_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    session: Session,
) -> Result<impl Responder, AppError> {
    let user = current_user(&state, identity).await?;
    let mut featured = marketplace::browse_items(state.store.as_ref(), &ItemFilter::available()).await?;
    featured.truncate(FEATURED_ITEMS);
    visit(&session, Page::Landing)?;

    let mut context = base_context("ReWear", user.as_ref());
    context.insert("featured", &featured);
    render("landing.html", &context)
}

#[derive(Deserialize)]
pub struct LoginQuery {
    error: Option<String>,
}

#[get("/login")]
pub async fn login_handler(
    query: web::Query<LoginQuery>,
    session: Session,
) -> Result<impl Responder, AppError> {
    visit(&session, Page::Login)?;
    let mut context = base_context("Log in", None);
    if let Some(code) = &query.error {
        context.insert("error", AuthErrorCode::from_code(code).friendly_message());
    }
    render("login.html", &context)
}

#[derive(Deserialize)]
pub struct Login {
    email: String,
    password: String,
}

#[post("/login")]
pub async fn login_form_handler(
    web::Form(form): web::Form<Login>,
    state: Data<AppState>,
    request: HttpRequest,
) -> Result<impl Responder, AppError> {
    match marketplace::authenticate(state.store.as_ref(), &form.email, &form.password).await {
        Ok(user) => {
            Identity::login(&request.extensions(), user.id.clone())?;
            log::info!("User {} logged in", user.id);
            Ok(see_other("/dashboard"))
        }
        Err(AppError::Auth(code)) => Ok(see_other(&format!("/login?error={}", code.code()))),
        Err(e) => Err(e),
    }
}

#[get("/register")]
pub async fn register_handler(session: Session) -> Result<impl Responder, AppError> {
    visit(&session, Page::Register)?;
    render("register.html", &base_context("Register", None))
}

#[derive(Deserialize)]
pub struct Register {
    display_name: String,
    email: String,
    password: String,
    password2: String,
}

#[post("/register")]
pub async fn register_form_handler(
    web::Form(form): web::Form<Register>,
    state: Data<AppState>,
    request: HttpRequest,
) -> Result<impl Responder, AppError> {
    let result = if form.password != form.password2 {
        Err(AppError::Validation("Passwords do not match".to_owned()))
    } else {
        let make_admin = state.config.is_admin_email(&form.email.trim().to_lowercase());
        marketplace::register(
            state.store.as_ref(),
            &form.display_name,
            &form.email,
            &form.password,
            make_admin,
        )
        .await
    };

    match result {
        Ok(user) => {
            Identity::login(&request.extensions(), user.id.clone())?;
            Ok(see_other("/dashboard"))
        }
        Err(e @ (AppError::Auth(_) | AppError::Validation(_))) => {
            let status = actix_web::ResponseError::status_code(&e);
            let mut context = base_context("Register", None);
            context.insert("error", &e.to_string());
            context.insert("display_name", &form.display_name);
            context.insert("email", &form.email);
            let mut response = render("register.html", &context)?;
            *response.status_mut() = status;
            Ok(response)
        }
        Err(e) => Err(e),
    }
}

#[post("/logout")]
pub async fn logout_handler(user: Identity) -> impl Responder {
    user.logout();
    see_other("/")
}

#[get("/dashboard")]
pub async fn dashboard_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    session: Session,
) -> Result<impl Responder, AppError> {
    let Some(user) = current_user(&state, identity).await? else {
        return Ok(see_other("/login"));
    };
    visit(&session, Page::Dashboard)?;
    let board = marketplace::dashboard(state.store.as_ref(), &user.id).await?;

    let mut context = base_context("Dashboard", Some(&board.user));
    context.insert("board", &board);
    context.insert("refresh_secs", &state.config.dashboard_refresh_secs);
    render("dashboard.html", &context)
}

#[derive(Deserialize, Serialize, Default)]
pub struct ItemsQuery {
    status: Option<String>,
    category: Option<String>,
    owner: Option<String>,
    q: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ItemsQuery {
    /// Listings default to available items; `status=all` lifts the filter.
    fn filter(&self) -> Result<ItemFilter, AppError> {
        let status = match present(&self.status) {
            None => Some(ItemStatus::Available),
            Some("all") => None,
            Some(raw) => Some(raw.parse()?),
        };
        Ok(ItemFilter {
            status,
            category: present(&self.category).map(str::parse).transpose()?,
            owner_id: present(&self.owner).map(str::to_owned),
        })
    }
}

#[get("/items")]
pub async fn items_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    session: Session,
    query: web::Query<ItemsQuery>,
) -> Result<impl Responder, AppError> {
    let user = current_user(&state, identity).await?;
    let filter = query.filter()?;
    let items = marketplace::browse_items(state.store.as_ref(), &filter).await?;
    let items = marketplace::search(items, present(&query.q).unwrap_or_default());
    visit(&session, Page::Items)?;

    let mut context = base_context("Browse items", user.as_ref());
    context.insert("items", &items);
    context.insert("query", &query.into_inner());
    context.insert("categories", Category::ALL);
    context.insert("statuses", ItemStatus::ALL);
    render("items.html", &context)
}

#[derive(Serialize)]
struct CategoryOptions {
    category: Category,
    types: Vec<ItemType>,
}

fn add_item_context(user: &User, state: &AppState) -> Context {
    let options: Vec<CategoryOptions> = Category::ALL
        .iter()
        .map(|c| CategoryOptions {
            category: *c,
            types: ItemType::for_category(*c).collect(),
        })
        .collect();
    let mut context = base_context("List an item", Some(user));
    context.insert("options", &options);
    context.insert("letter_sizes", Size::LETTERS);
    context.insert("shoe_sizes", &Size::options_for(Category::Shoes));
    context.insert("conditions", Condition::ALL);
    context.insert("bonus", &state.config.listing_bonus);
    context
}

#[get("/items/new")]
pub async fn add_item_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    session: Session,
) -> Result<impl Responder, AppError> {
    let Some(user) = current_user(&state, identity).await? else {
        return Ok(see_other("/login"));
    };
    visit(&session, Page::AddItem)?;
    render("add_item.html", &add_item_context(&user, &state))
}

#[derive(Deserialize)]
pub struct AddItemForm {
    title: String,
    #[serde(default)]
    description: String,
    category: String,
    item_type: String,
    size: String,
    condition: String,
    #[serde(default)]
    tags: String,
    #[serde(default)]
    images: String,
}

impl AddItemForm {
    /// Images must come from our own upload endpoint or be the placeholder.
    fn to_new_item(&self, placeholder: &str) -> Result<NewItem, AppError> {
        let tags = self.tags.split(',').map(str::to_owned).collect();
        let images: Vec<String> = self
            .images
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect();
        let uploads = format!("{}/", storage::PUBLIC_PREFIX);
        if let Some(foreign) = images
            .iter()
            .find(|url| url.as_str() != placeholder && !url.starts_with(&uploads))
        {
            return Err(ItemValidationError::ForeignImage(foreign.clone()).into());
        }
        Ok(NewItem::new(
            &self.title,
            &self.description,
            self.category.parse()?,
            self.item_type.parse()?,
            self.size.parse()?,
            self.condition.parse()?,
            tags,
            images,
        )?)
    }
}

#[post("/items/new")]
pub async fn add_item_form_handler(
    web::Form(form): web::Form<AddItemForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let user = require_user(&state, identity).await?;
    match form.to_new_item(&state.config.placeholder_image) {
        Ok(new_item) => {
            let item =
                marketplace::create_item(state.store.as_ref(), policy(&state), &user, new_item)
                    .await?;
            Ok(see_other(&Page::ItemDetail(item.id).path()))
        }
        Err(e @ (AppError::InvalidItem(_) | AppError::InvalidValue(_))) => {
            let mut context = add_item_context(&user, &state);
            context.insert("error", &e.to_string());
            context.insert("form_title", &form.title);
            context.insert("form_description", &form.description);
            context.insert("form_tags", &form.tags);
            context.insert("form_images", &form.images);
            let mut response = render("add_item.html", &context)?;
            *response.status_mut() = actix_web::http::StatusCode::BAD_REQUEST;
            Ok(response)
        }
        Err(e) => Err(e),
    }
}

#[get("/items/{id}")]
pub async fn item_detail_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    session: Session,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let id = path.into_inner();
    let user = current_user(&state, identity).await?;
    let item = state.store.get_item(&id).await?;
    let owner = state.store.get_user(&item.owner_id).await?;
    visit(&session, Page::ItemDetail(id))?;

    let is_owner = user.as_ref().is_some_and(|u| u.id == item.owner_id);
    let open = item.status == ItemStatus::Available && user.is_some() && !is_owner;
    let affordable = user.as_ref().is_some_and(|u| u.points >= item.points);

    let mut context = base_context(&item.title, user.as_ref());
    context.insert("owner_name", &owner.display_name);
    context.insert("is_owner", &is_owner);
    context.insert("can_swap", &open);
    context.insert("can_redeem", &(open && affordable));
    context.insert("item", &item);
    render("item_detail.html", &context)
}

#[derive(Deserialize)]
pub struct SwapForm {
    #[serde(default)]
    message: String,
}

#[post("/items/{id}/swap")]
pub async fn swap_request_handler(
    web::Form(form): web::Form<SwapForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let user = require_user(&state, identity).await?;
    marketplace::request_swap(state.store.as_ref(), &path, &user, &form.message).await?;
    Ok(see_other("/dashboard"))
}

#[post("/items/{id}/redeem")]
pub async fn redeem_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let user = require_user(&state, identity).await?;
    marketplace::redeem_item(state.store.as_ref(), &path, &user).await?;
    Ok(see_other("/dashboard"))
}

#[post("/swaps/{id}/{action}")]
pub async fn swap_action_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    path: web::Path<(String, String)>,
) -> Result<impl Responder, AppError> {
    let user = require_user(&state, identity).await?;
    let (id, action) = path.into_inner();
    let store = state.store.as_ref();
    match action.as_str() {
        "accept" => marketplace::respond_to_swap(store, &id, &user, true).await?,
        "reject" => marketplace::respond_to_swap(store, &id, &user, false).await?,
        "cancel" => marketplace::cancel_swap(store, &id, &user).await?,
        _ => return Err(AppError::NotFound("Action")),
    };
    Ok(see_other("/dashboard"))
}

#[derive(Serialize, Deserialize)]
pub struct UploadResponse {
    url: String,
}

/// Stores one image from the raw request body.
#[post("/uploads/{index}")]
pub async fn upload_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    path: web::Path<usize>,
    body: Bytes,
) -> Result<impl Responder, AppError> {
    let user = require_user(&state, identity).await?;
    let index = path.into_inner();
    if index >= crate::structs::IMAGES_MAX {
        return Err(AppError::Validation(format!(
            "At most {} images per listing",
            crate::structs::IMAGES_MAX
        )));
    }
    let key = storage::object_key(&user.id, Utc::now().timestamp_millis(), index);
    let url = storage::upload_image(
        state.files.as_ref(),
        &key,
        &body,
        state.config.upload_timeout,
        &state.config.placeholder_image,
    )
    .await?;
    Ok(HttpResponse::Ok().json(UploadResponse { url }))
}

#[get("/admin")]
pub async fn admin_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    session: Session,
) -> Result<impl Responder, AppError> {
    let Some(user) = current_user(&state, identity).await? else {
        return Ok(see_other("/login"));
    };
    let overview = marketplace::admin_overview(state.store.as_ref(), &user).await?;
    visit(&session, Page::Admin)?;

    let mut context = base_context("Admin", Some(&user));
    context.insert("overview", &overview);
    render("admin.html", &context)
}

#[derive(Deserialize)]
pub struct StatusForm {
    status: String,
}

#[post("/admin/items/{id}/status")]
pub async fn admin_item_status_handler(
    web::Form(form): web::Form<StatusForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let user = require_user(&state, identity).await?;
    let status: ItemStatus = form.status.parse()?;
    marketplace::moderate_item(state.store.as_ref(), &user, &path, status).await?;
    Ok(see_other("/admin"))
}

#[post("/admin/items/{id}/delete")]
pub async fn admin_item_delete_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let user = require_user(&state, identity).await?;
    marketplace::remove_item(state.store.as_ref(), &user, &path).await?;
    Ok(see_other("/admin"))
}

#[derive(Deserialize)]
pub struct AdminFlagForm {
    is_admin: bool,
}

#[post("/admin/users/{id}/admin")]
pub async fn admin_user_flag_handler(
    web::Form(form): web::Form<AdminFlagForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let user = require_user(&state, identity).await?;
    marketplace::set_admin(state.store.as_ref(), &user, &path, form.is_admin).await?;
    Ok(see_other("/admin"))
}

#[derive(Deserialize)]
pub struct PointsForm {
    delta: i64,
}

#[post("/admin/users/{id}/points")]
pub async fn admin_user_points_handler(
    web::Form(form): web::Form<PointsForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let user = require_user(&state, identity).await?;
    marketplace::adjust_points(state.store.as_ref(), &user, &path, form.delta).await?;
    Ok(see_other("/admin"))
}

#[get("/back")]
pub async fn back_handler(
    identity: Option<Identity>,
    session: Session,
) -> Result<impl Responder, AppError> {
    let mut nav = load_navigator(&session);
    log::debug!(
        "Going back from {:?} with {} pages of history",
        nav.current(),
        nav.history().len()
    );
    let target = nav.go_back().clone();
    session.insert(Navigator::SESSION_KEY, &nav)?;

    if target.requires_identity() && identity.is_none() {
        return Ok(see_other(&Page::Login.path()));
    }
    Ok(see_other(&target.path()))
}
