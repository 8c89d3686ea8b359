//! Marketplace use-cases. Handlers call these; these call the [`Store`].

use serde::Serialize;

use crate::{
    catalog::{ItemStatus, SwapKind, SwapStatus},
    db::Store,
    errors::{AppError, AuthErrorCode},
    points::PointsRule,
    structs::{Item, ItemFilter, NewItem, PlatformStats, SwapFilter, SwapRecord, User},
    utils,
};

pub const DISPLAY_NAME_MIN: usize = 2;
pub const DISPLAY_NAME_MAX: usize = 40;
pub const MESSAGE_MAX: usize = 500;
/// Largest single balance change an administrator may apply.
pub const POINTS_ADJUSTMENT_MAX: i64 = 1_000_000;

/// How new listings are priced and rewarded.
#[derive(Debug, Clone, Copy)]
pub struct ListingPolicy {
    pub rule: PointsRule,
    pub bonus: i64,
}

#[derive(Serialize, Debug, Clone)]
pub struct Dashboard {
    pub user: User,
    pub items: Vec<Item>,
    pub outgoing: Vec<SwapRecord>,
    pub incoming: Vec<SwapRecord>,
    pub purchases: Vec<SwapRecord>,
}

#[derive(Serialize, Debug, Clone)]
pub struct AdminOverview {
    pub stats: PlatformStats,
    pub users: Vec<User>,
    pub items: Vec<Item>,
}

fn require_admin(actor: &User) -> Result<(), AppError> {
    if !actor.is_admin {
        log::warn!("User {} attempted an admin action", actor.id);
        return Err(AppError::Forbidden("administrators only"));
    }
    Ok(())
}

pub async fn register(
    store: &dyn Store,
    display_name: &str,
    email: &str,
    password: &str,
    make_admin: bool,
) -> Result<User, AppError> {
    let display_name = display_name.trim();
    let len = display_name.chars().count();
    if !(DISPLAY_NAME_MIN..=DISPLAY_NAME_MAX).contains(&len) {
        return Err(AppError::Validation(format!(
            "Display name must be {DISPLAY_NAME_MIN}-{DISPLAY_NAME_MAX} characters"
        )));
    }
    let email = utils::normalise_email(email)?;
    utils::check_password_strength(password)?;
    let pwd_hash = utils::hash_password(password)?;
    store
        .insert_user(display_name, &email, &pwd_hash, make_admin)
        .await
}

pub async fn authenticate(store: &dyn Store, email: &str, password: &str) -> Result<User, AppError> {
    let email = utils::normalise_email(email)?;
    let creds = store
        .find_credentials(&email)
        .await?
        .ok_or(AppError::Auth(AuthErrorCode::UserNotFound))?;
    if !utils::verify_password(password, &creds.pwd_hash)? {
        log::warn!("Failed login for user ID: {}", creds.user.id);
        return Err(AppError::Auth(AuthErrorCode::WrongPassword));
    }
    Ok(creds.user)
}

/// Price `item` under `policy`, store it and credit the lister's bonus.
pub async fn create_item(
    store: &dyn Store,
    policy: ListingPolicy,
    owner: &User,
    item: NewItem,
) -> Result<Item, AppError> {
    let points = policy
        .rule
        .score(item.condition(), item.category(), item.size());
    store
        .create_listing(&owner.id, &item, points, policy.bonus)
        .await
}

pub async fn browse_items(store: &dyn Store, filter: &ItemFilter) -> Result<Vec<Item>, AppError> {
    store.list_items(filter).await
}

/// Case-insensitive match on title, description and tags, applied after the read.
pub fn search(items: Vec<Item>, needle: &str) -> Vec<Item> {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return items;
    }
    items
        .into_iter()
        .filter(|item| {
            item.title.to_lowercase().contains(&needle)
                || item.description.to_lowercase().contains(&needle)
                || item.tags.iter().any(|t| t.contains(&needle))
        })
        .collect()
}

pub async fn request_swap(
    store: &dyn Store,
    item_id: &str,
    requester: &User,
    message: &str,
) -> Result<SwapRecord, AppError> {
    let message = message.trim();
    if message.chars().count() > MESSAGE_MAX {
        return Err(AppError::Validation(format!(
            "Message must be at most {MESSAGE_MAX} characters"
        )));
    }
    let item = store.get_item(item_id).await?;
    if item.owner_id == requester.id {
        return Err(AppError::Forbidden("cannot request a swap for your own item"));
    }
    if item.status != ItemStatus::Available {
        return Err(AppError::ItemUnavailable);
    }
    let open = store
        .list_records(
            SwapKind::Swap,
            &SwapFilter {
                requester_id: Some(requester.id.clone()),
                status: Some(SwapStatus::Pending),
                ..Default::default()
            },
        )
        .await?;
    if open.iter().any(|s| s.item_id == item.id) {
        return Err(AppError::Validation(
            "You already have a pending request for this item".to_owned(),
        ));
    }
    store.insert_swap_request(&item, requester, message).await
}

/// The item owner accepts or rejects a pending request.
pub async fn respond_to_swap(
    store: &dyn Store,
    swap_id: &str,
    actor: &User,
    accept: bool,
) -> Result<SwapRecord, AppError> {
    let swap = store.get_swap(swap_id).await?;
    if swap.owner_id != actor.id {
        return Err(AppError::Forbidden("only the item owner can answer a request"));
    }
    if accept {
        store.complete_swap(swap_id).await
    } else {
        store.close_swap(swap_id, SwapStatus::Rejected).await
    }
}

pub async fn cancel_swap(
    store: &dyn Store,
    swap_id: &str,
    actor: &User,
) -> Result<SwapRecord, AppError> {
    let swap = store.get_swap(swap_id).await?;
    if swap.requester_id != actor.id {
        return Err(AppError::Forbidden("only the requester can cancel a request"));
    }
    store.close_swap(swap_id, SwapStatus::Cancelled).await
}

pub async fn redeem_item(
    store: &dyn Store,
    item_id: &str,
    redeemer: &User,
) -> Result<SwapRecord, AppError> {
    store.redeem_item(item_id, &redeemer.id).await
}

pub async fn dashboard(store: &dyn Store, user_id: &str) -> Result<Dashboard, AppError> {
    let user = store.get_user(user_id).await?;
    let items = store.list_items(&ItemFilter::owned_by(user_id)).await?;
    let outgoing = store
        .list_records(
            SwapKind::Swap,
            &SwapFilter {
                requester_id: Some(user_id.to_owned()),
                ..Default::default()
            },
        )
        .await?;
    let incoming = store
        .list_records(
            SwapKind::Swap,
            &SwapFilter {
                owner_id: Some(user_id.to_owned()),
                ..Default::default()
            },
        )
        .await?;
    let purchases = store
        .list_records(
            SwapKind::Points,
            &SwapFilter {
                requester_id: Some(user_id.to_owned()),
                ..Default::default()
            },
        )
        .await?;
    Ok(Dashboard {
        user,
        items,
        outgoing,
        incoming,
        purchases,
    })
}

pub async fn admin_overview(store: &dyn Store, actor: &User) -> Result<AdminOverview, AppError> {
    require_admin(actor)?;
    Ok(AdminOverview {
        stats: store.stats().await?,
        users: store.list_users().await?,
        items: store.list_items(&ItemFilter::default()).await?,
    })
}

/// Admin moderation: hold a listing for review or reject it.
pub async fn moderate_item(
    store: &dyn Store,
    actor: &User,
    item_id: &str,
    status: ItemStatus,
) -> Result<Item, AppError> {
    require_admin(actor)?;
    if !matches!(status, ItemStatus::Pending | ItemStatus::Rejected) {
        return Err(AppError::Validation(format!(
            "Moderation cannot set an item to {status}"
        )));
    }
    let item = store.set_item_status(item_id, status).await?;
    log::info!("Admin {} set item {} to {}", actor.id, item_id, status);
    Ok(item)
}

pub async fn remove_item(store: &dyn Store, actor: &User, item_id: &str) -> Result<(), AppError> {
    require_admin(actor)?;
    store.delete_item(item_id).await?;
    log::info!("Admin {} removed item {}", actor.id, item_id);
    Ok(())
}

pub async fn set_admin(
    store: &dyn Store,
    actor: &User,
    user_id: &str,
    is_admin: bool,
) -> Result<User, AppError> {
    require_admin(actor)?;
    if actor.id == user_id && !is_admin {
        return Err(AppError::Forbidden("administrators cannot demote themselves"));
    }
    store.set_admin(user_id, is_admin).await
}

pub async fn adjust_points(
    store: &dyn Store,
    actor: &User,
    user_id: &str,
    delta: i64,
) -> Result<User, AppError> {
    require_admin(actor)?;
    if delta.unsigned_abs() > POINTS_ADJUSTMENT_MAX.unsigned_abs() {
        return Err(AppError::Validation(format!(
            "Points adjustments are limited to {POINTS_ADJUSTMENT_MAX} either way"
        )));
    }
    let user = store.adjust_points(user_id, delta).await?;
    log::info!("Admin {} adjusted points of {} by {}", actor.id, user_id, delta);
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::{Category, Condition, ItemType, Size},
        db::SqliteStore,
    };

    const POLICY: ListingPolicy = ListingPolicy {
        rule: PointsRule::SizeAdjusted,
        bonus: 5,
    };

    async fn store() -> SqliteStore {
        SqliteStore::in_memory().await.unwrap()
    }

    async fn member(store: &SqliteStore, email: &str) -> User {
        store.insert_user("Member", email, "unused", false).await.unwrap()
    }

    fn blouse(condition: Condition) -> NewItem {
        NewItem::new(
            "Silk blouse",
            "",
            Category::Tops,
            ItemType::Blouse,
            Size::M,
            condition,
            vec![],
            vec![],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn register_list_and_login() {
        let store = store().await;

        let user = register(&store, "Ada", "Ada@Example.com", "stitch in time 9!", false)
            .await
            .unwrap();
        assert_eq!(user.points, 0);
        assert!(!user.is_admin);
        assert_eq!(user.email, "ada@example.com");

        let item = create_item(&store, POLICY, &user, blouse(Condition::LikeNew))
            .await
            .unwrap();
        assert_eq!(item.points, 13);
        assert_eq!(store.get_user(&user.id).await.unwrap().points, 5);

        let logged_in = authenticate(&store, "ada@example.com", "stitch in time 9!")
            .await
            .unwrap();
        assert_eq!(logged_in.id, user.id);

        let wrong = authenticate(&store, "ada@example.com", "stitch in time 8!")
            .await
            .unwrap_err();
        assert!(matches!(wrong, AppError::Auth(AuthErrorCode::WrongPassword)));
        let missing = authenticate(&store, "bob@example.com", "whatever")
            .await
            .unwrap_err();
        assert!(matches!(missing, AppError::Auth(AuthErrorCode::UserNotFound)));
    }

    #[tokio::test]
    async fn search_matches_title_and_tags() {
        let store = store().await;
        let owner = member(&store, "o@example.com").await;
        let tagged = NewItem::new(
            "Plain tee",
            "",
            Category::Tops,
            ItemType::TShirt,
            Size::S,
            Condition::Good,
            vec!["Vintage".into()],
            vec![],
        )
        .unwrap();
        create_item(&store, POLICY, &owner, tagged).await.unwrap();
        create_item(&store, POLICY, &owner, blouse(Condition::Good))
            .await
            .unwrap();
        let all = browse_items(&store, &ItemFilter::available()).await.unwrap();

        assert_eq!(search(all.clone(), "SILK").len(), 1);
        assert_eq!(search(all.clone(), "vintage")[0].title, "Plain tee");
        assert_eq!(search(all.clone(), "  ").len(), 2);
        assert!(search(all, "denim").is_empty());
    }

    #[tokio::test]
    async fn register_rejects_weak_password_before_storing() {
        let store = store().await;
        let err = register(&store, "Ada", "ada@example.com", "password", false)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthErrorCode::WeakPassword)));
        assert!(store.list_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn redemption_spends_item_points_once() {
        let store = store().await;
        let owner = member(&store, "o@example.com").await;
        let buyer = member(&store, "b@example.com").await;
        let item = create_item(&store, POLICY, &owner, blouse(Condition::New))
            .await
            .unwrap();
        store.adjust_points(&buyer.id, item.points + 4).await.unwrap();

        redeem_item(&store, &item.id, &buyer).await.unwrap();

        assert_eq!(store.get_user(&buyer.id).await.unwrap().points, 4);
        assert_eq!(
            store.get_item(&item.id).await.unwrap().status,
            ItemStatus::Redeemed
        );
        // the owner's balance only holds the listing bonus
        assert_eq!(store.get_user(&owner.id).await.unwrap().points, POLICY.bonus);
    }

    #[tokio::test]
    async fn owner_cannot_redeem_or_swap_own_item() {
        let store = store().await;
        let owner = member(&store, "o@example.com").await;
        let item = create_item(&store, POLICY, &owner, blouse(Condition::Good))
            .await
            .unwrap();

        let redeem = redeem_item(&store, &item.id, &owner).await.unwrap_err();
        assert!(matches!(redeem, AppError::Forbidden(_)));
        let swap = request_swap(&store, &item.id, &owner, "").await.unwrap_err();
        assert!(matches!(swap, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn swap_request_flow() {
        let store = store().await;
        let owner = member(&store, "o@example.com").await;
        let other = member(&store, "x@example.com").await;
        let item = create_item(&store, POLICY, &owner, blouse(Condition::Good))
            .await
            .unwrap();

        let request = request_swap(&store, &item.id, &other, "  trade for my scarf? ")
            .await
            .unwrap();
        assert_eq!(request.message, "trade for my scarf?");
        assert_eq!(request.requester_name, "Member");

        let duplicate = request_swap(&store, &item.id, &other, "").await.unwrap_err();
        assert!(matches!(duplicate, AppError::Validation(_)));

        let not_owner = respond_to_swap(&store, &request.id, &other, true)
            .await
            .unwrap_err();
        assert!(matches!(not_owner, AppError::Forbidden(_)));

        let accepted = respond_to_swap(&store, &request.id, &owner, true).await.unwrap();
        assert_eq!(accepted.status, SwapStatus::Completed);

        let board = dashboard(&store, &other.id).await.unwrap();
        assert_eq!(board.outgoing.len(), 1);
        assert!(board.incoming.is_empty());
        let board = dashboard(&store, &owner.id).await.unwrap();
        assert_eq!(board.incoming.len(), 1);
        assert_eq!(board.items[0].status, ItemStatus::Redeemed);
    }

    #[tokio::test]
    async fn requester_cancels_and_owner_rejects() {
        let store = store().await;
        let owner = member(&store, "o@example.com").await;
        let other = member(&store, "x@example.com").await;
        let item = create_item(&store, POLICY, &owner, blouse(Condition::Good))
            .await
            .unwrap();

        let first = request_swap(&store, &item.id, &other, "").await.unwrap();
        let err = cancel_swap(&store, &first.id, &owner).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let cancelled = cancel_swap(&store, &first.id, &other).await.unwrap();
        assert_eq!(cancelled.status, SwapStatus::Cancelled);

        let second = request_swap(&store, &item.id, &other, "").await.unwrap();
        let rejected = respond_to_swap(&store, &second.id, &owner, false).await.unwrap();
        assert_eq!(rejected.status, SwapStatus::Rejected);
        assert_eq!(
            store.get_item(&item.id).await.unwrap().status,
            ItemStatus::Available
        );
    }

    #[tokio::test]
    async fn admin_actions_require_flag() {
        let store = store().await;
        let plain = member(&store, "p@example.com").await;
        let admin = store
            .insert_user("Admin", "a@example.com", "unused", true)
            .await
            .unwrap();
        let item = create_item(&store, POLICY, &plain, blouse(Condition::Fair))
            .await
            .unwrap();

        let err = moderate_item(&store, &plain, &item.id, ItemStatus::Rejected)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let invalid = moderate_item(&store, &admin, &item.id, ItemStatus::Redeemed)
            .await
            .unwrap_err();
        assert!(matches!(invalid, AppError::Validation(_)));

        let rejected = moderate_item(&store, &admin, &item.id, ItemStatus::Rejected)
            .await
            .unwrap();
        assert_eq!(rejected.status, ItemStatus::Rejected);

        let promoted = set_admin(&store, &admin, &plain.id, true).await.unwrap();
        assert!(promoted.is_admin);
        let demote_self = set_admin(&store, &admin, &admin.id, false).await.unwrap_err();
        assert!(matches!(demote_self, AppError::Forbidden(_)));

        let credited = adjust_points(&store, &admin, &plain.id, 20).await.unwrap();
        assert_eq!(credited.points, POLICY.bonus + 20);

        let huge = adjust_points(&store, &admin, &plain.id, i64::MAX).await.unwrap_err();
        assert!(matches!(huge, AppError::Validation(_)));
        let debit = adjust_points(&store, &admin, &plain.id, i64::MIN).await.unwrap_err();
        assert!(matches!(debit, AppError::Validation(_)));
        assert_eq!(store.get_user(&plain.id).await.unwrap().points, POLICY.bonus + 20);

        let overview = admin_overview(&store, &admin).await.unwrap();
        assert_eq!(overview.stats.users, 2);
        assert_eq!(overview.items.len(), 1);

        remove_item(&store, &admin, &item.id).await.unwrap();
        assert!(matches!(
            store.get_item(&item.id).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }
}
