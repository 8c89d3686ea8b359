#[macro_use]
extern crate lazy_static;
use actix_identity::IdentityMiddleware;
use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use std::sync::Arc;
use tera::Tera;

use actix_files::{Files, NamedFile};
use actix_web::{
    cookie::Key,
    http::{Method, StatusCode},
    middleware,
    web::{self, Data},
    App, Either, HttpResponse, HttpServer, Responder,
};
use log::info;

mod catalog;
mod config;
mod db;
mod errors;
mod marketplace;
mod navigation;
mod points;
mod routes;
mod storage;
mod structs;
mod utils;

use config::Config;
use db::{SqliteStore, Store};
use storage::{FileStorage, LocalFileStorage};

/// Capabilities handed to every handler.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn Store>,
    files: Arc<dyn FileStorage>,
    config: Arc<Config>,
}

lazy_static! {
    pub static ref TEMPLATES: Tera = {
        let mut tera = match Tera::new("templates/**/*") {
            Ok(t) => t,
            Err(e) => {
                log::error!("Parsing error(s): {}", e);
                ::std::process::exit(1);
            }
        };
        tera.autoescape_on(vec![".html"]);
        tera
    };
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env()?;
    let session_key = Key::from(&config.session_key);

    let store = SqliteStore::connect(&config.database_url).await?;
    std::fs::create_dir_all(&config.upload_dir)?;
    let files = LocalFileStorage::new(
        &config.upload_dir,
        storage::PUBLIC_PREFIX,
        config.upload_max_bytes,
    );

    let state = AppState {
        store: Arc::new(store),
        files: Arc::new(files),
        config: Arc::new(config.clone()),
    };

    info!(
        "Starting HTTP server on http://{}:{}/",
        config.bind, config.port
    );

    HttpServer::new(move || {
        App::new()
            // enable automatic response compression - usually register this first
            .wrap(middleware::Compress::default())
            .wrap(IdentityMiddleware::default())
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), session_key.clone())
                    .cookie_secure(state.config.secure_cookies)
                    .build(),
            )
            // enable logger - always register Actix Web Logger middleware last
            .wrap(middleware::Logger::default())
            .app_data(Data::new(state.clone()))
            // image uploads arrive as raw bodies up to the storage limit
            .app_data(web::PayloadConfig::new(state.config.upload_max_bytes))
            .configure(routes::configure)
            .service(Files::new("/static", "static"))
            .service(Files::new(
                storage::PUBLIC_PREFIX,
                state.config.upload_dir.clone(),
            ))
            .default_service(web::to(default_handler))
    })
    .bind((config.bind.as_str(), config.port))?
    .run()
    .await
}

async fn default_handler(req_method: Method) -> Result<impl Responder, std::io::Error> {
    match req_method {
        Method::GET => {
            let file = NamedFile::open("static/404.html")?
                .customize()
                .with_status(StatusCode::NOT_FOUND);
            Ok(Either::Left(file))
        }
        _ => Ok(Either::Right(HttpResponse::MethodNotAllowed().finish())),
    }
}
