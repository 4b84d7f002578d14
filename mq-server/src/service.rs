//! Utilities for services building

use actix_web::cookie::time::Duration as CookieDuration;
use actix_web::cookie::{Cookie, SameSite};
use actix_web::web::{Data, ServiceConfig};
use actix_web::{HttpResponse, get, middleware, web};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;


mod admin;
mod content;
mod session;
mod subscriber;

use crate::error::Error;
use crate::model::Model;

/// Liveness check
#[get("/health")]
async fn health() -> &'static str {
    "ok"
}

/// Fallback for endpoints called with an unsupported method
async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().json(json!({
        "success": false,
        "message": "Method not allowed",
    }))
}

/// Parses JSON request body
///
/// Bodies are taken as raw bytes and parsed in the handlers, so that authorization is checked
/// before the body is even looked at.
fn parse<T: DeserializeOwned>(body: &[u8], message: &str) -> Result<T, Error> {
    serde_json::from_slice(body).map_err(|err| {
        debug!(%err, "Malformed request body");
        Error::Validation(message.to_owned())
    })
}

/// Builds a cookie holding a session token
fn session_cookie(name: &'static str, token: String, max_age: chrono::Duration) -> Cookie<'static> {
    Cookie::build(name, token)
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::seconds(max_age.num_seconds()))
        .finish()
}

/// Builds a cookie removing the session cookie from the client
fn removal_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::build(name, "").path("/").finish();
    cookie.make_removal();
    cookie
}

/// Returns configuration function for the ActixWeb services
pub async fn configure(
    context: Model,
) -> color_eyre::Result<impl Fn(&mut web::ServiceConfig) + Clone> {
    let cfg = move |cfg: &mut ServiceConfig| {
        let session_aware = {
            web::scope("")
                .wrap(middleware::from_fn(session::middleware))
                .service(
                    web::resource("/api/admin/login")
                        .route(web::post().to(admin::login))
                        .default_service(web::to(method_not_allowed)),
                )
                .service(
                    web::resource("/api/users")
                        .route(web::post().to(admin::write_users))
                        .default_service(web::to(method_not_allowed)),
                )
                .service(admin::logout)
                .service(admin::list_users)
                .service(admin::create_subscription)
                .service(admin::extend_subscription)
                .service(admin::cancel_subscription)
                .service(subscriber::login)
                .service(subscriber::logout)
                .service(subscriber::profile)
                .service(content::questions)
                .service(content::document)
        };

        cfg.app_data(Data::new(context.clone()))
            .service(health)
            .service(session_aware);
    };

    Ok(cfg)
}
