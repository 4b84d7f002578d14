//! Subscriber endpoints

use actix_web::web::{Bytes, Data, ReqData};
use actix_web::{HttpResponse, get, post};
use derivative::Derivative;
use serde::Deserialize;
use serde_json::json;

use super::session::SESSION_COOKIE;
use super::{parse, removal_cookie, session_cookie};
use crate::auth::Session;
use crate::auth::session::session_ttl;
use crate::error::Error;
use crate::model::Model;

#[derive(Derivative, Deserialize)]
#[derivative(Debug)]
struct LoginRequest {
    username: String,
    #[derivative(Debug = "ignore")]
    pin: String,
}

/// Logs a subscriber in
///
/// The token is returned in the body for API clients, and set as a cookie so that plain document
/// links work in the browser.
#[post("/api/login")]
pub async fn login(model: Data<Model>, body: Bytes) -> Result<HttpResponse, Error> {
    let request: LoginRequest = parse(&body, "Invalid request data")?;
    let (session, user) = model.login(&request.username, &request.pin).await?;

    let cookie = session_cookie(SESSION_COOKIE, session.token.to_string(), session_ttl());
    Ok(HttpResponse::Ok().cookie(cookie).json(json!({
        "success": true,
        "message": "Login successful",
        "token": session.token,
        "expires_at": session.expires_at,
        "user": user,
    })))
}

/// Ends the subscriber session
#[post("/api/logout")]
pub async fn logout(
    model: Data<Model>,
    session: Option<ReqData<Session>>,
) -> Result<HttpResponse, Error> {
    if let Some(session) = session {
        model.cleanup().await;
        model
            .sessions()
            .revoke(&session, model.clock().now())
            .await;
    }

    Ok(HttpResponse::Ok()
        .cookie(removal_cookie(SESSION_COOKIE))
        .json(json!({ "success": true })))
}

/// Subscription of the logged in user
#[get("/api/profile")]
pub async fn profile(
    model: Data<Model>,
    session: Option<ReqData<Session>>,
) -> Result<HttpResponse, Error> {
    let session = session.ok_or(Error::Unauthorized)?;
    let snapshot = model.store().snapshot();

    // Cancelled subscribers are unknown, even with a valid session
    let record = snapshot
        .users
        .find(&session.username)
        .ok_or(Error::Unauthorized)?;

    let today = model.clock().today();
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "user": record.subscriber(),
        "active": record.is_active(today),
        "remaining_days": record.remaining_days(today),
        "renewal_due": record.renewal_due(today),
    })))
}
