//! Administrator endpoints

use actix_web::web::{Bytes, Data, Path, ReqData};
use actix_web::{HttpResponse, delete, get, post};
use derivative::Derivative;
use rand::Rng;
use serde::Deserialize;
use serde_json::{Value, json};
use subscriptions::{Mutation, RecordUpdate, SubscriptionType};
use tracing::{info, instrument};

use super::session::ADMIN_SESSION_COOKIE;
use super::{parse, removal_cookie, session_cookie};
use crate::auth::{AdminSession, secret};
use crate::error::Error;
use crate::model::Model;

#[derive(Derivative, Deserialize)]
#[derivative(Debug)]
struct LoginRequest {
    username: String,
    #[derivative(Debug = "ignore")]
    password: String,
}

/// Full replacement of the users document
///
/// Records without a PIN keep the stored one, so the listing can be sent back as it is.
#[derive(Debug, Deserialize)]
struct UsersWrite {
    users: Vec<RecordUpdate>,
    /// Revision of the document the replacement is based on
    #[serde(default)]
    revision: Option<String>,
}

#[derive(Derivative, Deserialize)]
#[derivative(Debug)]
struct CreateRequest {
    /// Generated when not given
    #[serde(default)]
    username: Option<String>,
    /// Generated when not given
    #[serde(default)]
    #[derivative(Debug = "ignore")]
    pin: Option<String>,
    subscription_type: SubscriptionType,
}

#[derive(Debug, Deserialize)]
struct ExtendRequest {
    subscription_type: SubscriptionType,
}

fn require_admin(session: Option<ReqData<AdminSession>>) -> Result<AdminSession, Error> {
    session.map(ReqData::into_inner).ok_or(Error::Unauthorized)
}

/// PINs are short numeric codes
fn validate_pin(pin: &str) -> Result<(), Error> {
    if (4..=12).contains(&pin.len()) && pin.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(Error::Validation("PIN must be 4 to 12 digits".into()))
    }
}

/// Random six digit PIN
fn generate_pin() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

/// Random `user_` prefixed username
fn generate_username() -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();
    format!("user_{suffix}")
}

async fn hash_pin(pin: String) -> Result<String, Error> {
    tokio::task::spawn_blocking(move || secret::hash(&pin))
        .await
        .map_err(|err| Error::Internal(err.to_string()))?
        .map_err(Into::into)
}

/// Opens an admin session
pub async fn login(model: Data<Model>, body: Bytes) -> Result<HttpResponse, Error> {
    let request: LoginRequest = parse(&body, "Invalid request data")?;
    model.cleanup().await;

    let now = model.clock().now();
    let (token, session) = model
        .admin()
        .login(&request.username, &request.password, now)
        .await
        .ok_or(Error::InvalidCredentials)?;

    let cookie = session_cookie(ADMIN_SESSION_COOKIE, token, session.expires_at - now);
    Ok(HttpResponse::Ok().cookie(cookie).json(json!({
        "success": true,
        "message": "Login successful",
    })))
}

/// Closes the admin session
#[post("/api/admin/logout")]
pub async fn logout(
    model: Data<Model>,
    session: Option<ReqData<AdminSession>>,
) -> Result<HttpResponse, Error> {
    let session = require_admin(session)?;
    model.admin().logout(&session).await;

    Ok(HttpResponse::Ok()
        .cookie(removal_cookie(ADMIN_SESSION_COOKIE))
        .json(json!({ "success": true })))
}

/// Replaces the whole users document
#[instrument(skip_all)]
pub async fn write_users(
    model: Data<Model>,
    session: Option<ReqData<AdminSession>>,
    body: Bytes,
) -> Result<HttpResponse, Error> {
    let session = require_admin(session)?;

    let data: Value = parse(&body, "Invalid JSON data")?;
    if !data.get("users").is_some_and(Value::is_array) {
        return Err(Error::Validation("Invalid data structure".into()));
    }
    let UsersWrite { users, revision } = serde_json::from_value(data)
        .map_err(|err| Error::Validation(format!("Invalid user data structure: {err}")))?;

    for pin in users.iter().filter_map(|user| user.pin.as_deref()) {
        if !secret::is_hash(pin) {
            validate_pin(pin)?;
        }
    }

    let users = tokio::task::spawn_blocking(move || {
        users
            .into_iter()
            .map(|mut user| {
                user.pin = user.pin.map(secret::ensure_hashed).transpose()?;
                Ok(user)
            })
            .collect::<color_eyre::Result<Vec<_>>>()
    })
    .await
    .map_err(|err| Error::Internal(err.to_string()))??;

    let count = users.len();
    let (_, snapshot) = model
        .store()
        .apply(
            Mutation::Replace { users },
            model.clock().now(),
            revision.as_deref(),
        )
        .await?;

    info!(admin = %session.username, users = count, "Users document replaced");
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "revision": snapshot.revision,
    })))
}

/// Lists all the subscriptions
#[get("/api/admin/users")]
pub async fn list_users(
    model: Data<Model>,
    session: Option<ReqData<AdminSession>>,
) -> Result<HttpResponse, Error> {
    require_admin(session)?;
    let snapshot = model.store().snapshot();

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "users": snapshot.users.subscribers(),
        "revision": snapshot.revision,
    })))
}

/// Creates a new subscription
///
/// When the PIN is not given, a random one is generated and returned. This is the only time the
/// PIN is visible, it is stored hashed.
#[post("/api/admin/subscriptions")]
#[instrument(skip_all)]
pub async fn create_subscription(
    model: Data<Model>,
    session: Option<ReqData<AdminSession>>,
    body: Bytes,
) -> Result<HttpResponse, Error> {
    let session = require_admin(session)?;
    let request: CreateRequest = parse(&body, "Invalid subscription data")?;

    let username = match request.username {
        Some(username) => username.trim().to_owned(),
        None => generate_username(),
    };
    let (pin, generated) = match request.pin {
        Some(pin) => {
            validate_pin(&pin)?;
            (pin, false)
        }
        None => (generate_pin(), true),
    };

    let mutation = Mutation::Create {
        username,
        pin: hash_pin(pin.clone()).await?,
        subscription_type: request.subscription_type,
    };
    let (record, _) = model
        .store()
        .apply(mutation, model.clock().now(), None)
        .await?;
    let user = record.map(|record| record.subscriber());

    info!(admin = %session.username, ?user, "Subscription created");
    let mut response = json!({
        "success": true,
        "message": "Subscription created successfully",
        "user": user,
    });
    if generated {
        response["pin"] = Value::String(pin);
    }

    Ok(HttpResponse::Created().json(response))
}

/// Extends an existing subscription
#[post("/api/admin/subscriptions/{username}/extend")]
#[instrument(skip(model, session, body))]
pub async fn extend_subscription(
    model: Data<Model>,
    session: Option<ReqData<AdminSession>>,
    username: Path<String>,
    body: Bytes,
) -> Result<HttpResponse, Error> {
    let session = require_admin(session)?;
    let request: ExtendRequest = parse(&body, "Invalid subscription data")?;

    let mutation = Mutation::Extend {
        username: username.into_inner(),
        subscription_type: request.subscription_type,
    };
    let (record, _) = model
        .store()
        .apply(mutation, model.clock().now(), None)
        .await?;
    let user = record.map(|record| record.subscriber());

    info!(admin = %session.username, ?user, "Subscription extended");
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Subscription extended successfully",
        "user": user,
    })))
}

/// Cancels a subscription removing the subscriber
#[delete("/api/admin/subscriptions/{username}")]
#[instrument(skip(model, session))]
pub async fn cancel_subscription(
    model: Data<Model>,
    session: Option<ReqData<AdminSession>>,
    username: Path<String>,
) -> Result<HttpResponse, Error> {
    let session = require_admin(session)?;

    let mutation = Mutation::Cancel {
        username: username.into_inner(),
    };
    model
        .store()
        .apply(mutation, model.clock().now(), None)
        .await?;

    info!(admin = %session.username, "Subscription cancelled");
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Subscription cancelled successfully",
    })))
}
