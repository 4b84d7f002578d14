//! Session management

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::error::ErrorInternalServerError;
use actix_web::http::header::{self, HeaderName};
use actix_web::middleware::Next;
use actix_web::web::Data;
use actix_web::{Error, HttpMessage};
use tracing::debug;

use crate::auth::{AdminSession, Session};
use crate::model::Model;

/// Cookie carrying the subscriber session token
pub const SESSION_COOKIE: &str = "session";

/// Cookie carrying the admin session token
pub const ADMIN_SESSION_COOKIE: &str = "admin_session";

/// Identity the client claims to act as. If present, the session has to be issued for it.
const CLAIMED_USER_HEADER: HeaderName = HeaderName::from_static("x-username");

/// Tokens found on the request
#[derive(Debug, Default)]
struct Credentials {
    session: Option<String>,
    admin: Option<String>,
}

impl Credentials {
    fn from_request(req: &ServiceRequest) -> Self {
        let mut credentials = Self::default();

        if let Some(auth_header) = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
        {
            match auth_header.split_once(' ') {
                Some(("Session", token)) => credentials.session = Some(token.to_owned()),
                Some(("Admin", token)) => credentials.admin = Some(token.to_owned()),
                _ => debug!("Unsupported Authorization header ignored"),
            }
        }

        if credentials.session.is_none() {
            credentials.session = req
                .cookie(SESSION_COOKIE)
                .map(|cookie| cookie.value().to_owned());
        }

        if credentials.admin.is_none() {
            credentials.admin = req
                .cookie(ADMIN_SESSION_COOKIE)
                .map(|cookie| cookie.value().to_owned());
        }

        credentials
    }
}

/// Attaches verified sessions to the request
///
/// Subscriber sessions are attached as `Session`, admin sessions as `AdminSession`. A missing or
/// invalid token is not an error on its own - every handler decides what an anonymous caller may
/// do, free documents have to be served even along with a broken token.
pub async fn middleware<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<B>, Error>
where
    B: MessageBody + 'static,
{
    let credentials = Credentials::from_request(&req);

    if credentials.session.is_some() || credentials.admin.is_some() {
        let model: Data<Model> = req
            .app_data()
            .cloned()
            .ok_or_else(|| ErrorInternalServerError("Missing context"))?;
        let now = model.clock().now();

        if let Some(token) = credentials.session {
            let claimed = req
                .headers()
                .get(CLAIMED_USER_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);

            match model
                .sessions()
                .authenticate(&token, claimed.as_deref(), now)
                .await
            {
                Ok(session) => {
                    req.extensions_mut().insert::<Session>(session);
                }
                Err(err) => debug!(%err, "Rejected session token"),
            }
        }

        if let Some(token) = credentials.admin {
            match model.admin().authenticate(&token, now).await {
                Ok(session) => {
                    req.extensions_mut().insert::<AdminSession>(session);
                }
                Err(err) => debug!(%err, "Rejected admin token"),
            }
        }
    }

    next.call(req).await
}
