//! Administrator authentication
//!
//! There is exactly one administrator account, configured with an Argon2 password hash. A
//! successful login opens a server-side admin session, completely separate from subscriber
//! sessions.

use std::collections::{HashMap, hash_map};

use base64::prelude::*;
use chrono::{DateTime, Duration, Utc};
use color_eyre::Result;
use color_eyre::eyre::{OptionExt, ensure};
use sha3::{Digest, Sha3_256};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::secret;
use crate::config;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid token format")]
    InvalidTokenFormat,
    #[error("Token doesn't exist")]
    NonExistingToken,
    #[error("Admin session expired")]
    Expired,
    #[error("Configured admin password hash is malformed")]
    InvalidPasswordHash,
    #[error("Configured admin session lifetime is out of range")]
    InvalidSessionTtl,
}

/// Secret mixed into admin token signatures. Leaking the stored secrets alone is not enough to
/// forge a token.
const ADMIN_TOKEN_APP_SECRET: &str = "ModelQuestionsAdminToken";

/// Stored part of an admin token
///
/// Admin token has a structure of `{token_id}.{token}`. `token_id` indexes the tokens storage,
/// `token` authorizes the holder. The token itself is never stored - the entry holds a random
/// `secret` and the SHA3 signature of `{APP_SECRET}.{username}.{secret}.{token}`, so the token
/// can be verified but not recovered from the server state.
#[derive(Debug, Clone)]
struct AdminToken {
    /// Authorized admin
    username: String,
    /// Secret to build the signing key
    secret: Uuid,
    /// Expected hash
    signature: [u8; 32],
    expires_at: DateTime<Utc>,
}

impl AdminToken {
    /// Generate new token for the admin
    ///
    /// Returns pair of generated `AdminToken` and `token` part of the admin token that will be
    /// needed to pass for verification.
    fn generate(username: &str, expires_at: DateTime<Utc>) -> (Self, String) {
        let secret = Uuid::new_v4();
        let token = Uuid::new_v4();
        let token = BASE64_URL_SAFE_NO_PAD.encode(token.as_bytes());

        let signature = Self::sign(username, secret, &token);
        let admin_token = AdminToken {
            username: username.to_owned(),
            secret,
            signature,
            expires_at,
        };

        (admin_token, token)
    }

    fn sign(username: &str, secret: Uuid, token: &str) -> [u8; 32] {
        let secret = BASE64_URL_SAFE_NO_PAD.encode(secret.as_bytes());
        let data = format!("{ADMIN_TOKEN_APP_SECRET}.{username}.{secret}.{token}");

        let mut hasher = Sha3_256::new();
        hasher.update(data.as_bytes());
        hasher.finalize().into()
    }

    /// Verifies the token
    fn verify(&self, token: &str) -> Result<()> {
        let signature = Self::sign(&self.username, self.secret, token);
        ensure!(signature == self.signature, "Token signature doesn't match");
        Ok(())
    }
}

/// Authenticated admin session
#[derive(Debug, Clone, PartialEq)]
pub struct AdminSession {
    pub username: String,
    pub token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Admin credential and the open admin sessions
pub struct AdminAuth {
    username: String,
    password_hash: String,
    ttl: Duration,
    tokens: RwLock<HashMap<Uuid, AdminToken>>,
}

impl AdminAuth {
    pub fn new(config: &config::Admin) -> Result<Self> {
        ensure!(
            secret::is_hash(&config.password_hash),
            Error::InvalidPasswordHash
        );

        let ttl = i64::try_from(config.session_ttl)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_eyre(Error::InvalidSessionTtl)?;

        Ok(Self {
            username: config.username.clone(),
            password_hash: config.password_hash.clone(),
            ttl,
            tokens: RwLock::new(HashMap::new()),
        })
    }

    /// Verifies admin credentials opening a new session
    ///
    /// Returns the token to pass on subsequent requests and the session. `None` means the
    /// credentials were rejected.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Option<(String, AdminSession)> {
        let username_match = username == self.username;

        let (password, hash) = (password.to_owned(), self.password_hash.clone());
        let password_verified =
            tokio::task::spawn_blocking(move || secret::verify(&password, &hash))
                .await
                .unwrap_or(false);

        if !(username_match && password_verified) {
            warn!(username, "Admin login failed");
            return None;
        }

        let Some(expires_at) = now.checked_add_signed(self.ttl) else {
            warn!(username, "Admin session would outlive the calendar");
            return None;
        };
        let mut tokens = self.tokens.write().await;
        tokens.retain(|_, token| token.expires_at > now);

        let (token_entry, token_id) = loop {
            let token_id = Uuid::new_v4();
            if let hash_map::Entry::Vacant(entry) = tokens.entry(token_id) {
                break (entry, token_id);
            }
        };

        let (admin_token, token) = AdminToken::generate(username, expires_at);
        token_entry.insert(admin_token);

        info!(username, "Admin logged in");

        let token_id_b64 = BASE64_URL_SAFE_NO_PAD.encode(token_id.as_bytes());
        let session = AdminSession {
            username: username.to_owned(),
            token_id,
            expires_at,
        };
        Some((format!("{token_id_b64}.{token}"), session))
    }

    /// Verifies an admin token returning the session on success
    pub async fn authenticate(&self, token: &str, now: DateTime<Utc>) -> Result<AdminSession> {
        let (token_id, token) = token
            .split_once('.')
            .ok_or_eyre(Error::InvalidTokenFormat)?;

        let token_id: [u8; 16] = BASE64_URL_SAFE_NO_PAD
            .decode(token_id)?
            .try_into()
            .map_err(|_| Error::InvalidTokenFormat)?;
        let token_id = Uuid::from_bytes(token_id);

        let tokens = self.tokens.read().await;
        let admin_token = tokens.get(&token_id).ok_or_eyre(Error::NonExistingToken)?;
        admin_token.verify(token)?;
        ensure!(admin_token.expires_at > now, Error::Expired);

        Ok(AdminSession {
            username: admin_token.username.clone(),
            token_id,
            expires_at: admin_token.expires_at,
        })
    }

    /// Closes the admin session
    pub async fn logout(&self, session: &AdminSession) {
        self.tokens.write().await.remove(&session.token_id);
        info!(username = %session.username, "Admin logged out");
    }

    /// Drops expired admin sessions
    pub async fn cleanup(&self, now: DateTime<Utc>) {
        self.tokens
            .write()
            .await
            .retain(|_, token| token.expires_at > now);
    }
}
