//! Subscriber session tokens
//!
//! Sessions are PASETO `v4.local` tokens: the claims are encrypted and authenticated with a key
//! only the service knows, so the token can be neither read nor forged by the client. The token
//! carries everything needed to validate it - the server records nothing about active sessions,
//! except for the ids of tokens revoked by logout before their expiry.

use std::collections::HashMap;

use base64::prelude::*;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use color_eyre::Result;
use color_eyre::eyre::{OptionExt, ensure};
use pasetors::claims::{Claims, ClaimsValidationRules};
use pasetors::keys::{Generate, SymmetricKey};
use pasetors::token::UntrustedToken;
use pasetors::version4::V4;
use pasetors::{Local, local};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Missing session claim {0}")]
    MissingClaim(&'static str),
    #[error("Session expired")]
    Expired,
    #[error("Session revoked")]
    Revoked,
    #[error("Session key must be 32 bytes")]
    InvalidKey,
}

/// PASETO implicit assertion for subscriber sessions
const SESSION_APP_SECRET: &[u8] = b"ModelQuestionsSubscriberSession";

/// Session lifetime, independent of the subscription expiry
pub fn session_ttl() -> Duration {
    Duration::hours(24)
}

/// Newtype for session token string
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Verified subscriber session
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Username the session was issued for
    pub username: String,
    /// Token identifier, used for revocation
    pub token_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub token: SessionToken,
}

/// Issues and validates subscriber sessions
pub struct Sessions {
    key: SymmetricKey<V4>,
    /// Revoked token ids with the time after which they expire anyway
    revoked: RwLock<HashMap<Uuid, DateTime<Utc>>>,
}

impl Sessions {
    pub fn new(key: SymmetricKey<V4>) -> Self {
        Self {
            key,
            revoked: RwLock::new(HashMap::new()),
        }
    }

    /// Builds sessions manager from a base64 key, generating a random key if none is given
    pub fn with_key(key: Option<&str>) -> Result<Self> {
        let key = match key {
            Some(key) => {
                let key = BASE64_STANDARD.decode(key.trim())?;
                ensure!(key.len() == 32, Error::InvalidKey);
                SymmetricKey::<V4>::from(&key)?
            }
            None => SymmetricKey::<V4>::generate()?,
        };

        Ok(Self::new(key))
    }

    /// Issues a new session for the user
    pub fn issue(&self, username: &str, now: DateTime<Utc>) -> Result<Session> {
        let token_id = Uuid::new_v4();
        let expires_at = now + session_ttl();

        // Lifetime is judged against `iat` on our own clock, pasetors would use the wall clock
        let mut claims = Claims::new()?;
        claims.non_expiring();
        claims.subject(username)?;
        claims.token_identifier(&token_id.to_string())?;
        claims.issued_at(&rfc3339(now))?;
        claims.not_before(&rfc3339(now))?;

        let token = local::encrypt(&self.key, &claims, None, Some(SESSION_APP_SECRET))?;

        Ok(Session {
            username: username.to_owned(),
            token_id,
            issued_at: now,
            expires_at,
            token: SessionToken(token),
        })
    }

    /// Validates a token returning the session on success
    ///
    /// If `claimed` is given, the token has to be issued for that user.
    pub async fn authenticate(
        &self,
        token: &str,
        claimed: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        let untrusted = UntrustedToken::<Local, V4>::try_from(token)?;

        // Validity window is checked against our own clock below
        let mut rules = ClaimsValidationRules::new();
        rules.disable_valid_at();
        rules.allow_non_expiring();
        if let Some(claimed) = claimed {
            rules.validate_subject_with(claimed);
        }

        let trusted = local::decrypt(
            &self.key,
            &untrusted,
            &rules,
            None,
            Some(SESSION_APP_SECRET),
        )?;
        let claims = trusted.payload_claims().ok_or_eyre(Error::MissingClaim("payload"))?;

        let username = claim(claims, "sub")?.to_owned();
        let token_id: Uuid = claim(claims, "jti")?.parse()?;
        let issued_at: DateTime<Utc> = claim(claims, "iat")?.parse()?;

        ensure!(now - issued_at <= session_ttl(), Error::Expired);
        ensure!(
            !self.revoked.read().await.contains_key(&token_id),
            Error::Revoked
        );

        Ok(Session {
            username,
            token_id,
            issued_at,
            expires_at: issued_at + session_ttl(),
            token: SessionToken(token.to_owned()),
        })
    }

    /// Checks if the token is a valid session of the claimed user
    pub async fn is_valid(&self, token: &str, claimed: Option<&str>, now: DateTime<Utc>) -> bool {
        self.authenticate(token, claimed, now).await.is_ok()
    }

    /// Revokes the session before its expiry
    pub async fn revoke(&self, session: &Session, now: DateTime<Utc>) {
        let mut revoked = self.revoked.write().await;
        revoked.retain(|_, expires_at| *expires_at >= now);
        revoked.insert(session.token_id, session.expires_at);
        debug!(username = %session.username, "Session revoked");
    }

    /// Forgets revocations of sessions that expired anyway
    pub async fn cleanup(&self, now: DateTime<Utc>) {
        self.revoked
            .write()
            .await
            .retain(|_, expires_at| *expires_at >= now);
    }
}

fn claim<'a>(claims: &'a Claims, name: &'static str) -> Result<&'a str> {
    claims
        .get_claim(name)
        .and_then(|value| value.as_str())
        .ok_or_eyre(Error::MissingClaim(name))
}

fn rfc3339(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn issued_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap()
    }

    fn sessions() -> Sessions {
        Sessions::with_key(None).unwrap()
    }

    #[tokio::test]
    async fn verify_with_issued_token() {
        let sessions = sessions();
        let session = sessions.issue("alice", issued_at()).unwrap();

        let verified = sessions
            .authenticate(session.token.as_str(), None, issued_at())
            .await
            .unwrap();
        assert_eq!(verified, session);

        // Multiple sessions per user
        let other = sessions.issue("alice", issued_at()).unwrap();
        assert_ne!(other.token, session.token);
        assert!(
            sessions
                .is_valid(other.token.as_str(), Some("alice"), issued_at())
                .await
        );
    }

    #[tokio::test]
    async fn ttl_boundary() {
        let sessions = sessions();
        let token = sessions.issue("alice", issued_at()).unwrap().token;

        let almost = issued_at() + Duration::hours(23) + Duration::minutes(59);
        assert!(sessions.is_valid(token.as_str(), None, almost).await);

        let past = issued_at() + Duration::hours(24) + Duration::minutes(1);
        assert!(!sessions.is_valid(token.as_str(), None, past).await);
    }

    #[tokio::test]
    async fn validity_follows_given_clock() {
        let sessions = sessions();

        for issued_at in [
            Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2090, 1, 1, 0, 0, 0).unwrap(),
        ] {
            let token = sessions.issue("alice", issued_at).unwrap().token;
            assert!(sessions.is_valid(token.as_str(), None, issued_at).await);
            assert!(
                !sessions
                    .is_valid(token.as_str(), None, issued_at + Duration::hours(25))
                    .await
            );
        }
    }

    #[tokio::test]
    async fn verify_with_random_data_fails() {
        let sessions = sessions();
        assert!(!sessions.is_valid("fake_token", None, issued_at()).await);

        // The unsigned token format of the old site
        let legacy = BASE64_STANDARD.encode("alice:1714564800000");
        assert!(!sessions.is_valid(&legacy, None, issued_at()).await);
    }

    #[tokio::test]
    async fn token_from_another_key_fails() {
        let token = sessions().issue("alice", issued_at()).unwrap().token;
        assert!(!sessions().is_valid(token.as_str(), None, issued_at()).await);
    }

    #[tokio::test]
    async fn identity_swap_fails() {
        let sessions = sessions();
        let token = sessions.issue("alice", issued_at()).unwrap().token;

        assert!(
            !sessions
                .is_valid(token.as_str(), Some("bob"), issued_at())
                .await
        );
    }

    #[tokio::test]
    async fn revoked_session_fails() {
        let sessions = sessions();
        let session = sessions.issue("alice", issued_at()).unwrap();
        let kept = sessions.issue("alice", issued_at()).unwrap();

        sessions.revoke(&session, issued_at()).await;

        assert!(
            !sessions
                .is_valid(session.token.as_str(), None, issued_at())
                .await
        );
        assert!(sessions.is_valid(kept.token.as_str(), None, issued_at()).await);
    }

    #[tokio::test]
    async fn cleanup_drops_expired_revocations() {
        let sessions = sessions();
        let session = sessions.issue("alice", issued_at()).unwrap();
        sessions.revoke(&session, issued_at()).await;

        sessions.cleanup(issued_at() + Duration::hours(1)).await;
        assert_eq!(sessions.revoked.read().await.len(), 1);

        sessions.cleanup(issued_at() + Duration::hours(25)).await;
        assert!(sessions.revoked.read().await.is_empty());
    }

    #[tokio::test]
    async fn configured_key() {
        let key = BASE64_STANDARD.encode([7u8; 32]);
        let first = Sessions::with_key(Some(&key)).unwrap();
        let second = Sessions::with_key(Some(&key)).unwrap();

        // Sessions survive a restart with the same key
        let token = first.issue("alice", issued_at()).unwrap().token;
        assert!(second.is_valid(token.as_str(), None, issued_at()).await);

        let short = BASE64_STANDARD.encode([7u8; 16]);
        assert!(Sessions::with_key(Some(&short)).is_err());
    }
}
