//! Subscriber login

use chrono::NaiveDate;
use color_eyre::Result;
use subscriptions::{UserRecord, UserStore};
use tracing::debug;

use crate::auth::secret;

/// Checks username/PIN pairs against the user store
pub struct Credentials {
    /// Verified against when the username is unknown, so that timing does not tell whether the
    /// user exists
    dummy_hash: String,
}

impl Credentials {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dummy_hash: secret::hash("000000")?,
        })
    }

    /// Returns the subscriber record if the PIN matches and the subscription is active
    ///
    /// Every failure yields `None` - callers must not tell apart why the login was refused.
    pub async fn validate(
        &self,
        users: &UserStore,
        username: &str,
        pin: &str,
        today: NaiveDate,
    ) -> Option<UserRecord> {
        let record = users.find(username).cloned();
        let hash = record
            .as_ref()
            .map_or_else(|| self.dummy_hash.clone(), |record| record.pin.clone());

        let pin = pin.to_owned();
        let verified = tokio::task::spawn_blocking(move || secret::verify(&pin, &hash))
            .await
            .unwrap_or(false);

        let record = record.filter(|_| verified)?;
        if !record.is_active(today) {
            debug!(username, expiry_date = %record.expiry_date, "Login with lapsed subscription");
            return None;
        }

        Some(record)
    }
}
