//! Access decision for model-question documents

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::store::UserStore;

/// Outcome of an access check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    /// Caller is not logged in (or their session is no good)
    RedirectLogin,
    /// Caller is known, but their subscription lapsed
    RedirectRenew,
}

/// Decides who can open which document
#[derive(Debug, Clone)]
pub struct AccessGate {
    /// Documents open to everyone
    free: BTreeSet<u32>,
    /// Documents are numbered `1..=count`
    count: u32,
}

impl AccessGate {
    pub fn new(count: u32, free: impl IntoIterator<Item = u32>) -> Self {
        Self {
            free: free.into_iter().collect(),
            count,
        }
    }

    /// Number of documents
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn exists(&self, resource_id: u32) -> bool {
        (1..=self.count).contains(&resource_id)
    }

    pub fn is_free(&self, resource_id: u32) -> bool {
        self.free.contains(&resource_id)
    }

    /// Decides access of an authenticated subject to a document
    ///
    /// `subject` is the username bound to an already verified session, `None` if there is no
    /// session or it failed verification. Free documents are allowed before the session is even
    /// looked at.
    pub fn decide(
        &self,
        resource_id: u32,
        subject: Option<&str>,
        store: &UserStore,
        today: NaiveDate,
    ) -> Decision {
        if self.is_free(resource_id) {
            return Decision::Allow;
        }

        let Some(subject) = subject else {
            return Decision::RedirectLogin;
        };

        match store.find(subject) {
            // Cancelled subscriber holding a still valid session
            None => Decision::RedirectLogin,
            Some(user) if !user.is_active(today) => Decision::RedirectRenew,
            Some(_) => Decision::Allow,
        }
    }
}

impl Default for AccessGate {
    fn default() -> Self {
        Self::new(30, [1, 2])
    }
}
