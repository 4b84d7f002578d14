//! User store document

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::record::{Subscriber, UserRecord};
use crate::{Error, Result};

/// The whole persisted subscriber list
///
/// This is the only durable state of the service. It is always replaced as a whole - mutations
/// build a new document instead of patching the old one in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStore {
    pub users: Vec<UserRecord>,
}

impl UserStore {
    pub fn new(users: Vec<UserRecord>) -> Self {
        Self { users }
    }

    /// Looks up a record by exact username
    pub fn find(&self, username: &str) -> Option<&UserRecord> {
        self.users.iter().find(|user| user.username == username)
    }

    pub(crate) fn position(&self, username: &str) -> Option<usize> {
        self.users.iter().position(|user| user.username == username)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.position(username).is_some()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Public views of all the records, in store order
    pub fn subscribers(&self) -> Vec<Subscriber> {
        self.users.iter().map(UserRecord::subscriber).collect()
    }

    /// Checks every record and the username uniqueness
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.users.len());
        for user in &self.users {
            user.validate()?;
            if !seen.insert(user.username.as_str()) {
                return Err(Error::DuplicateUser(user.username.clone()));
            }
        }
        Ok(())
    }
}
