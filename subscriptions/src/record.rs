//! Subscriber records

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate};
use derivative::Derivative;
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::store::UserStore;

/// Purchased plan
///
/// The plan only decides how long a purchase or renewal lasts - every active subscriber has access
/// to the same documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionType {
    #[serde(rename = "1-month")]
    OneMonth,
    #[serde(rename = "3-month")]
    ThreeMonth,
    #[serde(rename = "6-year")]
    SixYear,
}

impl SubscriptionType {
    /// Length of a single purchase of this plan in days
    pub fn days(self) -> i64 {
        match self {
            Self::OneMonth => 30,
            Self::ThreeMonth => 90,
            Self::SixYear => 2190,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::days(self.days())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneMonth => "1-month",
            Self::ThreeMonth => "3-month",
            Self::SixYear => "6-year",
        }
    }
}

impl fmt::Display for SubscriptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1-month" => Ok(Self::OneMonth),
            "3-month" => Ok(Self::ThreeMonth),
            "6-year" => Ok(Self::SixYear),
            _ => Err(Error::Validation(format!("unknown subscription type {s}"))),
        }
    }
}

/// Persisted subscriber entry
///
/// `pin` is the stored credential. At rest it is an Argon2 PHC string; the service hashes any
/// cleartext PIN before a record reaches the store.
#[derive(Derivative, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[derivative(Debug)]
pub struct UserRecord {
    pub username: String,
    #[derivative(Debug = "ignore")]
    pub pin: String,
    pub subscription_type: SubscriptionType,
    pub start_date: NaiveDate,
    pub expiry_date: NaiveDate,
}

/// Subscribers are reminded to renew this many days before the expiry
pub const RENEWAL_REMINDER_DAYS: i64 = 7;

/// Usernames are 4 to 20 ASCII letters, digits or underscores
pub fn is_valid_username(username: &str) -> bool {
    (4..=20).contains(&username.len())
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl UserRecord {
    /// Subscription is active strictly before its expiry date
    pub fn is_active(&self, today: NaiveDate) -> bool {
        self.expiry_date > today
    }

    /// Days of access left, zero once lapsed
    pub fn remaining_days(&self, today: NaiveDate) -> i64 {
        (self.expiry_date - today).num_days().max(0)
    }

    /// Active, but close enough to the expiry to remind about renewal
    pub fn renewal_due(&self, today: NaiveDate) -> bool {
        (1..=RENEWAL_REMINDER_DAYS).contains(&self.remaining_days(today))
    }

    /// Public view of the record
    pub fn subscriber(&self) -> Subscriber {
        Subscriber {
            username: self.username.clone(),
            subscription_type: self.subscription_type,
            start_date: self.start_date,
            expiry_date: self.expiry_date,
        }
    }

    /// Checks the per-record invariants
    pub fn validate(&self) -> crate::Result<()> {
        if !is_valid_username(&self.username) {
            return Err(Error::Validation(format!(
                "username {:?} must be 4 to 20 letters, digits or underscores",
                self.username
            )));
        }
        if self.pin.is_empty() {
            return Err(Error::Validation(format!(
                "pin of {} must not be empty",
                self.username
            )));
        }
        if self.expiry_date < self.start_date {
            return Err(Error::Validation(format!(
                "expiry date of {} precedes its start date",
                self.username
            )));
        }
        Ok(())
    }
}

/// Record as submitted for a full replacement of the document
///
/// The PIN may be left out for subscribers that are already stored, they keep their credential.
#[derive(Derivative, Clone, PartialEq, Eq, Deserialize)]
#[derivative(Debug)]
pub struct RecordUpdate {
    pub username: String,
    #[serde(default)]
    #[derivative(Debug = "ignore")]
    pub pin: Option<String>,
    pub subscription_type: SubscriptionType,
    pub start_date: NaiveDate,
    pub expiry_date: NaiveDate,
}

impl RecordUpdate {
    /// Builds the record, taking a missing PIN from the current document
    pub fn resolve(self, current: &UserStore) -> crate::Result<UserRecord> {
        let pin = match self.pin {
            Some(pin) => pin,
            None => current
                .find(&self.username)
                .map(|record| record.pin.clone())
                .ok_or_else(|| {
                    Error::Validation(format!("PIN missing for new user {}", self.username))
                })?,
        };

        Ok(UserRecord {
            username: self.username,
            pin,
            subscription_type: self.subscription_type,
            start_date: self.start_date,
            expiry_date: self.expiry_date,
        })
    }
}

impl From<UserRecord> for RecordUpdate {
    fn from(record: UserRecord) -> Self {
        Self {
            username: record.username,
            pin: Some(record.pin),
            subscription_type: record.subscription_type,
            start_date: record.start_date,
            expiry_date: record.expiry_date,
        }
    }
}

/// Subscriber as returned by the API - the record without its credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub username: String,
    pub subscription_type: SubscriptionType,
    pub start_date: NaiveDate,
    pub expiry_date: NaiveDate,
}
