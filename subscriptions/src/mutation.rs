//! Administrative changes to the user store

use chrono::NaiveDate;
use derivative::Derivative;

use crate::record::{RecordUpdate, SubscriptionType, UserRecord};
use crate::store::UserStore;
use crate::{Error, Result};

/// Single privileged change of the subscriber list
#[derive(Derivative, Clone, PartialEq, Eq)]
#[derivative(Debug)]
pub enum Mutation {
    /// New subscription. `pin` is expected to be already hashed.
    Create {
        username: String,
        #[derivative(Debug = "ignore")]
        pin: String,
        subscription_type: SubscriptionType,
    },
    /// Renewal of an existing subscription
    Extend {
        username: String,
        subscription_type: SubscriptionType,
    },
    /// Removal of a subscriber
    Cancel { username: String },
    /// Full replacement of the subscriber list
    Replace { users: Vec<RecordUpdate> },
}

/// Outcome of a mutation
#[derive(Debug, Clone)]
pub struct Applied {
    /// The new document
    pub store: UserStore,
    /// Record created, updated or removed by the mutation
    pub record: Option<UserRecord>,
}

impl Mutation {
    /// Applies the mutation producing a new document
    ///
    /// The source document is never modified - on error nothing changes. The produced document
    /// is validated before it is returned.
    pub fn apply(self, store: &UserStore, today: NaiveDate) -> Result<Applied> {
        let mut next = store.clone();

        let record = match self {
            Self::Create {
                username,
                pin,
                subscription_type,
            } => {
                if next.contains(&username) {
                    return Err(Error::DuplicateUser(username));
                }

                let record = UserRecord {
                    username,
                    pin,
                    subscription_type,
                    start_date: today,
                    expiry_date: add_days(today, subscription_type)?,
                };
                record.validate()?;
                next.users.push(record.clone());
                Some(record)
            }

            Self::Extend {
                username,
                subscription_type,
            } => {
                let idx = next
                    .position(&username)
                    .ok_or_else(|| Error::NotFound(username.clone()))?;

                let record = &mut next.users[idx];
                // Renewal stacks on the remaining time, a lapsed subscription restarts today
                let base = record.expiry_date.max(today);
                record.expiry_date = add_days(base, subscription_type)?;
                record.subscription_type = subscription_type;
                Some(record.clone())
            }

            Self::Cancel { username } => {
                let idx = next
                    .position(&username)
                    .ok_or_else(|| Error::NotFound(username.clone()))?;
                Some(next.users.remove(idx))
            }

            Self::Replace { users } => {
                let users = users
                    .into_iter()
                    .map(|update| update.resolve(store))
                    .collect::<Result<_>>()?;
                next = UserStore::new(users);
                None
            }
        };

        next.validate()?;
        Ok(Applied {
            store: next,
            record,
        })
    }
}

fn add_days(date: NaiveDate, subscription_type: SubscriptionType) -> Result<NaiveDate> {
    date.checked_add_signed(subscription_type.duration())
        .ok_or_else(|| Error::Validation(format!("expiry date out of range after {date}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn create(store: &UserStore, name: &str, today: NaiveDate) -> Result<Applied> {
        Mutation::Create {
            username: name.into(),
            pin: "hash".into(),
            subscription_type: SubscriptionType::OneMonth,
        }
        .apply(store, today)
    }

    fn extend(store: &UserStore, name: &str, today: NaiveDate) -> Result<Applied> {
        Mutation::Extend {
            username: name.into(),
            subscription_type: SubscriptionType::OneMonth,
        }
        .apply(store, today)
    }

    #[test]
    fn create_sets_dates() {
        let today = date(2025, 5, 1);
        let applied = create(&UserStore::default(), "alice", today).unwrap();
        let alice = applied.store.find("alice").unwrap();

        assert_eq!(alice.start_date, today);
        assert_eq!(alice.expiry_date, date(2025, 5, 31));
        assert_eq!(applied.record.as_ref(), Some(alice));
    }

    #[test]
    fn create_duplicate_fails() {
        let today = date(2025, 5, 1);
        let store = create(&UserStore::default(), "alice", today).unwrap().store;

        let err = create(&store, "alice", today).unwrap_err();
        assert_eq!(err, Error::DuplicateUser("alice".into()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn create_then_extend_stacks() {
        let today = date(2025, 5, 1);
        let store = create(&UserStore::default(), "alice", today).unwrap().store;
        let store = extend(&store, "alice", today).unwrap().store;
        let alice = store.find("alice").unwrap();

        assert_eq!(alice.expiry_date, alice.start_date + chrono::Duration::days(60));
    }

    #[test]
    fn extend_lapsed_restarts_today() {
        let store = create(&UserStore::default(), "alice", date(2024, 1, 1))
            .unwrap()
            .store;

        let today = date(2025, 5, 1);
        let store = extend(&store, "alice", today).unwrap().store;
        assert_eq!(store.find("alice").unwrap().expiry_date, date(2025, 5, 31));
    }

    #[test]
    fn extend_updates_plan() {
        let today = date(2025, 5, 1);
        let store = create(&UserStore::default(), "alice", today).unwrap().store;
        let store = Mutation::Extend {
            username: "alice".into(),
            subscription_type: SubscriptionType::ThreeMonth,
        }
        .apply(&store, today)
        .unwrap()
        .store;

        let alice = store.find("alice").unwrap();
        assert_eq!(alice.subscription_type, SubscriptionType::ThreeMonth);
        assert_eq!(alice.expiry_date, date(2025, 5, 31) + chrono::Duration::days(90));
    }

    #[test]
    fn extend_never_decreases_expiry() {
        let start = date(2025, 1, 1);
        let mut store = create(&UserStore::default(), "alice", start).unwrap().store;

        for offset in [0, 10, 29, 30, 31, 200, 400] {
            let today = start + chrono::Duration::days(offset);
            let before = store.find("alice").unwrap().expiry_date;
            store = extend(&store, "alice", today).unwrap().store;
            let after = store.find("alice").unwrap().expiry_date;
            assert!(after >= before, "expiry went from {before} to {after}");
            assert!(after > today);
        }
    }

    #[test]
    fn missing_user() {
        let store = create(&UserStore::default(), "alice", date(2025, 5, 1))
            .unwrap()
            .store;

        let err = extend(&store, "bobby", date(2025, 5, 1)).unwrap_err();
        assert_eq!(err, Error::NotFound("bobby".into()));

        let err = Mutation::Cancel {
            username: "bobby".into(),
        }
        .apply(&store, date(2025, 5, 1))
        .unwrap_err();
        assert_eq!(err, Error::NotFound("bobby".into()));
    }

    #[test]
    fn cancel_removes() {
        let today = date(2025, 5, 1);
        let store = create(&UserStore::default(), "alice", today).unwrap().store;
        let store = create(&store, "bobby", today).unwrap().store;

        let applied = Mutation::Cancel {
            username: "alice".into(),
        }
        .apply(&store, today)
        .unwrap();

        assert_eq!(applied.record.unwrap().username, "alice");
        assert!(applied.store.find("alice").is_none());
        assert!(applied.store.find("bobby").is_some());
    }

    #[test]
    fn replace_is_validated() {
        let today = date(2025, 5, 1);
        let store = create(&UserStore::default(), "alice", today).unwrap().store;
        let alice = RecordUpdate::from(store.users[0].clone());
        let duplicated = vec![alice.clone(), alice];

        let err = Mutation::Replace { users: duplicated }
            .apply(&store, today)
            .unwrap_err();
        assert_eq!(err, Error::DuplicateUser("alice".into()));

        let applied = Mutation::Replace { users: vec![] }
            .apply(&store, today)
            .unwrap();
        assert!(applied.store.is_empty());
    }

    #[test]
    fn replace_keeps_pins_left_out() {
        let today = date(2025, 5, 1);
        let store = create(&UserStore::default(), "alice", today).unwrap().store;

        let mut alice = RecordUpdate::from(store.users[0].clone());
        alice.pin = None;
        alice.expiry_date = date(2025, 12, 31);

        let applied = Mutation::Replace { users: vec![alice] }
            .apply(&store, today)
            .unwrap();
        let stored = applied.store.find("alice").unwrap();
        assert_eq!(stored.pin, "hash");
        assert_eq!(stored.expiry_date, date(2025, 12, 31));

        let newcomer = RecordUpdate {
            username: "carol".into(),
            pin: None,
            subscription_type: SubscriptionType::OneMonth,
            start_date: today,
            expiry_date: date(2025, 5, 31),
        };
        let err = Mutation::Replace {
            users: vec![newcomer],
        }
        .apply(&store, today)
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn malformed_username_rejected() {
        let err = create(&UserStore::default(), "a/b", date(2025, 5, 1)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn usernames_unique_after_every_mutation() {
        let today = date(2025, 5, 1);
        let mut store = UserStore::default();
        let names = ["anna", "bert", "anna", "cleo", "bert", "anna"];

        for (i, name) in names.iter().enumerate() {
            let mutation = match i % 3 {
                0 | 1 => Mutation::Create {
                    username: name.to_string(),
                    pin: "hash".into(),
                    subscription_type: SubscriptionType::OneMonth,
                },
                _ => Mutation::Cancel {
                    username: name.to_string(),
                },
            };
            if let Ok(applied) = mutation.apply(&store, today) {
                store = applied.store;
            }
            store.validate().unwrap();
        }
    }
}
