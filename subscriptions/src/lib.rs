//! Subscription domain model
//!
//! Pure data and decision logic for the model-questions site: subscriber records, the user store
//! document and its mutations, and the access gate deciding who may open which document. Nothing
//! here touches IO - persistence and token handling live in the service crate.

pub mod clock;
pub mod gate;
pub mod mutation;
pub mod record;
pub mod store;

use thiserror::Error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use gate::{AccessGate, Decision};
pub use mutation::Mutation;
pub use record::{RecordUpdate, Subscriber, SubscriptionType, UserRecord, is_valid_username};
pub use store::UserStore;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Invalid user data: {0}")]
    Validation(String),
    #[error("User {0} not found")]
    NotFound(String),
    #[error("Username {0} already exists")]
    DuplicateUser(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
