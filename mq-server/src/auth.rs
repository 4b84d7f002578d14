//! Authentication of subscribers and the administrator

pub mod admin;
pub mod credentials;
pub mod secret;
pub mod session;

pub use admin::{AdminAuth, AdminSession};
pub use credentials::Credentials;
pub use session::{Session, Sessions};
