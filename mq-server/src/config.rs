//! Service configuration

use std::net::SocketAddr;
use std::path::PathBuf;

use derivative::Derivative;
use serde::{Deserialize, Deserializer};
use tracing_subscriber::filter::Directive;

/// Logging output format
#[derive(Debug, Clone, Copy, Deserialize)]
pub enum LogFormat {
    Compact,
    Pretty,
}

impl Default for LogFormat {
    fn default() -> Self {
        Self::Compact
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Logging {
    /// Additional filtering directives
    #[serde(default, deserialize_with = "Logging::deserialize_filters")]
    pub filters: Vec<Directive>,

    /// Logging format
    #[serde(default)]
    pub format: LogFormat,
}

impl Logging {
    fn deserialize_filters<'de, D>(deserializer: D) -> Result<Vec<Directive>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let dirs: Vec<String> = Deserialize::deserialize(deserializer)?;
        dirs.into_iter()
            .map(|dir| dir.parse().map_err(serde::de::Error::custom))
            .collect()
    }
}

/// Subscriber list persistence
#[derive(Debug, Clone, Deserialize)]
pub struct Store {
    /// Path to the users JSON document
    #[serde(default = "Store::default_path")]
    pub path: PathBuf,

    /// How many backup snapshots are kept next to the document
    #[serde(default = "Store::default_backups")]
    pub backups: usize,

    /// Hash cleartext PINs found in the document when loading it
    #[serde(default)]
    pub migrate: bool,
}

impl Store {
    fn default_path() -> PathBuf {
        PathBuf::from("data/users.json")
    }

    fn default_backups() -> usize {
        10
    }
}

impl Default for Store {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
            backups: Self::default_backups(),
            migrate: false,
        }
    }
}

/// The single administrator account
#[derive(Derivative, Clone, Deserialize)]
#[derivative(Debug)]
pub struct Admin {
    #[serde(default = "Admin::default_username")]
    pub username: String,

    /// Argon2 PHC string of the admin password
    #[derivative(Debug = "ignore")]
    pub password_hash: String,

    /// Admin session lifetime in seconds
    #[serde(default = "Admin::default_session_ttl")]
    pub session_ttl: u64,
}

impl Admin {
    fn default_username() -> String {
        "admin".to_owned()
    }

    fn default_session_ttl() -> u64 {
        3600
    }
}

/// Authorization settings
#[derive(Derivative, Clone, Deserialize)]
#[derivative(Debug)]
pub struct Auth {
    /// Base64 encoded 32 bytes key for subscriber session tokens. When missing a random key is
    /// generated on start-up, so sessions do not survive a restart.
    #[serde(default)]
    #[derivative(Debug = "ignore")]
    pub session_key: Option<String>,

    pub admin: Admin,
}

/// Gated documents
#[derive(Debug, Clone, Deserialize)]
pub struct Content {
    /// Directory holding `model-{id}.html` documents
    #[serde(default = "Content::default_dir")]
    pub dir: PathBuf,

    /// Documents are numbered `1..=count`
    #[serde(default = "Content::default_count")]
    pub count: u32,

    /// Documents accessible without subscription
    #[serde(default = "Content::default_free")]
    pub free: Vec<u32>,

    /// Where callers without a session are sent
    #[serde(default = "Content::default_login_page")]
    pub login_page: String,

    /// Where callers with a lapsed subscription are sent
    #[serde(default = "Content::default_renew_page")]
    pub renew_page: String,
}

impl Content {
    fn default_dir() -> PathBuf {
        PathBuf::from("model-questions")
    }

    fn default_count() -> u32 {
        30
    }

    fn default_free() -> Vec<u32> {
        vec![1, 2]
    }

    fn default_login_page() -> String {
        "/login.html".to_owned()
    }

    fn default_renew_page() -> String {
        "/profile.html".to_owned()
    }
}

impl Default for Content {
    fn default() -> Self {
        Self {
            dir: Self::default_dir(),
            count: Self::default_count(),
            free: Self::default_free(),
            login_page: Self::default_login_page(),
            renew_page: Self::default_renew_page(),
        }
    }
}

/// Top level service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address where to host the service
    #[serde(default = "Config::default_host")]
    pub host: SocketAddr,

    /// Logging configuration
    #[serde(default)]
    pub logging: Logging,

    /// Users document
    #[serde(default)]
    pub store: Store,

    /// Authorization
    pub auth: Auth,

    /// Gated documents
    #[serde(default)]
    pub content: Content,
}

impl Config {
    fn default_host() -> SocketAddr {
        ([127, 0, 0, 1], 3030).into()
    }
}
