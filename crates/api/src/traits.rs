use std::path::PathBuf;

use anyhow::Result;
use serde_json::{Map, Value};

/// Process-level action requested through the API.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Signal {
    Restart,
    Update,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Restart => "restart",
            Self::Update => "update",
        }
    }
}

/// Access to the application database.
///
/// The API core has no query engine of its own; the host decides what a
/// query means and how the database file is backed up.
pub trait Database: Send + Sync {
    /// Run a raw query and return the selected rows.
    fn select(&self, query: &str) -> Result<Vec<Map<String, Value>>>;

    /// Copy the database aside and return the backup path.
    fn backup(&self) -> Result<PathBuf>;
}

/// Media library maintenance hook. `refresh` reports whether the refresh
/// actually happened.
pub trait LibraryService: Send + Sync {
    fn refresh(&self) -> Result<bool>;
}

/// User directory maintenance hook.
pub trait UserService: Send + Sync {
    fn refresh(&self) -> Result<bool>;
}

/// Delivers restart/update requests to whatever supervises the process.
pub trait ProcessControl: Send + Sync {
    fn signal(&self, signal: Signal) -> Result<()>;
}

/// Source of proxied image bytes.
pub trait ImageStore: Send + Sync {
    fn fetch(&self, img: &str, width: Option<u32>, height: Option<u32>) -> Result<Vec<u8>>;
}
