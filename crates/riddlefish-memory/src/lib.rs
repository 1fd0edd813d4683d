//! `riddlefish-memory` – what the fish remembers between visits.
//!
//! Two keyed record stores on a local SQLite substrate:
//!
//! - [`identity`] – [`IdentityStore`][identity::IdentityStore]: every face
//!   the presence tracker has enrolled, in insertion order.
//! - [`preference`] – [`PreferenceStore`][preference::PreferenceStore]: the
//!   language and voice each visitor chose.
//!
//! Both are traits with a SQLite and an in-memory implementation.  The
//! presence worker and the orchestrator each open their own connection, so
//! no store is ever shared across threads.

pub mod identity;
pub mod preference;

use riddlefish_types::FishError;
use thiserror::Error;

/// Errors that can arise from the record stores.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Identity {0} has no face encoding")]
    EmptyEncoding(uuid::Uuid),
    #[error("Corrupt record {key}: {details}")]
    Corrupt { key: String, details: String },
}

impl From<StoreError> for FishError {
    fn from(e: StoreError) -> Self {
        FishError::Storage(e.to_string())
    }
}
