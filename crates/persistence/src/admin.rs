use crate::{PersistenceError, RecordStore};
use tracing::{info, warn};

/// Shared-secret gate in front of the record store.
///
/// The secret is compared in plaintext. This keeps casual players out of
/// the admin view and nothing more.
#[derive(Debug, Clone)]
pub struct AdminGate {
    secret: String,
}

impl AdminGate {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn check(&self, attempt: &str) -> bool {
        !self.secret.is_empty() && attempt == self.secret
    }

    /// Read access to `store` when `attempt` matches, `None` otherwise.
    pub fn unlock<'a>(&self, attempt: &str, store: &'a dyn RecordStore) -> Option<AdminView<'a>> {
        if self.check(attempt) {
            info!("admin view unlocked");
            Some(AdminView { store })
        } else {
            warn!("admin secret rejected");
            None
        }
    }
}

/// Read-only admin access to stored records.
pub struct AdminView<'a> {
    store: &'a dyn RecordStore,
}

impl AdminView<'_> {
    pub fn record_count(&self) -> Result<usize, PersistenceError> {
        self.store.count()
    }

    /// All records as CSV bytes, suitable for download.
    pub fn export_csv(&self) -> Result<Vec<u8>, PersistenceError> {
        self.store.export()
    }
}
