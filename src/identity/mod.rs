pub mod session;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// The identity records are filed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub is_anonymous: bool,
}

impl Identity {
    pub fn anonymous(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_anonymous: true,
        }
    }

    pub fn authenticated(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_anonymous: false,
        }
    }
}

/// Supplies the active identity. Sign-in mechanics stay behind the implementation.
pub trait IdentityProvider: Send + Sync {
    fn current_identity(&self) -> Option<Identity>;

    /// Dropping the receiver unsubscribes.
    fn on_identity_changed(&self) -> watch::Receiver<Option<Identity>>;
}
