use std::sync::Arc;

use tokio::sync::watch;

use super::{Identity, IdentityProvider};
use crate::storage::database::Database;
use crate::sync::api_client::ApiClient;
use crate::sync::error::RemoteError;
use crate::sync::types::AuthResponse;

const KEY_TOKEN: &str = "auth_token";
const KEY_USER_ID: &str = "auth_user_id";
const KEY_IS_ANONYMOUS: &str = "auth_is_anonymous";

/// Identity backed by a bearer-token session against the sync server.
/// The session survives restarts through the `app_config` table.
pub struct SessionIdentityProvider {
    api: ApiClient,
    db: Arc<Database>,
    identity: watch::Sender<Option<Identity>>,
}

impl SessionIdentityProvider {
    pub fn new(api: ApiClient, db: Arc<Database>) -> Self {
        let (identity, _) = watch::channel(None);
        let provider = Self { api, db, identity };
        provider.try_restore_session();
        provider
    }

    fn try_restore_session(&self) {
        let token = self.db.get_setting(KEY_TOKEN).unwrap_or_default();
        let user_id = self.db.get_setting(KEY_USER_ID).unwrap_or_default();

        // Empty values are what logout leaves behind
        if token.is_empty() || user_id.is_empty() {
            return;
        }

        let is_anonymous = self
            .db
            .get_setting(KEY_IS_ANONYMOUS)
            .map(|v| v == "true")
            .unwrap_or(true);

        self.api.set_token(Some(token));
        let identity = Identity {
            id: user_id,
            is_anonymous,
        };
        log::info!(
            "Restored session for {} (anonymous: {})",
            identity.id,
            identity.is_anonymous
        );
        self.identity.send_replace(Some(identity));
    }

    fn persist_session(&self, auth: &AuthResponse) {
        let writes = [
            (KEY_TOKEN, auth.token.as_str()),
            (KEY_USER_ID, auth.user_id.as_str()),
            (KEY_IS_ANONYMOUS, if auth.is_anonymous { "true" } else { "false" }),
        ];
        for (key, value) in writes {
            if let Err(e) = self.db.set_setting(key, value) {
                log::warn!("Failed to persist {}: {}", key, e);
            }
        }
    }

    fn clear_session_settings(&self) {
        for key in [KEY_TOKEN, KEY_USER_ID, KEY_IS_ANONYMOUS] {
            if let Err(e) = self.db.set_setting(key, "") {
                log::warn!("Failed to clear {}: {}", key, e);
            }
        }
    }

    fn activate(&self, auth: AuthResponse) -> Identity {
        self.persist_session(&auth);
        self.api.set_token(Some(auth.token.clone()));
        let identity = Identity {
            id: auth.user_id,
            is_anonymous: auth.is_anonymous,
        };
        self.identity.send_replace(Some(identity.clone()));
        identity
    }

    /// Make sure some identity is active, signing in anonymously if none was restored.
    pub async fn ensure_identity(&self) -> Result<Identity, RemoteError> {
        if let Some(identity) = self.current_identity() {
            return Ok(identity);
        }
        log::info!("No persisted session, signing in anonymously");
        let auth = self.api.sign_in_anonymously().await?;
        Ok(self.activate(auth))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, RemoteError> {
        let auth = self.api.login(email, password).await?;
        log::info!("Logged in as {}", email);
        Ok(self.activate(auth))
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<Identity, RemoteError> {
        let auth = self.api.register(email, password).await?;
        log::info!("Registered {}", email);
        Ok(self.activate(auth))
    }

    pub fn logout(&self) {
        self.clear_session_settings();
        self.api.set_token(None);
        self.identity.send_replace(None);
        log::info!("Logged out");
    }
}

impl IdentityProvider for SessionIdentityProvider {
    fn current_identity(&self) -> Option<Identity> {
        self.identity.borrow().clone()
    }

    fn on_identity_changed(&self) -> watch::Receiver<Option<Identity>> {
        self.identity.subscribe()
    }
}
