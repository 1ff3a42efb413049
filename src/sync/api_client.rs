use std::sync::{Arc, RwLock};

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::error::RemoteError;
use super::types::*;
use crate::clipboard::item::{ClipboardEntry, EntryPatch, NewEntry};

/// HTTP client for the sync server. Clones share the session token.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: Arc::new(RwLock::new(None)),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set_token(&self, token: Option<String>) {
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = token;
    }

    fn bearer(&self, request: RequestBuilder) -> Result<RequestBuilder, RemoteError> {
        let token = self
            .token()
            .ok_or_else(|| RemoteError::Unauthorized("no session token".to_string()))?;
        Ok(request.bearer_auth(token))
    }

    /// `base_url` plus escaped path segments.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| RemoteError::Parse(format!("invalid server URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| RemoteError::Parse(format!("invalid server URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    // ── Auth ────────────────────────────────────────────────────────────

    pub async fn sign_in_anonymously(&self) -> Result<AuthResponse, RemoteError> {
        let resp = self
            .client
            .post(self.endpoint(&["api", "auth", "anonymous"])?)
            .send()
            .await?;
        parse(check(resp).await?).await
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<AuthResponse, RemoteError> {
        let resp = self
            .client
            .post(self.endpoint(&["api", "auth", "register"])?)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;
        parse(check(resp).await?).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, RemoteError> {
        let resp = self
            .client
            .post(self.endpoint(&["api", "auth", "login"])?)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;
        parse(check(resp).await?).await
    }

    // ── History ─────────────────────────────────────────────────────────

    pub async fn add_item(&self, owner_id: &str, entry: &NewEntry) -> Result<String, RemoteError> {
        let resp = self
            .bearer(
                self.client
                    .post(self.endpoint(&["api", "history", owner_id, "items"])?),
            )?
            .json(entry)
            .send()
            .await?;
        let added: AddItemResponse = parse(check(resp).await?).await?;
        Ok(added.id)
    }

    pub async fn update_item(
        &self,
        owner_id: &str,
        id: &str,
        patch: &EntryPatch,
    ) -> Result<(), RemoteError> {
        let resp = self
            .bearer(
                self.client
                    .patch(self.endpoint(&["api", "history", owner_id, "items", id])?),
            )?
            .json(patch)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    pub async fn delete_item(&self, owner_id: &str, id: &str) -> Result<(), RemoteError> {
        let resp = self
            .bearer(
                self.client
                    .delete(self.endpoint(&["api", "history", owner_id, "items", id])?),
            )?
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    pub async fn list_items(&self, owner_id: &str) -> Result<Vec<ClipboardEntry>, RemoteError> {
        let resp = self
            .bearer(
                self.client
                    .get(self.endpoint(&["api", "history", owner_id, "items"])?),
            )?
            .send()
            .await?;
        let records: Vec<RemoteRecord> = parse(check(resp).await?).await?;
        Ok(decode_records(records))
    }

    pub async fn batch_set(
        &self,
        owner_id: &str,
        entries: &[ClipboardEntry],
    ) -> Result<(), RemoteError> {
        let body = BatchSetRequest {
            entries: entries.iter().map(RemoteRecord::from).collect(),
        };
        let resp = self
            .bearer(
                self.client
                    .post(self.endpoint(&["api", "history", owner_id, "batch"])?),
            )?
            .json(&body)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    pub async fn batch_delete(&self, owner_id: &str, ids: &[String]) -> Result<(), RemoteError> {
        let body = BatchDeleteRequest { ids: ids.to_vec() };
        let resp = self
            .bearer(
                self.client
                    .post(self.endpoint(&["api", "history", owner_id, "batch-delete"])?),
            )?
            .json(&body)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    // ── WebSocket ───────────────────────────────────────────────────────

    pub fn ws_url(&self, owner_id: &str) -> Result<String, RemoteError> {
        let token = self
            .token()
            .ok_or_else(|| RemoteError::Unauthorized("no session token".to_string()))?;
        let mut url = self.endpoint(&["api", "history", owner_id, "ws"])?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| RemoteError::Parse(format!("cannot use {} for WebSocket", self.base_url)))?;
        url.query_pairs_mut().append_pair("token", &token);
        Ok(url.to_string())
    }
}

async fn check(resp: Response) -> Result<Response, RemoteError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = extract_error(&body);
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Err(RemoteError::Unauthorized(message))
    } else {
        Err(RemoteError::Status {
            code: status.as_u16(),
            message,
        })
    }
}

async fn parse<T: DeserializeOwned>(resp: Response) -> Result<T, RemoteError> {
    resp.json::<T>()
        .await
        .map_err(|e| RemoteError::Parse(e.to_string()))
}

fn extract_error(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error")?.as_str().map(|s| s.to_string()))
        .unwrap_or_else(|| body.to_string())
}
