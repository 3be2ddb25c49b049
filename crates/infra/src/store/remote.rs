//! Hosted backend-as-a-service client.
//!
//! Speaks the PostgREST dialect: `{base}/rest/v1/{table}?column=eq.value` with
//! the project key in `apikey` and, as the bearer token, the signed-in session,
//! else a caller's forwarded access token, else the key itself. Row-level security lives on the backend; every request
//! still filters on `user_id` so a misconfigured policy cannot leak rows.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use stockroom_core::{ItemId, MovementId, OwnerId};
use stockroom_inventory::{InventoryItem, StockMovement};

use super::{InventoryStore, StoreError, StoreResult, quantity_moved};

const ITEMS_TABLE: &str = "inventory_items";
const MOVEMENTS_TABLE: &str = "stock_movements";

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Project url, e.g. `https://abc.example.co`.
    pub base_url: String,
    /// Public (anon) project key.
    pub api_key: String,
}

/// Session returned by a password sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user_id: OwnerId,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    user: TokenUser,
}

#[derive(Deserialize)]
struct TokenUser {
    id: OwnerId,
}

#[derive(Serialize)]
struct QuantityPatch {
    quantity: i64,
    updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct RemoteStore {
    config: RemoteConfig,
    client: reqwest::Client,
    access_token: Option<String>,
    session: RwLock<Option<RemoteSession>>,
}

impl RemoteStore {
    pub fn new(config: RemoteConfig) -> Self {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Self {
            config: RemoteConfig {
                base_url,
                api_key: config.api_key,
            },
            client: reqwest::Client::new(),
            access_token: None,
            session: RwLock::new(None),
        }
    }

    /// Store acting for a caller that already holds a backend access token.
    ///
    /// Shares this store's HTTP client; row-level security on the backend then
    /// applies to the caller rather than to the project key.
    pub fn with_access_token(&self, token: impl Into<String>) -> Self {
        Self {
            config: self.config.clone(),
            client: self.client.clone(),
            access_token: Some(token.into()),
            session: RwLock::new(None),
        }
    }

    /// Password sign-in; the returned session is used for all later requests.
    pub async fn sign_in(&self, email: &str, password: &str) -> StoreResult<RemoteSession> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.config.base_url);
        let resp = self
            .client
            .post(&url)
            .header("apikey", &self.config.api_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(network)?;

        let token: TokenResponse = decode(check(resp).await?).await?;
        let session = RemoteSession {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            user_id: token.user.id,
        };
        self.set_session(Some(session.clone()));
        tracing::info!(user_id = %session.user_id, "signed in to hosted backend");
        Ok(session)
    }

    pub fn sign_out(&self) {
        self.set_session(None);
        tracing::info!("signed out of hosted backend");
    }

    /// Install a session obtained elsewhere (e.g. the caller's own token).
    pub fn set_session(&self, session: Option<RemoteSession>) {
        match self.session.write() {
            Ok(mut guard) => *guard = session,
            Err(poisoned) => *poisoned.into_inner() = session,
        }
    }

    pub fn session(&self) -> Option<RemoteSession> {
        match self.session.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn request(&self, method: Method, table: &str, filters: &[(&str, String)]) -> RequestBuilder {
        let url = format!("{}/rest/v1/{}", self.config.base_url, table);
        let bearer = self
            .session()
            .map(|s| s.access_token)
            .or_else(|| self.access_token.clone())
            .unwrap_or_else(|| self.config.api_key.clone());
        self.client
            .request(method, &url)
            .query(filters)
            .header("apikey", &self.config.api_key)
            .header("Prefer", "return=representation")
            .bearer_auth(bearer)
    }

    async fn fetch<T: DeserializeOwned>(&self, req: RequestBuilder) -> StoreResult<Vec<T>> {
        let resp = req.send().await.map_err(network)?;
        decode(check(resp).await?).await
    }

    /// Explain a conditional PATCH that matched no row.
    async fn compare_failed(&self, owner: OwnerId, id: ItemId, expected: i64) -> StoreError {
        match self.get_item(owner, id).await {
            Ok(Some(current)) => quantity_moved(current.quantity, expected),
            Ok(None) => StoreError::NotFound,
            Err(err) => err,
        }
    }
}

fn eq_filter(value: impl ToString) -> String {
    format!("eq.{}", value.to_string())
}

fn network(err: reqwest::Error) -> StoreError {
    StoreError::Backend(format!("request to hosted backend failed: {err}"))
}

async fn check(resp: Response) -> StoreResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    tracing::debug!(%status, %body, "hosted backend rejected request");
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Unauthenticated,
        StatusCode::CONFLICT => StoreError::Conflict(body),
        _ => StoreError::Http {
            status: status.as_u16(),
            body,
        },
    })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> StoreResult<T> {
    resp.json::<T>()
        .await
        .map_err(|e| StoreError::Decode(e.to_string()))
}

#[async_trait::async_trait]
impl InventoryStore for RemoteStore {
    async fn list_items(&self, owner: OwnerId) -> StoreResult<Vec<InventoryItem>> {
        let req = self.request(
            Method::GET,
            ITEMS_TABLE,
            &[("select", "*".to_string()), ("user_id", eq_filter(owner))],
        );
        self.fetch(req).await
    }

    async fn get_item(&self, owner: OwnerId, id: ItemId) -> StoreResult<Option<InventoryItem>> {
        let req = self.request(
            Method::GET,
            ITEMS_TABLE,
            &[
                ("select", "*".to_string()),
                ("user_id", eq_filter(owner)),
                ("id", eq_filter(id)),
            ],
        );
        Ok(self.fetch(req).await?.into_iter().next())
    }

    async fn insert_item(&self, item: &InventoryItem) -> StoreResult<()> {
        let req = self.request(Method::POST, ITEMS_TABLE, &[]).json(item);
        let _: Vec<InventoryItem> = self.fetch(req).await?;
        Ok(())
    }

    async fn update_item(&self, item: &InventoryItem, expected_quantity: i64) -> StoreResult<()> {
        let req = self
            .request(
                Method::PATCH,
                ITEMS_TABLE,
                &[
                    ("user_id", eq_filter(item.owner_id)),
                    ("id", eq_filter(item.id)),
                    ("quantity", eq_filter(expected_quantity)),
                ],
            )
            .json(item);
        let updated: Vec<InventoryItem> = self.fetch(req).await?;
        if updated.is_empty() {
            return Err(self.compare_failed(item.owner_id, item.id, expected_quantity).await);
        }
        Ok(())
    }

    async fn update_quantity(
        &self,
        owner: OwnerId,
        id: ItemId,
        expected: i64,
        quantity: i64,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let req = self
            .request(
                Method::PATCH,
                ITEMS_TABLE,
                &[
                    ("user_id", eq_filter(owner)),
                    ("id", eq_filter(id)),
                    ("quantity", eq_filter(expected)),
                ],
            )
            .json(&QuantityPatch {
                quantity,
                updated_at,
            });
        let updated: Vec<InventoryItem> = self.fetch(req).await?;
        if updated.is_empty() {
            return Err(self.compare_failed(owner, id, expected).await);
        }
        Ok(())
    }

    async fn delete_item(&self, owner: OwnerId, id: ItemId) -> StoreResult<bool> {
        let req = self.request(
            Method::DELETE,
            ITEMS_TABLE,
            &[("user_id", eq_filter(owner)), ("id", eq_filter(id))],
        );
        let deleted: Vec<InventoryItem> = self.fetch(req).await?;
        if deleted.is_empty() {
            return Ok(false);
        }

        let req = self.request(
            Method::DELETE,
            MOVEMENTS_TABLE,
            &[("user_id", eq_filter(owner)), ("item_id", eq_filter(id))],
        );
        // The item is already gone; orphaned history is only logged.
        if let Err(err) = self.fetch::<StockMovement>(req).await {
            tracing::warn!(item_id = %id, error = %err, "failed to delete movement history");
        }
        Ok(true)
    }

    async fn insert_movement(&self, movement: &StockMovement) -> StoreResult<()> {
        let req = self.request(Method::POST, MOVEMENTS_TABLE, &[]).json(movement);
        let _: Vec<StockMovement> = self.fetch(req).await?;
        Ok(())
    }

    async fn delete_movement(&self, owner: OwnerId, id: MovementId) -> StoreResult<bool> {
        let req = self.request(
            Method::DELETE,
            MOVEMENTS_TABLE,
            &[("user_id", eq_filter(owner)), ("id", eq_filter(id))],
        );
        let deleted: Vec<StockMovement> = self.fetch(req).await?;
        Ok(!deleted.is_empty())
    }

    async fn list_movements(&self, owner: OwnerId, item_id: ItemId) -> StoreResult<Vec<StockMovement>> {
        let req = self.request(
            Method::GET,
            MOVEMENTS_TABLE,
            &[
                ("select", "*".to_string()),
                ("user_id", eq_filter(owner)),
                ("item_id", eq_filter(item_id)),
                ("order", "created_at.desc,id.desc".to_string()),
            ],
        );
        self.fetch(req).await
    }
}
