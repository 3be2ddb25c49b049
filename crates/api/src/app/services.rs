use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use stockroom_core::OwnerId;
use stockroom_infra::{InMemoryStore, InventoryService, InventoryStore, RemoteStore, SqliteStore};

use crate::config::BackendConfig;
use crate::context::PrincipalContext;

/// Service over whichever store the process was configured with.
pub type SharedInventory = InventoryService<Arc<dyn InventoryStore>>;

pub struct AppServices {
    inventory: SharedInventory,
    remote: Option<Arc<RemoteStore>>,
}

impl AppServices {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self {
            inventory: InventoryService::new(store),
            remote: None,
        }
    }

    /// Hosted backend: each request reaches it with the caller's own token.
    pub fn remote(store: RemoteStore) -> Self {
        let store = Arc::new(store);
        let shared: Arc<dyn InventoryStore> = store.clone();
        Self {
            inventory: InventoryService::new(shared),
            remote: Some(store),
        }
    }

    /// Process-wide service; owns the change channel.
    pub fn inventory(&self) -> &SharedInventory {
        &self.inventory
    }

    /// Service acting on behalf of `principal`.
    pub fn inventory_for(&self, principal: &PrincipalContext) -> SharedInventory {
        match (&self.remote, principal.access_token()) {
            (Some(remote), Some(token)) => {
                let store: Arc<dyn InventoryStore> = Arc::new(remote.with_access_token(token));
                self.inventory.with_store(store)
            }
            _ => self.inventory.clone(),
        }
    }
}

pub fn build_services(backend: &BackendConfig) -> anyhow::Result<AppServices> {
    let services = match backend {
        BackendConfig::Memory => AppServices::new(Arc::new(InMemoryStore::new())),
        BackendConfig::Local { path: Some(path) } => {
            AppServices::new(Arc::new(SqliteStore::open(path.clone())))
        }
        BackendConfig::Local { path: None } => AppServices::new(Arc::new(SqliteStore::open_default()?)),
        BackendConfig::Remote(remote) => AppServices::remote(RemoteStore::new(remote.clone())),
    };
    tracing::info!(backend = backend.name(), "inventory store configured");
    Ok(services)
}

/// SSE stream of item changes belonging to one owner.
pub fn owner_sse_stream(
    services: Arc<AppServices>,
    owner_id: OwnerId,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.inventory().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(change) if change.owner_id == owner_id => {
            let data = serde_json::to_string(&change).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default()
                .event(format!("item.{}", change.kind.as_str()))
                .data(data)))
        }
        // Lagged receivers skip what they missed.
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
