//! Per-process connection manager for both storage tiers.
//!
//! One cached client per tier. Accessors take a `force_reconnect` flag (set
//! by the retry layer on every attempt after the first); otherwise a cached
//! client is health-checked with a ping and replaced only when unhealthy.
//! Concurrent callers may race on a reconnect; the worst case is one extra
//! connection, which the pool/multiplexer absorbs.

use tokio::sync::Mutex;
use tracing::{info, warn};

use svp_config::{DocStoreSettings, KvSettings, TtlTable};

use crate::doc::DocStore;
use crate::error::StoreError;
use crate::kv::KvClient;

pub struct ConnectionManager {
    kv_settings: KvSettings,
    doc_settings: DocStoreSettings,
    ttl: TtlTable,
    kv: Mutex<Option<KvClient>>,
    doc: Mutex<Option<DocStore>>,
}

impl ConnectionManager {
    pub fn new(kv_settings: KvSettings, doc_settings: DocStoreSettings, ttl: TtlTable) -> Self {
        Self {
            kv_settings,
            doc_settings,
            ttl,
            kv: Mutex::new(None),
            doc: Mutex::new(None),
        }
    }

    pub async fn kv(&self, force_reconnect: bool) -> Result<KvClient, StoreError> {
        let mut cached = self.kv.lock().await;

        if force_reconnect || cached.is_none() {
            info!("creating new KV connection");
            let client = KvClient::connect(&self.kv_settings.url(), self.ttl).await?;
            *cached = Some(client.clone());
            return Ok(client);
        }

        let client = cached.clone().expect("checked above");
        if client.is_healthy().await {
            return Ok(client);
        }

        warn!("KV connection unhealthy, reconnecting");
        let client = KvClient::connect(&self.kv_settings.url(), self.ttl).await?;
        *cached = Some(client.clone());
        Ok(client)
    }

    pub async fn doc(&self, force_reconnect: bool) -> Result<DocStore, StoreError> {
        let mut cached = self.doc.lock().await;

        if force_reconnect || cached.is_none() {
            info!("creating new document-store connection");
            let store = DocStore::connect(
                &self.doc_settings.url,
                self.doc_settings.max_connections,
            )
            .await?;
            *cached = Some(store.clone());
            return Ok(store);
        }

        let store = cached.clone().expect("checked above");
        if store.is_healthy().await {
            return Ok(store);
        }

        warn!("document-store connection unhealthy, reconnecting");
        let store = DocStore::connect(
            &self.doc_settings.url,
            self.doc_settings.max_connections,
        )
        .await?;
        *cached = Some(store.clone());
        Ok(store)
    }
}
