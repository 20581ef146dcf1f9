//! Order store: durable CRUD plus live-subscription access to one order
//! collection.
//!
//! Two interchangeable backends implement the same trait and are picked once
//! at startup, never per call. `RedisStore` keeps each collection in a hash
//! shared by every server instance and announces writes on a pub/sub channel
//! so peers refresh their snapshots. `FallbackStore` is the system of record
//! when no Redis is configured: one JSON file per collection, loaded once
//! and rewritten in full on every mutation.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use axum::body::Bytes;
use chrono::Utc;
use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use thiserror::Error;
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tracing::warn;

use orders::model::{OrderRecord, next_order_id};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("order {0}")]
    NotFound(String),

    #[error("upload rejected: {0}")]
    Upload(String),

    #[error("{0}")]
    Backend(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

#[async_trait]
pub trait OrderStore<R: OrderRecord>: Send + Sync {
    /// Assigns the id and `createdAt`, inserts at the head of the
    /// collection. Input validation is the caller's job, never the store's.
    async fn create(&self, fields: R::Fields) -> Result<String, StoreError>;

    /// Field-merge update. The remote backend rejects unknown ids; the
    /// fallback backend silently no-ops instead.
    async fn update(&self, id: &str, patch: R::Patch) -> Result<(), StoreError>;

    /// Idempotent: deleting an absent id is not an error.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<R>, StoreError>;

    /// Snapshot ordered newest `createdAt` first.
    async fn list(&self) -> Result<Vec<R>, StoreError>;

    /// The receiver holds the current snapshot immediately and observes
    /// every subsequent change to the collection.
    fn subscribe(&self) -> watch::Receiver<Vec<R>>;

    /// Stores a binary attachment out-of-band and returns a stable
    /// retrieval URL.
    async fn upload_attachment(
        &self,
        id: &str,
        filename: &str,
        data: Bytes,
    ) -> Result<String, StoreError>;

    /// Read-back for attachment URLs served by this process. Fallback URLs
    /// point at an external placeholder, so the fallback always returns None.
    async fn fetch_attachment(
        &self,
        id: &str,
        filename: &str,
    ) -> Result<Option<Vec<u8>>, StoreError>;
}

pub async fn init_redis(redis_url: &str) -> (Client, ConnectionManager) {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url).unwrap();
    let connection_manager = client
        .get_connection_manager_with_config(config)
        .await
        .unwrap();

    (client, connection_manager)
}

pub struct RedisStore<R: OrderRecord> {
    conn: ConnectionManager,
    public_url: String,
    tx: watch::Sender<Vec<R>>,
}

impl<R: OrderRecord> RedisStore<R> {
    pub async fn connect(
        client: &Client,
        conn: ConnectionManager,
        public_url: String,
    ) -> Result<Arc<Self>, StoreError> {
        let (tx, _) = watch::channel(Vec::new());
        let store = Arc::new(Self {
            conn,
            public_url,
            tx,
        });

        let snapshot = store.list().await?;
        store.tx.send_replace(snapshot);
        store.spawn_listener(client.clone());

        Ok(store)
    }

    fn orders_key() -> String {
        format!("orders:{}", R::COLLECTION)
    }

    /// Internal last-modified marker, never exposed through the order API.
    fn touched_key() -> String {
        format!("orders:{}:touched", R::COLLECTION)
    }

    fn attachments_key() -> String {
        format!("orders:{}:attachments", R::COLLECTION)
    }

    fn channel() -> String {
        format!("orders:{}:changed", R::COLLECTION)
    }

    /// Watches the change channel so writes by other server instances
    /// sharing this Redis show up in our subscription snapshots.
    fn spawn_listener(self: &Arc<Self>, client: Client) {
        let store = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                let mut pubsub = match client.get_async_pubsub().await {
                    Ok(pubsub) => pubsub,
                    Err(e) => {
                        warn!("Change listener connect failed: {e}");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                };

                if let Err(e) = pubsub.subscribe(Self::channel()).await {
                    warn!("Change channel subscribe failed: {e}");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }

                {
                    let mut messages = pubsub.on_message();
                    while messages.next().await.is_some() {
                        store.refresh().await;
                    }
                }

                warn!("Change listener disconnected, reconnecting");
            }
        });
    }

    async fn refresh(&self) {
        match self.list().await {
            Ok(snapshot) => {
                self.tx.send_replace(snapshot);
            }
            Err(e) => warn!("Failed to refresh {} snapshot: {e}", R::COLLECTION),
        }
    }

    /// Refresh our own subscribers and tell peer instances to do the same.
    async fn bump(&self) {
        self.refresh().await;

        let mut conn = self.conn.clone();
        if let Err(e) = conn.publish::<_, _, ()>(Self::channel(), "changed").await {
            warn!("Change publish failed: {e}");
        }
    }
}

#[async_trait]
impl<R: OrderRecord> OrderStore<R> for RedisStore<R> {
    async fn create(&self, fields: R::Fields) -> Result<String, StoreError> {
        let id = next_order_id(R::ID_PREFIX);
        let now = Utc::now();
        let record = R::build(id.clone(), now, fields);
        let json = serde_json::to_string(&record)?;

        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(Self::orders_key(), &id, json)
            .await?;
        conn.hset::<_, _, _, ()>(Self::touched_key(), &id, now.to_rfc3339())
            .await?;

        self.bump().await;
        Ok(id)
    }

    async fn update(&self, id: &str, patch: R::Patch) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.hget(Self::orders_key(), id).await?;
        let Some(json) = json else {
            return Err(StoreError::NotFound(id.to_string()));
        };

        let mut record: R = serde_json::from_str(&json)?;
        record.apply(patch);

        conn.hset::<_, _, _, ()>(Self::orders_key(), id, serde_json::to_string(&record)?)
            .await?;
        conn.hset::<_, _, _, ()>(Self::touched_key(), id, Utc::now().to_rfc3339())
            .await?;

        self.bump().await;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.hdel::<_, _, ()>(Self::orders_key(), id).await?;
        conn.hdel::<_, _, ()>(Self::touched_key(), id).await?;

        self.bump().await;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<R>, StoreError> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.hget(Self::orders_key(), id).await?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<R>, StoreError> {
        let mut conn = self.conn.clone();
        let values: Vec<String> = conn.hvals(Self::orders_key()).await?;

        let mut records: Vec<R> = values
            .iter()
            .filter_map(|json| match serde_json::from_str(json) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping malformed {} record: {e}", R::COLLECTION);
                    None
                }
            })
            .collect();

        // newest first; ids encode creation sequence, so they break ties
        records.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(a.id()))
        });

        Ok(records)
    }

    fn subscribe(&self) -> watch::Receiver<Vec<R>> {
        self.tx.subscribe()
    }

    async fn upload_attachment(
        &self,
        id: &str,
        filename: &str,
        data: Bytes,
    ) -> Result<String, StoreError> {
        let field = format!("{id}/{filename}");

        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(Self::attachments_key(), &field, data.to_vec())
            .await
            .map_err(|e| StoreError::Upload(e.to_string()))?;

        Ok(format!(
            "{}/api/attachments/{}/{field}",
            self.public_url,
            R::COLLECTION
        ))
    }

    async fn fetch_attachment(
        &self,
        id: &str,
        filename: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn.clone();
        let data: Option<Vec<u8>> = conn
            .hget(Self::attachments_key(), format!("{id}/{filename}"))
            .await?;

        Ok(data)
    }
}

pub struct FallbackStore<R: OrderRecord> {
    path: PathBuf,
    inner: Mutex<Vec<R>>,
    tx: watch::Sender<Vec<R>>,
}

impl<R: OrderRecord> FallbackStore<R> {
    pub fn load(data_dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(data_dir).map_err(|e| StoreError::Backend(e.to_string()))?;
        let path = data_dir.join(format!("{}.json", R::COLLECTION));

        let records: Vec<R> = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Resetting unreadable {}: {e}", path.display());
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };

        let (tx, _) = watch::channel(records.clone());
        Ok(Self {
            path,
            inner: Mutex::new(records),
            tx,
        })
    }

    fn persist(&self, records: &[R]) -> Result<(), StoreError> {
        let raw = serde_json::to_string_pretty(records)?;
        fs::write(&self.path, raw).map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[async_trait]
impl<R: OrderRecord> OrderStore<R> for FallbackStore<R> {
    async fn create(&self, fields: R::Fields) -> Result<String, StoreError> {
        let id = next_order_id(R::ID_PREFIX);
        let record = R::build(id.clone(), Utc::now(), fields);

        // no suspension point between read and write, by construction
        let mut records = self.inner.lock().unwrap();
        records.insert(0, record);
        self.persist(&records)?;
        self.tx.send_replace(records.clone());

        Ok(id)
    }

    async fn update(&self, id: &str, patch: R::Patch) -> Result<(), StoreError> {
        let mut records = self.inner.lock().unwrap();

        // absent ids are a silent no-op in fallback mode
        if let Some(record) = records.iter_mut().find(|record| record.id() == id) {
            record.apply(patch);
            self.persist(&records)?;
            self.tx.send_replace(records.clone());
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut records = self.inner.lock().unwrap();
        records.retain(|record| record.id() != id);
        self.persist(&records)?;
        self.tx.send_replace(records.clone());

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<R>, StoreError> {
        let records = self.inner.lock().unwrap();
        Ok(records.iter().find(|record| record.id() == id).cloned())
    }

    async fn list(&self) -> Result<Vec<R>, StoreError> {
        // maintained newest-first: creates insert at the head
        Ok(self.inner.lock().unwrap().clone())
    }

    fn subscribe(&self) -> watch::Receiver<Vec<R>> {
        self.tx.subscribe()
    }

    async fn upload_attachment(
        &self,
        id: &str,
        _filename: &str,
        _data: Bytes,
    ) -> Result<String, StoreError> {
        Ok(format!(
            "https://via.placeholder.com/400x300?text=Mock+Image+{id}"
        ))
    }

    async fn fetch_attachment(
        &self,
        _id: &str,
        _filename: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use orders::model::{OrderStatus, RepairFields, RepairOrder, RepairPatch, next_order_id};

    use super::{FallbackStore, OrderStore};

    fn temp_store() -> FallbackStore<RepairOrder> {
        let dir = std::env::temp_dir().join(next_order_id("bagcraft-store-test"));
        FallbackStore::load(&dir).unwrap()
    }

    fn jane() -> RepairFields {
        RepairFields {
            customer_name: "Jane Doe".to_string(),
            phone_number: "555-1111".to_string(),
            damage: "torn strap".to_string(),
            price: 25.0,
            picture: None,
            deadline: "2024-06-01".parse().unwrap(),
            status: OrderStatus::default(),
        }
    }

    #[tokio::test]
    async fn create_then_list_returns_the_new_record() {
        let store = temp_store();

        let id = store.create(jane()).await.unwrap();
        let records = store.list().await.unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.id, id);
        assert_eq!(record.customer_name, "Jane Doe");
        assert_eq!(record.phone_number, "555-1111");
        assert_eq!(record.damage, "torn strap");
        assert_eq!(record.price, 25.0);
        assert_eq!(record.status, OrderStatus::Pending);
        assert!((Utc::now() - record.created_at).num_seconds() < 5);
    }

    #[tokio::test]
    async fn update_changes_only_the_given_fields() {
        let store = temp_store();
        let id = store.create(jane()).await.unwrap();
        let before = store.get(&id).await.unwrap().unwrap();

        store
            .update(
                &id,
                RepairPatch {
                    status: Some(OrderStatus::Done),
                    ..RepairPatch::default()
                },
            )
            .await
            .unwrap();

        let after = store.get(&id).await.unwrap().unwrap();
        assert_eq!(after.status, OrderStatus::Done);
        assert_eq!(after.customer_name, before.customer_name);
        assert_eq!(after.price, before.price);
        assert_eq!(after.deadline, before.deadline);
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(after.id, before.id);
    }

    #[tokio::test]
    async fn update_of_a_missing_id_is_a_silent_no_op() {
        let store = temp_store();

        let result = store
            .update(
                "repair-0-0",
                RepairPatch {
                    status: Some(OrderStatus::Done),
                    ..RepairPatch::default()
                },
            )
            .await;

        assert!(result.is_ok());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = temp_store();
        let id = store.create(jane()).await.unwrap();

        store.delete(&id).await.unwrap();
        store.delete(&id).await.unwrap();

        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn newest_orders_come_first() {
        let store = temp_store();
        let first = store.create(jane()).await.unwrap();
        let second = store.create(jane()).await.unwrap();

        let records = store.list().await.unwrap();

        assert_eq!(records[0].id, second);
        assert_eq!(records[1].id, first);
    }

    #[tokio::test]
    async fn records_survive_a_reload() {
        let dir = std::env::temp_dir().join(next_order_id("bagcraft-store-test"));
        let id = {
            let store = FallbackStore::<RepairOrder>::load(&dir).unwrap();
            store.create(jane()).await.unwrap()
        };

        let reloaded = FallbackStore::<RepairOrder>::load(&dir).unwrap();
        let records = reloaded.list().await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
    }

    #[tokio::test]
    async fn upload_returns_a_placeholder_url() {
        let store = temp_store();
        let id = store.create(jane()).await.unwrap();

        let url = store
            .upload_attachment(&id, "strap.jpg", axum::body::Bytes::from_static(b"jpeg"))
            .await
            .unwrap();

        assert!(url.contains(&id));
        assert!(store.fetch_attachment(&id, "strap.jpg").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn subscribers_see_the_current_snapshot_and_changes() {
        let store = temp_store();
        let mut rx = store.subscribe();
        assert!(rx.borrow().is_empty());

        let id = store.create(jane()).await.unwrap();

        assert_eq!(rx.borrow_and_update().len(), 1);
        store.delete(&id).await.unwrap();
        assert!(rx.borrow_and_update().is_empty());
    }
}
