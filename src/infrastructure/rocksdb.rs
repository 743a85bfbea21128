use crate::domain::UserId;
use crate::domain::order::{NewOrder, Order, OrderStatus, PaymentMethod, Template};
use crate::domain::ports::{
    ConversationKey, OrderStore, ProgressStore, RateCache, SessionStore, TemplateStore,
};
use crate::domain::rate::CachedRates;
use crate::domain::session::{Address, Session, StepPatch};
use crate::domain::step::Step;
use crate::error::{Result, ShipError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

pub const CF_SESSIONS: &str = "sessions";
pub const CF_PROGRESS: &str = "progress";
pub const CF_RATE_CACHE: &str = "rate_cache";
pub const CF_ORDERS: &str = "orders";
pub const CF_TEMPLATES: &str = "templates";

const COLUMN_FAMILIES: [&str; 5] = [CF_SESSIONS, CF_PROGRESS, CF_RATE_CACHE, CF_ORDERS, CF_TEMPLATES];

#[derive(Debug, Serialize, Deserialize)]
struct ProgressRecord {
    state: Step,
    updated_at: DateTime<Utc>,
}

/// A persistent store implementation using RocksDB.
///
/// Implements every storage port, one column family each, with JSON values.
/// Read-modify-write sequences (session upsert, order updates) are serialised
/// by a process-wide mutex that is never held across an await point.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
    progress_retention: Duration,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating
    /// any missing column family.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_retention(path, Duration::hours(1))
    }

    pub fn open_with_retention<P: AsRef<Path>>(path: P, progress_retention: Duration) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
            progress_retention,
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| ShipError::StorageUnavailable(format!("column family {name} not found")))
    }

    fn read<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf)?;
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(cf, key, bytes)?;
        Ok(())
    }

    fn remove(&self, cf: &str, key: &[u8]) -> Result<()> {
        let cf = self.cf(cf)?;
        self.db.delete_cf(cf, key)?;
        Ok(())
    }

    /// Decodes every entry of a column family whose key starts with `prefix`.
    fn scan<T: DeserializeOwned>(&self, cf: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, T)>> {
        let handle = self.cf(cf)?;
        let mut out = Vec::new();
        for item in self
            .db
            .iterator_cf(handle, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), serde_json::from_slice(&value)?));
        }
        Ok(out)
    }

    fn purge_where<T, F>(&self, cf: &str, prefix: &[u8], stale: F) -> Result<usize>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        let entries = self.scan::<T>(cf, prefix)?;
        let handle = self.cf(cf)?;
        let mut purged = 0;
        for (key, value) in entries {
            if stale(&value) {
                self.db.delete_cf(handle, key)?;
                purged += 1;
            }
        }
        Ok(purged)
    }

    fn update_order<F>(&self, order_id: &str, change: F) -> Result<()>
    where
        F: FnOnce(&mut Order),
    {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut order: Order = self
            .read(CF_ORDERS, order_id.as_bytes())?
            .ok_or_else(|| ShipError::InternalError(format!("order {order_id} not found")))?;
        change(&mut order);
        self.write(CF_ORDERS, order_id.as_bytes(), &order)
    }
}

fn session_key(user_id: UserId) -> [u8; 8] {
    user_id.to_be_bytes()
}

fn progress_prefix(conversation: &str) -> Vec<u8> {
    format!("{conversation}/").into_bytes()
}

fn progress_key(conversation: &str, key: ConversationKey) -> Vec<u8> {
    format!("{conversation}/{key}").into_bytes()
}

fn parse_progress_key(conversation: &str, raw: &[u8]) -> Option<ConversationKey> {
    let text = std::str::from_utf8(raw).ok()?;
    let (chat, user) = text.strip_prefix(conversation)?.strip_prefix('/')?.split_once(':')?;
    Some(ConversationKey::new(chat.parse().ok()?, user.parse().ok()?))
}

#[async_trait]
impl SessionStore for RocksDBStore {
    async fn get(&self, user_id: UserId) -> Result<Option<Session>> {
        self.read(CF_SESSIONS, &session_key(user_id))
    }

    async fn upsert(
        &self,
        user_id: UserId,
        step: Step,
        patch: &StepPatch,
        at: DateTime<Utc>,
    ) -> Result<Session> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let key = session_key(user_id);
        let mut session = self
            .read::<Session>(CF_SESSIONS, &key)?
            .unwrap_or_else(|| Session::new(user_id, at));
        session.apply(step, patch, at);
        self.write(CF_SESSIONS, &key, &session)?;
        Ok(session)
    }

    async fn delete(&self, user_id: UserId) -> Result<()> {
        self.remove(CF_SESSIONS, &session_key(user_id))
    }

    async fn purge_inactive(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.purge_where::<Session, _>(CF_SESSIONS, &[], |s| s.last_updated < cutoff)
    }
}

#[async_trait]
impl ProgressStore for RocksDBStore {
    async fn load(&self, conversation: &str) -> Result<HashMap<ConversationKey, Step>> {
        let entries = self.scan::<ProgressRecord>(CF_PROGRESS, &progress_prefix(conversation))?;
        Ok(entries
            .into_iter()
            .filter_map(|(key, record)| {
                parse_progress_key(conversation, &key).map(|k| (k, record.state))
            })
            .collect())
    }

    async fn get(&self, conversation: &str, key: ConversationKey) -> Result<Option<Step>> {
        let record: Option<ProgressRecord> =
            self.read(CF_PROGRESS, &progress_key(conversation, key))?;
        Ok(record.map(|r| r.state))
    }

    async fn save(
        &self,
        conversation: &str,
        key: ConversationKey,
        state: Option<Step>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let raw_key = progress_key(conversation, key);
        match state {
            Some(state) => self.write(
                CF_PROGRESS,
                &raw_key,
                &ProgressRecord {
                    state,
                    updated_at: at,
                },
            )?,
            None => self.remove(CF_PROGRESS, &raw_key)?,
        }
        let cutoff = at - self.progress_retention;
        self.purge_where::<ProgressRecord, _>(CF_PROGRESS, &[], |r| r.updated_at < cutoff)?;
        Ok(())
    }

    async fn purge_stale(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.purge_where::<ProgressRecord, _>(CF_PROGRESS, &[], |r| r.updated_at < cutoff)
    }
}

#[async_trait]
impl RateCache for RocksDBStore {
    async fn get(&self, key: &str) -> Result<Option<CachedRates>> {
        self.read(CF_RATE_CACHE, key.as_bytes())
    }

    async fn put(&self, key: &str, entry: CachedRates) -> Result<()> {
        self.write(CF_RATE_CACHE, key.as_bytes(), &entry)
    }

    async fn invalidate(&self, key: &str) -> Result<()> {
        self.remove(CF_RATE_CACHE, key.as_bytes())
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.purge_where::<CachedRates, _>(CF_RATE_CACHE, &[], |e| e.cached_at < cutoff)
    }
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn create_order(&self, order: NewOrder, at: DateTime<Utc>) -> Result<Order> {
        let order = Order {
            order_id: Uuid::new_v4().to_string(),
            user_id: order.user_id,
            from: order.from,
            to: order.to,
            rate: order.rate,
            status: OrderStatus::Pending,
            payment_method: None,
            created_at: at,
        };
        self.write(CF_ORDERS, order.order_id.as_bytes(), &order)?;
        Ok(order)
    }

    async fn find_pending_order(&self, user_id: UserId) -> Result<Option<Order>> {
        let orders = self.scan::<Order>(CF_ORDERS, &[])?;
        Ok(orders
            .into_iter()
            .map(|(_, order)| order)
            .filter(|o| o.user_id == user_id && o.status == OrderStatus::Pending)
            .max_by_key(|o| o.created_at))
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>> {
        self.read(CF_ORDERS, order_id.as_bytes())
    }

    async fn mark_order_cancelled(&self, order_id: &str) -> Result<()> {
        self.update_order(order_id, |order| order.status = OrderStatus::Cancelled)
    }

    async fn record_payment_method(&self, order_id: &str, method: PaymentMethod) -> Result<()> {
        self.update_order(order_id, |order| order.payment_method = Some(method))
    }
}

#[async_trait]
impl TemplateStore for RocksDBStore {
    async fn save_template(
        &self,
        user_id: UserId,
        name: &str,
        from: &Address,
        to: &Address,
        at: DateTime<Utc>,
    ) -> Result<Template> {
        let template = Template {
            template_id: Uuid::new_v4().to_string(),
            user_id,
            name: name.to_string(),
            from: from.clone(),
            to: to.clone(),
            created_at: at,
        };
        self.write(CF_TEMPLATES, template.template_id.as_bytes(), &template)?;
        Ok(template)
    }

    async fn load_template(&self, template_id: &str) -> Result<Option<Template>> {
        self.read(CF_TEMPLATES, template_id.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::{AddressPart, ParcelDim, SessionField, Side};
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in COLUMN_FAMILIES {
            assert!(store.db.cf_handle(name).is_some());
        }
    }

    #[tokio::test]
    async fn test_session_survives_reopen() {
        let dir = tempdir().unwrap();
        let now = Utc::now();
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            store
                .upsert(
                    42,
                    Step::FromCity,
                    &StepPatch::new()
                        .with(SessionField::Address(Side::From, AddressPart::Name, Some("John Smith".into())))
                        .with(SessionField::Parcel(ParcelDim::Weight, dec!(5))),
                    now,
                )
                .await
                .unwrap();
        }

        let store = RocksDBStore::open(dir.path()).unwrap();
        let session = SessionStore::get(&store, 42).await.unwrap().unwrap();
        assert_eq!(session.current_step, Step::FromCity);
        assert_eq!(session.step_data.from.name.as_deref(), Some("John Smith"));
        assert_eq!(session.step_data.parcel.weight, Some(dec!(5)));

        SessionStore::delete(&store, 42).await.unwrap();
        assert!(SessionStore::get(&store, 42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_progress_is_scoped_by_conversation() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let now = Utc::now();
        let key = ConversationKey::new(-100, 7);

        store.save("order", key, Some(Step::ToZip), now).await.unwrap();
        store.save("order_extra", key, Some(Step::End), now).await.unwrap();

        let loaded = store.load("order").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get(&key), Some(&Step::ToZip));

        store.save("order", key, None, now).await.unwrap();
        assert!(ProgressStore::get(&store, "order", key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_order_status_update() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let order = store
            .create_order(
                NewOrder {
                    user_id: 3,
                    from: Address::default(),
                    to: Address::default(),
                    rate: crate::domain::rate::Rate {
                        rate_id: "r1".into(),
                        carrier_code: "ups".into(),
                        carrier_name: "UPS".into(),
                        service_code: "ups_ground".into(),
                        service_type: "Ground".into(),
                        amount: dec!(11.2),
                        estimated_days: None,
                    },
                },
                Utc::now(),
            )
            .await
            .unwrap();

        store
            .record_payment_method(&order.order_id, PaymentMethod::Crypto)
            .await
            .unwrap();
        store.mark_order_cancelled(&order.order_id).await.unwrap();

        let stored = store.get_order(&order.order_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);
        assert_eq!(stored.payment_method, Some(PaymentMethod::Crypto));
        assert!(store.find_pending_order(3).await.unwrap().is_none());
    }
}
