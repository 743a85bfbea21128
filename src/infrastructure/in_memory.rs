use crate::domain::order::{NewOrder, Order, OrderStatus, PaymentMethod, Template};
use crate::domain::ports::{
    ConversationKey, OrderStore, ProgressStore, RateCache, SessionStore, TemplateStore,
};
use crate::domain::rate::CachedRates;
use crate::domain::session::{Address, Session, StepPatch};
use crate::domain::step::Step;
use crate::domain::UserId;
use crate::error::{Result, ShipError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A thread-safe in-memory session store.
///
/// Single-process only; every clone shares the same map. Suitable for tests
/// and for deployments that pin a user to one process.
#[derive(Default, Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<UserId, Session>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, user_id: UserId) -> Result<Option<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&user_id).cloned())
    }

    async fn upsert(
        &self,
        user_id: UserId,
        step: Step,
        patch: &StepPatch,
        at: DateTime<Utc>,
    ) -> Result<Session> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(user_id)
            .or_insert_with(|| Session::new(user_id, at));
        session.apply(step, patch, at);
        Ok(session.clone())
    }

    async fn delete(&self, user_id: UserId) -> Result<()> {
        self.sessions.write().await.remove(&user_id);
        Ok(())
    }

    async fn purge_inactive(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.last_updated >= cutoff);
        Ok(before - sessions.len())
    }
}

#[derive(Debug, Clone, Copy)]
struct ProgressEntry {
    state: Step,
    updated_at: DateTime<Utc>,
}

/// In-memory progress tracker with write-time purging of stale entries.
#[derive(Clone)]
pub struct InMemoryProgressStore {
    entries: Arc<RwLock<HashMap<(String, ConversationKey), ProgressEntry>>>,
    retention: Duration,
}

impl InMemoryProgressStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: Arc::default(),
            retention,
        }
    }
}

impl Default for InMemoryProgressStore {
    fn default() -> Self {
        Self::new(Duration::hours(1))
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn load(&self, conversation: &str) -> Result<HashMap<ConversationKey, Step>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|((name, _), _)| name == conversation)
            .map(|((_, key), entry)| (*key, entry.state))
            .collect())
    }

    async fn get(&self, conversation: &str, key: ConversationKey) -> Result<Option<Step>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(&(conversation.to_string(), key))
            .map(|entry| entry.state))
    }

    async fn save(
        &self,
        conversation: &str,
        key: ConversationKey,
        state: Option<Step>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut entries = self.entries.write().await;
        let map_key = (conversation.to_string(), key);
        match state {
            Some(state) => {
                entries.insert(map_key, ProgressEntry { state, updated_at: at });
            }
            None => {
                entries.remove(&map_key);
            }
        }
        let cutoff = at - self.retention;
        entries.retain(|_, entry| entry.updated_at >= cutoff);
        Ok(())
    }

    async fn purge_stale(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.updated_at >= cutoff);
        Ok(before - entries.len())
    }
}

/// Process-local rate cache. Expiry is decided by the rate engine.
#[derive(Default, Clone)]
pub struct InMemoryRateCache {
    entries: Arc<RwLock<HashMap<String, CachedRates>>>,
}

impl InMemoryRateCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateCache for InMemoryRateCache {
    async fn get(&self, key: &str) -> Result<Option<CachedRates>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, entry: CachedRates) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.cached_at >= cutoff);
        Ok(before - entries.len())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<String, Order>>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
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
        self.orders
            .write()
            .await
            .insert(order.order_id.clone(), order.clone());
        Ok(order)
    }

    async fn find_pending_order(&self, user_id: UserId) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .filter(|o| o.user_id == user_id && o.status == OrderStatus::Pending)
            .max_by_key(|o| o.created_at)
            .cloned())
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(order_id).cloned())
    }

    async fn mark_order_cancelled(&self, order_id: &str) -> Result<()> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| ShipError::InternalError(format!("order {order_id} not found")))?;
        order.status = OrderStatus::Cancelled;
        Ok(())
    }

    async fn record_payment_method(&self, order_id: &str, method: PaymentMethod) -> Result<()> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| ShipError::InternalError(format!("order {order_id} not found")))?;
        order.payment_method = Some(method);
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryTemplateStore {
    templates: Arc<RwLock<HashMap<String, Template>>>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateStore for InMemoryTemplateStore {
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
        self.templates
            .write()
            .await
            .insert(template.template_id.clone(), template.clone());
        Ok(template)
    }

    async fn load_template(&self, template_id: &str) -> Result<Option<Template>> {
        Ok(self.templates.read().await.get(template_id).cloned())
    }
}
