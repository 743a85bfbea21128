use super::order::{NewOrder, Order, PaymentMethod, Template};
use super::rate::{CachedRates, CanonicalShape, RateFetch};
use super::session::{Address, Session, StepPatch};
use super::step::Step;
use super::{ChatId, UserId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Routing key of the progress tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    pub chat_id: ChatId,
    pub user_id: UserId,
}

impl ConversationKey {
    pub fn new(chat_id: ChatId, user_id: UserId) -> Self {
        Self { chat_id, user_id }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chat_id, self.user_id)
    }
}

/// Durable per-user session documents, shared by every server process.
///
/// Implementations must not cache reads: a write by any process is visible
/// to the very next `get`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, user_id: UserId) -> Result<Option<Session>>;
    /// Merges `patch` into the stored payload, moves to `step` and touches
    /// `last_updated`, creating the session if needed. Returns the merged document.
    async fn upsert(
        &self,
        user_id: UserId,
        step: Step,
        patch: &StepPatch,
        at: DateTime<Utc>,
    ) -> Result<Session>;
    async fn delete(&self, user_id: UserId) -> Result<()>;
    /// Removes sessions whose `last_updated` is older than `cutoff`.
    async fn purge_inactive(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// Coarse `(chat, user) -> step` map the transport uses to route messages.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn load(&self, conversation: &str) -> Result<HashMap<ConversationKey, Step>>;
    async fn get(&self, conversation: &str, key: ConversationKey) -> Result<Option<Step>>;
    /// `None` removes the entry. Every write also purges entries older than
    /// the store's retention window.
    async fn save(
        &self,
        conversation: &str,
        key: ConversationKey,
        state: Option<Step>,
        at: DateTime<Utc>,
    ) -> Result<()>;
    async fn purge_stale(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

#[async_trait]
pub trait RateCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CachedRates>>;
    async fn put(&self, key: &str, entry: CachedRates) -> Result<()>;
    async fn invalidate(&self, key: &str) -> Result<()>;
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// External carrier-rate API. Implemented outside the core.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch_rates(&self, shape: &CanonicalShape) -> RateFetch;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create_order(&self, order: NewOrder, at: DateTime<Utc>) -> Result<Order>;
    async fn find_pending_order(&self, user_id: UserId) -> Result<Option<Order>>;
    async fn get_order(&self, order_id: &str) -> Result<Option<Order>>;
    async fn mark_order_cancelled(&self, order_id: &str) -> Result<()>;
    async fn record_payment_method(&self, order_id: &str, method: PaymentMethod) -> Result<()>;
}

#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn save_template(
        &self,
        user_id: UserId,
        name: &str,
        from: &Address,
        to: &Address,
        at: DateTime<Utc>,
    ) -> Result<Template>;
    async fn load_template(&self, template_id: &str) -> Result<Option<Template>>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type ClockRef = Arc<dyn Clock>;

pub type SessionStoreBox = Box<dyn SessionStore>;
pub type ProgressStoreBox = Box<dyn ProgressStore>;
pub type RateCacheBox = Box<dyn RateCache>;
pub type RateSourceBox = Box<dyn RateSource>;
pub type OrderStoreBox = Box<dyn OrderStore>;
pub type TemplateStoreBox = Box<dyn TemplateStore>;
