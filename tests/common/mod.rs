#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use shipbot::application::flow::{ConversationEngine, EngineSettings, Stores};
use shipbot::application::guard::InMemoryInputGuard;
use shipbot::application::rates::{RateEngine, RatePolicy};
use shipbot::domain::message::{Action, Inbound, Reply};
use shipbot::domain::order::Template;
use shipbot::domain::ports::{ClockRef, RateSource, SessionStore, TemplateStore};
use shipbot::domain::rate::{CanonicalShape, Rate, RateFetch};
use shipbot::domain::session::{Address, Session, StepPatch};
use shipbot::domain::step::Step;
use shipbot::domain::UserId;
use shipbot::error::{Result, ShipError};
use shipbot::infrastructure::clock::ManualClock;
use shipbot::infrastructure::in_memory::{
    InMemoryOrderStore, InMemoryProgressStore, InMemoryRateCache, InMemorySessionStore,
    InMemoryTemplateStore,
};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const USER: UserId = 42;
pub const CHAT: i64 = 4200;

pub fn rate(id: &str, carrier: &str, service: &str, cents: i64) -> Rate {
    Rate {
        rate_id: id.to_string(),
        carrier_code: carrier.to_string(),
        carrier_name: carrier.to_uppercase(),
        service_code: service.to_string(),
        service_type: service.to_string(),
        amount: Decimal::new(cents, 2),
        estimated_days: Some(3),
    }
}

pub fn sample_rates() -> Vec<Rate> {
    vec![
        rate("se-1", "usps", "usps_priority_mail", 1230),
        rate("se-2", "ups", "ups_ground", 1475),
        rate("se-3", "fedex", "fedex_ground", 1390),
    ]
}

/// Rate source whose answer can be swapped mid-test; counts calls.
#[derive(Clone)]
pub struct ScriptedRateSource {
    answer: Arc<Mutex<RateFetch>>,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedRateSource {
    pub fn new(answer: RateFetch) -> Self {
        Self {
            answer: Arc::new(Mutex::new(answer)),
            calls: Arc::default(),
        }
    }

    pub fn answer_with(&self, answer: RateFetch) {
        *self.answer.lock().unwrap() = answer;
    }
}

#[async_trait]
impl RateSource for ScriptedRateSource {
    async fn fetch_rates(&self, _shape: &CanonicalShape) -> RateFetch {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.lock().unwrap().clone()
    }
}

/// Session store that can be switched offline, or to return unreadable
/// documents.
#[derive(Clone, Default)]
pub struct FlakySessionStore {
    inner: InMemorySessionStore,
    pub down: Arc<AtomicBool>,
    pub corrupt: Arc<AtomicBool>,
}

impl FlakySessionStore {
    fn check(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(ShipError::StorageUnavailable("session store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FlakySessionStore {
    async fn get(&self, user_id: UserId) -> Result<Option<Session>> {
        self.check()?;
        if self.corrupt.load(Ordering::SeqCst) {
            return Err(ShipError::InternalError("corrupt session document".into()));
        }
        self.inner.get(user_id).await
    }

    async fn upsert(
        &self,
        user_id: UserId,
        step: Step,
        patch: &StepPatch,
        at: DateTime<Utc>,
    ) -> Result<Session> {
        self.check()?;
        self.inner.upsert(user_id, step, patch, at).await
    }

    async fn delete(&self, user_id: UserId) -> Result<()> {
        self.check()?;
        self.inner.delete(user_id).await
    }

    async fn purge_inactive(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.check()?;
        self.inner.purge_inactive(cutoff).await
    }
}

/// Template store that remembers what it saved and can be told to panic.
#[derive(Clone, Default)]
pub struct PanickyTemplateStore {
    pub inner: InMemoryTemplateStore,
    pub panic_on_save: Arc<AtomicBool>,
    pub saved: Arc<Mutex<Vec<Template>>>,
}

#[async_trait]
impl TemplateStore for PanickyTemplateStore {
    async fn save_template(
        &self,
        user_id: UserId,
        name: &str,
        from: &Address,
        to: &Address,
        at: DateTime<Utc>,
    ) -> Result<Template> {
        if self.panic_on_save.load(Ordering::SeqCst) {
            panic!("template backend exploded");
        }
        let template = self.inner.save_template(user_id, name, from, to, at).await?;
        self.saved.lock().unwrap().push(template.clone());
        Ok(template)
    }

    async fn load_template(&self, template_id: &str) -> Result<Option<Template>> {
        self.inner.load_template(template_id).await
    }
}

pub struct Harness {
    pub engine: ConversationEngine,
    pub clock: ManualClock,
    pub source: ScriptedRateSource,
    pub sessions: FlakySessionStore,
    pub orders: InMemoryOrderStore,
    pub templates: PanickyTemplateStore,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(RatePolicy::default())
    }

    pub fn with_policy(policy: RatePolicy) -> Self {
        let clock = ManualClock::default();
        let clock_ref: ClockRef = Arc::new(clock.clone());
        let source = ScriptedRateSource::new(RateFetch::ok(sample_rates()));
        let sessions = FlakySessionStore::default();
        let orders = InMemoryOrderStore::new();
        let templates = PanickyTemplateStore::default();
        let settings = EngineSettings::default();

        let stores = Stores {
            sessions: Box::new(sessions.clone()),
            progress: Box::new(InMemoryProgressStore::new(settings.progress_retention)),
            orders: Box::new(orders.clone()),
            templates: Box::new(templates.clone()),
        };
        let rates = RateEngine::new(
            Box::new(source.clone()),
            Box::new(InMemoryRateCache::new()),
            clock_ref.clone(),
            policy,
        );
        let guard = InMemoryInputGuard::new(clock_ref.clone(), Duration::milliseconds(300), 3);
        let engine = ConversationEngine::new(stores, rates, Box::new(guard), clock_ref, settings);

        Self {
            engine,
            clock,
            source,
            sessions,
            orders,
            templates,
        }
    }

    pub fn rate_calls(&self) -> usize {
        self.source.calls.load(Ordering::SeqCst)
    }

    /// Sends text a second after the previous message.
    pub async fn text(&self, text: &str) -> Reply {
        self.clock.advance(Duration::seconds(1));
        self.engine.handle(Inbound::text(USER, CHAT, text)).await
    }

    /// Presses a button a second after the previous message.
    pub async fn press(&self, action: Action) -> Reply {
        self.clock.advance(Duration::seconds(1));
        self.engine
            .handle(Inbound::callback(USER, CHAT, action.to_string()))
            .await
    }

    pub async fn state(&self) -> Option<Step> {
        self.engine.current_state(CHAT, USER).await.unwrap()
    }

    pub async fn session(&self) -> Session {
        self.engine
            .session(USER)
            .await
            .unwrap()
            .expect("session should exist")
    }

    /// From `/start` through the sender's zip and the skipped phone.
    pub async fn fill_sender(&self) {
        self.text("/start").await;
        self.text("John Smith").await;
        self.text("123 Main St").await;
        self.press(Action::SkipFromAddress2).await;
        self.text("San Francisco").await;
        self.text("CA").await;
        self.text("94102").await;
        self.press(Action::SkipFromPhone).await;
    }

    pub async fn fill_recipient(&self) {
        self.text("Jane Doe").await;
        self.text("456 Oak Ave").await;
        self.press(Action::SkipToAddress2).await;
        self.text("Los Angeles").await;
        self.text("CA").await;
        self.text("90001").await;
        self.press(Action::SkipToPhone).await;
    }

    /// Full data entry ending on the summary with the default box.
    pub async fn reach_confirmation(&self) -> Reply {
        self.fill_sender().await;
        self.fill_recipient().await;
        self.text("5").await;
        self.press(Action::SkipDimensions).await
    }
}
