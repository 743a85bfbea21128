#![cfg(feature = "storage-rocksdb")]

mod common;

use chrono::Duration;
use common::{CHAT, ScriptedRateSource, USER, sample_rates};
use shipbot::application::flow::{ConversationEngine, EngineSettings, Stores};
use shipbot::application::guard::InMemoryInputGuard;
use shipbot::application::rates::{RateEngine, RatePolicy};
use shipbot::domain::message::{Action, Inbound};
use shipbot::domain::ports::ClockRef;
use shipbot::domain::rate::RateFetch;
use shipbot::domain::step::Step;
use shipbot::infrastructure::clock::ManualClock;
use shipbot::infrastructure::rocksdb::RocksDBStore;
use std::path::Path;
use std::sync::Arc;

fn engine(path: &Path, clock: &ManualClock) -> ConversationEngine {
    let clock_ref: ClockRef = Arc::new(clock.clone());
    let store = RocksDBStore::open(path).unwrap();
    let stores = Stores {
        sessions: Box::new(store.clone()),
        progress: Box::new(store.clone()),
        orders: Box::new(store.clone()),
        templates: Box::new(store.clone()),
    };
    let rates = RateEngine::new(
        Box::new(ScriptedRateSource::new(RateFetch::ok(sample_rates()))),
        Box::new(store),
        clock_ref.clone(),
        RatePolicy::default(),
    );
    let guard = InMemoryInputGuard::new(clock_ref.clone(), Duration::milliseconds(300), 3);
    ConversationEngine::new(stores, rates, Box::new(guard), clock_ref, EngineSettings::default())
}

async fn send(engine: &ConversationEngine, clock: &ManualClock, inbound: Inbound) -> Option<Step> {
    clock.advance(Duration::seconds(1));
    engine.handle(inbound).await.next_state
}

#[tokio::test]
async fn test_conversation_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::default();

    {
        let first = engine(dir.path(), &clock);
        send(&first, &clock, Inbound::text(USER, CHAT, "/start")).await;
        send(&first, &clock, Inbound::text(USER, CHAT, "John Smith")).await;
        let state = send(&first, &clock, Inbound::text(USER, CHAT, "123 Main St")).await;
        assert_eq!(state, Some(Step::FromAddress2));
    }

    let second = engine(dir.path(), &clock);
    assert_eq!(
        second.current_state(CHAT, USER).await.unwrap(),
        Some(Step::FromAddress2)
    );
    let state = send(
        &second,
        &clock,
        Inbound::callback(USER, CHAT, Action::SkipFromAddress2.to_string()),
    )
    .await;
    assert_eq!(state, Some(Step::FromCity));

    let session = second.session(USER).await.unwrap().unwrap();
    assert_eq!(session.step_data.from.name.as_deref(), Some("John Smith"));
    assert_eq!(session.step_data.from.street.as_deref(), Some("123 Main St"));
}
