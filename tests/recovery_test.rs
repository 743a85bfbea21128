mod common;

use common::{CHAT, Harness, USER};
use shipbot::domain::message::Action;
use shipbot::domain::order::OrderStatus;
use shipbot::domain::ports::OrderStore;
use shipbot::domain::rate::RateFetch;
use shipbot::domain::step::Step;

async fn cancel_and_return(h: &Harness, expected: Step) {
    let reply = h.press(Action::CancelOrder).await;
    assert_eq!(reply.next_state, Some(expected));
    assert!(reply.has_action(&Action::ConfirmCancel));
    assert!(reply.has_action(&Action::ReturnToOrder));
    assert_eq!(
        h.session().await.step_data.saved_state_before_cancel,
        Some(expected)
    );

    let reply = h.press(Action::ReturnToOrder).await;
    assert_eq!(reply.next_state, Some(expected));
    assert_eq!(h.state().await, Some(expected));
    assert_eq!(h.session().await.step_data.saved_state_before_cancel, None);
}

#[tokio::test]
async fn test_cancel_and_return_in_address_section() {
    let h = Harness::new();
    h.text("/start").await;
    h.text("John Smith").await;
    h.text("123 Main St").await;
    h.press(Action::SkipFromAddress2).await;

    cancel_and_return(&h, Step::FromCity).await;

    let reply = h.text("San Francisco").await;
    assert_eq!(reply.next_state, Some(Step::FromState));
    assert_eq!(h.session().await.step_data.from.name.as_deref(), Some("John Smith"));
}

#[tokio::test]
async fn test_cancel_and_return_in_parcel_section() {
    let h = Harness::new();
    h.fill_sender().await;
    h.fill_recipient().await;
    h.text("5").await;
    h.text("12").await;

    cancel_and_return(&h, Step::ParcelWidth).await;

    let reply = h.text("8").await;
    assert_eq!(reply.next_state, Some(Step::ParcelHeight));
}

#[tokio::test]
async fn test_cancel_and_return_on_confirmation() {
    let h = Harness::new();
    h.reach_confirmation().await;

    cancel_and_return(&h, Step::ConfirmData).await;

    let reply = h.press(Action::ConfirmData).await;
    assert_eq!(reply.next_state, Some(Step::SelectCarrier));
}

#[tokio::test]
async fn test_return_on_carrier_list_keeps_rates() {
    let h = Harness::new();
    h.reach_confirmation().await;
    h.press(Action::ConfirmData).await;

    cancel_and_return(&h, Step::SelectCarrier).await;
    assert_eq!(h.rate_calls(), 1);
    assert_eq!(h.session().await.step_data.rates.len(), 3);
}

#[tokio::test]
async fn test_confirm_cancel_ends_conversation() {
    let h = Harness::new();
    h.text("/start").await;
    h.text("John Smith").await;
    h.press(Action::CancelOrder).await;

    let reply = h.press(Action::ConfirmCancel).await;
    assert_eq!(reply.next_state, None);
    assert!(reply.has_action(&Action::NewOrder));
    assert_eq!(h.state().await, None);
    assert!(h.engine.session(USER).await.unwrap().is_none());

    let reply = h.text("/start").await;
    assert_eq!(reply.next_state, Some(Step::FromName));
    assert_eq!(h.session().await.step_data.from.name, None);
}

#[tokio::test]
async fn test_confirm_cancel_marks_draft_order_cancelled() {
    let h = Harness::new();
    h.reach_confirmation().await;
    h.press(Action::ConfirmData).await;
    let reply = h.press(Action::SelectRate("se-1".into())).await;
    assert_eq!(reply.next_state, Some(Step::PaymentMethod));

    let order_id = h.session().await.step_data.order_id.expect("draft order");
    assert_eq!(
        h.orders.get_order(&order_id).await.unwrap().unwrap().status,
        OrderStatus::Pending
    );

    h.press(Action::CancelOrder).await;
    h.press(Action::ConfirmCancel).await;

    let order = h.orders.get_order(&order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(h.state().await, None);
}

#[tokio::test]
async fn test_cancel_without_order_has_nothing_to_cancel() {
    let h = Harness::new();
    let reply = h.press(Action::CancelOrder).await;
    assert_eq!(reply.next_state, None);
    assert!(reply.has_action(&Action::NewOrder));
}

#[tokio::test]
async fn test_return_without_any_state_starts_over() {
    let h = Harness::new();
    let reply = h.press(Action::ReturnToOrder).await;
    assert_eq!(reply.next_state, Some(Step::FromName));
}

#[tokio::test]
async fn test_rate_timeout_reverts_to_summary_with_retry() {
    let h = Harness::new();
    h.reach_confirmation().await;
    h.source.answer_with(RateFetch::failed("carrier API timeout"));

    let reply = h.press(Action::ConfirmData).await;
    assert_eq!(reply.next_state, Some(Step::ConfirmData));
    assert!(reply.has_action(&Action::RefreshRates));
    assert!(reply.has_action(&Action::EditData));
    assert_eq!(h.state().await, Some(Step::ConfirmData));

    let error = h.session().await.step_data.last_error.expect("recorded error");
    assert_eq!(error.step, Step::SelectCarrier);
    assert_eq!(error.reverted_to, Step::ConfirmData);

    h.source.answer_with(RateFetch::ok(common::sample_rates()));
    let reply = h.press(Action::RefreshRates).await;
    assert_eq!(reply.next_state, Some(Step::SelectCarrier));
    assert!(h.session().await.step_data.last_error.is_none());
}

#[tokio::test]
async fn test_rate_error_offers_edit_only() {
    let h = Harness::new();
    h.reach_confirmation().await;
    h.source.answer_with(RateFetch::failed("address not found"));

    let reply = h.press(Action::ConfirmData).await;
    assert_eq!(reply.next_state, Some(Step::ConfirmData));
    assert!(!reply.has_action(&Action::RefreshRates));
    assert!(reply.has_action(&Action::EditData));
}

#[tokio::test]
async fn test_no_rates_reverts_to_summary() {
    let h = Harness::new();
    h.reach_confirmation().await;
    h.source.answer_with(RateFetch::ok(Vec::new()));

    let reply = h.press(Action::ConfirmData).await;
    assert_eq!(reply.next_state, Some(Step::ConfirmData));
    assert!(reply.text.contains("No shipping options"));
}

#[tokio::test]
async fn test_revert_to_previous_step_records_reason() {
    let h = Harness::new();
    h.fill_sender().await;

    let step = h
        .engine
        .revert_to_previous_step(CHAT, USER, Step::ToName, "address service down")
        .await
        .unwrap();

    assert_eq!(step, Step::FromPhone);
    assert_eq!(h.state().await, Some(Step::FromPhone));
    let error = h.session().await.step_data.last_error.unwrap();
    assert_eq!(error.message, "address service down");
    assert_eq!(error.step, Step::ToName);
}

#[tokio::test]
async fn test_cancel_after_session_ttl_reports_expiry() {
    let h = Harness::new();
    h.reach_confirmation().await;
    h.clock.advance(chrono::Duration::minutes(16));

    let reply = h.press(Action::CancelOrder).await;
    assert_eq!(reply.next_state, None);
    assert!(reply.text.contains("expired"));
    assert_eq!(h.state().await, None);
    assert!(h.engine.session(USER).await.unwrap().is_none());

    let reply = h.press(Action::ConfirmData).await;
    assert_eq!(reply.next_state, None);
    assert_eq!(h.rate_calls(), 0);
}

#[tokio::test]
async fn test_return_after_session_ttl_reports_expiry() {
    let h = Harness::new();
    h.reach_confirmation().await;
    h.clock.advance(chrono::Duration::minutes(16));

    let reply = h.press(Action::ReturnToOrder).await;
    assert_eq!(reply.next_state, None);
    assert!(reply.has_action(&Action::NewOrder));
    assert_eq!(h.state().await, None);
    assert!(h.engine.session(USER).await.unwrap().is_none());
}
