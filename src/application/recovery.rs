//! Cancellation, return-to-order and error-driven rollback.

use crate::application::flow::{ConversationEngine, Turn};
use crate::application::prompts;
use crate::domain::message::Reply;
use crate::domain::order::OrderStatus;
use crate::domain::ports::ConversationKey;
use crate::domain::session::{RecordedError, Session, SessionField};
use crate::domain::step::Step;
use crate::domain::{ChatId, UserId};
use crate::error::Result;

impl ConversationEngine {
    /// Asks for confirmation. The current step is remembered so the user
    /// can come back to it.
    pub(crate) async fn cancel_order(&self, turn: &Turn, state: Option<Step>) -> Result<Reply> {
        let Some(state) = state.filter(|s| s.is_resumable()) else {
            return Ok(prompts::no_active_order());
        };
        if self.load_session(turn.user_id).await?.is_none() {
            return self.expire(turn, state).await;
        }
        self.advance(turn, state, SessionField::SavedStateBeforeCancel(Some(state)).into())
            .await?;
        tracing::info!(user_id = turn.user_id, state = %state, "cancel requested");
        Ok(prompts::confirm_cancel(Some(state)))
    }

    /// Resumes the order: the tracked step, else the step saved on cancel,
    /// else the first step.
    pub(crate) async fn return_to_order(&self, turn: &Turn, state: Option<Step>) -> Result<Reply> {
        let session = self.load_session(turn.user_id).await?;
        if let (Some(state), None) = (state, &session) {
            return self.expire(turn, state).await;
        }
        let saved = session.and_then(|s| s.step_data.saved_state_before_cancel);

        let target = state
            .filter(|s| s.is_resumable())
            .or(saved.filter(|s| s.is_resumable()))
            .unwrap_or(Step::FromName);
        let target = match target {
            Step::TemplateName => Step::ConfirmData,
            other => other,
        };

        let session = self
            .advance(turn, target, SessionField::SavedStateBeforeCancel(None).into())
            .await?;
        tracing::info!(user_id = turn.user_id, state = %target, "returned to order");

        if target == Step::SelectCarrier && session.step_data.rates.is_empty() {
            return self.calculate_rates(turn, false).await;
        }
        Ok(prompts::with_notice(
            "↩️ Let's continue your order.",
            prompts::prompt(target, &session.step_data),
        ))
    }

    /// Cancels the draft order, if any, and forgets the conversation.
    pub(crate) async fn confirm_cancel(&self, turn: &Turn) -> Result<Reply> {
        let session_order = self
            .load_session(turn.user_id)
            .await?
            .and_then(|s| s.step_data.order_id);

        let draft = match session_order {
            Some(order_id) => self.orders.get_order(&order_id).await?,
            None => self
                .orders
                .find_pending_order(turn.user_id)
                .await?
                .filter(|o| o.payment_method.is_none()),
        };

        if let Some(order) = draft.filter(|o| o.status == OrderStatus::Pending) {
            self.orders.mark_order_cancelled(&order.order_id).await?;
            tracing::info!(user_id = turn.user_id, order_id = %order.order_id, "draft order cancelled");
        }

        self.finish(turn).await?;
        tracing::info!(user_id = turn.user_id, "order conversation cancelled");
        Ok(prompts::order_cancelled())
    }

    /// Moves session and progress from `failed` to its recovery predecessor,
    /// recording why. Returns the step the conversation now sits in.
    pub async fn revert_to_previous_step(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        failed: Step,
        reason: &str,
    ) -> Result<Step> {
        let turn = Turn {
            user_id,
            chat_id,
            key: ConversationKey::new(chat_id, user_id),
            now: self.clock.now(),
            handler: "revert",
        };
        let session = self.revert(&turn, failed, reason).await?;
        Ok(session.current_step)
    }

    pub(crate) async fn revert(&self, turn: &Turn, failed: Step, reason: &str) -> Result<Session> {
        let target = failed.predecessor();
        let record = RecordedError {
            message: reason.to_string(),
            step: failed,
            reverted_to: target,
            at: turn.now,
        };
        let session = self
            .advance(turn, target, SessionField::LastError(Some(record)).into())
            .await?;
        tracing::warn!(
            user_id = turn.user_id,
            from = %failed,
            to = %target,
            reason,
            "reverted to previous step"
        );
        Ok(session)
    }
}
