use crate::application::guard::{Admission, InputGuardBox};
use crate::application::prompts;
use crate::application::rates::RateEngine;
use crate::application::steps;
use crate::domain::message::{Action, Inbound, Input, Reply};
use crate::domain::ports::{
    ClockRef, ConversationKey, OrderStoreBox, ProgressStoreBox, SessionStoreBox, TemplateStoreBox,
};
use crate::domain::session::{Session, StepPatch};
use crate::domain::step::Step;
use crate::domain::{ChatId, UserId};
use crate::error::{Result, ShipError};
use crate::infrastructure::in_memory::{
    InMemoryOrderStore, InMemoryProgressStore, InMemorySessionStore, InMemoryTemplateStore,
};
use chrono::{DateTime, Duration, Utc};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;

pub const ORDER_CONVERSATION: &str = "order_conversation";

/// Durable collaborators of the engine.
pub struct Stores {
    pub sessions: SessionStoreBox,
    pub progress: ProgressStoreBox,
    pub orders: OrderStoreBox,
    pub templates: TemplateStoreBox,
}

impl Stores {
    pub fn in_memory(progress_retention: Duration) -> Self {
        Self {
            sessions: Box::new(InMemorySessionStore::new()),
            progress: Box::new(InMemoryProgressStore::new(progress_retention)),
            orders: Box::new(InMemoryOrderStore::new()),
            templates: Box::new(InMemoryTemplateStore::new()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub conversation: String,
    pub session_ttl: Duration,
    pub progress_retention: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            conversation: ORDER_CONVERSATION.to_string(),
            session_ttl: Duration::minutes(15),
            progress_retention: Duration::hours(1),
        }
    }
}

/// What a single inbound message asks for.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    Text(String),
    Action(Action),
    Unknown(String),
}

impl Command {
    fn parse(input: &Input) -> Self {
        match input {
            Input::Text(text) if text.trim() == "/start" => Command::Action(Action::NewOrder),
            Input::Text(text) => Command::Text(text.clone()),
            Input::Callback(data) => match data.parse::<Action>() {
                Ok(action) => Command::Action(action),
                Err(_) => Command::Unknown(data.clone()),
            },
        }
    }

    /// Name the input guard keys on. Free text shares one name so a
    /// duplicate is caught even after the first copy moved the step on.
    fn handler_name(&self) -> &'static str {
        match self {
            Command::Text(_) => "text",
            Command::Action(action) => action.handler_name(),
            Command::Unknown(_) => "unknown",
        }
    }
}

/// Identity and time of the message being handled.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Turn {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub key: ConversationKey,
    pub now: DateTime<Utc>,
    pub handler: &'static str,
}

/// Drives the order conversation for every user.
///
/// The engine keeps no per-user state of its own beyond the input guard:
/// each message re-reads progress and session from the stores and writes
/// its changes back before returning.
pub struct ConversationEngine {
    pub(crate) sessions: SessionStoreBox,
    pub(crate) progress: ProgressStoreBox,
    pub(crate) orders: OrderStoreBox,
    pub(crate) templates: TemplateStoreBox,
    pub(crate) rates: RateEngine,
    pub(crate) guard: InputGuardBox,
    pub(crate) clock: ClockRef,
    pub(crate) settings: EngineSettings,
}

impl ConversationEngine {
    pub fn new(
        stores: Stores,
        rates: RateEngine,
        guard: InputGuardBox,
        clock: ClockRef,
        settings: EngineSettings,
    ) -> Self {
        Self {
            sessions: stores.sessions,
            progress: stores.progress,
            orders: stores.orders,
            templates: stores.templates,
            rates,
            guard,
            clock,
            settings,
        }
    }

    pub fn conversation(&self) -> &str {
        &self.settings.conversation
    }

    /// Current routing state of a conversation, straight from the store.
    pub async fn current_state(&self, chat_id: ChatId, user_id: UserId) -> Result<Option<Step>> {
        self.progress
            .get(&self.settings.conversation, ConversationKey::new(chat_id, user_id))
            .await
    }

    /// The user's live session, if any and not expired.
    pub async fn session(&self, user_id: UserId) -> Result<Option<Session>> {
        self.load_session(user_id).await
    }

    pub fn rate_engine(&self) -> &RateEngine {
        &self.rates
    }

    pub fn input_guard(&self) -> &InputGuardBox {
        &self.guard
    }

    /// Handles one inbound message and never fails: every error ends in a
    /// reply the transport can show.
    pub async fn handle(&self, inbound: Inbound) -> Reply {
        let command = Command::parse(&inbound.input);
        let turn = Turn {
            user_id: inbound.user_id,
            chat_id: inbound.chat_id,
            key: ConversationKey::new(inbound.chat_id, inbound.user_id),
            now: self.clock.now(),
            handler: command.handler_name(),
        };

        if let Admission::Rejected { notice } = self.guard.admit(turn.user_id, turn.handler) {
            let state = match self.guard.last_state(turn.user_id) {
                Some(state) => Some(state),
                None => self.current_state(turn.chat_id, turn.user_id).await.unwrap_or(None),
            };
            return Reply::suppressed(state, notice);
        }

        let outcome = AssertUnwindSafe(self.dispatch(&turn, command))
            .catch_unwind()
            .await;

        let reply = match outcome {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => self.recover(&turn, e).await,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "handler panicked".to_string());
                self.recover(&turn, ShipError::InternalError(message)).await
            }
        };

        self.guard.remember(turn.user_id, reply.next_state);
        reply
    }

    async fn dispatch(&self, turn: &Turn, command: Command) -> Result<Reply> {
        let state = self.progress.get(&self.settings.conversation, turn.key).await?;
        tracing::debug!(
            user_id = turn.user_id,
            chat_id = turn.chat_id,
            handler = turn.handler,
            state = ?state,
            "dispatching"
        );

        if let Command::Action(action) = &command {
            match action {
                Action::NewOrder => return self.start_order(turn).await,
                Action::UseTemplate(id) => return self.start_from_template(turn, id, state).await,
                Action::CancelOrder => return self.cancel_order(turn, state).await,
                Action::ReturnToOrder => return self.return_to_order(turn, state).await,
                Action::ConfirmCancel => return self.confirm_cancel(turn).await,
                _ => {}
            }
        }

        let Some(state) = state else {
            return Ok(prompts::no_active_order());
        };

        let Some(session) = self.load_session(turn.user_id).await? else {
            return self.expire(turn, state).await;
        };

        match command {
            Command::Text(text) => self.on_text(turn, state, &session, &text).await,
            Command::Action(action) => self.on_action(turn, state, &session, action).await,
            Command::Unknown(data) => {
                tracing::warn!(user_id = turn.user_id, data = %data, "unknown callback");
                Ok(prompts::stale_button(state, &session.step_data))
            }
        }
    }

    async fn on_text(&self, turn: &Turn, state: Step, session: &Session, text: &str) -> Result<Reply> {
        if let Some(field) = steps::field_step(state) {
            return self.fill_field(turn, field, session, text).await;
        }
        match state {
            Step::TemplateName => self.name_template(turn, session, text).await,
            _ => Ok(prompts::use_buttons(state, &session.step_data)),
        }
    }

    async fn on_action(
        &self,
        turn: &Turn,
        state: Step,
        session: &Session,
        action: Action,
    ) -> Result<Reply> {
        match (state, action) {
            (
                _,
                action @ (Action::SkipFromAddress2
                | Action::SkipToAddress2
                | Action::SkipFromPhone
                | Action::SkipToPhone
                | Action::SkipDimensions
                | Action::SkipWidthHeight
                | Action::SkipHeight),
            ) => self.skip(turn, state, session, &action).await,
            (Step::ConfirmData, Action::ConfirmData) => self.calculate_rates(turn, false).await,
            (Step::ConfirmData | Step::SelectCarrier, Action::RefreshRates) => {
                self.calculate_rates(turn, true).await
            }
            (Step::ConfirmData | Step::SelectCarrier, Action::EditData) => {
                self.open_edit_menu(turn, session).await
            }
            (Step::ConfirmData, Action::SaveTemplate) => self.ask_template_name(turn).await,
            (Step::EditMenu, Action::EditField(step)) => self.edit_field(turn, step, session).await,
            (
                Step::EditMenu | Step::TemplateName | Step::SelectCarrier | Step::PaymentMethod,
                Action::BackToConfirm | Action::CheckData,
            ) => self.back_to_confirm(turn).await,
            (Step::SelectCarrier, Action::SelectRate(rate_id)) => {
                self.select_rate(turn, session, &rate_id).await
            }
            (Step::PaymentMethod, Action::Pay(method)) => self.pay(turn, session, method).await,
            (state, Action::BackToConfirm)
                if session.step_data.return_to_confirm && steps::field_step(state).is_some() =>
            {
                self.back_to_confirm(turn).await
            }
            (state, action) => {
                tracing::info!(user_id = turn.user_id, state = %state, action = %action, "stale button");
                Ok(prompts::stale_button(state, &session.step_data))
            }
        }
    }

    /// Reads the session, dropping it when its inactivity TTL has passed.
    pub(crate) async fn load_session(&self, user_id: UserId) -> Result<Option<Session>> {
        match self.sessions.get(user_id).await? {
            Some(session) if session.is_expired(self.clock.now(), self.settings.session_ttl) => {
                self.sessions.delete(user_id).await?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Drops the progress entry left behind by an expired session.
    pub(crate) async fn expire(&self, turn: &Turn, state: Step) -> Result<Reply> {
        tracing::info!(user_id = turn.user_id, state = %state, "session expired");
        self.progress
            .save(&self.settings.conversation, turn.key, None, turn.now)
            .await?;
        Ok(prompts::session_expired())
    }

    /// Moves session and progress to `step` together, merging `patch`.
    pub(crate) async fn advance(&self, turn: &Turn, step: Step, patch: StepPatch) -> Result<Session> {
        let session = self
            .sessions
            .upsert(turn.user_id, step, &patch, turn.now)
            .await?;
        self.progress
            .save(&self.settings.conversation, turn.key, Some(step), turn.now)
            .await?;
        Ok(session)
    }

    /// Ends the conversation: no session, no progress entry, no guard state.
    pub(crate) async fn finish(&self, turn: &Turn) -> Result<()> {
        self.sessions.delete(turn.user_id).await?;
        self.progress
            .save(&self.settings.conversation, turn.key, None, turn.now)
            .await?;
        self.guard.clear(turn.user_id);
        Ok(())
    }

    /// Fault boundary: logs the failure and parks the conversation in a
    /// state the next message can be routed from.
    async fn recover(&self, turn: &Turn, error: ShipError) -> Reply {
        tracing::error!(
            user_id = turn.user_id,
            chat_id = turn.chat_id,
            handler = turn.handler,
            error = %error,
            "handler failed"
        );

        if let ShipError::StorageUnavailable(_) = error {
            let state = self.guard.last_state(turn.user_id);
            return prompts::storage_unavailable(state);
        }

        let current = self
            .progress
            .get(&self.settings.conversation, turn.key)
            .await
            .unwrap_or(None);
        let fallback = current.map(Step::fallback).unwrap_or(Step::End);

        let written = if fallback == Step::End {
            // Each cleanup is attempted even when an earlier one fails.
            let progress = self
                .progress
                .save(&self.settings.conversation, turn.key, None, turn.now)
                .await;
            let session = self.sessions.delete(turn.user_id).await;
            self.guard.clear(turn.user_id);
            progress.and(session)
        } else {
            self.advance(turn, fallback, StepPatch::new()).await.map(|_| ())
        };
        if let Err(e) = written {
            tracing::error!(
                user_id = turn.user_id,
                error = %e,
                "failed to park conversation after handler failure"
            );
        }

        prompts::apology(fallback)
    }
}
