//! Entry points, the review screen and everything after it.

use crate::application::flow::{ConversationEngine, Turn};
use crate::application::prompts;
use crate::application::steps;
use crate::domain::message::Reply;
use crate::domain::order::{NewOrder, OrderStatus, PaymentMethod};
use crate::domain::session::{AddressPart, Session, SessionField, Side, StepPatch};
use crate::domain::step::Step;
use crate::domain::validation;
use crate::error::{Result, ShipError};

impl ConversationEngine {
    /// `/start` or the new-order button. An unexpired in-progress session is
    /// resumed where it was left.
    pub(crate) async fn start_order(&self, turn: &Turn) -> Result<Reply> {
        if let Some(existing) = self.load_session(turn.user_id).await? {
            let step = existing.current_step;
            if step.is_resumable() {
                let session = self.advance(turn, step, StepPatch::new()).await?;
                tracing::info!(user_id = turn.user_id, step = %step, "resuming order");
                return Ok(prompts::with_notice(
                    "📝 You have an unfinished order, let's continue.",
                    prompts::prompt(step, &session.step_data),
                ));
            }
            self.sessions.delete(turn.user_id).await?;
        }

        let session = self.advance(turn, Step::FromName, StepPatch::new()).await?;
        tracing::info!(user_id = turn.user_id, chat_id = turn.chat_id, "order started");
        Ok(prompts::with_notice(
            "📦 Let's create a new order.",
            prompts::prompt(Step::FromName, &session.step_data),
        ))
    }

    /// Starts a fresh order pre-filled with a saved template's addresses.
    pub(crate) async fn start_from_template(
        &self,
        turn: &Turn,
        template_id: &str,
        state: Option<Step>,
    ) -> Result<Reply> {
        let template = match self.templates.load_template(template_id).await? {
            Some(t) if t.user_id == turn.user_id => t,
            _ => {
                tracing::warn!(
                    user_id = turn.user_id,
                    error = %ShipError::TemplateNotFound(template_id.to_string()),
                    "cannot start from template"
                );
                return Ok(prompts::template_not_found(state));
            }
        };

        self.sessions.delete(turn.user_id).await?;

        let mut patch = StepPatch::new();
        for (side, address) in [(Side::From, &template.from), (Side::To, &template.to)] {
            for part in AddressPart::ALL {
                patch.push(SessionField::Address(
                    side,
                    part,
                    address.get(part).map(str::to_string),
                ));
            }
        }
        patch.push(SessionField::TemplateName(Some(template.name.clone())));
        patch.push(SessionField::Extra(
            "template_id".to_string(),
            serde_json::Value::String(template.template_id.clone()),
        ));

        let session = self.advance(turn, Step::ParcelWeight, patch).await?;
        tracing::info!(user_id = turn.user_id, template = %template.template_id, "order started from template");
        Ok(prompts::with_notice(
            &format!("📄 Using template \"{}\".", template.name),
            prompts::prompt(Step::ParcelWeight, &session.step_data),
        ))
    }

    /// Looks up rates for the stored shipment. Any rate failure rolls the
    /// conversation back to the summary with a matching keyboard.
    pub(crate) async fn calculate_rates(&self, turn: &Turn, refresh: bool) -> Result<Reply> {
        let Some(session) = self.load_session(turn.user_id).await? else {
            return Ok(prompts::session_expired());
        };
        let shape = session.step_data.shipment_shape();

        let result = if refresh {
            self.rates.refresh(&shape).await
        } else {
            self.rates.get_rates(&shape).await
        };

        match result {
            Ok(quote) => {
                let patch = StepPatch::new()
                    .with(SessionField::Rates(quote.rates))
                    .with(SessionField::LastError(None));
                let session = self.advance(turn, Step::SelectCarrier, patch).await?;
                Ok(prompts::prompt(Step::SelectCarrier, &session.step_data))
            }
            Err(
                e @ (ShipError::RateSourceTimeout(_)
                | ShipError::RateSourceError(_)
                | ShipError::NoRatesAvailable
                | ShipError::IncompleteShipmentData(_)),
            ) => {
                if let ShipError::IncompleteShipmentData(_) = e {
                    tracing::error!(user_id = turn.user_id, error = %e, "rate lookup without complete data");
                }
                let session = self
                    .revert(turn, Step::SelectCarrier, &e.to_string())
                    .await?;
                Ok(prompts::rate_failure(&e, &session.step_data))
            }
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn open_edit_menu(&self, turn: &Turn, session: &Session) -> Result<Reply> {
        let patch = if session.step_data.return_to_confirm {
            SessionField::ReturnToConfirm(false).into()
        } else {
            StepPatch::new()
        };
        self.advance(turn, Step::EditMenu, patch).await?;
        Ok(prompts::edit_menu())
    }

    pub(crate) async fn edit_field(&self, turn: &Turn, step: Step, session: &Session) -> Result<Reply> {
        if steps::field_step(step).is_none() {
            return Ok(prompts::stale_button(Step::EditMenu, &session.step_data));
        }
        let session = self
            .advance(turn, step, SessionField::ReturnToConfirm(true).into())
            .await?;
        Ok(prompts::prompt(step, &session.step_data))
    }

    pub(crate) async fn back_to_confirm(&self, turn: &Turn) -> Result<Reply> {
        let session = self
            .advance(turn, Step::ConfirmData, SessionField::ReturnToConfirm(false).into())
            .await?;
        Ok(prompts::prompt(Step::ConfirmData, &session.step_data))
    }

    pub(crate) async fn ask_template_name(&self, turn: &Turn) -> Result<Reply> {
        let session = self.advance(turn, Step::TemplateName, StepPatch::new()).await?;
        Ok(prompts::prompt(Step::TemplateName, &session.step_data))
    }

    /// Saves both addresses as a named template and returns to the summary.
    pub(crate) async fn name_template(&self, turn: &Turn, session: &Session, text: &str) -> Result<Reply> {
        let name = match validation::validate_template_name(text) {
            Ok(name) => name,
            Err(ShipError::Validation(hint)) => {
                return Ok(prompts::invalid_input(&hint, Step::TemplateName, &session.step_data));
            }
            Err(e) => return Err(e),
        };

        let template = self
            .templates
            .save_template(
                turn.user_id,
                &name,
                &session.step_data.from,
                &session.step_data.to,
                turn.now,
            )
            .await?;
        let session = self
            .advance(turn, Step::ConfirmData, SessionField::TemplateName(Some(name.clone())).into())
            .await?;
        tracing::info!(user_id = turn.user_id, template = %template.template_id, "template saved");
        Ok(prompts::with_notice(
            &format!("✅ Template \"{name}\" saved."),
            prompts::prompt(Step::ConfirmData, &session.step_data),
        ))
    }

    /// Picks one of the displayed rates and opens a draft order for it.
    pub(crate) async fn select_rate(&self, turn: &Turn, session: &Session, rate_id: &str) -> Result<Reply> {
        let Some(rate) = session
            .step_data
            .rates
            .iter()
            .find(|r| r.rate_id == rate_id)
            .cloned()
        else {
            return Ok(prompts::with_notice(
                "⚠️ This rate is no longer available, please pick another one.",
                prompts::prompt(Step::SelectCarrier, &session.step_data),
            ));
        };

        if let Some(previous) = &session.step_data.order_id
            && let Some(order) = self.orders.get_order(previous).await?
            && order.status == OrderStatus::Pending
        {
            self.orders.mark_order_cancelled(&order.order_id).await?;
            tracing::info!(order_id = %order.order_id, "superseded draft order cancelled");
        }

        let order = self
            .orders
            .create_order(
                NewOrder {
                    user_id: turn.user_id,
                    from: session.step_data.from.clone(),
                    to: session.step_data.to.clone(),
                    rate: rate.clone(),
                },
                turn.now,
            )
            .await?;

        let patch = StepPatch::new()
            .with(SessionField::SelectedRate(Some(rate)))
            .with(SessionField::OrderId(Some(order.order_id.clone())));
        let session = self.advance(turn, Step::PaymentMethod, patch).await?;
        tracing::info!(user_id = turn.user_id, order_id = %order.order_id, "draft order created");
        Ok(prompts::prompt(Step::PaymentMethod, &session.step_data))
    }

    /// Records the chosen payment method and ends the conversation.
    pub(crate) async fn pay(&self, turn: &Turn, session: &Session, method: PaymentMethod) -> Result<Reply> {
        let order_id = session
            .step_data
            .order_id
            .as_deref()
            .ok_or_else(|| ShipError::InternalError("payment requested without an order".into()))?;

        self.orders.record_payment_method(order_id, method).await?;
        self.finish(turn).await?;
        tracing::info!(user_id = turn.user_id, order_id, method = %method, "order checked out");
        Ok(prompts::order_placed(method))
    }
}
