//! Field-collecting steps: validation, skips and the forward path.

use crate::application::flow::{ConversationEngine, Turn};
use crate::application::prompts;
use crate::domain::message::{Action, Reply};
use crate::domain::rate::DEFAULT_DIMENSION;
use crate::domain::session::{AddressPart, ParcelDim, Session, SessionField, Side, StepPatch};
use crate::domain::step::Step;
use crate::domain::validation;
use crate::error::{Result, ShipError};
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Address(Side, AddressPart),
    Parcel(ParcelDim),
}

impl Field {
    /// Validates raw user input into the session update it produces.
    pub fn parse(self, input: &str) -> Result<SessionField> {
        match self {
            Field::Address(side, part) => {
                let value = match part {
                    AddressPart::Name => validation::validate_name(input)?,
                    AddressPart::Street => validation::validate_street(input)?,
                    AddressPart::Street2 => validation::validate_street2(input)?,
                    AddressPart::City => validation::validate_city(input)?,
                    AddressPart::State => validation::validate_state(input)?,
                    AddressPart::Zip => validation::validate_zip(input)?,
                    AddressPart::Phone => validation::validate_phone(input)?,
                };
                let value = (!value.is_empty()).then_some(value);
                Ok(SessionField::Address(side, part, value))
            }
            Field::Parcel(ParcelDim::Weight) => Ok(SessionField::Parcel(
                ParcelDim::Weight,
                validation::validate_weight(input)?,
            )),
            Field::Parcel(dim) => {
                let label = match dim {
                    ParcelDim::Length => "Length",
                    ParcelDim::Width => "Width",
                    _ => "Height",
                };
                Ok(SessionField::Parcel(dim, validation::validate_dimension(input, label)?))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipRule {
    /// Stores an explicit empty value.
    Clear,
    /// Stores a generated placeholder phone number.
    GeneratePhone,
    /// Fills this and every later dimension with the standard box size.
    DefaultDimensions,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldStep {
    pub step: Step,
    pub field: Field,
    pub next: Step,
    pub skip: Option<SkipRule>,
}

const fn field_step_entry(step: Step, field: Field, next: Step, skip: Option<SkipRule>) -> FieldStep {
    FieldStep {
        step,
        field,
        next,
        skip,
    }
}

use self::Field::{Address as A, Parcel as P};

pub static FIELD_STEPS: [FieldStep; 18] = [
    field_step_entry(Step::FromName, A(Side::From, AddressPart::Name), Step::FromAddress, None),
    field_step_entry(Step::FromAddress, A(Side::From, AddressPart::Street), Step::FromAddress2, None),
    field_step_entry(Step::FromAddress2, A(Side::From, AddressPart::Street2), Step::FromCity, Some(SkipRule::Clear)),
    field_step_entry(Step::FromCity, A(Side::From, AddressPart::City), Step::FromState, None),
    field_step_entry(Step::FromState, A(Side::From, AddressPart::State), Step::FromZip, None),
    field_step_entry(Step::FromZip, A(Side::From, AddressPart::Zip), Step::FromPhone, None),
    field_step_entry(Step::FromPhone, A(Side::From, AddressPart::Phone), Step::ToName, Some(SkipRule::GeneratePhone)),
    field_step_entry(Step::ToName, A(Side::To, AddressPart::Name), Step::ToAddress, None),
    field_step_entry(Step::ToAddress, A(Side::To, AddressPart::Street), Step::ToAddress2, None),
    field_step_entry(Step::ToAddress2, A(Side::To, AddressPart::Street2), Step::ToCity, Some(SkipRule::Clear)),
    field_step_entry(Step::ToCity, A(Side::To, AddressPart::City), Step::ToState, None),
    field_step_entry(Step::ToState, A(Side::To, AddressPart::State), Step::ToZip, None),
    field_step_entry(Step::ToZip, A(Side::To, AddressPart::Zip), Step::ToPhone, None),
    field_step_entry(Step::ToPhone, A(Side::To, AddressPart::Phone), Step::ParcelWeight, Some(SkipRule::GeneratePhone)),
    field_step_entry(Step::ParcelWeight, P(ParcelDim::Weight), Step::ParcelLength, None),
    field_step_entry(Step::ParcelLength, P(ParcelDim::Length), Step::ParcelWidth, Some(SkipRule::DefaultDimensions)),
    field_step_entry(Step::ParcelWidth, P(ParcelDim::Width), Step::ParcelHeight, Some(SkipRule::DefaultDimensions)),
    field_step_entry(Step::ParcelHeight, P(ParcelDim::Height), Step::ConfirmData, Some(SkipRule::DefaultDimensions)),
];

pub fn field_step(step: Step) -> Option<&'static FieldStep> {
    FIELD_STEPS.iter().find(|f| f.step == step)
}

/// The step a skip button belongs to.
fn skip_target(action: &Action) -> Option<Step> {
    let step = match action {
        Action::SkipFromAddress2 => Step::FromAddress2,
        Action::SkipToAddress2 => Step::ToAddress2,
        Action::SkipFromPhone => Step::FromPhone,
        Action::SkipToPhone => Step::ToPhone,
        Action::SkipDimensions => Step::ParcelLength,
        Action::SkipWidthHeight => Step::ParcelWidth,
        Action::SkipHeight => Step::ParcelHeight,
        _ => return None,
    };
    Some(step)
}

/// Placeholder US number in the `+1XXXXXXXXXX` format.
pub fn generate_phone() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "+1{}{}{}",
        rng.gen_range(200..=999),
        rng.gen_range(200..=999),
        rng.gen_range(1000..=9999)
    )
}

impl ConversationEngine {
    pub(crate) async fn fill_field(
        &self,
        turn: &Turn,
        field: &FieldStep,
        session: &Session,
        text: &str,
    ) -> Result<Reply> {
        let value = match field.field.parse(text) {
            Ok(value) => value,
            Err(ShipError::Validation(hint)) => {
                tracing::debug!(user_id = turn.user_id, step = %field.step, hint = %hint, "invalid input");
                return Ok(prompts::invalid_input(&hint, field.step, &session.step_data));
            }
            Err(e) => return Err(e),
        };
        self.complete_field(turn, field.step, field.next, session, StepPatch::from(value))
            .await
    }

    pub(crate) async fn skip(
        &self,
        turn: &Turn,
        state: Step,
        session: &Session,
        action: &Action,
    ) -> Result<Reply> {
        let field = match (skip_target(action), field_step(state)) {
            (Some(target), Some(field)) if target == state => field,
            _ => return Ok(prompts::stale_button(state, &session.step_data)),
        };

        match (field.skip, field.field) {
            (Some(SkipRule::Clear), Field::Address(side, part)) => {
                let patch = SessionField::Address(side, part, None).into();
                self.complete_field(turn, state, field.next, session, patch).await
            }
            (Some(SkipRule::GeneratePhone), Field::Address(side, part)) => {
                let patch = SessionField::Address(side, part, Some(generate_phone())).into();
                self.complete_field(turn, state, field.next, session, patch).await
            }
            (Some(SkipRule::DefaultDimensions), Field::Parcel(from)) => {
                self.default_dimensions(turn, from, session.step_data.return_to_confirm)
                    .await
            }
            _ => Ok(prompts::stale_button(state, &session.step_data)),
        }
    }

    /// Sets `from` and every later dimension to the standard size and goes
    /// to the summary. Earlier dimensions come from a fresh store read and
    /// are defaulted only if they were never persisted. When editing a single
    /// dimension, later ones keep their stored values too.
    async fn default_dimensions(&self, turn: &Turn, from: ParcelDim, editing: bool) -> Result<Reply> {
        let fresh = self.load_session(turn.user_id).await?;
        let skipped_from = ParcelDim::DIMENSIONS
            .iter()
            .position(|d| *d == from)
            .unwrap_or(0);

        let mut patch = StepPatch::new();
        for (i, dim) in ParcelDim::DIMENSIONS.into_iter().enumerate() {
            let persisted = fresh.as_ref().and_then(|s| s.step_data.parcel.get(dim));
            let keep = i < skipped_from || (editing && i > skipped_from);
            let value = match persisted {
                Some(value) if keep => value,
                _ => DEFAULT_DIMENSION,
            };
            patch.push(SessionField::Parcel(dim, value));
        }
        patch.push(SessionField::ReturnToConfirm(false));

        let session = self.advance(turn, Step::ConfirmData, patch).await?;
        tracing::info!(user_id = turn.user_id, from = ?from, "dimensions defaulted");
        Ok(prompts::prompt(Step::ConfirmData, &session.step_data))
    }

    async fn complete_field(
        &self,
        turn: &Turn,
        step: Step,
        next: Step,
        session: &Session,
        mut patch: StepPatch,
    ) -> Result<Reply> {
        let next = if session.step_data.return_to_confirm {
            patch.push(SessionField::ReturnToConfirm(false));
            Step::ConfirmData
        } else {
            next
        };
        let session = self.advance(turn, next, patch).await?;
        tracing::info!(user_id = turn.user_id, from = %step, to = %next, "step completed");
        Ok(prompts::prompt(next, &session.step_data))
    }
}
