use super::rate::{Rate, ShipmentShape};
use super::step::Step;
use super::UserId;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    From,
    To,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressPart {
    Name,
    Street,
    Street2,
    City,
    State,
    Zip,
    Phone,
}

impl AddressPart {
    pub const ALL: [AddressPart; 7] = [
        AddressPart::Name,
        AddressPart::Street,
        AddressPart::Street2,
        AddressPart::City,
        AddressPart::State,
        AddressPart::Zip,
        AddressPart::Phone,
    ];

    /// Parts that must be present before rates can be requested.
    pub const REQUIRED: [AddressPart; 5] = [
        AddressPart::Name,
        AddressPart::Street,
        AddressPart::City,
        AddressPart::State,
        AddressPart::Zip,
    ];

    pub fn key(self, side: Side) -> String {
        let prefix = match side {
            Side::From => "from",
            Side::To => "to",
        };
        let part = match self {
            AddressPart::Name => "name",
            AddressPart::Street => "street",
            AddressPart::Street2 => "street2",
            AddressPart::City => "city",
            AddressPart::State => "state",
            AddressPart::Zip => "zip",
            AddressPart::Phone => "phone",
        };
        format!("{prefix}_{part}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParcelDim {
    Weight,
    Length,
    Width,
    Height,
}

impl ParcelDim {
    pub const DIMENSIONS: [ParcelDim; 3] = [ParcelDim::Length, ParcelDim::Width, ParcelDim::Height];

    pub fn key(self) -> &'static str {
        match self {
            ParcelDim::Weight => "weight",
            ParcelDim::Length => "length",
            ParcelDim::Width => "width",
            ParcelDim::Height => "height",
        }
    }
}

/// One side of the shipment. Every part stays optional while the
/// conversation is collecting it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Address {
    pub name: Option<String>,
    pub street: Option<String>,
    pub street2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub phone: Option<String>,
}

impl Address {
    pub fn get(&self, part: AddressPart) -> Option<&str> {
        match part {
            AddressPart::Name => self.name.as_deref(),
            AddressPart::Street => self.street.as_deref(),
            AddressPart::Street2 => self.street2.as_deref(),
            AddressPart::City => self.city.as_deref(),
            AddressPart::State => self.state.as_deref(),
            AddressPart::Zip => self.zip.as_deref(),
            AddressPart::Phone => self.phone.as_deref(),
        }
    }

    fn slot(&mut self, part: AddressPart) -> &mut Option<String> {
        match part {
            AddressPart::Name => &mut self.name,
            AddressPart::Street => &mut self.street,
            AddressPart::Street2 => &mut self.street2,
            AddressPart::City => &mut self.city,
            AddressPart::State => &mut self.state,
            AddressPart::Zip => &mut self.zip,
            AddressPart::Phone => &mut self.phone,
        }
    }

    pub fn missing_required(&self) -> Vec<AddressPart> {
        AddressPart::REQUIRED
            .into_iter()
            .filter(|part| self.get(*part).is_none_or(str::is_empty))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Parcel {
    pub weight: Option<Decimal>,
    pub length: Option<Decimal>,
    pub width: Option<Decimal>,
    pub height: Option<Decimal>,
}

impl Parcel {
    pub fn get(&self, dim: ParcelDim) -> Option<Decimal> {
        match dim {
            ParcelDim::Weight => self.weight,
            ParcelDim::Length => self.length,
            ParcelDim::Width => self.width,
            ParcelDim::Height => self.height,
        }
    }

    fn slot(&mut self, dim: ParcelDim) -> &mut Option<Decimal> {
        match dim {
            ParcelDim::Weight => &mut self.weight,
            ParcelDim::Length => &mut self.length,
            ParcelDim::Width => &mut self.width,
            ParcelDim::Height => &mut self.height,
        }
    }
}

/// Failure recorded in the session when a step is rolled back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedError {
    pub message: String,
    pub step: Step,
    pub reverted_to: Step,
    pub at: DateTime<Utc>,
}

/// Accumulated order data for one conversation.
///
/// Known order fields are typed; anything else (legacy keys, template
/// metadata) lands in `extra`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StepData {
    #[serde(default)]
    pub from: Address,
    #[serde(default)]
    pub to: Address,
    #[serde(default)]
    pub parcel: Parcel,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rates: Vec<Rate>,
    #[serde(default)]
    pub selected_rate: Option<Rate>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub saved_state_before_cancel: Option<Step>,
    #[serde(default)]
    pub return_to_confirm: bool,
    #[serde(default)]
    pub template_name: Option<String>,
    #[serde(default)]
    pub last_error: Option<RecordedError>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl StepData {
    pub fn address(&self, side: Side) -> &Address {
        match side {
            Side::From => &self.from,
            Side::To => &self.to,
        }
    }

    fn address_mut(&mut self, side: Side) -> &mut Address {
        match side {
            Side::From => &mut self.from,
            Side::To => &mut self.to,
        }
    }

    /// Applies every field of the patch in order; later fields win.
    pub fn merge(&mut self, patch: &StepPatch) {
        for field in patch.fields() {
            match field {
                SessionField::Address(side, part, value) => {
                    *self.address_mut(*side).slot(*part) = value.clone();
                }
                SessionField::Parcel(dim, value) => {
                    *self.parcel.slot(*dim) = Some(*value);
                }
                SessionField::Rates(rates) => self.rates = rates.clone(),
                SessionField::SelectedRate(rate) => self.selected_rate = rate.clone(),
                SessionField::OrderId(id) => self.order_id = id.clone(),
                SessionField::SavedStateBeforeCancel(step) => {
                    self.saved_state_before_cancel = *step;
                }
                SessionField::ReturnToConfirm(flag) => self.return_to_confirm = *flag,
                SessionField::TemplateName(name) => self.template_name = name.clone(),
                SessionField::LastError(err) => self.last_error = err.clone(),
                SessionField::Extra(key, value) => {
                    self.extra.insert(key.clone(), value.clone());
                }
            }
        }
    }

    pub fn shipment_shape(&self) -> ShipmentShape {
        ShipmentShape {
            from_zip: self.from.zip.clone(),
            to_zip: self.to.zip.clone(),
            weight: self.parcel.weight,
            length: self.parcel.length,
            width: self.parcel.width,
            height: self.parcel.height,
        }
    }
}

/// A single tagged update to the session payload.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionField {
    Address(Side, AddressPart, Option<String>),
    Parcel(ParcelDim, Decimal),
    Rates(Vec<Rate>),
    SelectedRate(Option<Rate>),
    OrderId(Option<String>),
    SavedStateBeforeCancel(Option<Step>),
    ReturnToConfirm(bool),
    TemplateName(Option<String>),
    LastError(Option<RecordedError>),
    Extra(String, serde_json::Value),
}

/// Ordered partial update passed to `SessionStore::upsert`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepPatch {
    fields: Vec<SessionField>,
}

impl StepPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: SessionField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn push(&mut self, field: SessionField) {
        self.fields.push(field);
    }

    pub fn fields(&self) -> &[SessionField] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<SessionField> for StepPatch {
    fn from(field: SessionField) -> Self {
        StepPatch::new().with(field)
    }
}

impl FromIterator<SessionField> for StepPatch {
    fn from_iter<I: IntoIterator<Item = SessionField>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// One user's in-progress conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub current_step: Step,
    pub step_data: StepData,
    pub last_updated: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: UserId, at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            current_step: Step::Start,
            step_data: StepData::default(),
            last_updated: at,
        }
    }

    /// Applies an upsert: merges the patch, moves to `step`, touches the timestamp.
    pub fn apply(&mut self, step: Step, patch: &StepPatch, at: DateTime<Utc>) {
        self.step_data.merge(patch);
        self.current_step = step;
        self.last_updated = at;
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.last_updated >= ttl
    }
}
