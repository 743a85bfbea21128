use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One node of the order conversation graph.
///
/// The linear happy path follows declaration order from `Start` to
/// `ParcelHeight`; from `ConfirmData` the user branches into editing,
/// template saving or carrier selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Step {
    Start,
    FromName,
    FromAddress,
    FromAddress2,
    FromCity,
    FromState,
    FromZip,
    FromPhone,
    ToName,
    ToAddress,
    ToAddress2,
    ToCity,
    ToState,
    ToZip,
    ToPhone,
    ParcelWeight,
    ParcelLength,
    ParcelWidth,
    ParcelHeight,
    ConfirmData,
    EditMenu,
    TemplateName,
    SelectCarrier,
    PaymentMethod,
    End,
}

/// Coarse grouping used for recovery and fallback decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Entry,
    Sender,
    Recipient,
    Parcel,
    Review,
    Checkout,
    Finished,
}

impl Step {
    pub const ALL: [Step; 25] = [
        Step::Start,
        Step::FromName,
        Step::FromAddress,
        Step::FromAddress2,
        Step::FromCity,
        Step::FromState,
        Step::FromZip,
        Step::FromPhone,
        Step::ToName,
        Step::ToAddress,
        Step::ToAddress2,
        Step::ToCity,
        Step::ToState,
        Step::ToZip,
        Step::ToPhone,
        Step::ParcelWeight,
        Step::ParcelLength,
        Step::ParcelWidth,
        Step::ParcelHeight,
        Step::ConfirmData,
        Step::EditMenu,
        Step::TemplateName,
        Step::SelectCarrier,
        Step::PaymentMethod,
        Step::End,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Step::Start => "START",
            Step::FromName => "FROM_NAME",
            Step::FromAddress => "FROM_ADDRESS",
            Step::FromAddress2 => "FROM_ADDRESS2",
            Step::FromCity => "FROM_CITY",
            Step::FromState => "FROM_STATE",
            Step::FromZip => "FROM_ZIP",
            Step::FromPhone => "FROM_PHONE",
            Step::ToName => "TO_NAME",
            Step::ToAddress => "TO_ADDRESS",
            Step::ToAddress2 => "TO_ADDRESS2",
            Step::ToCity => "TO_CITY",
            Step::ToState => "TO_STATE",
            Step::ToZip => "TO_ZIP",
            Step::ToPhone => "TO_PHONE",
            Step::ParcelWeight => "PARCEL_WEIGHT",
            Step::ParcelLength => "PARCEL_LENGTH",
            Step::ParcelWidth => "PARCEL_WIDTH",
            Step::ParcelHeight => "PARCEL_HEIGHT",
            Step::ConfirmData => "CONFIRM_DATA",
            Step::EditMenu => "EDIT_MENU",
            Step::TemplateName => "TEMPLATE_NAME",
            Step::SelectCarrier => "SELECT_CARRIER",
            Step::PaymentMethod => "PAYMENT_METHOD",
            Step::End => "END",
        }
    }

    pub fn section(self) -> Section {
        match self {
            Step::Start => Section::Entry,
            Step::FromName
            | Step::FromAddress
            | Step::FromAddress2
            | Step::FromCity
            | Step::FromState
            | Step::FromZip
            | Step::FromPhone => Section::Sender,
            Step::ToName
            | Step::ToAddress
            | Step::ToAddress2
            | Step::ToCity
            | Step::ToState
            | Step::ToZip
            | Step::ToPhone => Section::Recipient,
            Step::ParcelWeight | Step::ParcelLength | Step::ParcelWidth | Step::ParcelHeight => {
                Section::Parcel
            }
            Step::ConfirmData | Step::EditMenu | Step::TemplateName => Section::Review,
            Step::SelectCarrier | Step::PaymentMethod => Section::Checkout,
            Step::End => Section::Finished,
        }
    }

    /// Whether a conversation may legitimately be parked in this step.
    pub fn is_resumable(self) -> bool {
        !matches!(self, Step::Start | Step::End)
    }

    /// The step to resume when an external failure forces a rollback.
    ///
    /// This is not the inverse of forward navigation: optional steps are
    /// included so the user can re-enter them, and everything past the
    /// review screen rolls back towards `ConfirmData`.
    pub fn predecessor(self) -> Step {
        match self {
            Step::Start | Step::FromName => Step::Start,
            Step::FromAddress => Step::FromName,
            Step::FromAddress2 => Step::FromAddress,
            Step::FromCity => Step::FromAddress2,
            Step::FromState => Step::FromCity,
            Step::FromZip => Step::FromState,
            Step::FromPhone => Step::FromZip,
            Step::ToName => Step::FromPhone,
            Step::ToAddress => Step::ToName,
            Step::ToAddress2 => Step::ToAddress,
            Step::ToCity => Step::ToAddress2,
            Step::ToState => Step::ToCity,
            Step::ToZip => Step::ToState,
            Step::ToPhone => Step::ToZip,
            Step::ParcelWeight => Step::ToPhone,
            Step::ParcelLength => Step::ParcelWeight,
            Step::ParcelWidth => Step::ParcelLength,
            Step::ParcelHeight => Step::ParcelWidth,
            Step::ConfirmData => Step::ParcelHeight,
            Step::EditMenu | Step::TemplateName | Step::SelectCarrier => Step::ConfirmData,
            Step::PaymentMethod => Step::SelectCarrier,
            Step::End => Step::PaymentMethod,
        }
    }

    /// Safe landing state used by the fault boundary.
    pub fn fallback(self) -> Step {
        match self.section() {
            Section::Review | Section::Checkout => Step::ConfirmData,
            _ => Step::End,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Step::ALL
            .into_iter()
            .find(|step| step.name() == wanted)
            .ok_or_else(|| format!("unknown step: {s}"))
    }
}
