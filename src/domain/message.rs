use super::order::PaymentMethod;
use super::step::Step;
use super::{ChatId, UserId};
use std::fmt;
use std::str::FromStr;

/// What the transport adapter hands to the engine for each user message.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub input: Input,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Text(String),
    Callback(String),
}

impl Inbound {
    pub fn text(user_id: UserId, chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            user_id,
            chat_id,
            input: Input::Text(text.into()),
        }
    }

    pub fn callback(user_id: UserId, chat_id: ChatId, data: impl Into<String>) -> Self {
        Self {
            user_id,
            chat_id,
            input: Input::Callback(data.into()),
        }
    }
}

/// Button press decoded from callback data.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    NewOrder,
    UseTemplate(String),
    SkipFromAddress2,
    SkipToAddress2,
    SkipFromPhone,
    SkipToPhone,
    SkipDimensions,
    SkipWidthHeight,
    SkipHeight,
    ConfirmData,
    EditData,
    EditField(Step),
    BackToConfirm,
    SaveTemplate,
    SelectRate(String),
    RefreshRates,
    CheckData,
    Pay(PaymentMethod),
    CancelOrder,
    ReturnToOrder,
    ConfirmCancel,
}

impl Action {
    /// Stable handler name; the input guard keys on it.
    pub fn handler_name(&self) -> &'static str {
        match self {
            Action::NewOrder => "new_order",
            Action::UseTemplate(_) => "use_template",
            Action::SkipFromAddress2 => "skip_from_address2",
            Action::SkipToAddress2 => "skip_to_address2",
            Action::SkipFromPhone => "skip_from_phone",
            Action::SkipToPhone => "skip_to_phone",
            Action::SkipDimensions => "skip_dimensions",
            Action::SkipWidthHeight => "skip_width_height",
            Action::SkipHeight => "skip_height",
            Action::ConfirmData => "confirm_data",
            Action::EditData => "edit_data",
            Action::EditField(_) => "edit_field",
            Action::BackToConfirm => "back_to_confirm",
            Action::SaveTemplate => "save_template",
            Action::SelectRate(_) => "select_rate",
            Action::RefreshRates => "refresh_rates",
            Action::CheckData => "check_data",
            Action::Pay(_) => "pay",
            Action::CancelOrder => "cancel_order",
            Action::ReturnToOrder => "return_to_order",
            Action::ConfirmCancel => "confirm_cancel",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::UseTemplate(id) => write!(f, "template:{id}"),
            Action::EditField(step) => write!(f, "edit:{step}"),
            Action::SelectRate(id) => write!(f, "select_rate:{id}"),
            Action::Pay(method) => write!(f, "pay:{method}"),
            other => f.write_str(other.handler_name()),
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((prefix, arg)) = s.split_once(':') {
            return match prefix {
                "template" => Ok(Action::UseTemplate(arg.to_string())),
                "edit" => arg.parse().map(Action::EditField),
                "select_rate" => Ok(Action::SelectRate(arg.to_string())),
                "pay" => arg.parse().map(Action::Pay),
                _ => Err(format!("unknown action: {s}")),
            };
        }
        let action = match s {
            "new_order" | "start" => Action::NewOrder,
            "skip_from_address2" => Action::SkipFromAddress2,
            "skip_to_address2" => Action::SkipToAddress2,
            "skip_from_phone" => Action::SkipFromPhone,
            "skip_to_phone" => Action::SkipToPhone,
            "skip_dimensions" => Action::SkipDimensions,
            "skip_width_height" => Action::SkipWidthHeight,
            "skip_height" => Action::SkipHeight,
            "confirm_data" => Action::ConfirmData,
            "edit_data" | "edit_addresses" => Action::EditData,
            "back_to_confirm" => Action::BackToConfirm,
            "save_template" => Action::SaveTemplate,
            "refresh_rates" => Action::RefreshRates,
            "check_data" => Action::CheckData,
            "cancel_order" => Action::CancelOrder,
            "return_to_order" => Action::ReturnToOrder,
            "confirm_cancel" => Action::ConfirmCancel,
            other => return Err(format!("unknown action: {other}")),
        };
        Ok(action)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Button {
    pub label: String,
    pub action: String,
}

impl Button {
    pub fn new(label: impl Into<String>, action: &Action) -> Self {
        Self {
            label: label.into(),
            action: action.to_string(),
        }
    }
}

/// What the engine hands back to the transport adapter.
///
/// `next_state == None` means the conversation is over and the transport
/// should stop routing this user's messages to the order flow.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Vec<Button>,
    pub next_state: Option<Step>,
    /// Set when the input guard discarded the message.
    pub suppressed: bool,
}

impl Reply {
    pub fn new(text: impl Into<String>, next_state: Option<Step>) -> Self {
        Self {
            text: text.into(),
            keyboard: Vec::new(),
            next_state,
            suppressed: false,
        }
    }

    pub fn at(step: Step, text: impl Into<String>) -> Self {
        Self::new(text, Some(step))
    }

    pub fn ended(text: impl Into<String>) -> Self {
        Self::new(text, None)
    }

    pub fn with_keyboard(mut self, keyboard: Vec<Button>) -> Self {
        self.keyboard = keyboard;
        self
    }

    pub fn suppressed(next_state: Option<Step>, notice: Option<String>) -> Self {
        Self {
            text: notice.unwrap_or_default(),
            keyboard: Vec::new(),
            next_state,
            suppressed: true,
        }
    }

    pub fn has_action(&self, action: &Action) -> bool {
        let wanted = action.to_string();
        self.keyboard.iter().any(|b| b.action == wanted)
    }
}
