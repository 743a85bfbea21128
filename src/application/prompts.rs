//! User-facing texts and keyboards of the order conversation.

use crate::domain::message::{Action, Button, Reply};
use crate::domain::order::PaymentMethod;
use crate::domain::rate::Rate;
use crate::domain::session::{Address, StepData};
use crate::domain::step::Step;
use crate::error::ShipError;
use rust_decimal::Decimal;

fn cancel_button() -> Button {
    Button::new("❌ Cancel", &Action::CancelOrder)
}

fn field_question(step: Step) -> Option<&'static str> {
    let text = match step {
        Step::FromName => "Step 1/13: 📤 Sender's full name\n\nExample: John Smith",
        Step::FromAddress => "Step 2/13: Sender's street address\n\nExample: 123 Main St",
        Step::FromAddress2 => "Step 3/13: Apartment, suite or unit (optional)",
        Step::FromCity => "Step 4/13: Sender's city\n\nExample: San Francisco",
        Step::FromState => "Step 5/13: Sender's state, 2-letter code\n\nExample: CA",
        Step::FromZip => "Step 6/13: Sender's ZIP code\n\nExample: 94102",
        Step::FromPhone => "Step 7/13: Sender's phone number (optional)\n\nExample: +14155551234",
        Step::ToName => "Step 8/13: 📥 Recipient's full name\n\nExample: Jane Doe",
        Step::ToAddress => "Step 9/13: Recipient's street address\n\nExample: 456 Oak Ave",
        Step::ToAddress2 => "Step 10/13: Apartment, suite or unit (optional)",
        Step::ToCity => "Step 11/13: Recipient's city\n\nExample: Los Angeles",
        Step::ToState => "Step 12/13: Recipient's state, 2-letter code\n\nExample: CA",
        Step::ToZip => "Step 13/13: Recipient's ZIP code\n\nExample: 90001",
        Step::ToPhone => "Recipient's phone number (optional)\n\nExample: +13105551234",
        Step::ParcelWeight => "📦 Parcel weight in pounds\n\nExample: 5 or 2.5",
        Step::ParcelLength => "Parcel length in inches\n\nExample: 12",
        Step::ParcelWidth => "Parcel width in inches\n\nExample: 10",
        Step::ParcelHeight => "Parcel height in inches\n\nExample: 8",
        _ => return None,
    };
    Some(text)
}

fn skip_buttons(step: Step) -> Vec<Button> {
    match step {
        Step::FromAddress2 => vec![Button::new("⏭ Skip", &Action::SkipFromAddress2)],
        Step::ToAddress2 => vec![Button::new("⏭ Skip", &Action::SkipToAddress2)],
        Step::FromPhone => vec![Button::new("⏭ Skip", &Action::SkipFromPhone)],
        Step::ToPhone => vec![Button::new("⏭ Skip", &Action::SkipToPhone)],
        Step::ParcelLength => vec![Button::new(
            "📐 Use standard size (10x10x10)",
            &Action::SkipDimensions,
        )],
        Step::ParcelWidth => vec![Button::new(
            "📐 Use standard width and height",
            &Action::SkipWidthHeight,
        )],
        Step::ParcelHeight => vec![Button::new("📐 Use standard height", &Action::SkipHeight)],
        _ => Vec::new(),
    }
}

/// The prompt shown when the conversation sits in `step`.
pub fn prompt(step: Step, data: &StepData) -> Reply {
    if let Some(question) = field_question(step) {
        let mut keyboard = skip_buttons(step);
        if data.return_to_confirm {
            keyboard.push(Button::new("↩️ Back to summary", &Action::BackToConfirm));
        }
        keyboard.push(cancel_button());
        return Reply::at(step, question).with_keyboard(keyboard);
    }

    match step {
        Step::ConfirmData => confirmation(data),
        Step::EditMenu => edit_menu(),
        Step::TemplateName => Reply::at(
            Step::TemplateName,
            "💾 Enter a name for this template\n\nExample: Home to office",
        )
        .with_keyboard(vec![Button::new("↩️ Back to summary", &Action::BackToConfirm)]),
        Step::SelectCarrier => rate_list(&data.rates),
        Step::PaymentMethod => payment(data.selected_rate.as_ref()),
        Step::Start => welcome(),
        Step::End => no_active_order(),
        _ => generic_prompt(step),
    }
}

fn generic_prompt(step: Step) -> Reply {
    Reply::at(step, "Please continue with your order.").with_keyboard(vec![cancel_button()])
}

pub fn welcome() -> Reply {
    Reply::at(
        Step::Start,
        "👋 Let's create a shipping label.\n\nPress the button to start a new order.",
    )
    .with_keyboard(vec![Button::new("📦 New order", &Action::NewOrder)])
}

pub fn with_notice(notice: &str, mut reply: Reply) -> Reply {
    reply.text = format!("{notice}\n\n{}", reply.text);
    reply
}

pub fn invalid_input(hint: &str, step: Step, data: &StepData) -> Reply {
    with_notice(&format!("❌ {hint}"), prompt(step, data))
}

pub fn no_active_order() -> Reply {
    Reply::ended("You have no active order. Press the button to start one.")
        .with_keyboard(vec![Button::new("📦 New order", &Action::NewOrder)])
}

pub fn session_expired() -> Reply {
    Reply::ended("⌛ Your order session has expired. Please start a new order.")
        .with_keyboard(vec![Button::new("📦 New order", &Action::NewOrder)])
}

pub fn stale_button(state: Step, data: &StepData) -> Reply {
    with_notice("⚠️ This button is no longer active.", prompt(state, data))
}

pub fn use_buttons(state: Step, data: &StepData) -> Reply {
    with_notice("Please use the buttons below.", prompt(state, data))
}

pub fn storage_unavailable(state: Option<Step>) -> Reply {
    Reply::new(
        "⚠️ The service is temporarily unavailable. Please try again shortly.",
        state,
    )
}

/// Generic apology sent by the fault boundary.
pub fn apology(fallback: Step) -> Reply {
    if fallback == Step::End {
        return Reply::ended(
            "😔 Something went wrong and the order was interrupted. Please start a new order.",
        )
        .with_keyboard(vec![Button::new("📦 New order", &Action::NewOrder)]);
    }
    Reply::at(
        fallback,
        "😔 Something went wrong. Please check your order details and try again.",
    )
    .with_keyboard(vec![
        Button::new("✅ Continue", &Action::ConfirmData),
        Button::new("✏️ Edit", &Action::EditData),
        cancel_button(),
    ])
}

fn format_address(address: &Address) -> String {
    let mut lines = Vec::new();
    if let Some(name) = &address.name {
        lines.push(name.clone());
    }
    if let Some(street) = &address.street {
        lines.push(street.clone());
    }
    if let Some(street2) = &address.street2 {
        lines.push(street2.clone());
    }
    lines.push(format!(
        "{}, {} {}",
        address.city.as_deref().unwrap_or("?"),
        address.state.as_deref().unwrap_or("?"),
        address.zip.as_deref().unwrap_or("?")
    ));
    if let Some(phone) = &address.phone {
        lines.push(format!("Phone: {phone}"));
    }
    lines.join("\n")
}

/// Order summary with the actions available from `ConfirmData`.
pub fn confirmation(data: &StepData) -> Reply {
    let dim = |value: Option<Decimal>| {
        value.map(|v| v.to_string()).unwrap_or_else(|| "?".into())
    };
    let mut text = format!(
        "📋 Please check your order:\n\n📤 From:\n{}\n\n📥 To:\n{}\n\n📦 Parcel: {} lb, {} x {} x {} in",
        format_address(&data.from),
        format_address(&data.to),
        dim(data.parcel.weight),
        dim(data.parcel.length),
        dim(data.parcel.width),
        dim(data.parcel.height),
    );
    if let Some(name) = &data.template_name {
        text.push_str(&format!("\n\n💾 Template: {name}"));
    }

    Reply::at(Step::ConfirmData, text).with_keyboard(vec![
        Button::new("✅ Get rates", &Action::ConfirmData),
        Button::new("✏️ Edit", &Action::EditData),
        Button::new("💾 Save as template", &Action::SaveTemplate),
        cancel_button(),
    ])
}

fn edit_label(step: Step) -> &'static str {
    match step {
        Step::FromName => "Sender name",
        Step::FromAddress => "Sender address",
        Step::FromAddress2 => "Sender address line 2",
        Step::FromCity => "Sender city",
        Step::FromState => "Sender state",
        Step::FromZip => "Sender ZIP",
        Step::FromPhone => "Sender phone",
        Step::ToName => "Recipient name",
        Step::ToAddress => "Recipient address",
        Step::ToAddress2 => "Recipient address line 2",
        Step::ToCity => "Recipient city",
        Step::ToState => "Recipient state",
        Step::ToZip => "Recipient ZIP",
        Step::ToPhone => "Recipient phone",
        Step::ParcelWeight => "Weight",
        Step::ParcelLength => "Length",
        Step::ParcelWidth => "Width",
        Step::ParcelHeight => "Height",
        _ => "",
    }
}

pub fn edit_menu() -> Reply {
    let mut keyboard: Vec<Button> = crate::application::steps::FIELD_STEPS
        .iter()
        .map(|field| Button::new(edit_label(field.step), &Action::EditField(field.step)))
        .collect();
    keyboard.push(Button::new("↩️ Back to summary", &Action::BackToConfirm));
    Reply::at(Step::EditMenu, "✏️ What would you like to change?").with_keyboard(keyboard)
}

fn rate_label(rate: &Rate) -> String {
    let days = rate
        .estimated_days
        .map(|d| format!(" ({d} days)"))
        .unwrap_or_default();
    format!(
        "{} {} - ${}{}",
        rate.carrier_name,
        rate.service_type,
        rate.amount.round_dp(2),
        days
    )
}

pub fn rate_list(rates: &[Rate]) -> Reply {
    let mut text = String::from("🚚 Choose a shipping option:\n");
    for (i, rate) in rates.iter().enumerate() {
        text.push_str(&format!("\n{}. {}", i + 1, rate_label(rate)));
    }
    let mut keyboard: Vec<Button> = rates
        .iter()
        .map(|rate| Button::new(rate_label(rate), &Action::SelectRate(rate.rate_id.clone())))
        .collect();
    keyboard.push(Button::new("🔄 Refresh rates", &Action::RefreshRates));
    keyboard.push(Button::new("📋 Check data", &Action::CheckData));
    keyboard.push(cancel_button());
    Reply::at(Step::SelectCarrier, text).with_keyboard(keyboard)
}

pub fn payment(rate: Option<&Rate>) -> Reply {
    let text = match rate {
        Some(rate) => format!("💳 Selected: {}\n\nChoose a payment method:", rate_label(rate)),
        None => "💳 Choose a payment method:".to_string(),
    };
    Reply::at(Step::PaymentMethod, text).with_keyboard(vec![
        Button::new("💰 Pay from balance", &Action::Pay(PaymentMethod::Balance)),
        Button::new("🪙 Pay with crypto", &Action::Pay(PaymentMethod::Crypto)),
        Button::new("📋 Check data", &Action::CheckData),
        cancel_button(),
    ])
}

pub fn order_placed(method: PaymentMethod) -> Reply {
    let how = match method {
        PaymentMethod::Balance => "from your balance",
        PaymentMethod::Crypto => "with crypto",
    };
    Reply::ended(format!(
        "✅ Order placed. You chose to pay {how}; payment instructions will follow."
    ))
    .with_keyboard(vec![Button::new("📦 New order", &Action::NewOrder)])
}

pub fn confirm_cancel(state: Option<Step>) -> Reply {
    Reply::new("❓ Do you really want to cancel this order?", state).with_keyboard(vec![
        Button::new("✅ Yes, cancel", &Action::ConfirmCancel),
        Button::new("↩️ Return to order", &Action::ReturnToOrder),
    ])
}

pub fn order_cancelled() -> Reply {
    Reply::ended("🗑 Order cancelled.")
        .with_keyboard(vec![Button::new("📦 New order", &Action::NewOrder)])
}

pub fn template_not_found(state: Option<Step>) -> Reply {
    Reply::new("⚠️ This template no longer exists.", state)
        .with_keyboard(vec![Button::new("📦 New order", &Action::NewOrder)])
}

/// Message for a failed rate lookup, with keyboards matching the failure.
pub fn rate_failure(error: &ShipError, data: &StepData) -> Reply {
    let summary = confirmation(data);
    let (text, keyboard) = match error {
        ShipError::RateSourceTimeout(_) => (
            "⏱ The carrier service did not answer in time. Please try again or check the addresses.",
            vec![
                Button::new("🔄 Try again", &Action::RefreshRates),
                Button::new("✏️ Edit addresses", &Action::EditData),
                cancel_button(),
            ],
        ),
        ShipError::NoRatesAvailable => (
            "😕 No shipping options were found for these addresses. Please check them.",
            vec![Button::new("✏️ Edit addresses", &Action::EditData), cancel_button()],
        ),
        ShipError::IncompleteShipmentData(_) => (
            "⚠️ Some required order data is missing. Please fill in every field.",
            vec![Button::new("✏️ Edit", &Action::EditData), cancel_button()],
        ),
        _ => (
            "❌ The carrier service returned an error. Please check the addresses.",
            vec![Button::new("✏️ Edit addresses", &Action::EditData), cancel_button()],
        ),
    };
    Reply::at(Step::ConfirmData, format!("{text}\n\n{}", summary.text)).with_keyboard(keyboard)
}
