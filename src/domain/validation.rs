//! Field-level input rules for the order conversation.
//!
//! Every validator trims its input and either returns the normalised value
//! or a `ShipError::Validation` carrying the hint shown to the user.

use crate::error::{Result, ShipError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;

pub const MAX_WEIGHT_LBS: Decimal = dec!(150);
pub const MAX_DIMENSION_IN: Decimal = dec!(108);

fn invalid<T>(hint: &str) -> Result<T> {
    Err(ShipError::Validation(hint.to_string()))
}

pub fn validate_name(input: &str) -> Result<String> {
    let name = input.trim();
    match name.chars().count() {
        0 => invalid("Name cannot be empty."),
        1 => invalid("Name must be at least 2 characters long."),
        n if n > 50 => invalid("Name is too long (50 characters max)."),
        _ => Ok(name.to_string()),
    }
}

pub fn validate_street(input: &str) -> Result<String> {
    let street = input.trim();
    match street.chars().count() {
        0 => invalid("Address cannot be empty."),
        n if n < 5 => invalid("Address must be at least 5 characters long.\n\nExample: 123 Main St"),
        n if n > 100 => invalid("Address is too long (100 characters max)."),
        _ => Ok(street.to_string()),
    }
}

pub fn validate_street2(input: &str) -> Result<String> {
    let street2 = input.trim();
    if street2.chars().count() > 100 {
        return invalid("Address line 2 is too long (100 characters max).");
    }
    Ok(street2.to_string())
}

pub fn validate_city(input: &str) -> Result<String> {
    let city = input.trim();
    match city.chars().count() {
        0 => return invalid("City cannot be empty."),
        1 => return invalid("City must be at least 2 characters long."),
        n if n > 50 => return invalid("City is too long (50 characters max)."),
        _ => {}
    }
    if !city
        .chars()
        .all(|c| c.is_alphabetic() || c.is_whitespace() || c == '.' || c == '-')
    {
        return invalid("City may only contain letters, spaces, dots and hyphens.");
    }
    Ok(city.to_string())
}

pub fn validate_state(input: &str) -> Result<String> {
    let state = input.trim().to_ascii_uppercase();
    if state.chars().count() != 2 {
        return invalid("State must be a 2-letter code.\n\nExample: CA, NY, TX, FL");
    }
    if !state.chars().all(|c| c.is_ascii_alphabetic()) {
        return invalid("State code may only contain letters.\n\nExample: CA, NY, TX, FL");
    }
    Ok(state)
}

pub fn validate_zip(input: &str) -> Result<String> {
    let zip = input.trim();
    if !zip.chars().all(|c| c.is_ascii_digit()) || zip.is_empty() {
        return invalid("ZIP code may only contain digits.\n\nExample: 94102, 10001, 90210");
    }
    if zip.len() != 5 {
        return invalid("ZIP code must be exactly 5 digits.\n\nExample: 94102, 10001, 90210");
    }
    Ok(zip.to_string())
}

pub fn validate_phone(input: &str) -> Result<String> {
    let phone = input.trim();
    if phone.is_empty() {
        return invalid("Phone number cannot be empty. Use the skip button instead.");
    }
    let digits: String = phone
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '+'))
        .collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return invalid("Phone number may only contain digits.\n\nExample: +14155551234");
    }
    match digits.len() {
        n if n < 10 => invalid("Phone number is too short.\n\nExample: +14155551234 or 4155551234"),
        n if n > 15 => invalid("Phone number is too long."),
        _ => Ok(phone.to_string()),
    }
}

fn parse_measure(input: &str, label: &str, example: &str) -> Result<Decimal> {
    let raw = input.trim().replace(',', ".");
    if raw.is_empty() {
        return invalid(&format!("{label} cannot be empty."));
    }
    Decimal::from_str(&raw)
        .map_err(|_| ShipError::Validation(format!("{label} must be a number.\n\nExample: {example}")))
}

pub fn validate_weight(input: &str) -> Result<Decimal> {
    let weight = parse_measure(input, "Weight", "1, 2.5, 10")?;
    if weight <= Decimal::ZERO {
        return invalid("Weight must be greater than 0.");
    }
    if weight > MAX_WEIGHT_LBS {
        return invalid("Weight cannot exceed 150 lbs.\n\nContact us for heavier shipments.");
    }
    Ok(weight)
}

pub fn validate_dimension(input: &str, label: &str) -> Result<Decimal> {
    let dimension = parse_measure(input, label, "10, 12.5, 20")?;
    if dimension <= Decimal::ZERO {
        return invalid(&format!("{label} must be greater than 0."));
    }
    if dimension > MAX_DIMENSION_IN {
        return invalid(&format!(
            "{label} cannot exceed 108 inches.\n\nContact us for oversized shipments."
        ));
    }
    Ok(dimension)
}

pub fn validate_template_name(input: &str) -> Result<String> {
    let name = input.trim();
    match name.chars().count() {
        0 => invalid("Template name cannot be empty."),
        n if n > 50 => invalid("Template name is too long (50 characters max)."),
        _ => Ok(name.to_string()),
    }
}
