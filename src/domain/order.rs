use super::rate::Rate;
use super::session::Address;
use super::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Cancelled,
    Paid,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Balance,
    Crypto,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Balance => "balance",
            PaymentMethod::Crypto => "crypto",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "balance" => Ok(PaymentMethod::Balance),
            "crypto" => Ok(PaymentMethod::Crypto),
            other => Err(format!("unknown payment method: {other}")),
        }
    }
}

/// Draft order created once the user has picked a rate.
///
/// The core never prices or charges anything; it only moves status flags.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Order {
    pub order_id: String,
    pub user_id: UserId,
    pub from: Address,
    pub to: Address,
    pub rate: Rate,
    pub status: OrderStatus,
    pub payment_method: Option<PaymentMethod>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub from: Address,
    pub to: Address,
    pub rate: Rate,
}

/// Saved pair of addresses a user can start a new order from.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Template {
    pub template_id: String,
    pub user_id: UserId,
    pub name: String,
    pub from: Address,
    pub to: Address,
    pub created_at: DateTime<Utc>,
}
