//! Domain types and the ports the conversation core depends on.

pub mod message;
pub mod order;
pub mod ports;
pub mod rate;
pub mod session;
pub mod step;
pub mod validation;

pub type UserId = i64;
pub type ChatId = i64;
