//! Conversation orchestration: routing, step handlers and the services
//! they lean on.

pub mod checkout;
pub mod flow;
pub mod guard;
pub mod prompts;
pub mod rates;
pub mod recovery;
pub mod steps;
pub mod sweeper;
