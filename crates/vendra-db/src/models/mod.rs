//! Database models for the vendra CRM core.

pub mod client;
pub mod sim_card;
pub mod task;

pub use client::Client;
pub use sim_card::{SimCard, SimStatus};
pub use task::Task;
