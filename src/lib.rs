//! Customer records, logged activities and follow-up scheduling for a small
//! sales and service team.
//!
//! The follow-up view in [`followups`] is the one piece of real business
//! logic: it picks each customer's nearest pending follow-up and buckets it
//! as overdue, due today or upcoming. The dashboard, the follow-ups list and
//! the customer detail page all go through it.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod followups;
pub mod memo;
pub mod models;
pub mod report;
pub mod validation;

pub use error::{CrmError, CrmResult};
