//! Samiti, a residential society management backend.
//!
//! Societies are submitted for review, approved with a durable numeric id,
//! and populated with members whose numbers come from per-society counters.
//! Users authenticate with one-time passwords; verified mobile ownership is
//! carried between flows as a signed registration assertion.

pub mod api;
pub mod cli;
pub mod otp;
pub mod registry;
pub mod sequence;
pub mod token;
