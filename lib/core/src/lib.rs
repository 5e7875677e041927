//! Core domain types and utilities for stan-easy-connect.
//!
//! This crate provides the foundational pieces shared by the OIDC client,
//! the platform-access layer and the HTTP server:
//! - the `Result` alias used for infrastructure failures
//! - strongly-typed identifiers for local users and session tokens
//! - the `Clock` seam used for every time-dependent decision
//! - the `ActivityLog` seam used for the audit trail

pub mod activity;
pub mod clock;
pub mod error;
pub mod id;

pub use activity::{ActivityEntry, ActivityLog, MemoryActivityLog, TracingActivityLog};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::Result;
pub use id::{ParseIdError, SessionToken, UserId};
