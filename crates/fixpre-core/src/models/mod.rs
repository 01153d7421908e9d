//! Data models for fixpre entities.
//!
//! - `FeedbackReport`: the server's feedback payload, kept verbatim
//! - `JobId`, `JobStatus`: the asynchronous feedback job
//! - `DashboardStats`: the signed-in user's score summary

pub mod feedback;
pub mod stats;

pub use feedback::{FeedbackReport, JobId, JobStatus};
pub use stats::DashboardStats;
