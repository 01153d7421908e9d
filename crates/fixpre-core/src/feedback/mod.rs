//! Presentation upload and feedback job polling.
//!
//! A single `FeedbackClient` serves every deployment: the target host comes
//! from configuration and the size check from an explicit `UploadPolicy`.

pub mod client;
pub mod upload;

pub use client::{FeedbackClient, FeedbackState, Job, PollTiming};
pub use upload::{UploadFile, UploadPolicy, PRESENTATION_FIELD};
