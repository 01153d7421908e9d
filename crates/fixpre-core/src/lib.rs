//! Core library for the fixpre presentation feedback client.
//!
//! - `api`: HTTP client and typed errors for the fixpre REST service
//! - `auth`: token storage, the explicit `Session` context and the `AuthManager`
//! - `guard`: route requirements and the navigation guard
//! - `feedback`: upload a presentation and poll for its feedback job
//! - `readers`: dashboard statistics and feedback history
//! - `config`: file and environment configuration
//!
//! Components publish their observable state through `tokio::sync::watch`
//! channels so a front end can render loading flags and errors as they change.

pub mod api;
pub mod auth;
pub mod config;
pub mod feedback;
pub mod guard;
pub mod models;
pub mod readers;

pub use api::{ApiClient, ApiError, ErrorKind, Failure};
pub use auth::{AuthManager, AuthState, Session};
pub use config::Config;
pub use feedback::{FeedbackClient, FeedbackState, PollTiming, UploadPolicy};
pub use guard::{GuardDecision, Page, RouteRequirement};
pub use readers::{HistoryReader, Reader, ReaderState, StatsReader};
