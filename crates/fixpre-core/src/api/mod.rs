//! REST API client module for the fixpre feedback service.
//!
//! This module provides the `ApiClient` for communicating with the account
//! API and the feedback host that accepts uploads and serves job results.
//!
//! Authenticated requests carry a JWT bearer token read from the shared
//! `Session`.

pub mod client;
pub mod error;

pub use client::{ApiClient, Host, JsonBody, RawResponse};
pub use error::{detail_from_body, ApiError, ErrorKind, Failure};
