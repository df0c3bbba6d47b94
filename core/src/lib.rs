//! Core components shared by the sapmon storage tooling.
//!
//! This crate provides the foundational types used to talk to a cloud storage
//! account without a vendor SDK: the runtime [`Context`] that carries the HTTP
//! transport and environment access, the [`Error`] taxonomy, and the hashing and
//! time helpers needed to compute Shared Key signatures.
//!
//! ## Overview
//!
//! - **Context**: A container that holds implementations for HTTP sending and environment access
//! - **Traits**: [`HttpSend`] and [`Env`] abstract the outside world so every component can be
//!   exercised against a recording mock in tests
//! - **SigningRequest**: A decomposed request used while building canonical strings
//!
//! ## Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use sapmon_core::{Context, OsEnv, Result};
//!
//! # async fn example() -> Result<()> {
//! let ctx = Context::new().with_env(OsEnv);
//!
//! let req = http::Request::get("https://example.com")
//!     .body(Bytes::new())?;
//! let resp = ctx.http_send(req).await?;
//! println!("status: {}", resp.status());
//! # Ok(())
//! # }
//! ```
//!
//! ## Utilities
//!
//! - [`hash`]: Cryptographic hashing utilities
//! - [`time`]: Time formatting utilities
//! - [`utils`]: General utilities including data redaction

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

pub mod hash;
pub mod time;
pub mod utils;

mod context;
pub use context::{Context, Env, HttpSend, NoopEnv, NoopHttpSend, OsEnv, StaticEnv};

mod error;
pub use error::{Error, ErrorKind, Result};

mod request;
pub use request::SigningRequest;
