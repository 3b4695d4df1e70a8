//! Core types and the consent/registration engine for school health events.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! remote consent service and the event directory are reached only through
//! the traits in [`repository`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod classify;
pub mod clock;
pub mod consent;
pub mod error;
pub mod event;
pub mod ids;
pub mod presentation;
pub mod registry;
pub mod repository;
pub mod session;
pub mod window;
pub mod workflow;

pub use error::{Error, Result, SubmitError};
