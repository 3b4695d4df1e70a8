//! JSON REST API for Assent.
//!
//! Exposes an axum [`Router`] over any store that is both a
//! [`ConsentRepository`] and an [`EventDirectory`]. Every request opens a
//! fresh [`ConsentSession`](assent_core::session::ConsentSession), hydrates
//! it from the store and closes it before responding, so the API itself holds
//! no consent state between requests.
//!
//! Auth and TLS are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", assent_api::api_router(state))
//! ```

pub mod consents;
pub mod error;
pub mod events;

use std::sync::Arc;

use assent_core::{
  classify::ClassifiedError,
  clock::Clock,
  repository::{ConsentRepository, EventDirectory},
  workflow::FlowConfig,
};
use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Shared handler state.
pub struct AppState<S> {
  pub store: Arc<S>,
  pub clock: Arc<dyn Clock>,
  pub flows: FlowConfig,
}

impl<S> AppState<S> {
  pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, flows: FlowConfig) -> Self {
    Self { store, clock, flows }
  }
}

// Manual impl: `S` itself need not be `Clone`.
impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      clock: Arc::clone(&self.clock),
      flows: self.flows,
    }
  }
}

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: ConsentRepository + EventDirectory + 'static,
  <S as ConsentRepository>::Error: ClassifiedError,
{
  Router::new()
    .route("/events/{event_id}", get(events::get_one::<S>))
    .route(
      "/events/{event_id}/consent",
      get(consents::status::<S>).post(consents::submit::<S>),
    )
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

#[cfg(test)]
mod tests;
