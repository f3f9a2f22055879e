//! Aircraft state-vector source backed by the OpenSky Network REST API.
//!
//! [`OpenSkySource`] implements [`skytrack_core::DataSource`]. Each fetch is
//! one request: `GET /states/all` restricted to the configured bounding box,
//! or `GET /flights/all` over the run's window when configured for flights.
//! Upstream failures map onto [`skytrack_core::FetchError`].

pub mod auth;
pub mod client;
pub mod decode;

pub use auth::{Credentials, TokenCache};
pub use client::OpenSkySource;
pub use decode::{decode_flights, decode_states, StatesResponse};
