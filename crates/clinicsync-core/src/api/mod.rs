//! REST access to the clinic backend.
//!
//! This module provides the `Dispatcher`, which turns one logical request
//! into a bounded exploration of credential schemes and trailing-slash
//! forms, and `ClinicApi`, the typed endpoints built on top of it.
//!
//! The backend's preferred `Authorization` scheme, its trailing-slash
//! routing and its response envelope key are all treated as unknown.

pub mod client;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod request;
pub mod transport;

pub use client::ClinicApi;
pub use dispatcher::{Delivered, Dispatcher};
pub use error::{DispatchError, StatusClass, TransportError};
pub use request::{AttemptPolicy, RequestDescriptor};
pub use transport::{HttpTransport, Method, Transport};
