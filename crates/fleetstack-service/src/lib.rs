//! FleetStack service binding
//!
//! Binds apps to service instances: the service's HTTP endpoint is asked
//! for credentials, which are injected into the app environment as private
//! variables owned by the instance. A bind whose persistence fails is
//! compensated so that neither the instance nor the app is left half-bound.

pub mod binding;
pub mod client;
pub mod error;

pub use binding::Binder;
pub use client::ServiceClient;
pub use error::{BindError, Result};
