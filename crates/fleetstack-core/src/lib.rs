//! FleetStack core
//!
//! Data model shared by every FleetStack crate (apps, units, teams,
//! services and service instances) plus the persistence contract the
//! control plane talks to.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   fleetstackd                    │
//! └───────┬──────────────────────┬──────────────────┘
//!         │                      │
//! ┌───────▼────────┐    ┌────────▼────────┐
//! │ fleetstack-app │    │ fleetstack-     │
//! │ (pipeline)     │    │ service (bind)  │
//! └───┬────────┬───┘    └────────┬────────┘
//!     │        │                 │
//! ┌───▼──┐ ┌───▼─────────┐       │
//! │action│ │ provision   │       │
//! └──────┘ └───┬─────────┘       │
//!              │                 │
//! ┌────────────▼─────────────────▼──────────────────┐
//! │               fleetstack-core                    │
//! │   model (App / Unit / ServiceInstance)  Store    │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod model;
pub mod store;

pub use error::{ErrorKind, Result, StoreError};
pub use model::*;
pub use store::{MemoryStore, Store};
