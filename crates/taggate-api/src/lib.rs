//! HTTP surface for the tag engine.

pub mod auth;
pub mod clients;
pub mod error;
pub mod members;
pub mod middleware;
pub mod organizations;
pub mod premium;
pub mod redemptions;
pub mod router;
pub mod tags;

pub use auth::{AppState, AppStateInner};
pub use router::router;
