//! Tag generation, verification and quota enforcement for organizations.
//!
//! `TagService` is the entry point. Every operation resolves the caller
//! against the organization, evaluates rolling quotas lazily, and talks to
//! persistence through the `Store` trait. Captcha, payment and profile
//! lookups are remote collaborators behind traits.

pub mod captcha;
pub mod clock;
pub mod config;
pub mod error;
pub mod members;
pub mod organizations;
pub mod permissions;
pub mod quota;
pub mod redemptions;
pub mod service;
pub mod store;
pub mod subscription;
pub mod tags;
pub mod token;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CoreConfig, DealCosts};
pub use error::{CoreError, ErrorKind, Result};
pub use service::{Collaborators, TagService};
pub use store::{MemoryStore, Store};
