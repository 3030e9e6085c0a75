//! # sigil-core
//!
//! The coordinating layer of the signer and messaging client: the
//! signing pipeline (approval → session → key → delegation → sign), the
//! inbound event router, the typed event bus UIs observe, retrying
//! relay publishes, observable list models, configuration, and the
//! unified error taxonomy.
//!
//! ## Modules
//!
//! - [`service`] — the owned root wiring every engine together
//! - [`signing`] — the authorization / signing pipeline
//! - [`router`] — inbound event dispatch by kind
//! - [`events`] — the typed event bus
//! - [`publish`] — relay publish with retry and backoff
//! - [`models`] — observable group and message projections
//! - [`migration`] — NIP-41 key-migration events
//! - [`config`] — TOML configuration

pub mod config;
pub mod error;
pub mod events;
pub mod migration;
pub mod models;
pub mod publish;
pub mod router;
pub mod service;
pub mod signing;

pub use config::CoreConfig;
pub use error::{CoreError, Result};
pub use events::{CoreEvent, EventBus};
pub use router::EventRouter;
pub use service::Core;
pub use signing::{SignOutcome, SigningPipeline};
