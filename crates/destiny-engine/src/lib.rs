#![deny(warnings)]

//! Game state machine for Flip Your Destiny.
//!
//! A [`GameSession`] moves through
//! `Login -> Setup -> (AwaitingTimeJump -> AwaitingEventCode -> AwaitingRebalance)* -> Finished`
//! only via [`Engine`] transitions. Each transition clones the session,
//! applies the change and returns the result, so a rejected input never
//! leaves a half-updated session behind.

mod engine;
mod error;
mod record;
mod session;

pub use engine::{Engine, EventPreview};
pub use error::EngineError;
pub use record::build_record;
pub use session::{GameSession, Holding, Stage};
