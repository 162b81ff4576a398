//! Shared domain primitives.
//!
//! - Strongly-typed identifiers for every remote entity
//! - `Timestamp` value object (always UTC)
//! - `DomainError` / `ErrorCode` / `ValidationError`
//! - `StateMachine` trait for lifecycle status enums

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{ConversationId, GroupId, InvitationId, LikeId, MatchId, MessageId, UserId};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
