//! Connection lifecycle domain types.

mod generation;
mod state;

pub use generation::{Generation, GenerationCounter};
pub use state::ConnectionState;
