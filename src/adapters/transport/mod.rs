//! Change-stream transport adapters.

mod scripted;

pub use scripted::ScriptedTransport;
