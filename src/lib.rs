//! Bubble Sync - Realtime Synchronization Engine
//!
//! This crate keeps the Bubble client's local notification and conversation
//! state synchronized with the remote service over a persistent change-stream
//! connection, shielding the rest of the application from connection churn,
//! duplicate events, and out-of-order delivery.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
