//! Entitlement Bridge - webhook reconciliation engine.
//!
//! Verifies inbound payment-gateway webhooks, normalizes them into
//! canonical events, and idempotently applies them to the user,
//! subscription and payment records that control paid-tier access.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
