//! Shared domain models and event payloads for the Peerly messaging core.
//!
//! The canonical definitions live here so the store, the bus, and the
//! service layer agree on one set of types.

pub mod events;
pub mod models;
