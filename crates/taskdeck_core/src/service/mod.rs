//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate the entity stores into cross-store operations: blueprint
//!   materialization and snapshot export/import.
//! - Keep outer layers decoupled from storage details.
//!
//! # Invariants
//! - Cross-store mutations run inside one immediate transaction; any
//!   failure rolls the whole operation back.

pub mod snapshot_service;
pub mod template_service;
