//! rulesync core - domain model and port definitions
//!
//! This crate contains the hexagonal core of the sync engine:
//! - Domain entities (FileInfo, SyncRule, SyncAction, SyncPlan)
//! - Typed error taxonomies shared across crates
//! - Port traits for storage adapters and execution history
//! - Configuration loading and validation
//!
//! Everything here is free of I/O except [`config`], which reads the
//! YAML configuration file. Concrete adapters live in sibling crates.

pub mod config;
pub mod domain;
pub mod ports;
