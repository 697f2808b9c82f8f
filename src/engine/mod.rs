//! # Engine Module
//!
//! Internal ECS runtime implementation.
//!
//! This module contains all core building blocks:
//! - Entity allocation and signatures
//! - Sparse-set component storage and exact-signature partitions
//! - Queries and group resolution
//! - Jobs, systems and stage scheduling
//! - Deferred command buffers and lifecycle hooks
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod config;
pub mod component;
pub mod storage;
pub mod entity;
pub mod partition;
pub mod hooks;
pub mod spatial;
pub mod snapshot;
pub mod query;
pub mod group;
pub mod job;
pub mod commands;
pub mod systems;
pub mod scheduler;
pub mod manager;
