//! HR operations approval and execution workflow engine
//!
//! Request types (leave, settlements, contract actions, payroll
//! deductions, attendance corrections) pass through a fixed multi-party
//! approval chain; a final trusted executor then applies the authoritative
//! domain effect exactly once and stamps a tamper-evident document hash.
//!
//! The engine owns one mutable resource, the [`transaction::Transaction`]
//! record persisted in sled. Policy evaluation, document rendering and the
//! domain effects themselves are external collaborators behind traits.

pub mod chain;
pub mod effects;
pub mod error;
pub mod guard;
pub mod policy;
pub mod service;
pub mod transaction;
pub mod types;
pub mod utils;
pub mod workflow;
