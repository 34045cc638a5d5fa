// SPDX-License-Identifier: MIT
//! replicator crate
//!
//! Off-chain replication of values a deployed contract derives from public
//! chain state. Pure: no I/O, no clocks, no randomness.

pub mod engine;
pub mod error;
pub mod formula;
pub mod vault;

pub use engine::replicate;
pub use error::ReplicateError;
pub use formula::{Formula, Step};
