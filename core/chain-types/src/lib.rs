// SPDX-License-Identifier: MIT
//! chain-types crate
//!
//! Plain data shared by the replicator and the host side: observables,
//! fixed-width conversions and challenge constants. No I/O.

pub mod constants;
pub mod conversions;
pub mod observable;
