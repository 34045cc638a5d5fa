// SPDX-License-Identifier: MIT
//! host-utils crate
//!
//! Everything that touches the outside world: JSON-RPC, the challenge host,
//! signing, solc, and reading observables from chain state.

pub mod abi;
pub mod challenge;
pub mod compiler;
pub mod observables;
pub mod provider;
pub mod rpc;
pub mod wallet;
