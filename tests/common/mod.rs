#![allow(dead_code)]
//! Shared test utilities for integration tests.
//!
//! # Modules
//!
//! - `fixtures`: a small three-block contract and service/coordinator builders
//! - `mocks`: hand-written fakes for the engine, chain and signature index

pub mod fixtures;
pub mod mocks;

pub use fixtures::{
    coordinator_with, sample_output, service_with, wrapped_ether, ADDRESS, OTHER_ADDRESS, SENT,
    SENT_TOPIC,
};
pub use mocks::{FakeChain, FakeEngine, FakeSignatures, Gate};
