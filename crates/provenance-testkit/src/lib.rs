//! # Provenance Testkit
//!
//! Testing utilities for the provenance ledger.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: A fixed cast of parties and a script for writing chains
//! - **Generators**: Proptest strategies for property-based testing
//!
//! The cross-crate integration tests live in this crate's `tests/`.
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use provenance_testkit::generators::{chain_from_plan, CustodyPlan};
//!
//! proptest! {
//!     #[test]
//!     fn chains_verify(plan: CustodyPlan) {
//!         let chain = chain_from_plan(&plan);
//!         prop_assert!(provenance_core::verify_chain(&chain).is_ok());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use provenance_testkit::fixtures::{ChainScript, TestFixture};
//!
//! let f = TestFixture::new();
//! let mut script = ChainScript::new("bike-0042", 1_000);
//! let genesis = script.create(&f.maker, &f.alice);
//! let sale = script.transfer(&f.alice, &f.bob);
//! assert_eq!(sale.previous_entry_hash, Some(genesis.digest()));
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{init_tracing, ChainScript, Party, TestFixture};
pub use generators::{chain_from_plan, CustodyPlan, CustodyStep};
