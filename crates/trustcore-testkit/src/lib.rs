//! # trustcore testkit
//!
//! Testing utilities for trustcore.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a trust chain that signs users, devices, revocations and
//!   claims the way the server log would deliver them
//! - **Generators**: Proptest strategies for property-based testing
//! - **Size vectors**: Known clear and encrypted lengths per format
//!
//! ## Test Fixtures
//!
//! ```rust
//! use trustcore_testkit::fixtures::TrustchainFixture;
//!
//! let mut fixture = TrustchainFixture::new();
//! let (mut alice, first_device) = fixture.create_user();
//! let author = alice.device_id(0);
//! let second_device = fixture.add_device(&mut alice, &author);
//! assert!(second_device.index() > first_device.index());
//! ```
//!
//! ## Size Vectors
//!
//! ```rust
//! use trustcore_testkit::vectors::verify_all_vectors;
//!
//! verify_all_vectors().unwrap();
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{creation_entry, TestDevice, TestUser, TrustchainFixture};
pub use vectors::{all_vectors, verify_all_vectors, SizeVector};
