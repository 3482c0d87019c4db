//! Integration test crate for the Encode marketplace.
//!
//! This crate exists solely to run tests that drive `encode-market` against
//! the `encode-ledger` in-memory host. It has no public API.

#![forbid(unsafe_code)]
