//! Shared utilities.
//!
//! Path digests for output naming, command-line quoting and test helpers.

pub mod hash;
pub mod quote;

#[cfg(test)]
pub mod testutil;
