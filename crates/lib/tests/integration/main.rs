//! Integration tests for kiln-lib.

#![cfg(unix)]

mod build_tests;
mod common;
mod generate_tests;
