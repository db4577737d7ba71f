//! Integration tests for the winvm-e2e CLI
//!
//! These tests spawn the actual binary. None of them reach a cloud account:
//! every case fails or finishes before provisioning starts.

mod cli_tests;
