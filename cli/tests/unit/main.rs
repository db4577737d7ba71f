//! Unit tests for the harness service over recording mocks.

mod harness;
mod mocks;
