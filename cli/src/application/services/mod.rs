//! Application services: use-case orchestration over the port traits.

pub mod harness;
pub mod remote_access;
pub mod test_run;
pub mod transfer;
