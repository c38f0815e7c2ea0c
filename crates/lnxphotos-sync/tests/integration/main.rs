//! Integration tests for lnxphotos-sync
//!
//! The engines run against an in-memory catalog and real files in a temp
//! directory.

mod common;
mod test_discovery;
mod test_scenarios;
