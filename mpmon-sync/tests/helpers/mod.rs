//! Test Helper Utilities
//!
//! Shared utilities for testing mpmon-sync

#![allow(dead_code)]

pub mod fake_upstream;
pub mod fixtures;

pub use fake_upstream::FakeUpstream;
pub use fixtures::{
    ballot, ballot_for, bill, former_politician, politician, quick_sync_config, seed_detail,
    test_store, vote, vote_on_bill, Corpus,
};
