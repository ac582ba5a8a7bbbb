//! End-to-end tests through the `Database` API.
//!
//! Each test file covers a specific scenario, using deterministic inputs
//! (seeded RNGs where randomness helps) against a real file on disk.

#![cfg(test)]

mod helpers;

mod test_append_only;
mod test_commit_scenarios;
mod test_concurrent_readers;
mod test_concurrent_writers;
mod test_empty_bootstrap;
mod test_history;
mod test_large_values;
mod test_read_your_writes;
mod test_reopen;
mod test_total_order;
