//! Command-line interface for cot-eval.
//!
//! Provides commands for claiming evaluation requests, uploading results and
//! updating the leaderboard, auditing the traces dataset, and generating
//! chain-run configs and harness tasks.

mod commands;

pub use commands::{parse_cli, run, run_with_cli};
