//! Name/variant matching contract.
//!
//! Chain-run names use underscores, but the traces store normalizes
//! separators to hyphens when it materializes config partitions. Identity
//! checks between the two datasets therefore accept either the exact name or
//! its hyphenated variant. The rule lives here as a pure function so every
//! component applies the same contract.

/// The hyphenated form of a config name.
pub fn variant(name: &str) -> String {
    name.replace('_', "-")
}

/// Whether a declared traces config refers to a chain-run record.
///
/// True when `declared` equals the record name exactly or equals its
/// hyphenated variant.
pub fn matches_record(declared: &str, record_name: &str) -> bool {
    declared == record_name || declared == variant(record_name)
}
