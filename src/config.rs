//! Construction-time engine configuration.
//!
//! Plain numeric settings only. Loading these from files or the environment
//! belongs to surrounding glue, not to this crate.

/// Resource ceilings and dispatch knobs for one engine instance.
///
/// A ceiling of zero disables that particular check. The defaults are sized
/// for ordinary documents; callers handling untrusted input should set them
/// deliberately rather than rely on the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of tokens accepted before indexing starts.
    pub max_tokens: usize,

    /// Maximum raw document size in bytes, checked when the caller supplies
    /// a source size.
    pub max_bytes: usize,

    /// Maximum opener-stack depth during index construction.
    pub max_depth: usize,

    /// Soft deadline for a single collector callback, in seconds.
    /// Zero disables enforcement.
    pub collector_timeout_secs: u64,

    /// When set, the first collector failure aborts the dispatch pass with a
    /// typed error instead of being recorded in the failure log.
    pub strict: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tokens: 100_000,
            max_bytes: 2 * 1024 * 1024,
            max_depth: 100,
            collector_timeout_secs: 0,
            strict: false,
        }
    }
}
