//! Host and per-context configuration.
//!
//! `icu_data_path`/`snapshot_path` are accepted for FFI-surface parity with
//! engines that need them, but are inert here: JavaScriptCore links its own
//! ICU and has no snapshot-loading concept, so both fields are stored and
//! otherwise ignored (Open Question Resolution #3).

#[derive(Clone, Debug, Default)]
pub struct HostConfig {
    pub owner_thread_name: Option<String>,
    /// Accepted, not used by this engine. See module docs.
    pub icu_data_path: Option<String>,
    /// Accepted, not used by this engine. See module docs.
    pub snapshot_path: Option<String>,
    /// Whitespace-separated engine flags; only `--single-threaded` is
    /// recognized (and only for diagnostics — JavaScriptCore already runs
    /// one isolate per owner thread, so the flag has no V8-style "shared
    /// Platform" effect to toggle).
    pub engine_flags: String,
}

impl HostConfig {
    pub fn single_threaded_requested(&self) -> bool {
        self.engine_flags
            .split_whitespace()
            .any(|flag| flag == "--single-threaded")
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ContextConfig {
    /// Bytes. `0` disables the limit.
    pub soft_memory_limit: u64,
    /// Bytes. `0` disables the limit.
    pub hard_memory_limit: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_single_threaded_flag() {
        let cfg = HostConfig {
            engine_flags: "--single-threaded --foo".to_string(),
            ..Default::default()
        };
        assert!(cfg.single_threaded_requested());
    }

    #[test]
    fn ignores_unrelated_flags() {
        let cfg = HostConfig {
            engine_flags: "--foo --bar".to_string(),
            ..Default::default()
        };
        assert!(!cfg.single_threaded_requested());
    }
}
