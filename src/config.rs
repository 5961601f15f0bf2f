//! Dispatcher configuration (§4.I). No environment variables, config files, or CLI surface
//! are read; callers construct a [`DispatcherConfig`] in code and hand it to
//! [`crate::Dispatcher::new`].

/// Builder-style configuration for a [`crate::Dispatcher`].
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub(crate) worker_threads: usize,
    pub(crate) default_race_protection: bool,
    pub(crate) directory_cache_enabled: bool,
}

impl DispatcherConfig {
    /// Starts from the defaults: one worker thread per available CPU, race protection on,
    /// directory-handle caching on.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fixed size of the worker thread pool (§4.A). Clamped to at least 1.
    #[must_use]
    pub fn worker_threads(mut self, n: usize) -> Self {
        self.worker_threads = n.max(1);
        self
    }

    /// Sets whether handles opened without an explicit `no_race_protection` flag default to
    /// the dev/ino race-safety protocol.
    #[must_use]
    pub fn default_race_protection(mut self, enabled: bool) -> Self {
        self.default_race_protection = enabled;
        self
    }

    /// Enables or disables the process-wide directory-handle cache (§4.D). Disabling it is
    /// useful for tests that want every directory open to be observably distinct.
    #[must_use]
    pub fn directory_cache_enabled(mut self, enabled: bool) -> Self {
        self.directory_cache_enabled = enabled;
        self
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            default_race_protection: true,
            directory_cache_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_threads_clamped_to_one() {
        let cfg = DispatcherConfig::new().worker_threads(0);
        assert_eq!(cfg.worker_threads, 1);
    }
}
