//! End-to-end test harness
//!
//! Builds a full [`MemoryService`] over a temp database and provides the
//! fixture exchanges the scenarios drive through the public API.

use std::sync::Arc;

use engram_core::MemoryService;
use tempfile::TempDir;

/// A service over a throwaway database. The temp dir lives as long as the
/// context.
pub struct TestContext {
    pub service: Arc<MemoryService>,
    _dir: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let service = MemoryService::open(Some(dir.path().join("e2e.db")))
            .expect("service over temp db");
        Self { service: Arc::new(service), _dir: dir }
    }

    /// Reopen the service over the same database (restart simulation)
    pub fn reopen(self) -> Self {
        let dir = self._dir;
        drop(self.service);
        let service = MemoryService::open(Some(dir.path().join("e2e.db")))
            .expect("service reopened over temp db");
        Self { service: Arc::new(service), _dir: dir }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture exchanges with known analyzer behavior
pub mod fixtures {
    /// Clears the default auto-store threshold (several strong preference
    /// indicators)
    pub const STRONG_PREFERENCE: (&str, &str) = (
        "I prefer 2-space indentation. Always use spaces, never use tabs. That's my preference.",
        "Got it, I'll always use 2-space indentation from now on.",
    );

    /// Lands in the suggest band (single weak preference indicator)
    pub const WEAK_PREFERENCE: (&str, &str) = (
        "I prefer concise commit messages for this work",
        "Understood, concise commit messages going forward.",
    );

    /// Nothing worth remembering
    pub const SMALL_TALK: (&str, &str) = (
        "nice weather today outside, isn't the sun lovely",
        "indeed, very sunny and pleasant everywhere around",
    );

    /// A solved problem
    pub const SOLUTION: (&str, &str) = (
        "Why does the build keep failing with a linker error?",
        "The root cause was a stale lockfile. Fixed by regenerating it; the build works now.",
    );
}
