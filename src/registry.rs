//! Process-wide compilation state, held explicitly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::toolchain::{compile_reference, Diagnostic, ReferenceBinding, ReferenceUnit, CODE_CODE_BEHIND};

/// Unit-name counter and code-behind cache shared by compilers.
#[derive(Debug, Default)]
pub struct CompilerRegistry {
    counter: AtomicU64,
    code_behind: Mutex<HashMap<PathBuf, Arc<ReferenceUnit>>>,
}

impl CompilerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next unique generated type name: `Generator1`, `Generator2`, ...
    pub fn next_class_name(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("Generator{n}")
    }

    /// The compiled code-behind unit for `path`, compiling it on first use.
    ///
    /// The cache lock is held while compiling, so a path is never compiled
    /// twice. Failures are not cached.
    pub fn code_behind(&self, path: &Path) -> Result<Arc<ReferenceUnit>, Diagnostic> {
        let key = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let mut cache = self
            .code_behind
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(unit) = cache.get(&key) {
            debug!(path = %key.display(), "code-behind cache hit");
            return Ok(Arc::clone(unit));
        }

        let unit = Arc::new(compile_reference(&key, ReferenceBinding::Spread, CODE_CODE_BEHIND)?);
        info!(path = %key.display(), "compiled code-behind");
        cache.insert(key, Arc::clone(&unit));
        Ok(unit)
    }

    /// Number of cached code-behind units.
    pub fn cached_code_behind(&self) -> usize {
        self.code_behind
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
