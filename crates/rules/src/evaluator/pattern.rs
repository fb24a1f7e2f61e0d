//! Bounded regex compilation for operator-supplied patterns.
//!
//! The `regex` crate matches in linear time, so evaluation cannot blow up;
//! what remains is capping pattern length and compiled program size.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use regex::{Regex, RegexBuilder};

use crate::error::EvalError;

/// Longest pattern accepted from a rule value, in bytes.
pub const MAX_PATTERN_LEN: usize = 1024;

const COMPILED_SIZE_LIMIT: usize = 1 << 20;
const DFA_SIZE_LIMIT: usize = 1 << 20;

pub(crate) fn compile(pattern: &str, case_sensitive: bool) -> Result<Regex, EvalError> {
    if pattern.len() > MAX_PATTERN_LEN {
        return Err(EvalError::InvalidPattern {
            pattern: truncate(pattern),
            message: format!("pattern longer than {MAX_PATTERN_LEN} bytes"),
        });
    }
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .size_limit(COMPILED_SIZE_LIMIT)
        .dfa_size_limit(DFA_SIZE_LIMIT)
        .build()
        .map_err(|e| EvalError::InvalidPattern {
            pattern: truncate(pattern),
            message: e.to_string(),
        })
}

/// Distinct patterns kept compiled per evaluator.
pub const PATTERN_CACHE_SIZE: usize = 512;

type CacheKey = (String, bool);

/// Compiled patterns keyed by pattern text and case flag. Failed
/// compilations are cached too, so an invalid pattern stays a cheap error.
#[derive(Clone)]
pub(crate) struct PatternCache {
    entries: Arc<Mutex<LruCache<CacheKey, Result<Regex, EvalError>>>>,
}

impl PatternCache {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub(crate) fn get(&self, pattern: &str, case_sensitive: bool) -> Result<Regex, EvalError> {
        let Ok(mut entries) = self.entries.lock() else {
            return compile(pattern, case_sensitive);
        };
        let key = (pattern.to_string(), case_sensitive);
        if let Some(cached) = entries.get(&key) {
            return cached.clone();
        }
        let compiled = compile(pattern, case_sensitive);
        entries.put(key, compiled.clone());
        compiled
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new(PATTERN_CACHE_SIZE)
    }
}

impl fmt::Debug for PatternCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternCache").finish_non_exhaustive()
    }
}

fn truncate(pattern: &str) -> String {
    pattern.chars().take(64).collect()
}
