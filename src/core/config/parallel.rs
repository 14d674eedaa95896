//! Parallel processing configuration for batch runs.

use serde::{Deserialize, Serialize};

/// Controls how the batch runner spreads documents across threads.
///
/// Detection itself is single-threaded per page; the natural unit of
/// parallelism is the document, handed to rayon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelPolicy {
    /// Maximum number of threads to use.
    /// If None, rayon's default pool size (number of CPU cores) is used.
    #[serde(default)]
    pub max_threads: Option<usize>,

    /// Document count at or below which the batch runs sequentially.
    #[serde(default = "ParallelPolicy::default_document_threshold")]
    pub document_threshold: usize,
}

impl ParallelPolicy {
    /// Create a new ParallelPolicy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of threads.
    pub fn with_max_threads(mut self, max_threads: Option<usize>) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Set the sequential document threshold.
    pub fn with_document_threshold(mut self, threshold: usize) -> Self {
        self.document_threshold = threshold;
        self
    }

    /// Returns true when `documents` items should be processed in parallel.
    pub fn should_parallelize(&self, documents: usize) -> bool {
        documents > self.document_threshold && self.max_threads != Some(1)
    }

    /// Builds a dedicated rayon pool honoring `max_threads`.
    ///
    /// Returns `Ok(None)` when no limit is configured and the global pool
    /// should be used.
    pub fn build_thread_pool(
        &self,
    ) -> Result<Option<rayon::ThreadPool>, rayon::ThreadPoolBuildError> {
        match self.max_threads {
            Some(num_threads) => rayon::ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .build()
                .map(Some),
            None => Ok(None),
        }
    }

    fn default_document_threshold() -> usize {
        1
    }
}

impl Default for ParallelPolicy {
    fn default() -> Self {
        Self {
            max_threads: None,
            document_threshold: Self::default_document_threshold(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_parallelize() {
        let policy = ParallelPolicy::default();
        assert!(!policy.should_parallelize(1));
        assert!(policy.should_parallelize(2));

        let single = ParallelPolicy::new().with_max_threads(Some(1));
        assert!(!single.should_parallelize(10));
    }

    #[test]
    fn test_serde_defaults() {
        let policy: ParallelPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, ParallelPolicy::default());
    }
}
