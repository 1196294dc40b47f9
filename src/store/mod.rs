pub mod git;
pub mod offset;

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;

/// A mergeable, versioned directory of records.
///
/// Implementations own a local working copy; `records_dir` is where record
/// files are written between `sync` and `publish`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    fn records_dir(&self) -> &Path;

    /// Merge the latest shared state into the working copy.
    async fn sync(&self) -> Result<()>;

    /// Commit everything written since the last `sync` and push it.
    async fn publish(&self) -> Result<()>;
}
