use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::routing::{self, Record};
use crate::store::offset::NO_RECORDS;
use crate::store::RecordStore;
use crate::telegram::UpdateSource;

/// Highest `update_id` known to be durably persisted.
///
/// Never stored on its own: seeded from the record file names at startup
/// and only ever moved forward by a fully successful iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor(i64);

impl Cursor {
    pub fn new(last_persisted: i64) -> Self {
        Self(last_persisted.max(NO_RECORDS))
    }

    pub fn last_persisted(self) -> i64 {
        self.0
    }

    /// Offset to request from the update source.
    pub fn next_offset(self) -> i64 {
        self.0 + 1
    }

    pub fn advance_to(self, update_id: i64) -> Self {
        Self(self.0.max(update_id))
    }
}

/// Writes selected records between a store sync and a store publish.
pub struct Persister<S> {
    store: S,
}

impl<S: RecordStore> Persister<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Pull, write every record, then commit and push. An empty batch
    /// leaves the store untouched.
    pub async fn persist(&self, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            debug!("No records for the target channel in this batch");
            return Ok(());
        }

        self.store.sync().await?;

        let dir = self.store.records_dir();
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| SyncError::persistence(format!("Failed to create {}", dir.display()), e))?;

        for record in records {
            let path = dir.join(record.file_name());
            tokio::fs::write(&path, &record.content)
                .await
                .map_err(|e| SyncError::persistence(format!("Failed to write {}", path.display()), e))?;
        }

        self.store.publish().await?;
        info!("Persisted {} record(s)", records.len());
        Ok(())
    }
}

/// The poll → route → filter → persist loop for one target channel.
pub struct Syncer<U, S> {
    source: U,
    persister: Persister<S>,
    channel_id: i64,
}

impl<U: UpdateSource, S: RecordStore> Syncer<U, S> {
    pub fn new(source: U, store: S, channel_id: i64) -> Self {
        Self {
            source,
            persister: Persister::new(store),
            channel_id,
        }
    }

    #[cfg(test)]
    pub fn persister(&self) -> &Persister<S> {
        &self.persister
    }

    /// One iteration. Returns the advanced cursor only when the whole batch
    /// was persisted; on error there is no new cursor at all.
    pub async fn step(&self, cursor: Cursor) -> Result<Cursor> {
        let updates = self.source.get_updates(cursor.next_offset()).await?;
        let Some(last_update_id) = updates.last().map(|u| u.update_id) else {
            return Ok(cursor);
        };

        let groups = routing::group_by_destination(&updates)?;
        info!(
            "Got {} update(s) from chats: {:?}",
            updates.len(),
            groups.keys().collect::<Vec<_>>()
        );

        let selected = routing::select(groups, self.channel_id);
        self.persister.persist(&selected).await?;

        Ok(cursor.advance_to(last_update_id))
    }

    /// Run until the first error. There is no retry: the caller exits and an
    /// external supervisor restarts the process, which resumes from the
    /// store's record file names.
    pub async fn run(&self, start: Cursor) -> Result<()> {
        info!(
            "Syncing chat {} starting at offset {}",
            self.channel_id,
            start.next_offset()
        );
        let mut cursor = start;
        loop {
            cursor = self.step(cursor).await?;
        }
    }
}
