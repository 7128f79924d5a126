use async_trait::async_trait;
use sqlx::PgPool;
use std::io::Write;
use std::path::{Path, PathBuf};

use stakcast_common::{SyncError, SyncResult};

/// Durable height of the last fully processed block.
///
/// `write` must not return before the new value is durable: a crash after it
/// returns must never resume below that height.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Last processed height, 0 when nothing has been stored yet
    async fn read(&self) -> SyncResult<u64>;

    async fn write(&self, height: u64) -> SyncResult<()>;
}

/// Checkpoint kept in a plain text file holding one decimal integer
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn read(&self) -> SyncResult<u64> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents.trim().parse().map_err(|e| {
                SyncError::Checkpoint(format!(
                    "{} does not hold a block height ({:?}): {}",
                    self.path.display(),
                    contents.trim(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(SyncError::Checkpoint(format!("failed to read {}: {}", self.path.display(), e))),
        }
    }

    async fn write(&self, height: u64) -> SyncResult<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, height))
            .await
            .map_err(|e| SyncError::Checkpoint(format!("checkpoint writer panicked: {}", e)))?
    }
}

/// Write to a temp file in the same directory, fsync it, then rename it over
/// the target so readers only ever see a complete value.
fn write_atomically(path: &Path, height: u64) -> SyncResult<()> {
    let fail = |e: std::io::Error| SyncError::Checkpoint(format!("failed to write {}: {}", path.display(), e));

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(fail)?;
    writeln!(tmp, "{}", height).map_err(fail)?;
    tmp.as_file().sync_all().map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;

    #[cfg(unix)]
    std::fs::File::open(&dir).and_then(|d| d.sync_all()).map_err(fail)?;

    Ok(())
}

/// Checkpoint kept as a row in the `indexer_state` table
pub struct PgCheckpointStore {
    pool: PgPool,
}

const CHECKPOINT_KEY: &str = "last_processed_block";

impl PgCheckpointStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckpointStore for PgCheckpointStore {
    async fn read(&self) -> SyncResult<u64> {
        let result: Option<(String,)> = sqlx::query_as("SELECT value FROM indexer_state WHERE key = $1")
            .bind(CHECKPOINT_KEY)
            .fetch_optional(&self.pool)
            .await?;

        match result {
            Some((value,)) => value
                .parse()
                .map_err(|e| SyncError::Checkpoint(format!("indexer_state holds invalid height {:?}: {}", value, e))),
            None => Ok(0),
        }
    }

    async fn write(&self, height: u64) -> SyncResult<()> {
        sqlx::query(
            "INSERT INTO indexer_state (key, value, updated_at)
             VALUES ($1, $2, NOW())
             ON CONFLICT (key) DO UPDATE SET value = $2, updated_at = NOW()"
        )
        .bind(CHECKPOINT_KEY)
        .bind(height.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
