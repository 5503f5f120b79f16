use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;
use tack_shared::{ItemRecord, MoveTargetDto, PersistMoveArgs, Variant};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::{SyncAdapter, SyncError};
use crate::item::{ISO_DATE, Status, parse_iso_date};

/// Keeps the authoritative item set as JSON lines in the data directory.
#[derive(Debug)]
pub struct FileSyncAdapter {
    feed_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSyncAdapter {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let feed_path = data_dir.join("items.data");
        if !feed_path.exists() {
            fs::write(&feed_path, "")?;
        }

        info!(feed = %feed_path.display(), "opened item feed");
        Ok(Self {
            feed_path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn feed_path(&self) -> &Path {
        &self.feed_path
    }

    #[tracing::instrument(skip(self))]
    pub fn load_records(&self) -> anyhow::Result<Vec<ItemRecord>> {
        load_jsonl(&self.feed_path).context("failed to load items.data")
    }

    #[tracing::instrument(skip(self, records))]
    pub fn save_records(&self, records: &[ItemRecord]) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock();
        save_jsonl_atomic(&self.feed_path, records).context("failed to save items.data")
    }

    fn apply(&self, args: &PersistMoveArgs) -> Result<(), SyncError> {
        let _guard = self.write_lock.lock();
        let mut records = load_jsonl(&self.feed_path).map_err(transient)?;

        let record = records
            .iter_mut()
            .find(|record| record.id == args.id && record.variant == args.variant)
            .ok_or_else(|| {
                SyncError::Permanent(format!("no {} with id {}", args.variant, args.id))
            })?;

        match &args.target {
            MoveTargetDto::Status(label) => {
                let status = Status::parse(args.variant, label).ok_or_else(|| {
                    SyncError::Permanent(format!("{label:?} is not a {} status", args.variant))
                })?;
                record.status = Some(status.label().to_string());
            }
            MoveTargetDto::ScheduledDate(raw) => {
                if args.variant == Variant::Channel {
                    return Err(SyncError::Permanent(
                        "channels cannot be scheduled".to_string(),
                    ));
                }
                let date = parse_iso_date(raw)
                    .ok_or_else(|| SyncError::Permanent(format!("invalid date {raw:?}")))?;
                record.scheduled_date = Some(date.format(ISO_DATE).to_string());
            }
        }

        save_jsonl_atomic(&self.feed_path, &records).map_err(transient)?;
        debug!(id = %args.id, variant = %args.variant, "persisted move");
        Ok(())
    }
}

fn transient(err: anyhow::Error) -> SyncError {
    SyncError::Transient(format!("{err:#}"))
}

#[async_trait]
impl SyncAdapter for FileSyncAdapter {
    async fn fetch_items(&self) -> Result<Vec<ItemRecord>, SyncError> {
        self.load_records().map_err(transient)
    }

    #[tracing::instrument(skip(self))]
    async fn persist_move(&self, args: &PersistMoveArgs) -> Result<(), SyncError> {
        self.apply(args)
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl(path: &Path) -> anyhow::Result<Vec<ItemRecord>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: ItemRecord = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(record);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, records))]
fn save_jsonl_atomic(path: &Path, records: &[ItemRecord]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = records.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for record in records {
        let serialized = serde_json::to_string(record)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
