use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::ListingSnapshot;

/// Durable cursor payload: the newest modification timestamp observed
/// across all completed cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Cursor {
    last_modified: DateTime<Utc>,
}

/// Last-observed state per listing, owned exclusively by the poll loop.
///
/// Entries are only ever inserted or replaced, never removed, for the
/// process lifetime. An absent entry means the listing is being seen for
/// the first time, which is a baseline and must not produce change events.
pub struct SnapshotStore {
    snapshots: HashMap<String, ListingSnapshot>,
    cursor: Option<DateTime<Utc>>,
    cursor_path: Option<PathBuf>,
}

impl SnapshotStore {
    /// In-memory store without restart continuity.
    pub fn new() -> Self {
        Self {
            snapshots: HashMap::new(),
            cursor: None,
            cursor_path: None,
        }
    }

    /// Store backed by a single-value cursor file. An existing cursor is
    /// loaded immediately; a missing or unreadable file just means no
    /// continuity (logged, not fatal).
    pub fn with_cursor_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cursor = match load_cursor(&path) {
            Ok(cursor) => cursor,
            Err(e) => {
                warn!("Failed to load cursor from {}: {e:#}", path.display());
                None
            }
        };
        Self {
            snapshots: HashMap::new(),
            cursor,
            cursor_path: Some(path),
        }
    }

    pub fn get(&self, listing_id: &str) -> Option<&ListingSnapshot> {
        self.snapshots.get(listing_id)
    }

    /// Insert or replace the snapshot for a listing and advance the cursor.
    pub fn put(&mut self, snapshot: ListingSnapshot) {
        if self.cursor.is_none_or(|c| snapshot.modified_at > c) {
            self.cursor = Some(snapshot.modified_at);
        }
        self.snapshots.insert(snapshot.listing_id.clone(), snapshot);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Newest modification timestamp observed, from this run or a prior one.
    pub fn cursor(&self) -> Option<DateTime<Utc>> {
        self.cursor
    }

    /// Whether a cursor survived from a previous process run. True means the
    /// store must be rehydrated by a full baseline fetch before diffing.
    pub fn has_persisted_cursor(&self) -> bool {
        self.cursor.is_some() && self.snapshots.is_empty()
    }

    /// Write the cursor file, if one is configured. Called after each
    /// completed cycle.
    pub fn persist_cursor(&self) -> Result<()> {
        let (Some(path), Some(last_modified)) = (&self.cursor_path, self.cursor) else {
            return Ok(());
        };
        let contents = serde_json::to_string_pretty(&Cursor { last_modified })
            .context("failed to serialize cursor")?;
        std::fs::write(path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

fn load_cursor(path: &Path) -> Result<Option<DateTime<Utc>>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let cursor: Cursor = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(cursor.last_modified))
}
