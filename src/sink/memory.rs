//! In-process implementations of the sink traits.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::{self, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{CatalogSink, ContentSink, Scheduler, SinkError, Stage};
use crate::entry::{Container, Entry, EntryId, EntryStatus, NewEntry};

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Catalog ─────────────────────────────────────────────────────────────────

struct CatalogInner {
    entries: Vec<Entry>,
    next_id: u64,
}

/// Catalog kept in a vector, identities handed out sequentially.
pub struct MemoryCatalog {
    inner: Mutex<CatalogInner>,
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// First identity handed out will be `first`.
    pub fn starting_at(first: u64) -> Self {
        Self { inner: Mutex::new(CatalogInner { entries: Vec::new(), next_id: first }) }
    }

    /// Snapshot in creation order.
    pub fn entries(&self) -> Vec<Entry> {
        guard(&self.inner).entries.clone()
    }

    pub fn len(&self) -> usize {
        guard(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: EntryId) -> Option<Entry> {
        guard(&self.inner).entries.iter().find(|e| e.id == id).cloned()
    }

    pub fn by_path(&self, full_path: &str) -> Option<Entry> {
        guard(&self.inner).entries.iter().find(|e| e.full_path == full_path).cloned()
    }

    pub fn children(&self, parent: EntryId) -> Vec<Entry> {
        guard(&self.inner).entries.iter().filter(|e| e.parent == parent).cloned().collect()
    }

    /// Indented listing of everything below `root`, children sorted by name.
    pub fn render_tree(&self, root: &Container) -> String {
        let entries = self.entries();
        let mut by_parent: HashMap<EntryId, Vec<&Entry>> = HashMap::new();
        for e in &entries {
            by_parent.entry(e.parent).or_default().push(e);
        }
        for kids in by_parent.values_mut() {
            kids.sort_by(|a, b| a.name.cmp(&b.name));
        }

        let mut out = format!("{}\n", root.full_path);
        let mut stack: Vec<(&Entry, usize)> = by_parent
            .get(&root.identity)
            .map(|kids| kids.iter().rev().map(|e| (*e, 1)).collect())
            .unwrap_or_default();
        while let Some((e, depth)) = stack.pop() {
            let marker = match e.status {
                EntryStatus::AnalysisFailed => " [failed]",
                EntryStatus::Created => " [pending]",
                EntryStatus::ReadyForAnalysis => "",
            };
            let slash = if e.is_dir { "/" } else { "" };
            let _ = writeln!(out, "{:indent$}{}{}{}", "", e.name, slash, marker, indent = depth * 2);
            if let Some(kids) = by_parent.get(&e.id) {
                stack.extend(kids.iter().rev().map(|k| (*k, depth + 1)));
            }
        }
        out
    }
}

impl CatalogSink for MemoryCatalog {
    fn create_entry(&self, entry: &NewEntry) -> Result<EntryId, SinkError> {
        let mut inner = guard(&self.inner);
        let id = EntryId(inner.next_id);
        inner.next_id += 1;
        inner.entries.push(Entry::from_new(id, entry.clone()));
        Ok(id)
    }

    fn set_status(&self, id: EntryId, status: EntryStatus) -> Result<(), SinkError> {
        let mut inner = guard(&self.inner);
        let entry = inner.entries.iter_mut().find(|e| e.id == id).ok_or(SinkError::UnknownEntry(id))?;
        entry.status = status;
        Ok(())
    }
}

// ── Content ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryContentStore {
    blobs: Mutex<HashMap<EntryId, Vec<u8>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: EntryId) -> Option<Vec<u8>> {
        guard(&self.blobs).get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        guard(&self.blobs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ContentSink for MemoryContentStore {
    fn store_content(&self, id: EntryId, content: &mut dyn Read) -> Result<u64, SinkError> {
        // Read fully before publishing so a failed stream leaves nothing behind.
        let mut buf = Vec::new();
        content.read_to_end(&mut buf)?;
        let n = buf.len() as u64;
        guard(&self.blobs).insert(id, buf);
        Ok(n)
    }
}

/// Drains content without keeping it; counts what went through.
#[derive(Default)]
pub struct DiscardContent {
    bytes: AtomicU64,
}

impl DiscardContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

impl ContentSink for DiscardContent {
    fn store_content(&self, _id: EntryId, content: &mut dyn Read) -> Result<u64, SinkError> {
        let n = io::copy(content, &mut io::sink())?;
        self.bytes.fetch_add(n, Ordering::Relaxed);
        Ok(n)
    }
}

// ── Scheduler ───────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryQueue {
    queued: Mutex<Vec<(Stage, EntryId)>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queued(&self) -> Vec<(Stage, EntryId)> {
        guard(&self.queued).clone()
    }

    pub fn len(&self) -> usize {
        guard(&self.queued).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Scheduler for MemoryQueue {
    fn enqueue(&self, stage: Stage, id: EntryId) -> Result<(), SinkError> {
        guard(&self.queued).push((stage, id));
        Ok(())
    }
}
