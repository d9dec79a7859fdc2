#![allow(dead_code)]

use std::io::{Cursor, Write};

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use ziptree::archive::{ExtractOptions, Extractor, RunOutcome, RunReport};
use ziptree::entry::{Container, EntryId};
use ziptree::error::RunError;
use ziptree::sink::{MemoryCatalog, MemoryContentStore, MemoryQueue, Services};

pub const CONTAINER: &str = "img/evidence.zip";

/// Build an in-memory zip. Names ending in `/` become directory entries.
pub fn build_zip(entries: &[(&str, &[u8])], method: CompressionMethod) -> Vec<u8> {
    let mut w = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = FileOptions::default().compression_method(method);
    for (name, data) in entries {
        if name.ends_with('/') {
            w.add_directory(*name, opts).unwrap();
        } else {
            w.start_file(*name, opts).unwrap();
            w.write_all(data).unwrap();
        }
    }
    w.finish().unwrap().into_inner()
}

/// Every name gets its own name as content.
pub fn zip_of(names: &[&str]) -> Vec<u8> {
    let entries: Vec<(&str, &[u8])> = names.iter().map(|n| (*n, n.as_bytes())).collect();
    build_zip(&entries, CompressionMethod::Deflated)
}

pub fn container() -> Container {
    Container::new(EntryId(0), CONTAINER)
}

/// In-memory services for one run.
pub struct Harness {
    pub catalog: MemoryCatalog,
    pub content: MemoryContentStore,
    pub queue:   MemoryQueue,
    pub options: ExtractOptions,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(ExtractOptions::default())
    }

    pub fn with_options(options: ExtractOptions) -> Self {
        Self {
            catalog: MemoryCatalog::starting_at(1),
            content: MemoryContentStore::new(),
            queue:   MemoryQueue::new(),
            options,
        }
    }

    pub fn services(&self) -> Services<'_> {
        Services::new(&self.catalog, &self.content, &self.queue)
    }

    pub fn run(&self, bytes: Vec<u8>) -> Result<RunOutcome, RunError> {
        Extractor::new(self.services(), &self.options).run(Cursor::new(bytes), &container())
    }

    pub fn completed(&self, bytes: Vec<u8>) -> RunReport {
        match self.run(bytes).unwrap() {
            RunOutcome::Completed(r) => r,
            RunOutcome::Skipped => panic!("run was skipped"),
        }
    }

    pub fn tree(&self) -> String {
        self.catalog.render_tree(&container())
    }
}

// ── byte patching ────────────────────────────────────────────────────────────

/// Offset of the central directory record for `name`.
pub fn central_record(bytes: &[u8], name: &str) -> usize {
    (0..bytes.len().saturating_sub(46))
        .find(|&i| {
            if &bytes[i..i + 4] != b"PK\x01\x02" {
                return false;
            }
            let n = u16::from_le_bytes([bytes[i + 28], bytes[i + 29]]) as usize;
            bytes.get(i + 46..i + 46 + n) == Some(name.as_bytes())
        })
        .expect("no central record for name")
}

/// Offset of the local header for `name`.
pub fn local_header(bytes: &[u8], name: &str) -> usize {
    let cd = central_record(bytes, name);
    u32::from_le_bytes([bytes[cd + 42], bytes[cd + 43], bytes[cd + 44], bytes[cd + 45]]) as usize
}

/// Rewrite the compression method recorded for `name`.
pub fn set_method(bytes: &mut [u8], name: &str, method: u16) {
    let cd = central_record(bytes, name);
    let local = local_header(bytes, name);
    bytes[cd + 10..cd + 12].copy_from_slice(&method.to_le_bytes());
    bytes[local + 8..local + 10].copy_from_slice(&method.to_le_bytes());
}

/// Rewrite the CRC-32 recorded in the central directory for `name`.
pub fn set_crc(bytes: &mut [u8], name: &str, crc: u32) {
    let cd = central_record(bytes, name);
    bytes[cd + 16..cd + 20].copy_from_slice(&crc.to_le_bytes());
}

/// Destroy the local header signature of `name`.
pub fn break_local_header(bytes: &mut [u8], name: &str) {
    let local = local_header(bytes, name);
    bytes[local..local + 4].copy_from_slice(b"XXXX");
}

/// Destroy the central directory signature of `name`.
pub fn break_central_record(bytes: &mut [u8], name: &str) {
    let cd = central_record(bytes, name);
    bytes[cd..cd + 4].copy_from_slice(b"XXXX");
}

/// Rewrite the external file attributes recorded for `name`.
pub fn set_external_attrs(bytes: &mut [u8], name: &str, attrs: u32) {
    let cd = central_record(bytes, name);
    bytes[cd + 38..cd + 42].copy_from_slice(&attrs.to_le_bytes());
}
