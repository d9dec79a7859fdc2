mod common;

use std::io::{self, Read};

use common::*;
use zip::CompressionMethod;
use ziptree::archive::{ExtractOptions, Extractor, RunOutcome};
use ziptree::codec::{CodecId, CodecPolicy};
use ziptree::entry::{EntryId, EntryStatus, NewEntry};
use ziptree::error::{EntryError, RunError};
use ziptree::sink::{
    CatalogSink, ContentSink, DirContentStore, MemoryCatalog, MemoryContentStore, MemoryQueue,
    Scheduler, Services, SinkError, Stage,
};

#[test]
fn test_synthesizes_missing_directories() {
    let h = Harness::new();
    let report = h.completed(build_zip(&[("a/b/c.txt", b"hello")], CompressionMethod::Deflated));

    assert!(report.is_clean());
    assert_eq!(report.entries_seen, 1);
    assert_eq!(report.directories_synthesized, 2);
    assert_eq!(report.files_extracted, 1);
    assert_eq!(report.bytes_stored, 5);
    assert_eq!(h.tree(), "img/evidence.zip\n  a/\n    b/\n      c.txt\n");

    let a = h.catalog.by_path("img/evidence.zip/a").unwrap();
    let b = h.catalog.by_path("img/evidence.zip/a/b").unwrap();
    let c = h.catalog.by_path("img/evidence.zip/a/b/c.txt").unwrap();
    assert_eq!(a.parent, EntryId(0));
    assert_eq!(b.parent, a.id);
    assert_eq!(c.parent, b.id);
    assert!(a.metadata.is_none());
    assert_eq!(c.size, 5);
    assert_eq!(c.status, EntryStatus::ReadyForAnalysis);
    assert_eq!(h.content.get(c.id).unwrap(), b"hello");
    assert_eq!(h.queue.queued(), vec![(Stage::ContentAnalysis, c.id)]);
}

#[test]
fn test_mixed_tree() {
    let h = Harness::new();
    h.completed(zip_of(&["a/b/c.txt", "a/d.txt", "e.txt"]));
    assert_eq!(
        h.tree(),
        "img/evidence.zip\n  a/\n    b/\n      c.txt\n    d.txt\n  e.txt\n"
    );
    assert_eq!(h.catalog.len(), 5);
    assert_eq!(h.catalog.by_path("img/evidence.zip/e.txt").unwrap().parent, EntryId(0));
}

#[test]
fn test_late_directory_entries_are_not_duplicated() {
    let h = Harness::new();
    let report = h.completed(zip_of(&["a/b/c.txt", "a/", "a/b/"]));

    assert!(report.is_clean());
    assert_eq!(report.entries_seen, 3);
    assert_eq!(report.entries_cataloged, 1);
    assert_eq!(report.directories, 0);
    assert_eq!(h.catalog.len(), 3);
}

#[test]
fn test_explicit_directory_keeps_metadata() {
    let h = Harness::new();
    let report = h.completed(zip_of(&["a/", "a/b.txt"]));

    assert_eq!(report.directories, 1);
    assert_eq!(report.directories_synthesized, 0);
    let a = h.catalog.by_path("img/evidence.zip/a").unwrap();
    assert!(a.is_dir);
    assert_eq!(a.size, 0);
    assert_eq!(a.status, EntryStatus::ReadyForAnalysis);
    assert_eq!(a.metadata.as_ref().unwrap().archive_name, "a/");

    let b = h.catalog.by_path("img/evidence.zip/a/b.txt").unwrap();
    assert_eq!(b.parent, a.id);
    let meta = b.metadata.unwrap();
    assert_eq!(meta.codec, CodecId::Deflate);
    assert_eq!(meta.uncompressed_size, 7);
    assert_eq!(meta.crc32, crc32fast::hash(b"a/b.txt"));
    assert!(meta.end_pos > meta.start_pos);
}

#[test]
fn test_not_an_archive_is_skipped() {
    let h = Harness::new();
    let out = h.run(b"%PDF-1.7 definitely not a zip".to_vec()).unwrap();
    assert!(matches!(out, RunOutcome::Skipped));
    assert!(h.catalog.is_empty());
    assert!(h.queue.is_empty());
}

#[test]
fn test_unsupported_method() {
    let mut bytes = build_zip(&[("x.bin", b"payload"), ("y.txt", b"fine")], CompressionMethod::Stored);
    set_method(&mut bytes, "x.bin", 12);

    let h = Harness::new();
    let report = h.completed(bytes);

    let x = h.catalog.by_path("img/evidence.zip/x.bin").unwrap();
    assert_eq!(x.status, EntryStatus::AnalysisFailed);
    assert_eq!(x.metadata.unwrap().codec, CodecId::Bzip2);
    assert!(h.content.get(x.id).is_none());
    assert!(matches!(
        report.failures.as_slice(),
        [EntryError::UnsupportedCodec { codec: CodecId::Bzip2, .. }]
    ));

    // the walk carries on
    let y = h.catalog.by_path("img/evidence.zip/y.txt").unwrap();
    assert_eq!(y.status, EntryStatus::ReadyForAnalysis);
    assert_eq!(h.queue.queued(), vec![(Stage::ContentAnalysis, y.id)]);
    assert_eq!(report.files_extracted, 1);
    assert_eq!(report.files_failed, 1);
}

#[test]
fn test_policy_restricts_codecs() {
    let h = Harness::with_options(ExtractOptions {
        codecs:           CodecPolicy::new([CodecId::Store]),
        verify_checksums: true,
    });
    let report = h.completed(zip_of(&["deflated.txt"]));
    let e = h.catalog.by_path("img/evidence.zip/deflated.txt").unwrap();
    assert_eq!(e.status, EntryStatus::AnalysisFailed);
    assert!(matches!(
        report.failures.as_slice(),
        [EntryError::UnsupportedCodec { codec: CodecId::Deflate, .. }]
    ));
}

#[test]
fn test_corruption_mid_walk_keeps_earlier_entries() {
    let mut bytes = build_zip(
        &[("f0.txt", b"zero"), ("f1.txt", b"one"), ("f2.txt", b"two"), ("f3.txt", b"three")],
        CompressionMethod::Stored,
    );
    break_local_header(&mut bytes, "f2.txt");

    let h = Harness::new();
    let err = h.run(bytes).unwrap_err();
    let RunError::CorruptArchive { container, report, .. } = err else {
        panic!("expected a corrupt archive error");
    };
    assert_eq!(container, CONTAINER);
    assert_eq!(report.entries_seen, 2);
    assert_eq!(h.catalog.len(), 2);
    assert!(h.catalog.entries().iter().all(|e| e.status == EntryStatus::ReadyForAnalysis));
    assert!(h.catalog.by_path("img/evidence.zip/f2.txt").is_none());
}

fn four_stored() -> Vec<u8> {
    build_zip(
        &[("f0.txt", b"zero"), ("f1.txt", b"one"), ("f2.txt", b"two"), ("f3.txt", b"three")],
        CompressionMethod::Stored,
    )
}

fn assert_prefix_cataloged(h: &Harness, err: &RunError) {
    assert!(matches!(err, RunError::CorruptArchive { .. }));
    let report = err.report().unwrap();
    assert_eq!(report.entries_seen, 2);
    assert_eq!(report.entries_cataloged, 2);
    assert_eq!(report.files_extracted, 2);
    assert_eq!(h.catalog.len(), 2);
    assert!(h.catalog.by_path("img/evidence.zip/f2.txt").is_none());

    let f1 = h.catalog.by_path("img/evidence.zip/f1.txt").unwrap();
    assert_eq!(f1.status, EntryStatus::ReadyForAnalysis);
    assert_eq!(h.content.get(f1.id).unwrap(), b"one");
}

#[test]
fn test_truncated_container() {
    let mut bytes = four_stored();
    let cut = central_record(&bytes, "f2.txt") + 10;
    bytes.truncate(cut);

    let h = Harness::new();
    let err = h.run(bytes).unwrap_err();
    assert_prefix_cataloged(&h, &err);
}

#[test]
fn test_damaged_central_record_keeps_earlier_entries() {
    let mut bytes = four_stored();
    break_central_record(&mut bytes, "f2.txt");

    let h = Harness::new();
    let err = h.run(bytes).unwrap_err();
    assert_prefix_cataloged(&h, &err);
    assert_eq!(h.queue.len(), 2);
}

#[test]
fn test_truncated_data_falls_back_to_local_headers() {
    let mut bytes = four_stored();
    let cut = local_header(&bytes, "f2.txt") + 30 + "f2.txt".len() + 1;
    bytes.truncate(cut);

    let h = Harness::new();
    let err = h.run(bytes).unwrap_err();
    assert_prefix_cataloged(&h, &err);
}

#[test]
fn test_self_extracting_stub_with_damaged_directory() {
    let mut bytes = b"MZ\x90\x00 stub code".to_vec();
    bytes.resize(512, 0);
    bytes.extend(four_stored());
    break_central_record(&mut bytes, "f2.txt");

    let h = Harness::new();
    let err = h.run(bytes).unwrap_err();
    assert_prefix_cataloged(&h, &err);
}

#[test]
fn test_directory_flagged_by_attributes() {
    let mut bytes = zip_of(&["bin", "bin/tool"]);
    set_external_attrs(&mut bytes, "bin", 0o040_755 << 16);

    let h = Harness::new();
    let report = h.completed(bytes);
    assert!(report.is_clean());
    assert_eq!(report.directories, 1);
    assert_eq!(report.directories_synthesized, 0);
    assert_eq!(report.files_extracted, 1);
    assert_eq!(h.tree(), "img/evidence.zip\n  bin/\n    tool\n");

    let bin = h.catalog.by_path("img/evidence.zip/bin").unwrap();
    let tool = h.catalog.by_path("img/evidence.zip/bin/tool").unwrap();
    assert!(bin.is_dir);
    assert_eq!(bin.size, 0);
    assert_eq!(tool.parent, bin.id);
    assert!(h.content.get(bin.id).is_none());
}

#[test]
fn test_checksum_mismatch() {
    let mut bytes = zip_of(&["a.txt"]);
    set_crc(&mut bytes, "a.txt", 0xdead_beef);

    let h = Harness::new();
    let report = h.completed(bytes.clone());
    let a = h.catalog.by_path("img/evidence.zip/a.txt").unwrap();
    assert_eq!(a.status, EntryStatus::AnalysisFailed);
    assert!(h.content.is_empty());
    assert!(h.queue.is_empty());
    assert!(matches!(report.failures.as_slice(), [EntryError::ContentStore { .. }]));

    let unchecked = Harness::with_options(ExtractOptions { verify_checksums: false, ..Default::default() });
    let report = unchecked.completed(bytes);
    assert!(report.is_clean());
    let a = unchecked.catalog.by_path("img/evidence.zip/a.txt").unwrap();
    assert_eq!(unchecked.content.get(a.id).unwrap(), b"a.txt");
}

#[test]
fn test_duplicate_paths() {
    let h = Harness::new();
    let report = h.completed(zip_of(&["a/x.txt", "a//x.txt", "/a/x.txt"]));

    assert_eq!(report.entries_seen, 3);
    assert_eq!(report.entries_cataloged, 1);
    assert_eq!(report.failures.len(), 2);
    assert!(report.failures.iter().all(|e| matches!(e, EntryError::DuplicatePath { .. })));
    assert_eq!(h.catalog.len(), 2);
}

#[test]
fn test_directory_cannot_shadow_file() {
    let h = Harness::new();
    let report = h.completed(zip_of(&["a", "a/b.txt", "a/"]));

    assert_eq!(report.failures.len(), 2);
    assert!(report.failures.iter().all(|e| matches!(e, EntryError::PathConflict { .. })));
    let a = h.catalog.by_path("img/evidence.zip/a").unwrap();
    assert!(!a.is_dir);
    let b = h.catalog.by_path("img/evidence.zip/a/b.txt").unwrap();
    assert_eq!(b.parent, EntryId(0));
}

#[test]
fn test_malformed_paths_are_skipped() {
    let h = Harness::new();
    let report = h.completed(zip_of(&["../etc/passwd", "ok.txt"]));

    assert!(matches!(report.failures.as_slice(), [EntryError::MalformedPath(_)]));
    assert_eq!(h.catalog.len(), 1);
    assert!(h.catalog.by_path("img/evidence.zip/ok.txt").is_some());
}

// ── failing collaborators ────────────────────────────────────────────────────

/// Refuses to create entries with the given name.
struct RefuseName(&'static str, MemoryCatalog);

impl CatalogSink for RefuseName {
    fn create_entry(&self, entry: &NewEntry) -> Result<EntryId, SinkError> {
        if entry.name == self.0 {
            return Err(SinkError::Rejected("constraint violation".into()));
        }
        self.1.create_entry(entry)
    }

    fn set_status(&self, id: EntryId, status: EntryStatus) -> Result<(), SinkError> {
        self.1.set_status(id, status)
    }
}

struct DownStore;

impl ContentSink for DownStore {
    fn store_content(&self, _: EntryId, _: &mut dyn Read) -> Result<u64, SinkError> {
        Err(SinkError::Io(io::Error::new(io::ErrorKind::Other, "no space left")))
    }
}

struct DownQueue;

impl Scheduler for DownQueue {
    fn enqueue(&self, _: Stage, _: EntryId) -> Result<(), SinkError> {
        Err(SinkError::Unavailable("queue offline".into()))
    }
}

fn run_with(services: Services<'_>, bytes: Vec<u8>) -> RunOutcome {
    let options = ExtractOptions::default();
    Extractor::new(services, &options).run(io::Cursor::new(bytes), &container()).unwrap()
}

#[test]
fn test_catalog_failure_falls_back_to_nearest_ancestor() {
    let catalog = RefuseName("b", MemoryCatalog::starting_at(1));
    let content = MemoryContentStore::new();
    let queue   = MemoryQueue::new();
    let out = run_with(Services::new(&catalog, &content, &queue), zip_of(&["a/b/c.txt", "a/b/d.txt"]));
    let report = out.report().unwrap();

    // "b" is retried for d.txt and fails again
    assert_eq!(report.failures.len(), 2);
    assert!(report.failures.iter().all(|e| matches!(e, EntryError::CatalogWrite { .. })));

    let a = catalog.1.by_path("img/evidence.zip/a").unwrap();
    let c = catalog.1.by_path("img/evidence.zip/a/b/c.txt").unwrap();
    assert_eq!(c.parent, a.id);
    assert_eq!(c.status, EntryStatus::ReadyForAnalysis);
    assert_eq!(catalog.1.children(a.id).len(), 2);
}

#[test]
fn test_failed_file_creation_is_skipped() {
    let catalog = RefuseName("c.txt", MemoryCatalog::starting_at(1));
    let content = MemoryContentStore::new();
    let queue   = MemoryQueue::new();
    let out = run_with(Services::new(&catalog, &content, &queue), zip_of(&["a/c.txt", "a/d.txt"]));
    let report = out.report().unwrap();

    assert_eq!(report.entries_cataloged, 1);
    assert!(matches!(report.failures.as_slice(), [EntryError::CatalogWrite { .. }]));
    assert_eq!(content.len(), 1);
    assert_eq!(queue.len(), 1);
}

#[test]
fn test_content_store_failure_fails_entry() {
    let catalog = MemoryCatalog::starting_at(1);
    let queue   = MemoryQueue::new();
    let out = run_with(Services::new(&catalog, &DownStore, &queue), zip_of(&["a.txt"]));
    let report = out.report().unwrap();

    let a = catalog.by_path("img/evidence.zip/a.txt").unwrap();
    assert_eq!(a.status, EntryStatus::AnalysisFailed);
    assert!(queue.is_empty());
    assert_eq!(report.files_failed, 1);
    assert!(matches!(report.failures.as_slice(), [EntryError::ContentStore { .. }]));
}

#[test]
fn test_scheduler_failure_leaves_entry_ready() {
    let catalog = MemoryCatalog::starting_at(1);
    let content = MemoryContentStore::new();
    let out = run_with(Services::new(&catalog, &content, &DownQueue), zip_of(&["a.txt"]));
    let report = out.report().unwrap();

    let a = catalog.by_path("img/evidence.zip/a.txt").unwrap();
    assert_eq!(a.status, EntryStatus::ReadyForAnalysis);
    assert_eq!(content.get(a.id).unwrap(), b"a.txt");
    assert_eq!(report.files_extracted, 1);
    assert!(matches!(report.failures.as_slice(), [EntryError::Scheduler { .. }]));
}

#[test]
fn test_content_written_to_directory() {
    let dir = tempfile::tempdir().unwrap();
    let store   = DirContentStore::create(dir.path().join("blobs")).unwrap();
    let catalog = MemoryCatalog::starting_at(1);
    let queue   = MemoryQueue::new();
    run_with(Services::new(&catalog, &store, &queue), zip_of(&["docs/readme.md", "bin/tool"]));

    for path in ["docs/readme.md", "bin/tool"] {
        let e = catalog.by_path(&format!("{CONTAINER}/{path}")).unwrap();
        assert_eq!(std::fs::read(store.path_of(e.id)).unwrap(), path.as_bytes());
    }
    assert_eq!(std::fs::read_dir(store.root()).unwrap().count(), 2);
}

#[test]
fn test_catalog_survives_json() {
    let h = Harness::new();
    h.completed(zip_of(&["a/b.txt"]));
    for e in h.catalog.entries() {
        let back = ziptree::entry::Entry::from_json(&e.to_json().unwrap()).unwrap();
        assert_eq!(back, e);
    }
}
