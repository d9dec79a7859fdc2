//! Entry recovery for containers whose central directory the parser
//! rejected, typically carved or truncated inputs.
//!
//! Records are read forward in stored order up to the first one that is
//! damaged or cut off. That record is exposed as the last entry and fails
//! with [`ContainerError::Corrupt`], so a walk catalogs the readable prefix
//! and then stops as it would on any other structural damage.
//!
//! The central directory is read when it can be located, through the end
//! record or just past the last local entry. Otherwise the local headers
//! themselves are read.

use std::io::{self, Cursor, Read, Seek, SeekFrom};

use ::zip::DateTime;
use byteorder::{LittleEndian, ReadBytesExt};
use tracing::debug;

use super::detect::{
    self, SIG_CENTRAL_HEADER, SIG_END_OF_DIRECTORY, SIG_LOCAL_HEADER, SIG_SPANNED, SIG_ZIP64_END,
};
use super::zip::dos_to_unix;
use super::{is_dir_mode, ArchiveEntry, ContainerError, EntrySource};
use crate::codec::CodecId;

const LOCAL_HEADER_LEN:     u64 = 30;
const CENTRAL_HEADER_LEN:   u64 = 46;
const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
const ZIP64_EXTRA:          u16 = 0x0001;
const ZIP64_MARKER:         u32 = u32::MAX;
const SYSTEM_DOS:           u16 = 0;
const SYSTEM_UNIX:          u16 = 3;
const DOS_DIRECTORY:        u32 = 0x10;

// ── SalvageSource ────────────────────────────────────────────────────────────

pub struct SalvageSource<R> {
    reader:  R,
    entries: Vec<ArchiveEntry>,
    damage:  String,
}

impl<R: Read + Seek> SalvageSource<R> {
    /// Recover the records that precede the damage. `cause` is the parser's
    /// complaint and leads the reported reason.
    pub fn scan(mut reader: R, cause: &str) -> io::Result<Self> {
        let end = reader.seek(SeekFrom::End(0))?;
        let first_local = detect::find_signature(&mut reader, 0, end, SIG_LOCAL_HEADER)?;
        let locals = match first_local {
            Some(at) => read_locals(&mut reader, at, end)?,
            None => Run::stopped(Vec::new(), "no local file headers".into()),
        };

        let central = match locate_by_end_record(&mut reader)? {
            Some(found) => Some(found),
            None => first_local.zip(locals.central_after).map(|(base, start)| (start, base)),
        };
        let run = match central {
            Some((start, base)) => {
                debug!(start, base, "reading damaged central directory");
                read_centrals(&mut reader, start, base)?
            }
            None => {
                debug!("central directory not found, reading local headers");
                locals
            }
        };

        debug!(recovered = run.entries.len(), damage = %run.damage, "salvaged container index");
        Ok(Self { reader, entries: run.entries, damage: format!("{cause}; {}", run.damage) })
    }

    pub fn recovered(&self) -> usize {
        self.entries.len()
    }

    pub fn damage(&self) -> &str {
        &self.damage
    }

    fn missing(&self, index: usize) -> ContainerError {
        if index == self.entries.len() {
            ContainerError::corrupt(self.damage.clone())
        } else {
            ContainerError::NoSuchEntry { index, len: self.len() }
        }
    }
}

impl<R: Read + Seek> EntrySource for SalvageSource<R> {
    /// Recovered entries plus the damaged record that ended recovery.
    fn len(&self) -> usize {
        self.entries.len() + 1
    }

    fn entry(&mut self, index: usize) -> Result<ArchiveEntry, ContainerError> {
        match self.entries.get(index) {
            Some(e) => Ok(e.clone()),
            None => Err(self.missing(index)),
        }
    }

    fn raw(&mut self, index: usize) -> Result<Box<dyn Read + '_>, ContainerError> {
        let Some(e) = self.entries.get(index) else {
            return Err(self.missing(index));
        };
        let (start, len) = (e.data_start, e.compressed_size);
        self.reader.seek(SeekFrom::Start(start))?;
        Ok(Box::new((&mut self.reader).take(len)))
    }
}

// ── Record reading ───────────────────────────────────────────────────────────

/// Why reading stopped: a damaged record, or a real I/O failure.
enum Halt {
    Damaged(String),
    Io(io::Error),
}

impl From<io::Error> for Halt {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Halt::Damaged("record cut off".into())
        } else {
            Halt::Io(e)
        }
    }
}

/// Entries read before reading stopped, and why it stopped.
struct Run {
    entries:       Vec<ArchiveEntry>,
    damage:        String,
    /// Where a run of local entries ended, when a central directory header
    /// follows it.
    central_after: Option<u64>,
}

impl Run {
    fn stopped(entries: Vec<ArchiveEntry>, damage: String) -> Self {
        Self { entries, damage, central_after: None }
    }
}

/// Fields local and central headers share, in their shared order.
struct Common {
    version_needed:    u16,
    flags:             u16,
    method:            u16,
    time:              u16,
    date:              u16,
    crc32:             u32,
    compressed_size:   u64,
    uncompressed_size: u64,
    name_len:          u16,
    extra_len:         u16,
}

fn read_common<R: Read>(r: &mut R) -> io::Result<Common> {
    Ok(Common {
        version_needed:    r.read_u16::<LittleEndian>()?,
        flags:             r.read_u16::<LittleEndian>()?,
        method:            r.read_u16::<LittleEndian>()?,
        time:              r.read_u16::<LittleEndian>()?,
        date:              r.read_u16::<LittleEndian>()?,
        crc32:             r.read_u32::<LittleEndian>()?,
        compressed_size:   u64::from(r.read_u32::<LittleEndian>()?),
        uncompressed_size: u64::from(r.read_u32::<LittleEndian>()?),
        name_len:          r.read_u16::<LittleEndian>()?,
        extra_len:         r.read_u16::<LittleEndian>()?,
    })
}

fn read_bytes<R: Read>(r: &mut R, len: u16) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; usize::from(len)];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Names are UTF-8 in practice; anything else is kept lossily.
fn decode_name(raw: Vec<u8>) -> String {
    String::from_utf8(raw).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Replace 32-bit markers with the values of a Zip64 extra field.
fn apply_zip64(extra: &[u8], c: &mut Common, mut offset: Option<&mut u64>) -> io::Result<()> {
    let marker = u64::from(ZIP64_MARKER);
    let mut r = Cursor::new(extra);
    while r.position() + 4 <= extra.len() as u64 {
        let id = r.read_u16::<LittleEndian>()?;
        let len = u64::from(r.read_u16::<LittleEndian>()?);
        let next = r.position() + len;
        if id == ZIP64_EXTRA {
            if c.uncompressed_size == marker {
                c.uncompressed_size = r.read_u64::<LittleEndian>()?;
            }
            if c.compressed_size == marker {
                c.compressed_size = r.read_u64::<LittleEndian>()?;
            }
            if let Some(off) = offset.as_deref_mut() {
                if *off == marker {
                    *off = r.read_u64::<LittleEndian>()?;
                }
            }
            return Ok(());
        }
        r.set_position(next);
    }
    Ok(())
}

fn attributes_mark_directory(made_by: u16, external: u32) -> bool {
    match made_by >> 8 {
        SYSTEM_UNIX => is_dir_mode(external >> 16),
        SYSTEM_DOS => external & DOS_DIRECTORY != 0,
        _ => false,
    }
}

fn to_entry(raw_path: String, is_dir: bool, c: &Common, version: u16, header_start: u64, data_start: u64) -> ArchiveEntry {
    let version = version & 0xff;
    ArchiveEntry {
        raw_path,
        is_dir,
        codec:             CodecId::from_method(c.method),
        compressed_size:   c.compressed_size,
        uncompressed_size: c.uncompressed_size,
        crc32:             c.crc32,
        header_start,
        data_start,
        version_major:     (version / 10) as u8,
        version_minor:     (version % 10) as u8,
        mtime:             dos_to_unix(DateTime::from_msdos(c.date, c.time)),
    }
}

fn local_data_start<R: Read + Seek>(r: &mut R, header_start: u64) -> Result<u64, Halt> {
    r.seek(SeekFrom::Start(header_start))?;
    if r.read_u32::<LittleEndian>()? != SIG_LOCAL_HEADER {
        return Err(Halt::Damaged("invalid local file header".into()));
    }
    r.seek(SeekFrom::Start(header_start + 26))?;
    let name_len = r.read_u16::<LittleEndian>()?;
    let extra_len = r.read_u16::<LittleEndian>()?;
    Ok(header_start + LOCAL_HEADER_LEN + u64::from(name_len) + u64::from(extra_len))
}

// ── Central directory ────────────────────────────────────────────────────────

/// Central directory start and the offset of the archive within the stream,
/// taken from an intact end record.
fn locate_by_end_record<R: Read + Seek>(r: &mut R) -> io::Result<Option<(u64, u64)>> {
    let Some(at) = detect::find_end_of_directory(r)? else {
        return Ok(None);
    };
    r.seek(SeekFrom::Start(at + 12))?;
    let size = r.read_u32::<LittleEndian>()?;
    let offset = r.read_u32::<LittleEndian>()?;
    if size == ZIP64_MARKER || offset == ZIP64_MARKER {
        return Ok(None);
    }
    let Some(start) = at.checked_sub(u64::from(size)) else {
        return Ok(None);
    };
    Ok(Some((start, start.saturating_sub(u64::from(offset)))))
}

/// One central record and the bytes it occupies.
fn read_central<R: Read + Seek>(r: &mut R, pos: u64, base: u64) -> Result<Option<(ArchiveEntry, u64)>, Halt> {
    r.seek(SeekFrom::Start(pos))?;
    match r.read_u32::<LittleEndian>()? {
        SIG_CENTRAL_HEADER => {}
        SIG_END_OF_DIRECTORY | SIG_ZIP64_END => return Ok(None),
        _ => return Err(Halt::Damaged("invalid central directory header".into())),
    }

    let made_by = r.read_u16::<LittleEndian>()?;
    let mut c = read_common(r)?;
    let comment_len = r.read_u16::<LittleEndian>()?;
    // disk number, internal attributes
    r.seek(SeekFrom::Current(4))?;
    let external = r.read_u32::<LittleEndian>()?;
    let mut offset = u64::from(r.read_u32::<LittleEndian>()?);
    let name = read_bytes(r, c.name_len)?;
    let extra = read_bytes(r, c.extra_len)?;
    apply_zip64(&extra, &mut c, Some(&mut offset))
        .map_err(|_| Halt::Damaged("malformed zip64 extra field".into()))?;

    let header_start = base + offset;
    let data_start = local_data_start(r, header_start)?;
    let name = decode_name(name);
    let is_dir = name.ends_with(['/', '\\']) || attributes_mark_directory(made_by, external);
    let len = CENTRAL_HEADER_LEN + u64::from(c.name_len) + u64::from(c.extra_len) + u64::from(comment_len);
    Ok(Some((to_entry(name, is_dir, &c, made_by, header_start, data_start), len)))
}

fn read_centrals<R: Read + Seek>(r: &mut R, start: u64, base: u64) -> io::Result<Run> {
    let mut entries = Vec::new();
    let mut pos = start;
    loop {
        match read_central(r, pos, base) {
            Ok(Some((entry, len))) => {
                entries.push(entry);
                pos += len;
            }
            Ok(None) => {
                let damage = format!("central directory ends after {} records", entries.len());
                return Ok(Run::stopped(entries, damage));
            }
            Err(Halt::Damaged(why)) => {
                let damage = format!("central directory record {}: {why}", entries.len());
                return Ok(Run::stopped(entries, damage));
            }
            Err(Halt::Io(e)) => return Err(e),
        }
    }
}

// ── Local headers ────────────────────────────────────────────────────────────

/// One local entry and the offset just past it. `None` once the next bytes
/// are not a local header.
fn read_local<R: Read + Seek>(r: &mut R, pos: u64, end: u64) -> Result<Option<(ArchiveEntry, u64)>, Halt> {
    r.seek(SeekFrom::Start(pos))?;
    if r.read_u32::<LittleEndian>()? != SIG_LOCAL_HEADER {
        return Ok(None);
    }

    let mut c = read_common(r)?;
    let name = read_bytes(r, c.name_len)?;
    let extra = read_bytes(r, c.extra_len)?;
    apply_zip64(&extra, &mut c, None)
        .map_err(|_| Halt::Damaged("malformed zip64 extra field".into()))?;

    let deferred = c.flags & FLAG_DATA_DESCRIPTOR != 0;
    if deferred && c.compressed_size == 0 {
        return Err(Halt::Damaged("sizes deferred to a data descriptor".into()));
    }
    let data_start = pos + LOCAL_HEADER_LEN + u64::from(c.name_len) + u64::from(c.extra_len);
    let mut next = data_start + c.compressed_size;
    if next > end {
        return Err(Halt::Damaged("entry data cut off".into()));
    }
    if deferred {
        r.seek(SeekFrom::Start(next))?;
        next += if r.read_u32::<LittleEndian>()? == SIG_SPANNED { 16 } else { 12 };
    }

    let name = decode_name(name);
    let is_dir = name.ends_with(['/', '\\']);
    Ok(Some((to_entry(name, is_dir, &c, c.version_needed, pos, data_start), next)))
}

fn read_locals<R: Read + Seek>(r: &mut R, from: u64, end: u64) -> io::Result<Run> {
    let mut entries = Vec::new();
    let mut pos = from;
    loop {
        match read_local(r, pos, end) {
            Ok(Some((entry, next))) => {
                entries.push(entry);
                pos = next;
            }
            Ok(None) => {
                r.seek(SeekFrom::Start(pos))?;
                let central = matches!(r.read_u32::<LittleEndian>(), Ok(SIG_CENTRAL_HEADER));
                let damage = format!("no central directory after {} local entries", entries.len());
                return Ok(Run { entries, damage, central_after: central.then_some(pos) });
            }
            Err(Halt::Damaged(why)) => {
                let damage = format!("local entry {}: {why}", entries.len());
                return Ok(Run::stopped(entries, damage));
            }
            Err(Halt::Io(e)) => return Err(e),
        }
    }
}
