//! Signature sniffing and searching, used only once the parser has rejected
//! a stream: to classify it, and to find records to salvage.

use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

/// Local file header.
pub const SIG_LOCAL_HEADER: u32 = 0x0403_4b50;
/// Central directory file header.
pub const SIG_CENTRAL_HEADER: u32 = 0x0201_4b50;
/// End of central directory (an empty archive starts with it).
pub const SIG_END_OF_DIRECTORY: u32 = 0x0605_4b50;
/// Zip64 end of central directory.
pub const SIG_ZIP64_END: u32 = 0x0606_4b50;
/// Spanning marker written at the start of split archives; also the
/// optional data descriptor signature.
pub const SIG_SPANNED: u32 = 0x0807_4b50;

/// Fixed part of the end of central directory record.
pub const END_OF_DIRECTORY_LEN: u64 = 22;

const SCAN_CHUNK: usize = 64 * 1024;

pub fn is_signature(sig: u32) -> bool {
    matches!(sig, SIG_LOCAL_HEADER | SIG_END_OF_DIRECTORY | SIG_SPANNED)
}

/// Does the stream look like a ZIP container? True when it starts with a
/// ZIP signature, or when an end of central directory record sits near its
/// tail (self-extracting archives carry a stub in front). Rewinds to the
/// start either way.
pub fn has_zip_signature<R: Read + Seek>(reader: &mut R) -> io::Result<bool> {
    reader.seek(SeekFrom::Start(0))?;
    let leading = match reader.read_u32::<LittleEndian>() {
        Ok(sig) => is_signature(sig),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => false,
        Err(e) => return Err(e),
    };
    let found = leading || find_end_of_directory(reader)?.is_some();
    reader.seek(SeekFrom::Start(0))?;
    Ok(found)
}

/// Offset of the last complete end of central directory record, searching
/// only as far back as the longest possible archive comment allows.
pub fn find_end_of_directory<R: Read + Seek>(reader: &mut R) -> io::Result<Option<u64>> {
    let end = reader.seek(SeekFrom::End(0))?;
    let span = end.min(END_OF_DIRECTORY_LEN + u64::from(u16::MAX));
    let start = end - span;

    let mut tail = vec![0u8; span as usize];
    reader.seek(SeekFrom::Start(start))?;
    reader.read_exact(&mut tail)?;

    let needle = SIG_END_OF_DIRECTORY.to_le_bytes();
    let found = tail
        .windows(4)
        .rposition(|w| w == needle)
        .filter(|&i| (tail.len() - i) as u64 >= END_OF_DIRECTORY_LEN)
        .map(|i| start + i as u64);
    Ok(found)
}

/// First offset in `from..end` where `sig` occurs.
pub fn find_signature<R: Read + Seek>(reader: &mut R, from: u64, end: u64, sig: u32) -> io::Result<Option<u64>> {
    let needle = sig.to_le_bytes();
    let mut buf = vec![0u8; SCAN_CHUNK];
    let mut pos = from;

    while pos < end {
        let want = (end - pos).min(SCAN_CHUNK as u64) as usize;
        reader.seek(SeekFrom::Start(pos))?;
        reader.read_exact(&mut buf[..want])?;
        if let Some(i) = buf[..want].windows(4).position(|w| w == needle) {
            return Ok(Some(pos + i as u64));
        }
        if pos + want as u64 >= end {
            break;
        }
        // keep three bytes so a signature straddling chunks is still seen
        pos += (want - 3) as u64;
    }
    Ok(None)
}
