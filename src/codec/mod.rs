//! Codec identities and the acceptance policy for entry extraction.
//!
//! # Identity rules
//! A ZIP entry names its compression method with a 16-bit number in both the
//! local header and the central directory. [`CodecId`] gives the methods this
//! crate can name a variant; everything else is carried as
//! [`CodecId::Other`] with the raw number so the catalog still records it.
//!
//! Whether an entry is *extracted* is decided by [`CodecPolicy`], not by
//! whether a decoder exists. A codec outside the policy is never decoded,
//! even when a decoder is available in this build.

use std::collections::BTreeSet;
use std::fmt;
use std::io::{self, Read};

use flate2::read::DeflateDecoder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod verify;

// ── Method numbers (APPNOTE 4.4.5) ──────────────────────────────────────────

pub const METHOD_STORE:     u16 = 0;
pub const METHOD_SHRINK:    u16 = 1;
pub const METHOD_IMPLODE:   u16 = 6;
pub const METHOD_DEFLATE:   u16 = 8;
pub const METHOD_DEFLATE64: u16 = 9;
pub const METHOD_BZIP2:     u16 = 12;
pub const METHOD_LZMA:      u16 = 14;
pub const METHOD_ZSTD:      u16 = 93;
pub const METHOD_XZ:        u16 = 95;
pub const METHOD_AES:       u16 = 99;

// ── CodecId ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecId {
    Store,
    Deflate,
    Deflate64,
    Bzip2,
    Lzma,
    Zstd,
    Xz,
    /// WinZip AES wrapper; the real method is hidden inside the extra field.
    Aes,
    /// Any other method number, including legacy Shrink/Implode.
    Other(u16),
}

impl CodecId {
    pub fn from_method(method: u16) -> Self {
        match method {
            METHOD_STORE     => CodecId::Store,
            METHOD_DEFLATE   => CodecId::Deflate,
            METHOD_DEFLATE64 => CodecId::Deflate64,
            METHOD_BZIP2     => CodecId::Bzip2,
            METHOD_LZMA      => CodecId::Lzma,
            METHOD_ZSTD      => CodecId::Zstd,
            METHOD_XZ        => CodecId::Xz,
            METHOD_AES       => CodecId::Aes,
            m                => CodecId::Other(m),
        }
    }

    pub fn method(self) -> u16 {
        match self {
            CodecId::Store     => METHOD_STORE,
            CodecId::Deflate   => METHOD_DEFLATE,
            CodecId::Deflate64 => METHOD_DEFLATE64,
            CodecId::Bzip2     => METHOD_BZIP2,
            CodecId::Lzma      => METHOD_LZMA,
            CodecId::Zstd      => METHOD_ZSTD,
            CodecId::Xz        => METHOD_XZ,
            CodecId::Aes       => METHOD_AES,
            CodecId::Other(m)  => m,
        }
    }

    /// Human-readable name (for diagnostics only).
    pub fn name(self) -> &'static str {
        match self {
            CodecId::Store     => "store",
            CodecId::Deflate   => "deflate",
            CodecId::Deflate64 => "deflate64",
            CodecId::Bzip2     => "bzip2",
            CodecId::Lzma      => "lzma",
            CodecId::Zstd      => "zstd",
            CodecId::Xz        => "xz",
            CodecId::Aes       => "aes",
            CodecId::Other(METHOD_SHRINK)  => "shrink",
            CodecId::Other(METHOD_IMPLODE) => "implode",
            CodecId::Other(_)  => "unknown",
        }
    }

    /// Parse from a CLI string. Only named codecs are accepted.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "store" | "stored" => Some(CodecId::Store),
            "deflate"          => Some(CodecId::Deflate),
            "deflate64"        => Some(CodecId::Deflate64),
            "bzip2"            => Some(CodecId::Bzip2),
            "lzma"             => Some(CodecId::Lzma),
            "zstd"             => Some(CodecId::Zstd),
            "xz"               => Some(CodecId::Xz),
            _                  => None,
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.method())
    }
}

// ── Error type ──────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("codec {0} is not accepted by the extraction policy")]
    Rejected(CodecId),
    #[error("no decoder for codec {0} in this build")]
    Unavailable(CodecId),
    #[error("unknown codec name {0:?}")]
    UnknownName(String),
}

// ── Policy ──────────────────────────────────────────────────────────────────

/// The set of codecs whose entries are decoded and handed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecPolicy {
    accepted: BTreeSet<CodecId>,
}

impl Default for CodecPolicy {
    /// Store and Deflate only.
    fn default() -> Self {
        Self::new([CodecId::Store, CodecId::Deflate])
    }
}

impl CodecPolicy {
    pub fn new(codecs: impl IntoIterator<Item = CodecId>) -> Self {
        Self { accepted: codecs.into_iter().collect() }
    }

    /// Parse a comma-separated list such as `store,deflate`.
    pub fn from_names(list: &str) -> Result<Self, CodecError> {
        let mut accepted = BTreeSet::new();
        for name in list.split(',').filter(|s| !s.trim().is_empty()) {
            let id = CodecId::from_name(name).ok_or_else(|| CodecError::UnknownName(name.trim().to_owned()))?;
            accepted.insert(id);
        }
        Ok(Self { accepted })
    }

    pub fn accepts(&self, codec: CodecId) -> bool {
        self.accepted.contains(&codec)
    }

    pub fn codecs(&self) -> impl Iterator<Item = CodecId> + '_ {
        self.accepted.iter().copied()
    }

    /// Build a decoder for `codec`, refusing anything outside the policy.
    pub fn decoder<'a>(&self, codec: CodecId, raw: Box<dyn Read + 'a>) -> Result<Box<dyn Read + 'a>, CodecError> {
        if !self.accepts(codec) {
            return Err(CodecError::Rejected(codec));
        }
        Ok(get_codec(codec)?.decoder(raw))
    }
}

// ── Codec trait ─────────────────────────────────────────────────────────────

pub trait Codec: Send + Sync {
    fn codec_id(&self) -> CodecId;
    /// Wrap a stream of compressed bytes in a stream of decoded bytes.
    fn decoder<'a>(&self, raw: Box<dyn Read + 'a>) -> Box<dyn Read + 'a>;
}

pub struct StoreCodec;
impl Codec for StoreCodec {
    fn codec_id(&self) -> CodecId { CodecId::Store }
    fn decoder<'a>(&self, raw: Box<dyn Read + 'a>) -> Box<dyn Read + 'a> { raw }
}

pub struct DeflateCodec;
impl Codec for DeflateCodec {
    fn codec_id(&self) -> CodecId { CodecId::Deflate }
    fn decoder<'a>(&self, raw: Box<dyn Read + 'a>) -> Box<dyn Read + 'a> {
        Box::new(DeflateDecoder::new(raw))
    }
}

// ── Factory ─────────────────────────────────────────────────────────────────

/// Resolve a CodecId to a built-in decoder.
pub fn get_codec(id: CodecId) -> Result<Box<dyn Codec>, CodecError> {
    match id {
        CodecId::Store   => Ok(Box::new(StoreCodec)),
        CodecId::Deflate => Ok(Box::new(DeflateCodec)),
        other            => Err(CodecError::Unavailable(other)),
    }
}

/// Decode everything from `raw` into memory. Test and CLI helper.
pub fn decode_all(codec: CodecId, raw: &[u8]) -> io::Result<Vec<u8>> {
    let codec = get_codec(codec).map_err(|e| io::Error::new(io::ErrorKind::Unsupported, e))?;
    let mut out = Vec::new();
    codec.decoder(Box::new(raw)).read_to_end(&mut out)?;
    Ok(out)
}
