//! CRC-32 and length verification of a decoded entry stream.

use std::io::{self, Read};

use crc32fast::Hasher;

/// Expected properties of a decoded stream, taken from the container index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expected {
    pub size:  u64,
    pub crc32: u32,
}

/// Pass-through reader that checks size and CRC-32 once the inner stream is
/// exhausted. A mismatch is reported as `InvalidData` from the final `read`,
/// so whoever drains the stream sees the failure.
pub struct VerifyingReader<R> {
    inner:    R,
    hasher:   Hasher,
    read:     u64,
    expected: Option<Expected>,
}

impl<R: Read> VerifyingReader<R> {
    pub fn new(inner: R, expected: Expected) -> Self {
        Self { inner, hasher: Hasher::new(), read: 0, expected: Some(expected) }
    }

    /// Count bytes without checking anything.
    pub fn unchecked(inner: R) -> Self {
        Self { inner, hasher: Hasher::new(), read: 0, expected: None }
    }

    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    fn check(&self) -> io::Result<()> {
        let Some(expected) = self.expected else { return Ok(()) };
        if self.read != expected.size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("decoded {} bytes, index declares {}", self.read, expected.size),
            ));
        }
        let actual = self.hasher.clone().finalize();
        if actual != expected.crc32 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("CRC-32 mismatch: computed {actual:08x}, index declares {:08x}", expected.crc32),
            ));
        }
        Ok(())
    }
}

impl<R: Read> Read for VerifyingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 {
            if !buf.is_empty() {
                self.check()?;
            }
            return Ok(0);
        }
        self.hasher.update(&buf[..n]);
        self.read += n as u64;
        if let Some(expected) = self.expected {
            if self.read > expected.size {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("decoded stream exceeds declared size {}", expected.size),
                ));
            }
        }
        Ok(n)
    }
}
