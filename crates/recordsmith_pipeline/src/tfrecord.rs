//! TFRecord framing.
//!
//! Each record is laid out as
//!
//! ```text
//! u64 length (little endian)
//! u32 masked crc32c of the length bytes
//! [u8; length] payload
//! u32 masked crc32c of the payload
//! ```
//!
//! With gzip compression the whole framed stream is wrapped in one gzip
//! member, which is what TensorFlow's `GZIP` record option reads.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use recordsmith_core::Compression;
use std::io::{self, Read, Write};

const MASK_DELTA: u32 = 0xa282_ead8;
const HEADER_LEN: usize = 12;
const FOOTER_LEN: usize = 4;

/// Masked CRC32C as stored in record headers and footers
#[must_use]
pub fn masked_crc32c(data: &[u8]) -> u32 {
    mask(crc32c::crc32c(data))
}

const fn mask(crc: u32) -> u32 {
    crc.rotate_right(15).wrapping_add(MASK_DELTA)
}

const fn unmask(masked: u32) -> u32 {
    masked.wrapping_sub(MASK_DELTA).rotate_left(15)
}

/// Record decoding errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TfRecordError {
    /// Stream ended inside a record
    #[error("Truncated record at offset {offset}")]
    Truncated {
        /// Byte offset of the record
        offset: usize,
    },

    /// Length or payload checksum mismatch
    #[error("Corrupt {part} checksum at offset {offset}")]
    Checksum {
        /// `length` or `payload`
        part: &'static str,
        /// Byte offset of the record
        offset: usize,
    },

    /// Gzip stream could not be inflated
    #[error("Failed to decompress records: {reason}")]
    Decompress {
        /// Decoder error message
        reason: String,
    },
}

/// Writes framed records to any byte sink
pub struct TfRecordWriter<W: Write> {
    inner: W,
    records: u64,
}

impl<W: Write> TfRecordWriter<W> {
    /// Writer appending to `inner`
    pub const fn new(inner: W) -> Self {
        Self { inner, records: 0 }
    }

    /// Append one record
    ///
    /// # Errors
    ///
    /// Returns error if the sink fails
    pub fn write_record(&mut self, payload: &[u8]) -> io::Result<()> {
        let length = (payload.len() as u64).to_le_bytes();
        self.inner.write_all(&length)?;
        self.inner.write_all(&masked_crc32c(&length).to_le_bytes())?;
        self.inner.write_all(payload)?;
        self.inner.write_all(&masked_crc32c(payload).to_le_bytes())?;
        self.records += 1;
        Ok(())
    }

    /// Records written so far
    pub const fn records(&self) -> u64 {
        self.records
    }

    /// Flush and hand back the sink
    ///
    /// # Errors
    ///
    /// Returns error if flushing fails
    pub fn into_inner(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Byte sink that gzips everything written to it when asked to
pub enum RecordSink<W: Write> {
    /// Bytes pass through
    Plain(W),
    /// Bytes go into one gzip member
    Gzip(GzEncoder<W>),
}

impl<W: Write> RecordSink<W> {
    /// Sink over `inner` for `compression`
    pub fn new(inner: W, compression: Compression) -> Self {
        match compression {
            Compression::None => Self::Plain(inner),
            Compression::Gzip => Self::Gzip(GzEncoder::new(inner, flate2::Compression::default())),
        }
    }

    /// Write the gzip trailer if any and hand back the inner sink
    ///
    /// # Errors
    ///
    /// Returns error if the final bytes cannot be written
    pub fn finish(self) -> io::Result<W> {
        match self {
            Self::Plain(mut inner) => {
                inner.flush()?;
                Ok(inner)
            }
            Self::Gzip(encoder) => encoder.finish(),
        }
    }
}

impl<W: Write> Write for RecordSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(inner) => inner.write(buf),
            Self::Gzip(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(inner) => inner.flush(),
            Self::Gzip(encoder) => encoder.flush(),
        }
    }
}

/// Frame `records` into one file image, compressed per `compression`
///
/// # Errors
///
/// Returns error if compression fails
pub fn encode_file<'a>(
    records: impl IntoIterator<Item = &'a [u8]>,
    compression: Compression,
) -> io::Result<Vec<u8>> {
    let mut writer = TfRecordWriter::new(RecordSink::new(Vec::new(), compression));
    for record in records {
        writer.write_record(record)?;
    }
    writer.into_inner()?.finish()
}

/// Split a file image back into record payloads, checking every checksum
///
/// # Errors
///
/// Returns error if the data is truncated, corrupt or not valid gzip
pub fn decode_file(data: &[u8], compression: Compression) -> Result<Vec<Vec<u8>>, TfRecordError> {
    match compression {
        Compression::None => decode_records(data),
        Compression::Gzip => {
            let mut raw = Vec::new();
            GzDecoder::new(data)
                .read_to_end(&mut raw)
                .map_err(|e| TfRecordError::Decompress { reason: e.to_string() })?;
            decode_records(&raw)
        }
    }
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[at..at + 4]);
    u32::from_le_bytes(buf)
}

fn decode_records(data: &[u8]) -> Result<Vec<Vec<u8>>, TfRecordError> {
    let mut records = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        if data.len() - offset < HEADER_LEN {
            return Err(TfRecordError::Truncated { offset });
        }
        let length_bytes = &data[offset..offset + 8];
        if unmask(read_u32(data, offset + 8)) != crc32c::crc32c(length_bytes) {
            return Err(TfRecordError::Checksum { part: "length", offset });
        }

        let mut buf = [0u8; 8];
        buf.copy_from_slice(length_bytes);
        let length = usize::try_from(u64::from_le_bytes(buf))
            .map_err(|_| TfRecordError::Truncated { offset })?;

        let start = offset + HEADER_LEN;
        let remaining = data.len() - start;
        if remaining < FOOTER_LEN || remaining - FOOTER_LEN < length {
            return Err(TfRecordError::Truncated { offset });
        }
        let payload = &data[start..start + length];
        if read_u32(data, start + length) != masked_crc32c(payload) {
            return Err(TfRecordError::Checksum { part: "payload", offset });
        }

        records.push(payload.to_vec());
        offset = start + length + FOOTER_LEN;
    }

    Ok(records)
}
