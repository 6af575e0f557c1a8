// ============================================
// File: crates/wiretape/src/oplog.rs
// ============================================
//! # Operation Log Files
//!
//! ## Creation Reason
//! Persists captured ops as a flat sequence of self-delimited records and
//! reads them back, forward only, for playback and inspection.
//!
//! ## Main Functionality
//! - `OpLogWriter`: Buffered appender over any `AsyncWrite`
//! - `OpLogReader`: Sequential reader over any `AsyncRead`
//! - `LogSource`: Re-openable log location (file or memory)
//!
//! ## End-of-log Handling
//! ```text
//! clean EOF at record boundary      ──► Ok(None)
//! short final record                ──► warn, Ok(None)
//! short record, header disagrees    ──► Err(CorruptLog)    (bad length prefix)
//! undecodable record, nothing after ──► warn, Ok(None)   (stopped mid-write)
//! undecodable record, more follows  ──► Err(CorruptLog)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - No index, no footer; the only way through a log is a full scan
//! - Call `finish()` on the writer, dropping it may lose buffered records
//!
//! ## Last Modified
//! v0.1.0 - Initial log file implementation

use std::io::Cursor;
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter,
};
use tracing::{debug, warn};

use wiretape_core::error::CoreError;
use wiretape_core::{Codec, OpWithTime, RecordCodec};

use crate::error::{ReplayError, Result};

const LENGTH_PREFIX_SIZE: usize = 4;

// ============================================
// OpLogWriter
// ============================================

/// Appends records to an operation log.
#[derive(Debug)]
pub struct OpLogWriter<W = File> {
    writer: BufWriter<W>,
    codec: RecordCodec,
    scratch: BytesMut,
    records: u64,
    bytes: u64,
}

impl OpLogWriter<File> {
    /// Creates (or truncates) a log file.
    ///
    /// # Errors
    /// Returns `LogOpen` if the file cannot be created.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).await.map_err(|source| ReplayError::LogOpen {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), "Created operation log");
        Ok(Self::new(file))
    }
}

impl<W: AsyncWrite + Unpin + Send> OpLogWriter<W> {
    /// Wraps a writer.
    pub fn new(inner: W) -> Self {
        Self {
            writer: BufWriter::new(inner),
            codec: RecordCodec::new(),
            scratch: BytesMut::with_capacity(4096),
            records: 0,
            bytes: 0,
        }
    }

    /// Appends one record.
    ///
    /// # Errors
    /// Returns error if the write fails.
    pub async fn append(&mut self, record: &OpWithTime) -> Result<()> {
        self.scratch.clear();
        self.codec.encode(record, &mut self.scratch);
        self.writer.write_all(&self.scratch).await?;
        self.records += 1;
        self.bytes += self.scratch.len() as u64;
        Ok(())
    }

    /// Records written so far.
    #[must_use]
    pub const fn records(&self) -> u64 {
        self.records
    }

    /// Bytes written so far.
    #[must_use]
    pub const fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Flushes buffered records and returns the inner writer.
    ///
    /// # Errors
    /// Returns error if flushing fails.
    pub async fn finish(mut self) -> Result<W> {
        self.writer.flush().await?;
        Ok(self.writer.into_inner())
    }
}

// ============================================
// OpLogReader
// ============================================

/// Reads records from an operation log, front to back.
#[derive(Debug)]
pub struct OpLogReader<R = File> {
    reader: BufReader<R>,
    name: String,
    codec: RecordCodec,
    offset: u64,
    records: u64,
}

impl OpLogReader<File> {
    /// Opens a log file.
    ///
    /// # Errors
    /// Returns `LogOpen` if the file cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).await.map_err(|source| ReplayError::LogOpen {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::new(file, path.display().to_string()))
    }
}

impl<R: AsyncRead + Unpin + Send> OpLogReader<R> {
    /// Wraps a reader.
    pub fn new(inner: R, name: impl Into<String>) -> Self {
        Self {
            reader: BufReader::new(inner),
            name: name.into(),
            codec: RecordCodec::new(),
            offset: 0,
            records: 0,
        }
    }

    /// Reads the next record, or `None` at the end of the log.
    ///
    /// # Errors
    /// `CorruptLog` if a record in the middle of the log cannot be decoded,
    /// `Io` if reading fails.
    pub async fn next_record(&mut self) -> Result<Option<OpWithTime>> {
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        let n = read_full(&mut self.reader, &mut prefix).await?;
        if n == 0 {
            return Ok(None);
        }
        if n < LENGTH_PREFIX_SIZE {
            return Ok(self.truncated(n));
        }

        if let Err(e) = RecordCodec::check_complete(&prefix) {
            return self.undecodable(e).await;
        }
        let Some(len) = RecordCodec::peek_len(&prefix) else {
            return Ok(self.truncated(n));
        };

        let mut raw = vec![0u8; len];
        raw[..LENGTH_PREFIX_SIZE].copy_from_slice(&prefix);
        let n = read_full(&mut self.reader, &mut raw[LENGTH_PREFIX_SIZE..]).await?;
        if n < len - LENGTH_PREFIX_SIZE {
            let partial = LENGTH_PREFIX_SIZE + n;
            // A damaged length prefix can swallow the rest of the log.
            if let Err(source) = RecordCodec::check_partial(&raw[..partial]) {
                return Err(ReplayError::CorruptLog {
                    offset: self.offset,
                    source,
                });
            }
            return Ok(self.truncated(partial));
        }

        let mut bytes = Bytes::from(raw);
        match self.codec.decode(&mut bytes) {
            Ok(record) => {
                self.offset += len as u64;
                self.records += 1;
                Ok(Some(record))
            }
            Err(e) => self.undecodable(e).await,
        }
    }

    /// Records read so far.
    #[must_use]
    pub const fn records_read(&self) -> u64 {
        self.records
    }

    /// Byte offset of the next record.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    fn truncated(&self, partial: usize) -> Option<OpWithTime> {
        warn!(
            log = %self.name,
            offset = self.offset,
            partial,
            "Truncated final record, treating as end of log"
        );
        None
    }

    async fn undecodable(&mut self, source: CoreError) -> Result<Option<OpWithTime>> {
        let at_end = self.reader.fill_buf().await?.is_empty();
        if at_end {
            warn!(
                log = %self.name,
                offset = self.offset,
                error = %source,
                "Unreadable final record, treating as end of log"
            );
            return Ok(None);
        }
        Err(ReplayError::CorruptLog {
            offset: self.offset,
            source,
        })
    }
}

/// Reads until `buf` is full or EOF; returns the number of bytes read.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

// ============================================
// LogSource
// ============================================

/// Reader type produced by [`LogSource::open`].
pub type DynLogReader = OpLogReader<Box<dyn AsyncRead + Unpin + Send>>;

/// Where a playback run reads its log from; opened once per repeat pass.
#[derive(Debug, Clone)]
pub enum LogSource {
    /// A log file on disk.
    File(PathBuf),
    /// An in-memory log.
    Memory(Bytes),
}

impl LogSource {
    /// Opens a fresh reader positioned at the first record.
    ///
    /// # Errors
    /// Returns `LogOpen` if the file cannot be opened.
    pub async fn open(&self) -> Result<DynLogReader> {
        match self {
            Self::File(path) => {
                let file = File::open(path).await.map_err(|source| ReplayError::LogOpen {
                    path: path.display().to_string(),
                    source,
                })?;
                Ok(OpLogReader::new(
                    Box::new(file) as Box<dyn AsyncRead + Unpin + Send>,
                    path.display().to_string(),
                ))
            }
            Self::Memory(bytes) => Ok(OpLogReader::new(
                Box::new(Cursor::new(bytes.clone())) as Box<dyn AsyncRead + Unpin + Send>,
                "<memory>",
            )),
        }
    }

    /// Short description used in logs.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Memory(bytes) => format!("<memory:{}B>", bytes.len()),
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiretape_common::{CaptureTime, ConnectionId};
    use wiretape_core::protocol::{decode_op, encode_op, KillCursorsOp, MsgHeader, Op, OpCode};

    fn record(n: i64) -> OpWithTime {
        let built = Op::KillCursors(KillCursorsOp {
            header: MsgHeader {
                message_length: 0,
                request_id: i32::try_from(n).unwrap(),
                response_to: 0,
                op_code: OpCode::KillCursors.as_i32(),
            },
            reserved: 0,
            cursor_ids: vec![n],
        });
        // Decoded ops carry their real message length.
        let (op, _) = decode_op(&encode_op(&built)).unwrap().unwrap();
        let mut r = OpWithTime::new(
            op,
            CaptureTime::from_unix_nanos(n * 1_000),
            ConnectionId::new(1),
            "10.0.0.1:50000".parse().unwrap(),
            "[::1]:27017".parse().unwrap(),
        );
        r.order = u64::try_from(n).unwrap();
        r
    }

    async fn log_bytes(records: &[OpWithTime]) -> Vec<u8> {
        let mut writer = OpLogWriter::new(Vec::new());
        for r in records {
            writer.append(r).await.unwrap();
        }
        assert_eq!(writer.records(), records.len() as u64);
        writer.finish().await.unwrap()
    }

    async fn read_all(bytes: &[u8]) -> Result<Vec<OpWithTime>> {
        let mut reader = OpLogReader::new(bytes, "test");
        let mut out = Vec::new();
        while let Some(r) = reader.next_record().await? {
            out.push(r);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn test_write_then_read_back() {
        let records: Vec<_> = (1..=3).map(record).collect();
        let bytes = log_bytes(&records).await;
        let read = read_all(&bytes).await.unwrap();
        assert_eq!(read, records);
    }

    #[tokio::test]
    async fn test_empty_log() {
        assert!(read_all(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_truncated_tail_is_end_of_log() {
        let records: Vec<_> = (1..=3).map(record).collect();
        let bytes = log_bytes(&records).await;
        for cut in [1, 3, 10] {
            let read = read_all(&bytes[..bytes.len() - cut]).await.unwrap();
            assert_eq!(read.len(), 2, "cut {cut}");
        }
    }

    #[tokio::test]
    async fn test_corrupt_tail_is_end_of_log() {
        let records: Vec<_> = (1..=2).map(record).collect();
        let mut bytes = log_bytes(&records).await;
        let second = bytes.len() / 2;
        bytes[second + 4] = 99;
        let read = read_all(&bytes).await.unwrap();
        assert_eq!(read.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_middle_is_fatal() {
        let records: Vec<_> = (1..=3).map(record).collect();
        let mut bytes = log_bytes(&records).await;
        let one = bytes.len() / 3;
        // Unsupported format version in the second record.
        bytes[one + 4] = 99;
        let err = read_all(&bytes).await.unwrap_err();
        assert!(err.is_corruption());
        assert!(matches!(err, ReplayError::CorruptLog { offset, .. } if offset == one as u64));

        let mut bytes = log_bytes(&records).await;
        bytes[one..one + 4].copy_from_slice(&1u32.to_le_bytes());
        assert!(read_all(&bytes).await.unwrap_err().is_corruption());
    }

    #[tokio::test]
    async fn test_oversized_length_prefix_mid_log_is_fatal() {
        let records: Vec<_> = (1..=3).map(record).collect();
        let mut bytes = log_bytes(&records).await;
        let one = bytes.len() / 3;
        // Still a legal record length, but far past the end of the log.
        let bogus = u32::try_from(bytes.len() * 4).unwrap();
        bytes[one..one + 4].copy_from_slice(&bogus.to_le_bytes());

        let err = read_all(&bytes).await.unwrap_err();
        assert!(matches!(err, ReplayError::CorruptLog { offset, .. } if offset == one as u64));
    }

    #[tokio::test]
    async fn test_file_and_memory_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ops.log");
        let mut writer = OpLogWriter::create(&path).await.unwrap();
        writer.append(&record(7)).await.unwrap();
        writer.finish().await.unwrap();

        let mut reader = LogSource::File(path.clone()).open().await.unwrap();
        assert_eq!(reader.next_record().await.unwrap(), Some(record(7)));
        assert_eq!(reader.next_record().await.unwrap(), None);
        assert_eq!(reader.records_read(), 1);

        let bytes = Bytes::from(std::fs::read(&path).unwrap());
        let mut reader = LogSource::Memory(bytes).open().await.unwrap();
        assert_eq!(reader.next_record().await.unwrap(), Some(record(7)));

        let Err(err) = LogSource::File(dir.path().join("missing.log")).open().await else {
            panic!("opening a missing log should fail");
        };
        assert!(err.is_fatal());
    }
}
