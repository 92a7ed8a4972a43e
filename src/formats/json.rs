//! JSONL spool queue.
//!
//! Buffers queued messages per destination and writes them to
//! `<dir>/<destination>/` as JSON lines, rotating by size.

use crate::core::event::QueuedRecord;
use crate::core::traits::{BatchEntry, BatchResponse, MessageQueue, QueueError};
use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File-backed queue that accepts every entry it can write.
pub struct SpoolQueue {
    dir: PathBuf,
    target_size_bytes: u64,
    compression: SpoolCompression,
    spools: HashMap<String, SpoolBuffer>,
}

#[derive(Debug, Clone, Copy)]
enum SpoolCompression {
    None,
    Gzip,
}

impl SpoolQueue {
    /// Creates a spool rooted at `dir` that starts a new file once a
    /// destination's buffer reaches `target_size_mb`.
    pub fn new(
        dir: impl Into<PathBuf>,
        target_size_mb: u64,
        compression: Option<&str>,
    ) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let compression = parse_compression(compression)?;
        Ok(Self {
            dir,
            target_size_bytes: target_size_mb.saturating_mul(1024 * 1024),
            compression,
            spools: HashMap::new(),
        })
    }

    /// Writes every buffered destination to disk.
    pub fn close(&mut self) -> io::Result<()> {
        for (destination, spool) in self.spools.iter_mut() {
            flush_spool(&self.dir, destination, spool, self.compression)?;
        }
        Ok(())
    }

    fn append(&mut self, destination: &str, record: &QueuedRecord) -> io::Result<()> {
        let line = serde_json::to_vec(record)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let spool = self
            .spools
            .entry(destination.to_string())
            .or_insert_with(SpoolBuffer::new);
        spool.buffer.extend_from_slice(&line);
        spool.buffer.push(b'\n');
        spool.record_count += 1;

        if spool.buffer.len() as u64 >= self.target_size_bytes {
            flush_spool(&self.dir, destination, spool, self.compression)?;
        }
        Ok(())
    }
}

impl MessageQueue for SpoolQueue {
    fn send_batch(
        &mut self,
        entries: &[BatchEntry],
        destination: &str,
    ) -> Result<BatchResponse, QueueError> {
        let mut successful = Vec::with_capacity(entries.len());
        for entry in entries {
            let record = QueuedRecord {
                message_id: message_id(),
                body: entry.body.clone(),
            };
            self.append(destination, &record)?;
            successful.push(entry.id.clone());
        }
        Ok(BatchResponse {
            successful: Some(successful),
            failed: Some(Vec::new()),
        })
    }
}

struct SpoolBuffer {
    buffer: Vec<u8>,
    record_count: u64,
}

impl SpoolBuffer {
    fn new() -> Self {
        Self {
            buffer: Vec::new(),
            record_count: 0,
        }
    }
}

fn flush_spool(
    dir: &Path,
    destination: &str,
    spool: &mut SpoolBuffer,
    compression: SpoolCompression,
) -> io::Result<()> {
    if spool.buffer.is_empty() {
        return Ok(());
    }

    let target_dir = dir.join(sanitize_destination(destination));
    fs::create_dir_all(&target_dir)?;
    let ext = match compression {
        SpoolCompression::None => "jsonl",
        SpoolCompression::Gzip => "jsonl.gz",
    };
    let path = target_dir.join(format!("{}_{}.{ext}", current_stamp(), file_suffix()));
    let file = File::create(&path)?;
    match compression {
        SpoolCompression::None => {
            let mut file = file;
            file.write_all(&spool.buffer)?;
        }
        SpoolCompression::Gzip => {
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(&spool.buffer)?;
            encoder.finish()?;
        }
    }
    debug!(path = %path.display(), records = spool.record_count, "spool file written");

    spool.buffer.clear();
    spool.record_count = 0;
    Ok(())
}

/// Reads every record from a spool file, decompressing `.gz` files.
pub fn read_spool_file(path: impl AsRef<Path>) -> io::Result<Vec<QueuedRecord>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let reader: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    let mut records = Vec::new();
    for line in BufReader::new(reader).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        records.push(record);
    }
    Ok(records)
}

fn sanitize_destination(destination: &str) -> String {
    let cleaned: String = destination
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}

fn current_stamp() -> String {
    Utc::now().format("%Y%m%dT%H%M%SZ").to_string()
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn message_id() -> String {
    random_token(24)
}

fn file_suffix() -> String {
    random_token(16).to_lowercase()
}

fn parse_compression(value: Option<&str>) -> io::Result<SpoolCompression> {
    let Some(value) = value else {
        return Ok(SpoolCompression::None);
    };
    let normalized = value.trim().to_lowercase();
    if normalized.is_empty() {
        return Ok(SpoolCompression::None);
    }
    match normalized.as_str() {
        "gzip" | "gz" => Ok(SpoolCompression::Gzip),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsupported spool compression: {value}"),
        )),
    }
}
