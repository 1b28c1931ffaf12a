/// Reads and writes the packed file format: an 18-byte header
/// followed by the raw bucket blob, verbatim.
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use log::{debug, warn};

use crate::error::{IndexError, Result};
use crate::layout::{HEADER_SIZE, MAGIC};

pub struct RawIndex {
    pub num_entries: u32,
    pub num_buckets: u32,
    pub key_size: u8,
    pub value_size: u8,
    pub buckets: Vec<u8>,
}

fn io_err(path: &Path, source: std::io::Error) -> IndexError {
    IndexError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn corrupt(path: &Path, reason: impl Into<String>) -> IndexError {
    IndexError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Read and validate a hash index file: header read succeeds, magic
/// matches, file length matches the declared bucket count, bucket
/// read succeeds.
pub fn read(path: &Path) -> Result<RawIndex> {
    let mut file = File::open(path).map_err(|e| io_err(path, e))?;

    let mut header = [0u8; HEADER_SIZE];
    file.read_exact(&mut header).map_err(|e| {
        warn!("hashindex: {}: failed to read header: {e}", path.display());
        io_err(path, e)
    })?;

    if header[0..8] != MAGIC[..] {
        warn!("hashindex: {}: bad magic", path.display());
        return Err(corrupt(path, "bad magic"));
    }

    let num_entries = u32::from_le_bytes(header[8..12].try_into().unwrap());
    let num_buckets = u32::from_le_bytes(header[12..16].try_into().unwrap());
    let key_size = header[16];
    let value_size = header[17];

    let bucket_size = key_size as u64 + value_size as u64;
    let expected_buckets_len = num_buckets as u64 * bucket_size;

    let file_len = file
        .metadata()
        .map_err(|e| io_err(path, e))?
        .len();
    let expected_len = HEADER_SIZE as u64 + expected_buckets_len;
    if file_len != expected_len {
        warn!(
            "hashindex: {}: length mismatch (expected {expected_len}, got {file_len})",
            path.display()
        );
        return Err(corrupt(
            path,
            format!("length mismatch: expected {expected_len}, got {file_len}"),
        ));
    }

    let mut buckets = vec![0u8; expected_buckets_len as usize];
    file.read_exact(&mut buckets).map_err(|e| {
        warn!("hashindex: {}: short bucket read: {e}", path.display());
        io_err(path, e)
    })?;

    debug!(
        "hashindex: read {}: {num_entries} entries, {num_buckets} buckets",
        path.display()
    );

    Ok(RawIndex {
        num_entries,
        num_buckets,
        key_size,
        value_size,
        buckets,
    })
}

/// Write the packed header followed by the raw bucket blob, verbatim.
///
/// Crash-atomicity (write-to-temp + rename) is the caller's
/// responsibility; this function performs a single direct write.
pub fn write(
    path: &Path,
    num_entries: u32,
    num_buckets: u32,
    key_size: u8,
    value_size: u8,
    buckets: &[u8],
) -> Result<()> {
    let mut file = File::create(path).map_err(|e| io_err(path, e))?;

    let mut header = [0u8; HEADER_SIZE];
    header[0..8].copy_from_slice(&MAGIC);
    header[8..12].copy_from_slice(&num_entries.to_le_bytes());
    header[12..16].copy_from_slice(&num_buckets.to_le_bytes());
    header[16] = key_size;
    header[17] = value_size;

    file.write_all(&header).map_err(|e| io_err(path, e))?;
    file.write_all(buckets).map_err(|e| io_err(path, e))?;
    file.flush().map_err(|e| io_err(path, e))?;

    debug!(
        "hashindex: wrote {}: {num_entries} entries, {num_buckets} buckets",
        path.display()
    );

    Ok(())
}
