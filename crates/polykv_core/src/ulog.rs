//! Update log: a rotating, replayable record of every mutation.
//!
//! Each mutation applied through the facade is appended as one entry to
//! the current segment file `{prefix}.NNNNNNNNNN`. When a segment reaches
//! the configured size bound, the writer rotates to the next index.
//! Entries carry a monotonically increasing offset, the writing server's
//! ID, and the logical database index, so one log stream can serve
//! several databases and a restore can stop at a chosen point.
//!
//! # Entry envelope
//!
//! ```text
//! [ magic "PKUL" ][ version: u8 ][ op: u8 ][ payload_len: u32 ]
//! [ payload ][ crc32(payload): u32 ]
//! ```
//!
//! Payload: `[offset: u64][server_id: u32][dbm_index: u32]` followed by a
//! length-prefixed key/value frame.

use crate::config::UlogOptions;
use crate::error::{Error, Result};
use crate::wire::{self, SliceReader};
use parking_lot::Mutex;
use polykv_storage::{FileStorage, StorageFile};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const ULOG_MAGIC: [u8; 4] = *b"PKUL";
const ULOG_VERSION: u8 = 1;

/// Kind of mutation recorded in a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UlogOp {
    /// A record was stored or replaced.
    Set,
    /// A record was removed.
    Remove,
    /// The whole database was cleared.
    Clear,
}

impl UlogOp {
    const fn as_byte(self) -> u8 {
        match self {
            Self::Set => 1,
            Self::Remove => 2,
            Self::Clear => 3,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Set),
            2 => Some(Self::Remove),
            3 => Some(Self::Clear),
            _ => None,
        }
    }
}

/// One decoded update-log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UlogEntry {
    /// Monotonic position in the log stream, starting at 1.
    pub offset: u64,
    /// Identifier of the server that wrote the entry.
    pub server_id: u32,
    /// Logical database index within the stream.
    pub dbm_index: u32,
    /// The mutation kind.
    pub op: UlogOp,
    /// The record key (empty for [`UlogOp::Clear`]).
    pub key: Vec<u8>,
    /// The record value (empty for remove and clear).
    pub value: Vec<u8>,
}

struct SegmentState {
    index: u64,
    storage: FileStorage,
    next_offset: u64,
}

/// Appends mutation entries to rotating segment files.
pub struct UlogWriter {
    prefix: PathBuf,
    max_file_size: u64,
    server_id: u32,
    dbm_index: u32,
    state: Mutex<SegmentState>,
}

impl std::fmt::Debug for UlogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UlogWriter")
            .field("prefix", &self.prefix)
            .field("max_file_size", &self.max_file_size)
            .finish()
    }
}

impl UlogWriter {
    /// Opens the log for appending, resuming after existing segments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corruption`] if an existing non-final segment is
    /// malformed, or an I/O error from the filesystem.
    pub fn open(opts: &UlogOptions) -> Result<Self> {
        let segments = list_segments(&opts.prefix)?;
        let (index, next_offset) = if segments.is_empty() {
            (1, 1)
        } else {
            let entries = read_entries(&opts.prefix)?;
            let max = entries.iter().map(|e| e.offset).max().unwrap_or(0);
            let last = segments[segments.len() - 1].0;
            (last, max + 1)
        };

        let storage = FileStorage::open(&segment_path(&opts.prefix, index))?;
        debug!(
            prefix = %opts.prefix.display(),
            segment = index,
            next_offset,
            "opened update log"
        );
        Ok(Self {
            prefix: opts.prefix.clone(),
            max_file_size: opts.max_file_size,
            server_id: opts.server_id,
            dbm_index: opts.dbm_index,
            state: Mutex::new(SegmentState {
                index,
                storage,
                next_offset,
            }),
        })
    }

    /// Appends one entry, rotating the segment first if it is full.
    /// Returns the entry's offset.
    pub fn write(&self, op: UlogOp, key: &[u8], value: &[u8]) -> Result<u64> {
        let mut state = self.state.lock();
        if state.storage.size()? >= self.max_file_size {
            state.storage.sync()?;
            let next_index = state.index + 1;
            let storage = FileStorage::open(&segment_path(&self.prefix, next_index))?;
            debug!(prefix = %self.prefix.display(), segment = next_index, "rotated update log");
            state.index = next_index;
            state.storage = storage;
        }

        let offset = state.next_offset;
        let mut payload = Vec::with_capacity(24 + key.len() + value.len());
        payload.extend_from_slice(&offset.to_le_bytes());
        payload.extend_from_slice(&self.server_id.to_le_bytes());
        payload.extend_from_slice(&self.dbm_index.to_le_bytes());
        wire::put_frame(&mut payload, key, value);

        let mut buf = Vec::with_capacity(14 + payload.len());
        buf.extend_from_slice(&ULOG_MAGIC);
        buf.push(ULOG_VERSION);
        buf.push(op.as_byte());
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&payload);
        buf.extend_from_slice(&wire::compute_crc32(&payload).to_le_bytes());

        state.storage.append(&buf)?;
        state.storage.flush()?;
        state.next_offset = offset + 1;
        Ok(offset)
    }

    /// Flushes the current segment; `hard` reaches the device.
    pub fn sync(&self, hard: bool) -> Result<()> {
        let state = self.state.lock();
        state.storage.flush()?;
        if hard {
            state.storage.sync()?;
        }
        Ok(())
    }
}

fn segment_path(prefix: &Path, index: u64) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(format!(".{index:010}"));
    PathBuf::from(name)
}

/// Lists existing segment files for a prefix, in index order.
pub(crate) fn list_segments(prefix: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let parent = match prefix.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let Some(stem) = prefix.file_name() else {
        return Err(Error::invalid_argument("update log prefix has no file name"));
    };
    let mut stem = stem.to_string_lossy().into_owned();
    stem.push('.');

    let mut segments = Vec::new();
    if !parent.exists() {
        return Ok(segments);
    }
    for entry in std::fs::read_dir(&parent)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(suffix) = name.strip_prefix(&stem) {
            if suffix.len() == 10 && suffix.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(index) = suffix.parse::<u64>() {
                    segments.push((index, entry.path()));
                }
            }
        }
    }
    segments.sort_unstable_by_key(|(index, _)| *index);
    Ok(segments)
}

/// Reads every entry across all segments, in offset order.
///
/// A torn entry at the tail of the final segment - the signature of a
/// crashed writer - is dropped with a warning. The same damage anywhere
/// else is corruption.
///
/// # Errors
///
/// Returns [`Error::Corruption`] for a malformed non-final segment or a
/// checksum mismatch.
pub fn read_entries(prefix: &Path) -> Result<Vec<UlogEntry>> {
    let segments = list_segments(prefix)?;
    let mut entries = Vec::new();
    for (position, (index, path)) in segments.iter().enumerate() {
        let data = std::fs::read(path)?;
        let (segment_entries, clean) = parse_segment(&data)?;
        let is_last = position == segments.len() - 1;
        if !clean {
            if is_last {
                warn!(segment = index, "dropping torn tail entry from update log");
            } else {
                return Err(Error::corruption(format!(
                    "update log segment {index} is truncated mid-stream"
                )));
            }
        }
        entries.extend(segment_entries);
    }
    Ok(entries)
}

/// Parses one segment. Returns the entries and whether the segment ended
/// cleanly on an entry boundary.
fn parse_segment(data: &[u8]) -> Result<(Vec<UlogEntry>, bool)> {
    let mut reader = SliceReader::new(data);
    let mut entries = Vec::new();
    while reader.remaining() > 0 {
        if reader.remaining() < 14 {
            return Ok((entries, false));
        }
        let magic = reader.read_bytes(4)?;
        if magic != ULOG_MAGIC {
            return Err(Error::corruption("bad update log entry magic"));
        }
        let version = reader.read_u8()?;
        if version != ULOG_VERSION {
            return Err(Error::corruption(format!(
                "unsupported update log version {version}"
            )));
        }
        let op_byte = reader.read_u8()?;
        let op = UlogOp::from_byte(op_byte)
            .ok_or_else(|| Error::corruption(format!("unknown update log op {op_byte}")))?;
        let payload_len = reader.read_u32()? as usize;
        if reader.remaining() < payload_len + 4 {
            return Ok((entries, false));
        }
        let payload = reader.read_bytes(payload_len)?;
        let stored_crc = reader.read_u32()?;
        if wire::compute_crc32(payload) != stored_crc {
            return Err(Error::corruption("update log entry checksum mismatch"));
        }

        let mut payload_reader = SliceReader::new(payload);
        let offset = payload_reader.read_u64()?;
        let server_id = payload_reader.read_u32()?;
        let dbm_index = payload_reader.read_u32()?;
        let (key, value) = wire::read_frame(&mut payload_reader)?;
        entries.push(UlogEntry {
            offset,
            server_id,
            dbm_index,
            op,
            key,
            value,
        });
    }
    Ok((entries, true))
}
