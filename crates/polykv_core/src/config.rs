//! Database configuration.
//!
//! Callers hand the engine a stringly-typed map (the shape produced by
//! host-application bindings and JSON config files). [`OpenOptions::from_map`]
//! parses it once, at open time, into a typed structure; malformed values
//! for recognized keys fail with `InvalidArgument`, unrecognized keys are
//! retained verbatim and surfaced through `inspect` for forward
//! compatibility.

use crate::comparator::KeyComparator;
use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Backend class selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendClass {
    /// On-disk hash table. Unordered. The default.
    #[default]
    Hash,
    /// On-disk ordered tree store.
    Tree,
    /// Append-only ordered store for bulk sorted writes.
    Skip,
    /// In-memory hash store.
    MemHash,
    /// In-memory ordered store.
    MemTree,
    /// In-memory bounded store with LRU eviction.
    Cache,
}

impl BackendClass {
    /// Parses a class name from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] naming the unknown class.
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "tree" => Ok(Self::Tree),
            "skip" => Ok(Self::Skip),
            "memhash" => Ok(Self::MemHash),
            "memtree" => Ok(Self::MemTree),
            "cache" => Ok(Self::Cache),
            other => Err(Error::invalid_argument(format!(
                "unknown backend class: {other}"
            ))),
        }
    }

    /// Returns the configuration name of this class.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Hash => "hash",
            Self::Tree => "tree",
            Self::Skip => "skip",
            Self::MemHash => "memhash",
            Self::MemTree => "memtree",
            Self::Cache => "cache",
        }
    }

    /// Whether this class keeps its records in comparator order.
    #[must_use]
    pub const fn is_ordered(self) -> bool {
        matches!(self, Self::Tree | Self::Skip | Self::MemTree)
    }

    /// Whether this class persists to a file and therefore needs a path.
    #[must_use]
    pub const fn needs_path(self) -> bool {
        matches!(self, Self::Hash | Self::Tree | Self::Skip)
    }
}

/// Per-record value compression codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Values stored verbatim. The default.
    #[default]
    None,
    /// Values stored zlib-compressed (hash backend only).
    Zlib,
}

impl Compression {
    fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "zlib" => Ok(Self::Zlib),
            other => Err(Error::invalid_argument(format!(
                "unknown compression codec: {other}"
            ))),
        }
    }

    /// Returns the configuration name of this codec.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Zlib => "zlib",
        }
    }
}

/// Update-log configuration.
#[derive(Debug, Clone)]
pub struct UlogOptions {
    /// Path prefix for log segment files (`{prefix}.0000000001`, ...).
    pub prefix: PathBuf,
    /// Maximum segment size before rotation, in bytes.
    pub max_file_size: u64,
    /// Identifier of the writing server, recorded in every entry.
    pub server_id: u32,
    /// Index of the logical database within a shared log stream.
    pub dbm_index: u32,
}

impl UlogOptions {
    /// Creates update-log options with default rotation size and IDs.
    #[must_use]
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            max_file_size: 64 * 1024 * 1024,
            server_id: 0,
            dbm_index: 0,
        }
    }
}

/// Typed configuration for opening a database.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Backend class.
    pub class: BackendClass,
    /// Whether the handle may mutate records.
    pub writable: bool,
    /// Hash bucket count (hash backends).
    pub num_buckets: u64,
    /// Record alignment is `2^align_pow` bytes (hash backend).
    pub align_pow: u8,
    /// Key comparator (ordered backends).
    pub key_comparator: KeyComparator,
    /// Per-record value compression (hash backend).
    pub record_compression: Compression,
    /// Record capacity for the cache backend.
    pub cap_rec_num: u64,
    /// Update-log configuration, when logging is enabled.
    pub ulog: Option<UlogOptions>,
    /// Recognized tuning keys the Rust structures do not act on
    /// (`offset_width`, `max_branches`, `update_mode`, ...). Validated
    /// for well-formedness and surfaced through `inspect`.
    pub tuning: BTreeMap<String, String>,
    /// Unrecognized keys, passed through without validation.
    pub extra: BTreeMap<String, String>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            class: BackendClass::default(),
            writable: true,
            num_buckets: 1021,
            align_pow: 3,
            key_comparator: KeyComparator::default(),
            record_compression: Compression::default(),
            cap_rec_num: 65536,
            ulog: None,
            tuning: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }
}

/// Tuning keys that are recognized and recorded but do not change the
/// shape of the Rust structures.
const ADVISORY_KEYS: &[&str] = &[
    "offset_width",
    "file",
    "min_read_size",
    "cache_buckets",
    "update_mode",
    "restore_mode",
    "page_update_mode",
    "max_branches",
];

impl OpenOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the backend class.
    #[must_use]
    pub fn class(mut self, class: BackendClass) -> Self {
        self.class = class;
        self
    }

    /// Sets whether the handle may mutate records.
    #[must_use]
    pub fn writable(mut self, value: bool) -> Self {
        self.writable = value;
        self
    }

    /// Sets the hash bucket count.
    #[must_use]
    pub fn num_buckets(mut self, value: u64) -> Self {
        self.num_buckets = value;
        self
    }

    /// Sets the record alignment power.
    #[must_use]
    pub fn align_pow(mut self, value: u8) -> Self {
        self.align_pow = value;
        self
    }

    /// Sets the key comparator.
    #[must_use]
    pub fn key_comparator(mut self, value: KeyComparator) -> Self {
        self.key_comparator = value;
        self
    }

    /// Sets the per-record compression codec.
    #[must_use]
    pub fn record_compression(mut self, value: Compression) -> Self {
        self.record_compression = value;
        self
    }

    /// Sets the cache backend record capacity.
    #[must_use]
    pub fn cap_rec_num(mut self, value: u64) -> Self {
        self.cap_rec_num = value;
        self
    }

    /// Enables the update log.
    #[must_use]
    pub fn ulog(mut self, value: UlogOptions) -> Self {
        self.ulog = Some(value);
        self
    }

    /// Parses a stringly-typed configuration map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a malformed value of a
    /// recognized key. Unrecognized keys never fail.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let mut opts = Self::default();
        let mut ulog_prefix: Option<PathBuf> = None;
        let mut ulog_max_file_size: Option<u64> = None;
        let mut ulog_server_id: Option<u32> = None;
        let mut ulog_dbm_index: Option<u32> = None;

        for (key, value) in map {
            match key.as_str() {
                "class" | "dbm" => opts.class = BackendClass::parse(value)?,
                "writable" => opts.writable = parse_bool(key, value)?,
                "num_buckets" => opts.num_buckets = parse_num(key, value)?,
                "align_pow" => opts.align_pow = parse_num(key, value)?,
                "key_comparator" => opts.key_comparator = KeyComparator::parse(value)?,
                "record_comp_mode" => opts.record_compression = Compression::parse(value)?,
                "cap_rec_num" => opts.cap_rec_num = parse_num(key, value)?,
                "ulog_prefix" => ulog_prefix = Some(PathBuf::from(value)),
                "ulog_max_file_size" => ulog_max_file_size = Some(parse_num(key, value)?),
                "ulog_server_id" => ulog_server_id = Some(parse_num(key, value)?),
                "ulog_dbm_index" => ulog_dbm_index = Some(parse_num(key, value)?),
                _ if ADVISORY_KEYS.contains(&key.as_str()) => {
                    if key == "max_branches" || key == "offset_width" || key == "min_read_size" {
                        let _: u64 = parse_num(key, value)?;
                    }
                    opts.tuning.insert(key.clone(), value.clone());
                }
                _ => {
                    opts.extra.insert(key.clone(), value.clone());
                }
            }
        }

        if let Some(prefix) = ulog_prefix {
            let mut ulog = UlogOptions::new(prefix);
            if let Some(size) = ulog_max_file_size {
                ulog.max_file_size = size;
            }
            if let Some(id) = ulog_server_id {
                ulog.server_id = id;
            }
            if let Some(index) = ulog_dbm_index {
                ulog.dbm_index = index;
            }
            opts.ulog = Some(ulog);
        }

        check_hash_tuning(opts.num_buckets, opts.align_pow)?;
        Ok(opts)
    }
}

/// Largest accepted `align_pow`; the alignment arithmetic works in `u64`.
pub(crate) const MAX_ALIGN_POW: u8 = 16;

/// Largest accepted hash bucket count (an 8 GiB bucket table).
pub(crate) const MAX_NUM_BUCKETS: u64 = 1 << 30;

/// Range-checks the hash backend tuning knobs.
pub(crate) fn check_hash_tuning(num_buckets: u64, align_pow: u8) -> Result<()> {
    if align_pow > MAX_ALIGN_POW {
        return Err(Error::invalid_argument(format!(
            "align_pow {align_pow} exceeds the maximum of {MAX_ALIGN_POW}"
        )));
    }
    if num_buckets > MAX_NUM_BUCKETS {
        return Err(Error::invalid_argument(format!(
            "num_buckets {num_buckets} exceeds the maximum of {MAX_NUM_BUCKETS}"
        )));
    }
    Ok(())
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        Error::invalid_argument(format!("malformed value for {key}: {value}"))
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::invalid_argument(format!(
            "malformed value for {key}: {value}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults() {
        let opts = OpenOptions::default();
        assert_eq!(opts.class, BackendClass::Hash);
        assert!(opts.writable);
        assert_eq!(opts.num_buckets, 1021);
        assert!(opts.ulog.is_none());
    }

    #[test]
    fn parses_backend_and_tuning() {
        let opts = OpenOptions::from_map(&map(&[
            ("class", "tree"),
            ("key_comparator", "decimal"),
            ("max_branches", "256"),
        ]))
        .unwrap();

        assert_eq!(opts.class, BackendClass::Tree);
        assert_eq!(opts.key_comparator, KeyComparator::Decimal);
        assert_eq!(opts.tuning.get("max_branches").unwrap(), "256");
    }

    #[test]
    fn parses_ulog_group() {
        let opts = OpenOptions::from_map(&map(&[
            ("ulog_prefix", "/tmp/db-ulog"),
            ("ulog_max_file_size", "4096"),
            ("ulog_server_id", "3"),
            ("ulog_dbm_index", "1"),
        ]))
        .unwrap();

        let ulog = opts.ulog.unwrap();
        assert_eq!(ulog.prefix, PathBuf::from("/tmp/db-ulog"));
        assert_eq!(ulog.max_file_size, 4096);
        assert_eq!(ulog.server_id, 3);
        assert_eq!(ulog.dbm_index, 1);
    }

    #[test]
    fn unrecognized_keys_pass_through() {
        let opts = OpenOptions::from_map(&map(&[("future_option", "whatever")])).unwrap();
        assert_eq!(opts.extra.get("future_option").unwrap(), "whatever");
    }

    #[test]
    fn malformed_recognized_value_fails() {
        let err = OpenOptions::from_map(&map(&[("num_buckets", "many")])).unwrap_err();
        assert!(err.to_string().contains("num_buckets"));

        let err = OpenOptions::from_map(&map(&[("class", "btree9000")])).unwrap_err();
        assert!(err.to_string().contains("btree9000"));
    }

    #[test]
    fn out_of_range_hash_tuning_fails() {
        let err = OpenOptions::from_map(&map(&[("align_pow", "200")])).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));

        let err = OpenOptions::from_map(&map(&[("num_buckets", "18446744073709551615")]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));

        // The limits themselves are accepted.
        let opts =
            OpenOptions::from_map(&map(&[("align_pow", "16"), ("num_buckets", "1073741824")]))
                .unwrap();
        assert_eq!(opts.align_pow, 16);
    }

    #[test]
    fn builder_pattern() {
        let opts = OpenOptions::new()
            .class(BackendClass::MemTree)
            .writable(false)
            .cap_rec_num(128);
        assert_eq!(opts.class, BackendClass::MemTree);
        assert!(!opts.writable);
        assert_eq!(opts.cap_rec_num, 128);
    }
}
