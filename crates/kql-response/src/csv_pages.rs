//! Indexable row access over a folder of headerless CSV shards (`1.csv`, `2.csv`, ...).
//!
//! Shard `k` holds rows `[(k-1) * window, k * window)`. Only one shard (the current window) is
//! held in memory at a time; a request outside it reloads the owning shard wholesale. The
//! index → shard mapping does not depend on access order, so random access is always correct,
//! while monotonic access loads each shard at most once.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value as JsonValue;

use crate::options::CsvPageOptions;

/// One raw row; cells are the CSV fields as JSON strings.
pub type SharedRow = Arc<[JsonValue]>;

#[derive(Debug, thiserror::Error)]
pub enum CsvPageError {
    #[error("failed to read row shard `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("csv parse error in row shard `{path}` at row {row}: {reason}")]
    Parse {
        path: PathBuf,
        row: u64,
        reason: String,
    },
}

#[derive(Debug)]
struct CsvWindow {
    /// 1-based shard number.
    shard: usize,
    start_row: usize,
    rows: Vec<SharedRow>,
}

#[derive(Debug)]
pub struct PagedCsvRowSource {
    folder: PathBuf,
    window_size: usize,
    window: Option<CsvWindow>,
    shard_loads: usize,
}

impl PagedCsvRowSource {
    pub fn new(folder: impl Into<PathBuf>, options: CsvPageOptions) -> Self {
        Self {
            folder: folder.into(),
            window_size: options.window_size_rows.max(1),
            window: None,
            shard_loads: 0,
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Number of shard files read so far.
    pub fn shard_loads(&self) -> usize {
        self.shard_loads
    }

    pub fn shard_path(&self, shard: usize) -> PathBuf {
        self.folder.join(format!("{shard}.csv"))
    }

    /// Row `index`, or `None` when it lies past the last shard (or past the end of a short
    /// final shard).
    pub fn get(&mut self, index: usize) -> Result<Option<SharedRow>, CsvPageError> {
        let shard = index / self.window_size + 1;
        let offset = index % self.window_size;

        if let Some(window) = &self.window {
            if window.shard == shard {
                return Ok(window.rows.get(offset).cloned());
            }
        }

        let Some(rows) = self.load_shard(shard)? else {
            return Ok(None);
        };
        let row = rows.get(offset).cloned();
        self.window = Some(CsvWindow {
            shard,
            start_row: (shard - 1) * self.window_size,
            rows,
        });
        Ok(row)
    }

    /// Total row count, found by walking shards until one is missing or short.
    ///
    /// This reads every shard once; callers that only need bounded access should avoid it.
    pub fn len(&mut self) -> Result<usize, CsvPageError> {
        let mut shard = 1;
        loop {
            let cached = self
                .window
                .as_ref()
                .filter(|w| w.shard == shard)
                .map(|w| w.rows.len());
            let rows_in_shard = match cached {
                Some(n) => Some(n),
                None => self.load_shard(shard)?.map(|rows| rows.len()),
            };
            let base = (shard - 1) * self.window_size;
            match rows_in_shard {
                Some(n) if n == self.window_size => shard += 1,
                Some(n) => {
                    log::debug!(
                        "row shards in `{}` hold {} rows",
                        self.folder.display(),
                        base + n
                    );
                    return Ok(base + n);
                }
                None => return Ok(base),
            }
        }
    }

    pub fn is_empty(&mut self) -> Result<bool, CsvPageError> {
        Ok(self.get(0)?.is_none())
    }

    /// First row index held by the current window, if any shard is loaded.
    pub fn window_start(&self) -> Option<usize> {
        self.window.as_ref().map(|w| w.start_row)
    }

    fn load_shard(&mut self, shard: usize) -> Result<Option<Vec<SharedRow>>, CsvPageError> {
        let path = self.shard_path(shard);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CsvPageError::Io { path, source }),
        };

        let started = Instant::now();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);

        let mut rows = Vec::with_capacity(self.window_size.min(4096));
        // Read one record past the window to detect a writer that used a larger window.
        for (idx, record) in reader.records().take(self.window_size + 1).enumerate() {
            let record = record.map_err(|err| CsvPageError::Parse {
                path: path.clone(),
                row: idx as u64 + 1,
                reason: err.to_string(),
            })?;
            rows.push(
                record
                    .iter()
                    .map(|field| JsonValue::String(field.to_string()))
                    .collect::<SharedRow>(),
            );
        }
        if rows.len() > self.window_size {
            log::warn!(
                "row shard `{}` holds more than {} rows; the writer used a different window size",
                path.display(),
                self.window_size
            );
            rows.truncate(self.window_size);
        }

        self.shard_loads += 1;
        log::debug!(
            "loaded row shard `{}` ({} rows) in {:?}",
            path.display(),
            rows.len(),
            started.elapsed()
        );
        Ok(Some(rows))
    }
}
