//! Rolling JSONL store - append-only persistence with bounded retention.
//!
//! One JSON object per line, so the format survives partial writes and
//! streams cheaply. The active file never holds entries older than the
//! retention window (24 h); when the oldest entry crosses that boundary the
//! store rolls over: the last carry window (3 h) of entries is copied into a
//! fresh file, the expiring file is archived with its rollover timestamp,
//! and the fresh file becomes active. Recent context therefore survives the
//! cut.
//!
//! Rollover is build-new-then-rename so a crash at any point leaves a state
//! the next open can repair without losing entries.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A stored entry with its insertion timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stamped<T> {
    pub ts: DateTime<Utc>,
    pub entry: T,
}

pub struct RollingStore<T> {
    path: PathBuf,
    retention: Duration,
    carry: Duration,
    _entry: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> RollingStore<T> {
    /// Open a store with the default 24 h retention / 3 h carry-forward.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        Self::with_windows(path, Duration::hours(24), Duration::hours(3))
    }

    pub fn with_windows(
        path: impl Into<PathBuf>,
        retention: Duration,
        carry: Duration,
    ) -> io::Result<Self> {
        let store = Self {
            path: path.into(),
            retention,
            carry,
            _entry: PhantomData,
        };
        if let Some(parent) = store.path.parent() {
            fs::create_dir_all(parent)?;
        }
        store.recover()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one immutable record. Retention bookkeeping runs lazily first,
    /// so the normal path is a single buffered line write.
    pub fn append(&self, now: DateTime<Utc>, entry: &T) -> io::Result<()> {
        self.rollover_if_needed(now)?;

        let json = serde_json::to_string(&StampedRef { ts: now, entry })
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{json}")?;
        file.flush()?;
        Ok(())
    }

    /// Entries from `now - window` to `now`, oldest first. Malformed lines
    /// are skipped, not fatal.
    pub fn read_window(&self, now: DateTime<Utc>, window: Duration) -> io::Result<Vec<Stamped<T>>> {
        let cutoff = now - window;
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|e| e.ts >= cutoff)
            .collect())
    }

    fn read_all(&self) -> io::Result<Vec<Stamped<T>>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&self.path)?;
        let reader = io::BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Stamped<T>>(&line) {
                Ok(entry) => entries.push(entry),
                Err(_) => continue,
            }
        }
        Ok(entries)
    }

    /// Roll the active file over once its oldest entry has aged past the
    /// retention boundary.
    fn rollover_if_needed(&self, now: DateTime<Utc>) -> io::Result<()> {
        let entries = self.read_all()?;
        let oldest = match entries.first() {
            Some(e) => e.ts,
            None => return Ok(()),
        };
        if now - oldest < self.retention {
            return Ok(());
        }

        // Build the replacement file fully before touching the active one.
        let cutoff = now - self.carry;
        let tmp = self.tmp_path();
        {
            let mut file = fs::File::create(&tmp)?;
            for entry in entries.iter().filter(|e| e.ts >= cutoff) {
                let json = serde_json::to_string(&StampedRef { ts: entry.ts, entry: &entry.entry })
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                writeln!(file, "{json}")?;
            }
            file.sync_all()?;
        }

        // Archive-then-swap: the full pre-rollover set moves aside, then the
        // carried window takes its place. Either rename failing leaves a
        // state recover() knows how to repair.
        let archive = self.archive_path(now);
        fs::rename(&self.path, &archive)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Repair a rollover interrupted between the two renames.
    ///
    /// Active present + tmp present: the tmp is a stale build, discard it.
    /// Active missing + tmp present: the archive rename landed but the swap
    /// did not; the tmp holds the carried window, promote it.
    fn recover(&self) -> io::Result<()> {
        let tmp = self.tmp_path();
        if !tmp.exists() {
            return Ok(());
        }
        if self.path.exists() {
            fs::remove_file(&tmp)?;
        } else {
            fs::rename(&tmp, &self.path)?;
        }
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut os = self.path.as_os_str().to_owned();
        os.push(".tmp");
        PathBuf::from(os)
    }

    fn archive_path(&self, now: DateTime<Utc>) -> PathBuf {
        let mut os = self.path.as_os_str().to_owned();
        os.push(format!(".{}.archive", now.format("%Y%m%dT%H%M%SZ")));
        PathBuf::from(os)
    }
}

/// Borrowed serialization twin of [`Stamped`], to append without cloning.
#[derive(Serialize)]
struct StampedRef<'a, T> {
    ts: DateTime<Utc>,
    entry: &'a T,
}
