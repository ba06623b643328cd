//! AOF file handle
//!
//! Appends, syncs and replays the log under a single mutex so a sync never
//! observes half of a record.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::config::SyncStrategy;
use crate::error::{KvError, Result};
use crate::protocol::{encode, RespReader, Value};

/// Outcome of a replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Number of records decoded and handed to the apply function
    pub records: u64,

    /// Bytes of log consumed
    pub bytes: u64,
}

/// File operations an append needs, so rollback can be exercised without a disk fault
trait LogSink: Write {
    fn sync_data(&self) -> io::Result<()>;
    fn set_len(&self, len: u64) -> io::Result<()>;
}

impl LogSink for File {
    fn sync_data(&self) -> io::Result<()> {
        File::sync_data(self)
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

/// Open log state; `None` in [`Aof`] once closed
struct LogFile<F = File> {
    file: F,

    /// Logical end of the log (offset where the next record lands)
    len: u64,
}

impl<F: LogSink> LogFile<F> {
    /// Write one encoded record, fsyncing it when `sync` is set
    ///
    /// On any failure the file is cut back to `len`, so a record the caller
    /// reported as failed is never replayed.
    fn append_record(&mut self, bytes: &[u8], sync: bool) -> io::Result<()> {
        let written = self.file.write_all(bytes).and_then(|()| {
            if sync {
                self.file.sync_data()
            } else {
                Ok(())
            }
        });

        if let Err(e) = written {
            if let Err(trunc) = self.file.set_len(self.len) {
                error!(error = %trunc, "failed to roll back partial AOF record");
            }
            return Err(e);
        }

        self.len += bytes.len() as u64;
        Ok(())
    }
}

/// The append-only command log
pub struct Aof {
    path: PathBuf,
    strategy: SyncStrategy,
    file: Mutex<Option<LogFile>>,
}

impl Aof {
    /// Open or create the log for reading and appending
    ///
    /// Existing contents are never truncated.
    pub fn open(path: &Path, strategy: SyncStrategy) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        let len = file.metadata()?.len();

        info!(path = %path.display(), bytes = len, "AOF opened");

        Ok(Self {
            path: path.to_path_buf(),
            strategy,
            file: Mutex::new(Some(LogFile { file, len })),
        })
    }

    /// Append one request to the log
    ///
    /// The record is written with a single `write_all` while the lock is
    /// held. Under [`SyncStrategy::EveryWrite`] it is also fsynced before
    /// returning. If either step fails the file is cut back to its previous
    /// end, so a later replay never meets a torn or unacknowledged record.
    pub fn append(&self, record: &Value) -> Result<()> {
        let bytes = encode(record);

        let mut guard = self.file.lock();
        let log = guard
            .as_mut()
            .ok_or_else(|| KvError::Aof("log is closed".to_string()))?;

        log.append_record(&bytes, self.strategy == SyncStrategy::EveryWrite)?;
        Ok(())
    }

    /// Flush the log to stable storage
    ///
    /// A closed log has nothing left to flush, so this is a no-op after
    /// [`Aof::close`].
    pub fn sync(&self) -> Result<()> {
        let guard = self.file.lock();
        if let Some(log) = guard.as_ref() {
            log.file.sync_data()?;
        }
        Ok(())
    }

    /// Replay every record from the start of the log
    ///
    /// `apply` is called once per record, in file order. Replay stops
    /// cleanly at end of file; anything else that fails to decode, including
    /// a record cut off mid-way, aborts with [`KvError::Replay`].
    pub fn replay<F>(&self, mut apply: F) -> Result<ReplayStats>
    where
        F: FnMut(Value),
    {
        let mut guard = self.file.lock();
        let log = guard
            .as_mut()
            .ok_or_else(|| KvError::Aof("log is closed".to_string()))?;

        log.file.seek(SeekFrom::Start(0))?;
        let mut reader = RespReader::new(BufReader::new(&log.file));
        let mut stats = ReplayStats::default();

        loop {
            match reader.read_request() {
                Ok(Some(value)) => {
                    stats.records += 1;
                    apply(value);
                }
                Ok(None) => break,
                Err(e) => {
                    return Err(KvError::Replay {
                        record: stats.records + 1,
                        reason: e.to_string(),
                    })
                }
            }
        }

        stats.bytes = log.len;
        debug!(records = stats.records, bytes = stats.bytes, "AOF replay finished");
        Ok(stats)
    }

    /// fsync and release the file handle; further appends fail
    ///
    /// Safe to call more than once.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.file.lock();
        if let Some(log) = guard.take() {
            log.file.sync_all()?;
            info!(path = %self.path.display(), bytes = log.len, "AOF closed");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.file.lock().is_none()
    }

    /// Current size of the log in bytes (0 once closed)
    pub fn len(&self) -> u64 {
        self.file.lock().as_ref().map(|log| log.len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn strategy(&self) -> SyncStrategy {
        self.strategy
    }
}

impl Drop for Aof {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(error = %e, "failed to close AOF");
        }
    }
}
