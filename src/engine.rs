//! Engine Module
//!
//! Coordinates the AOF and the command dispatcher.
//!
//! ## Responsibilities
//! - Rebuild the in-memory tables from the AOF on startup
//! - Log every mutating command before it is applied
//! - Run the periodic sync task and stop it on shutdown

use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, info, trace, warn};

use crate::aof::{Aof, SyncTask};
use crate::command::{Command, Dispatcher, Request, Table};
use crate::config::Config;
use crate::error::Result;
use crate::protocol::Value;
use crate::store::MemoryStore;

/// What startup replay did with the records in the log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Records decoded from the log
    pub records: u64,

    /// Records executed against the store
    pub applied: u64,

    /// Records skipped because they were not a valid command
    pub skipped: u64,
}

/// The main engine
///
/// ## Ordering
///
/// - A mutating command is appended to the AOF before it touches the store;
///   if the append fails the store is left untouched
/// - Each table has a write gate held across append + apply, so the order of
///   records in the log matches the order the table saw them
/// - Writes to different tables take different gates; reads take no gate at
///   all and only contend on the store's RwLock
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Append-only log (shared with the sync task)
    aof: Arc<Aof>,

    /// Executes commands against the in-memory tables
    dispatcher: Dispatcher<MemoryStore>,

    /// Background fsync, present for `SyncStrategy::Interval`
    sync_task: Mutex<Option<SyncTask>>,

    /// Serializes SET-family log + apply
    string_writes: Mutex<()>,

    /// Serializes HSET-family log + apply
    hash_writes: Mutex<()>,

    /// Result of the startup replay
    replay: ReplaySummary,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate config and create the data directory
    /// 2. Open (or create) the AOF
    /// 3. Replay it into empty tables through the normal command path
    /// 4. Start the sync task if the strategy asks for one
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        // Step 1: Create data directory if it doesn't exist
        fs::create_dir_all(&config.data_dir)?;

        // Step 2: Open the log
        let aof = Arc::new(Aof::open(&config.aof_path(), config.sync_strategy)?);

        // Step 3: Replay into a fresh store
        let dispatcher = Dispatcher::new(Arc::new(MemoryStore::new()));
        let replay = Self::replay(&aof, &dispatcher)?;

        info!(
            records = replay.records,
            applied = replay.applied,
            skipped = replay.skipped,
            "AOF replay complete"
        );

        // Step 4: Periodic fsync
        let sync_task = match config.sync_strategy.interval() {
            Some(period) => Some(SyncTask::spawn(Arc::clone(&aof), period)?),
            None => None,
        };

        Ok(Self {
            config,
            aof,
            dispatcher,
            sync_task: Mutex::new(sync_task),
            string_writes: Mutex::new(()),
            hash_writes: Mutex::new(()),
            replay,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Feed every logged record through the dispatcher
    ///
    /// Records that are not a valid command are skipped with a warning
    /// rather than failing startup; a log that cannot be decoded fails it.
    fn replay(aof: &Aof, dispatcher: &Dispatcher<MemoryStore>) -> Result<ReplaySummary> {
        let mut summary = ReplaySummary::default();

        let stats = aof.replay(|value| {
            let command = Request::from_value(value)
                .map_err(|e| e.to_string())
                .and_then(|request| Command::parse(&request).map_err(|e| e.to_string()));

            match command {
                Ok(command) => {
                    dispatcher.apply(command);
                    summary.applied += 1;
                }
                Err(reason) => {
                    warn!(record = summary.applied + summary.skipped + 1, %reason, "skipping AOF record");
                    summary.skipped += 1;
                }
            }
        })?;

        summary.records = stats.records;
        Ok(summary)
    }

    /// Execute a client request
    ///
    /// Argument errors are returned as error replies without touching the
    /// log. `Err` means the AOF append failed: the command was not applied
    /// and must not be reported as successful.
    pub fn execute(&self, request: &Request) -> Result<Value> {
        let command = match Command::parse(request) {
            Ok(command) => command,
            Err(e) => {
                debug!(command = request.name(), error = %e, "rejected command");
                return Ok(e.into());
            }
        };

        if !command.is_mutating() {
            return Ok(self.dispatcher.apply(command));
        }

        let _gate = self.write_gate(command.table());

        if let Err(e) = self.aof.append(request.raw()) {
            error!(command = request.name(), error = %e, "AOF append failed, command not applied");
            return Err(e);
        }
        trace!(command = request.name(), "logged to AOF");

        Ok(self.dispatcher.apply(command))
    }

    fn write_gate(&self, table: Option<Table>) -> Option<MutexGuard<'_, ()>> {
        match table? {
            Table::Strings => Some(self.string_writes.lock()),
            Table::Hashes => Some(self.hash_writes.lock()),
        }
    }

    /// Force the AOF to stable storage now
    pub fn sync(&self) -> Result<()> {
        self.aof.sync()
    }

    /// Stop the sync task and close the AOF
    ///
    /// Every later mutating command fails. Safe to call more than once; also
    /// runs on drop.
    pub fn shutdown(&self) -> Result<()> {
        if let Some(mut task) = self.sync_task.lock().take() {
            task.shutdown();
        }
        self.aof.close()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The in-memory tables
    pub fn store(&self) -> &Arc<MemoryStore> {
        self.dispatcher.store()
    }

    pub fn dispatcher(&self) -> &Dispatcher<MemoryStore> {
        &self.dispatcher
    }

    /// Path of the append-only log
    pub fn aof_path(&self) -> &Path {
        self.aof.path()
    }

    /// Current AOF size in bytes
    pub fn aof_len(&self) -> u64 {
        self.aof.len()
    }

    /// What the startup replay did
    pub fn replay_summary(&self) -> ReplaySummary {
        self.replay
    }

    pub fn is_shut_down(&self) -> bool {
        self.aof.is_closed()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(error = %e, "engine shutdown failed");
        }
    }
}
