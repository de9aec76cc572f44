// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Dual-file journal with rotation.
//!
//! Lock order: conservative mutex, then position lock, then the swap/force
//! lock. Appends reserve their offset under the position lock and take the
//! swap/force lock's read side before releasing it, so the bytes can be
//! written in parallel while rotation and `force()` (write side) wait for
//! every reserved write to land.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::config::Configuration;
use crate::time::Clock;
use crate::uid::{Uid, FORMAT_ID};

use super::{
    collect_dangling, next_record, DanglingRecords, Journal, JournalError, LogAppender,
    LogRecord, LogState, TxStatus,
};
use super::header::HEADER_LENGTH;

/// Settings the disk journal reads from [`Configuration`].
#[derive(Debug, Clone)]
struct DiskJournalSettings {
    part1: PathBuf,
    part2: PathBuf,
    capacity: u64,
    forced_write_enabled: bool,
    conservative_journaling: bool,
    skip_corrupted_logs: bool,
    filter_log_status: bool,
}

/// The two files of an open journal.
#[derive(Debug)]
struct JournalFiles {
    appenders: [LogAppender; 2],
    active: AtomicUsize,
    prior_state: LogState,
}

impl JournalFiles {
    #[inline]
    fn active_index(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    #[inline]
    fn active(&self) -> &LogAppender {
        &self.appenders[self.active_index()]
    }
}

/// Journal backed by two pre-allocated files.
pub struct DiskJournal {
    settings: DiskJournalSettings,
    clock: Arc<dyn Clock>,
    files: RwLock<Option<Arc<JournalFiles>>>,
    lifecycle_lock: Mutex<()>,
    conservative_lock: Mutex<()>,
    position_lock: Mutex<()>,
    swap_force_lock: RwLock<()>,
    needs_force: AtomicBool,
    sequence: AtomicI32,
    rotations: AtomicU64,
}

impl DiskJournal {
    /// Creates a closed journal. Call [`Journal::open`] before logging.
    pub fn new(config: &Configuration, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings: DiskJournalSettings {
                part1: config.log_part1_filename.clone(),
                part2: config.log_part2_filename.clone(),
                capacity: config.max_log_size_in_bytes(),
                forced_write_enabled: config.forced_write_enabled,
                conservative_journaling: config.conservative_journaling,
                skip_corrupted_logs: config.skip_corrupted_logs,
                filter_log_status: config.filter_log_status,
            },
            clock,
            files: RwLock::new(None),
            lifecycle_lock: Mutex::new(()),
            conservative_lock: Mutex::new(()),
            position_lock: Mutex::new(()),
            swap_force_lock: RwLock::new(()),
            needs_force: AtomicBool::new(false),
            sequence: AtomicI32::new(0),
            rotations: AtomicU64::new(0),
        }
    }

    /// Number of rotations since this journal was created.
    #[inline]
    pub fn rotation_count(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }

    /// Path of the file currently written to.
    pub fn active_path(&self) -> Option<PathBuf> {
        self.files
            .read()
            .as_ref()
            .map(|files| files.active().path().to_path_buf())
    }

    fn files(&self, operation: &'static str) -> Result<Arc<JournalFiles>, JournalError> {
        self.files
            .read()
            .clone()
            .ok_or(JournalError::NotOpen { operation })
    }

    fn next_sequence(&self) -> i32 {
        self.sequence.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Returns every record of the active file, in write order.
    ///
    /// With `include_invalid`, records failing the checksum are returned too.
    /// Other corruption is skipped or fatal depending on the configuration.
    pub fn read_records(&self, include_invalid: bool) -> Result<Vec<LogRecord>, JournalError> {
        let files = self.files("read records")?;
        let mut cursor = {
            let _position = self.position_lock.lock();
            let _swap = self.swap_force_lock.write();
            files.active().cursor()?
        };

        let mut records = Vec::new();
        while let Some(record) =
            next_record(&mut cursor, include_invalid, self.settings.skip_corrupted_logs)?
        {
            records.push(record);
        }
        Ok(records)
    }

    /// Copies the dangling records of this journal into `other`.
    pub fn migrate_to(&self, other: &dyn Journal) -> Result<(), JournalError> {
        let this = self as *const Self as *const ();
        let that = other as *const dyn Journal as *const ();
        if this == that {
            return Err(JournalError::SelfMigration);
        }

        let dangling = self.collect_dangling_records()?;
        for record in dangling.values() {
            other.log(record.status(), record.gtrid(), record.unique_names())?;
        }
        tracing::info!(migrated = dangling.len(), "migrated dangling records");
        Ok(())
    }

    fn create_log_files(&self) -> Result<(), JournalError> {
        let settings = &self.settings;
        tracing::debug!(
            part1 = %settings.part1.display(),
            part2 = %settings.part2.display(),
            "creating log files"
        );

        let part2_timestamp = self.clock.now_millis();
        LogAppender::create(&settings.part2, settings.capacity, FORMAT_ID, part2_timestamp)?;
        // Part 1 must carry a strictly later timestamp so it starts active.
        self.clock.wait_until_past(part2_timestamp);
        LogAppender::create(
            &settings.part1,
            settings.capacity,
            FORMAT_ID,
            self.clock.now_millis(),
        )?;
        Ok(())
    }

    fn check_format_id(&self, appender: &LogAppender) -> Result<(), JournalError> {
        let format_id = appender.header().format_id();
        if format_id == FORMAT_ID {
            return Ok(());
        }
        let err = JournalError::InvalidHeader {
            path: appender.path().to_path_buf(),
            reason: format!("unexpected format id {:#x}", format_id),
        };
        if !self.settings.skip_corrupted_logs {
            return Err(err);
        }
        tracing::error!(error = %err, "ignoring invalid log header");
        Ok(())
    }

    fn append(&self, files: &JournalFiles, record: &LogRecord) -> Result<(), JournalError> {
        let bytes = record.to_bytes();
        let len = bytes.len() as u64;
        let capacity = files.active().capacity();
        if len > capacity {
            return Err(JournalError::RecordTooLarge { size: len, capacity });
        }

        let _conservative = self
            .settings
            .conservative_journaling
            .then(|| self.conservative_lock.lock());

        let (target, offset, _write_guard) = {
            let _position = self.position_lock.lock();
            let reserved = files.active().reserve(len)?;
            let offset = match reserved {
                Some(offset) => offset,
                None => {
                    let _swap = self.swap_force_lock.write();
                    let (dangling, moved) = self.swap_journal_files(files)?;
                    files.active().reserve(len)?.ok_or(JournalError::Overflow {
                        dangling,
                        needed: moved + len,
                        capacity,
                    })?
                }
            };
            // Must be taken before the position lock is released.
            (files.active_index(), offset, self.swap_force_lock.read())
        };

        files.appenders[target].write_at(offset, &bytes)?;
        self.needs_force.store(true, Ordering::Release);
        Ok(())
    }

    /// Moves the dangling records to the passive file and makes it active.
    /// Caller holds the position lock and the swap/force write lock.
    ///
    /// Returns the number of records moved and their size in bytes.
    fn swap_journal_files(&self, files: &JournalFiles) -> Result<(usize, u64), JournalError> {
        let active_index = files.active_index();
        let passive_index = 1 - active_index;
        let active = &files.appenders[active_index];
        let passive = &files.appenders[passive_index];

        active.force()?;
        let dangling =
            collect_dangling(&mut active.cursor()?, self.settings.skip_corrupted_logs)?;

        passive.rewind()?;
        let needed: u64 = dangling.values().map(LogRecord::encoded_len).sum();
        if needed > passive.capacity() {
            return Err(JournalError::Overflow {
                dangling: dangling.len(),
                needed,
                capacity: passive.capacity(),
            });
        }
        for record in dangling.values() {
            if !passive.append(record)? {
                return Err(JournalError::Overflow {
                    dangling: dangling.len(),
                    needed,
                    capacity: passive.capacity(),
                });
            }
        }

        let timestamp = self.clock.now_millis().max(active.timestamp() + 1);
        passive.set_timestamp(timestamp)?;
        passive.set_state(LogState::Unclean)?;
        passive.force()?;
        files.active.store(passive_index, Ordering::Release);

        let rotations = self.rotations.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            from = %active.path().display(),
            to = %passive.path().display(),
            dangling = dangling.len(),
            rotations,
            "swapped journal files"
        );
        Ok((dangling.len(), needed))
    }
}

impl Journal for DiskJournal {
    #[inline]
    fn is_open(&self) -> bool {
        self.files.read().is_some()
    }

    fn open(&self) -> Result<LogState, JournalError> {
        let _lifecycle = self.lifecycle_lock.lock();
        if let Some(files) = self.files.read().as_ref() {
            tracing::warn!("disk journal already open");
            return Ok(files.prior_state);
        }

        let part1 = self.settings.part1.as_path();
        let part2 = self.settings.part2.as_path();
        if !part1.exists() && !part2.exists() {
            self.create_log_files()?;
        }

        let len1 = file_length(part1)?;
        let len2 = file_length(part2)?;
        if len1 != len2 {
            let err = JournalError::LengthMismatch {
                part1: len1,
                part2: len2,
            };
            if !self.settings.skip_corrupted_logs {
                return Err(err);
            }
            tracing::error!(error = %err, "transaction log files are not of the same length, corrupted files?");
        }
        let max_file_length = len1.max(len2);
        if max_file_length < HEADER_LENGTH {
            return Err(JournalError::InvalidHeader {
                path: part1.to_path_buf(),
                reason: format!("file of {} bytes cannot hold a header", max_file_length),
            });
        }

        let appender1 = LogAppender::open(part1, max_file_length)?;
        let appender2 = LogAppender::open(part2, max_file_length)?;
        self.check_format_id(&appender1)?;
        self.check_format_id(&appender2)?;

        let active = if appender1.timestamp() > appender2.timestamp() { 0 } else { 1 };
        let appenders = [appender1, appender2];
        let prior_state = appenders[active].state();
        appenders[active].set_state(LogState::Unclean)?;
        appenders[active].force()?;

        if prior_state != LogState::Clean {
            tracing::warn!(
                path = %appenders[active].path().display(),
                "active log file is unclean, the coordinator was not shut down properly"
            );
        }
        tracing::info!(
            active = %appenders[active].path().display(),
            position = appenders[active].header().position(),
            "disk journal opened"
        );

        *self.files.write() = Some(Arc::new(JournalFiles {
            appenders,
            active: AtomicUsize::new(active),
            prior_state,
        }));
        Ok(prior_state)
    }

    fn log(
        &self,
        status: TxStatus,
        gtrid: &Uid,
        unique_names: &BTreeSet<String>,
    ) -> Result<(), JournalError> {
        let files = self.files("write log")?;
        if self.settings.filter_log_status && !status.survives_filter() {
            return Ok(());
        }
        if unique_names.is_empty() {
            return Err(JournalError::NoUniqueNames);
        }

        let record = LogRecord::new(
            status,
            gtrid.clone(),
            unique_names.clone(),
            self.clock.now_millis(),
            self.next_sequence(),
        )?;
        self.append(&files, &record)
    }

    fn force(&self) -> Result<(), JournalError> {
        let files = self.files("force log writing")?;
        if !self.settings.forced_write_enabled || !self.needs_force.load(Ordering::Acquire) {
            return Ok(());
        }

        let _swap = self.swap_force_lock.write();
        files.active().force()?;
        self.needs_force.store(false, Ordering::Release);
        Ok(())
    }

    fn collect_dangling_records(&self) -> Result<DanglingRecords, JournalError> {
        let files = self.files("collect dangling records")?;
        let mut cursor = {
            let _position = self.position_lock.lock();
            let _swap = self.swap_force_lock.write();
            files.active().cursor()?
        };
        collect_dangling(&mut cursor, self.settings.skip_corrupted_logs)
    }

    fn close(&self) -> Result<(), JournalError> {
        let _lifecycle = self.lifecycle_lock.lock();
        let files = match self.files.write().take() {
            Some(files) => files,
            None => return Ok(()),
        };

        let _position = self.position_lock.lock();
        let _swap = self.swap_force_lock.write();
        let mut first_error = None;
        for appender in &files.appenders {
            if let Err(e) = appender.close() {
                tracing::error!(path = %appender.path().display(), error = %e, "cannot close log file");
                first_error.get_or_insert(e);
            }
        }
        tracing::info!("disk journal closed");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for DiskJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskJournal")
            .field("part1", &self.settings.part1)
            .field("part2", &self.settings.part2)
            .field("open", &self.is_open())
            .field("rotations", &self.rotation_count())
            .finish()
    }
}

fn file_length(path: &Path) -> Result<u64, JournalError> {
    Ok(fs::metadata(path)?.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::MonotonicClock;
    use crate::uid::UidGenerator;
    use std::thread;
    use tempfile::TempDir;

    fn names(csv: &str) -> BTreeSet<String> {
        csv.split(',').map(str::to_string).collect()
    }

    fn setup(config: impl FnOnce(Configuration) -> Configuration) -> (TempDir, Configuration, DiskJournal, UidGenerator) {
        let dir = TempDir::new().unwrap();
        let config = config(
            Configuration::in_directory(dir.path())
                .with_server_id("test-node")
                .with_max_log_size_in_mb(1),
        );
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let journal = DiskJournal::new(&config, Arc::clone(&clock));
        let uids = UidGenerator::new(config.server_id_bytes(), clock);
        (dir, config, journal, uids)
    }

    #[test]
    fn test_not_open() {
        let (_dir, _config, journal, uids) = setup(|c| c);
        let gtrid = uids.generate_uid();
        assert!(!journal.is_open());

        assert!(matches!(
            journal.force(),
            Err(JournalError::NotOpen { operation: "force log writing" })
        ));
        assert!(matches!(
            journal.log(TxStatus::Committing, &gtrid, &names("a")),
            Err(JournalError::NotOpen { operation: "write log" })
        ));
        assert!(matches!(
            journal.collect_dangling_records(),
            Err(JournalError::NotOpen { .. })
        ));
        assert_eq!(
            journal.force().unwrap_err().to_string(),
            "cannot force log writing, disk journal is not open"
        );

        journal.close().unwrap();
        journal.shutdown();
    }

    #[test]
    fn test_open_creates_both_files() {
        let (_dir, config, journal, _uids) = setup(|c| c);
        assert_eq!(journal.open().unwrap(), LogState::Clean);

        let expected = HEADER_LENGTH + 1024 * 1024;
        assert_eq!(fs::metadata(&config.log_part1_filename).unwrap().len(), expected);
        assert_eq!(fs::metadata(&config.log_part2_filename).unwrap().len(), expected);
        assert_eq!(journal.active_path(), Some(config.log_part1_filename.clone()));

        let files = journal.files("test").unwrap();
        assert!(files.appenders[0].timestamp() > files.appenders[1].timestamp());
        assert_eq!(files.appenders[0].state(), LogState::Unclean);
        assert_eq!(files.appenders[1].state(), LogState::Clean);

        journal.shutdown();
    }

    #[test]
    fn test_open_twice_is_harmless() {
        let (_dir, _config, journal, _uids) = setup(|c| c);
        journal.open().unwrap();
        assert_eq!(journal.open().unwrap(), LogState::Clean);
        assert!(journal.is_open());
        journal.shutdown();
        assert!(!journal.is_open());
    }

    #[test]
    fn test_unclean_state_reported_after_crash() {
        let (_dir, config, journal, uids) = setup(|c| c);
        journal.open().unwrap();
        journal
            .log(TxStatus::Committing, &uids.generate_uid(), &names("a"))
            .unwrap();
        journal.force().unwrap();
        // Dropped without close: the active file stays unclean.
        drop(journal);

        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let reopened = DiskJournal::new(&config, Arc::clone(&clock));
        assert_eq!(reopened.open().unwrap(), LogState::Unclean);
        assert_eq!(reopened.collect_dangling_records().unwrap().len(), 1);
        reopened.close().unwrap();

        let again = DiskJournal::new(&config, clock);
        assert_eq!(again.open().unwrap(), LogState::Clean);
        assert_eq!(again.collect_dangling_records().unwrap().len(), 1);
        again.shutdown();
    }

    #[test]
    fn test_length_mismatch() {
        let (_dir, config, journal, _uids) = setup(|c| c);
        journal.open().unwrap();
        journal.close().unwrap();

        let file = fs::OpenOptions::new()
            .write(true)
            .open(&config.log_part2_filename)
            .unwrap();
        file.set_len(HEADER_LENGTH + 1000).unwrap();

        let strict = DiskJournal::new(&config, Arc::new(MonotonicClock::new()));
        assert!(matches!(
            strict.open(),
            Err(JournalError::LengthMismatch { .. })
        ));

        let tolerant = DiskJournal::new(
            &config.clone().with_skip_corrupted_logs(true),
            Arc::new(MonotonicClock::new()),
        );
        assert!(tolerant.open().is_ok());
        tolerant.shutdown();
    }

    #[test]
    fn test_simple_collect_dangling_records() {
        let (_dir, _config, journal, uids) = setup(|c| c);
        journal.open().unwrap();
        let gtrid = uids.generate_uid();

        assert_eq!(journal.collect_dangling_records().unwrap().len(), 0);
        journal.log(TxStatus::Committing, &gtrid, &names("name1")).unwrap();
        assert_eq!(journal.collect_dangling_records().unwrap().len(), 1);
        journal.log(TxStatus::Committed, &gtrid, &names("name1")).unwrap();
        assert_eq!(journal.collect_dangling_records().unwrap().len(), 0);

        journal.shutdown();
    }

    #[test]
    fn test_complex_collect_dangling_records() {
        let (_dir, _config, journal, uids) = setup(|c| c);
        journal.open().unwrap();
        let gtrid1 = uids.generate_uid();
        let gtrid2 = uids.generate_uid();
        let dangling = || journal.collect_dangling_records().unwrap().len();

        journal.log(TxStatus::Committing, &gtrid1, &names("name1,name2,name3")).unwrap();
        assert_eq!(dangling(), 1);
        journal.log(TxStatus::Committed, &gtrid1, &names("name1")).unwrap();
        assert_eq!(dangling(), 1);
        journal.log(TxStatus::Committed, &gtrid1, &names("name2")).unwrap();
        assert_eq!(dangling(), 1);
        journal.log(TxStatus::Committed, &gtrid1, &names("name3")).unwrap();
        assert_eq!(dangling(), 0);

        journal.log(TxStatus::Committing, &gtrid2, &names("name1,name2,name3")).unwrap();
        assert_eq!(dangling(), 1);
        journal.log(TxStatus::Committed, &gtrid2, &names("name2")).unwrap();
        assert_eq!(dangling(), 1);
        journal.log(TxStatus::Committed, &gtrid2, &names("name3,name1")).unwrap();
        assert_eq!(dangling(), 0);

        journal.log(TxStatus::Committing, &gtrid2, &names("name1,name2,name3")).unwrap();
        assert_eq!(dangling(), 1);
        journal.log(TxStatus::Unknown, &gtrid2, &names("name2")).unwrap();
        assert_eq!(dangling(), 1);
        journal.log(TxStatus::Committed, &gtrid2, &names("name1")).unwrap();
        assert_eq!(dangling(), 1);
        journal.log(TxStatus::RolledBack, &gtrid2, &names("name3")).unwrap();
        assert_eq!(dangling(), 0);

        journal.shutdown();
    }

    #[test]
    fn test_unrelated_names_do_not_resolve() {
        let (_dir, _config, journal, uids) = setup(|c| c);
        journal.open().unwrap();
        let gtrid1 = uids.generate_uid();
        let gtrid2 = uids.generate_uid();
        let dangling = || journal.collect_dangling_records().unwrap().len();

        journal.log(TxStatus::Committing, &gtrid1, &names("name1,name2,name3")).unwrap();
        journal.log(TxStatus::Committed, &gtrid1, &names("name1")).unwrap();
        journal.log(TxStatus::Committed, &gtrid1, &names("name3")).unwrap();
        journal.log(TxStatus::Committed, &gtrid1, &names("name4")).unwrap();
        assert_eq!(dangling(), 1);
        journal.log(TxStatus::Committed, &gtrid1, &names("name2")).unwrap();
        assert_eq!(dangling(), 0);
        journal.log(TxStatus::Committed, &gtrid2, &names("name1")).unwrap();
        assert_eq!(dangling(), 0);

        journal.shutdown();
    }

    #[test]
    fn test_corrupted_record_in_file() {
        let (_dir, config, journal, uids) = setup(|c| c);
        journal.open().unwrap();
        let gtrid1 = uids.generate_uid();
        let gtrid2 = uids.generate_uid();
        journal.log(TxStatus::Committing, &gtrid1, &names("name1")).unwrap();
        journal.log(TxStatus::Committing, &gtrid2, &names("name1")).unwrap();
        journal.close().unwrap();

        // Flip a byte of the first record's time field.
        let path = &config.log_part1_filename;
        let mut raw = fs::read(path).unwrap();
        raw[HEADER_LENGTH as usize + 14] ^= 0x10;
        fs::write(path, &raw).unwrap();

        let strict = DiskJournal::new(&config, Arc::new(MonotonicClock::new()));
        strict.open().unwrap();
        assert!(matches!(
            strict.collect_dangling_records(),
            Err(JournalError::Corrupted { .. })
        ));
        assert_eq!(strict.read_records(true).unwrap().len(), 2);
        strict.close().unwrap();

        let tolerant = DiskJournal::new(
            &config.clone().with_skip_corrupted_logs(true),
            Arc::new(MonotonicClock::new()),
        );
        tolerant.open().unwrap();
        let dangling = tolerant.collect_dangling_records().unwrap();
        assert_eq!(dangling.keys().collect::<Vec<_>>(), vec![&gtrid2]);
        assert_eq!(tolerant.read_records(false).unwrap().len(), 1);
        tolerant.shutdown();
    }

    #[test]
    fn test_random_corruption_tolerated() {
        use rand::Rng;

        let (_dir, config, journal, uids) = setup(|c| c.with_skip_corrupted_logs(true));
        journal.open().unwrap();
        let written: Vec<Uid> = (0..50).map(|_| uids.generate_uid()).collect();
        for gtrid in &written {
            journal.log(TxStatus::Committing, gtrid, &names("db,queue")).unwrap();
        }
        let used: u64 = journal
            .read_records(false)
            .unwrap()
            .iter()
            .map(LogRecord::encoded_len)
            .sum();
        journal.close().unwrap();

        let path = &config.log_part1_filename;
        let pristine = fs::read(path).unwrap();
        let records = HEADER_LENGTH as usize..(HEADER_LENGTH + used) as usize;
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let mut raw = pristine.clone();
            let offset = rng.gen_range(records.clone());
            raw[offset] ^= rng.gen_range(1..=255u8);
            fs::write(path, &raw).unwrap();

            let reopened = DiskJournal::new(&config, Arc::new(MonotonicClock::new()));
            reopened.open().unwrap();
            let dangling = reopened.collect_dangling_records().unwrap();
            assert!(dangling.len() <= written.len());
            assert!(dangling.keys().all(|gtrid| written.contains(gtrid)));
            reopened.close().unwrap();
        }
    }

    #[test]
    fn test_records_read_back_identical() {
        let (_dir, _config, journal, uids) = setup(|c| c);
        journal.open().unwrap();
        let gtrid = uids.generate_uid();
        journal.log(TxStatus::Committing, &gtrid, &names("b,a")).unwrap();
        journal.log(TxStatus::Committed, &gtrid, &names("a")).unwrap();

        let records = journal.read_records(false).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status(), TxStatus::Committing);
        assert_eq!(records[0].gtrid(), &gtrid);
        assert_eq!(records[0].unique_names(), &names("a,b"));
        assert!(records[0].sequence() < records[1].sequence());
        assert!(records[0].time() <= records[1].time());
        assert!(records.iter().all(LogRecord::is_crc32_correct));

        journal.shutdown();
    }

    #[test]
    fn test_filter_log_status() {
        let (_dir, _config, journal, uids) = setup(|c| c.with_filter_log_status(true));
        journal.open().unwrap();
        let gtrid = uids.generate_uid();
        for status in [
            TxStatus::Active,
            TxStatus::Preparing,
            TxStatus::Prepared,
            TxStatus::Committing,
            TxStatus::Committed,
            TxStatus::RollingBack,
            TxStatus::RolledBack,
            TxStatus::Unknown,
        ] {
            journal.log(status, &gtrid, &names("a")).unwrap();
        }

        let statuses: Vec<_> = journal
            .read_records(false)
            .unwrap()
            .iter()
            .map(LogRecord::status)
            .collect();
        assert_eq!(
            statuses,
            vec![TxStatus::Committing, TxStatus::Committed, TxStatus::Unknown]
        );
        journal.shutdown();
    }

    #[test]
    fn test_rejects_empty_names() {
        let (_dir, _config, journal, uids) = setup(|c| c);
        journal.open().unwrap();
        assert!(matches!(
            journal.log(TxStatus::Committing, &uids.generate_uid(), &BTreeSet::new()),
            Err(JournalError::NoUniqueNames)
        ));
        journal.shutdown();
    }

    #[test]
    fn test_rollover() {
        let (_dir, config, journal, uids) = setup(|c| c);
        journal.open().unwrap();

        let mut uncommitted = Vec::new();
        for i in 1..4000 {
            let gtrid = uids.generate_uid();
            journal.log(TxStatus::Committing, &gtrid, &names("name1,name2,name3")).unwrap();
            if i < 3600 {
                journal.log(TxStatus::Committed, &gtrid, &names("name1")).unwrap();
                journal.log(TxStatus::Committed, &gtrid, &names("name2")).unwrap();
                journal.log(TxStatus::Committed, &gtrid, &names("name3")).unwrap();
            } else {
                uncommitted.push(gtrid);
            }
        }
        assert_eq!(journal.rotation_count(), 0);

        let before = journal.collect_dangling_records().unwrap();
        assert_eq!(before.len(), 400);

        // Committing the stragglers fills the first file and forces a rotation.
        for (i, gtrid) in uncommitted.iter().enumerate() {
            journal.log(TxStatus::Committed, gtrid, &names("name1")).unwrap();
            if i == 0 {
                continue;
            }
            journal.log(TxStatus::Committed, gtrid, &names("name2")).unwrap();
            journal.log(TxStatus::Committed, gtrid, &names("name3")).unwrap();
        }
        assert_eq!(journal.rotation_count(), 1);
        assert_eq!(journal.active_path(), Some(config.log_part2_filename.clone()));

        let after = journal.collect_dangling_records().unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[&uncommitted[0]].unique_names(), &names("name2,name3"));

        journal.log(TxStatus::Committed, &uncommitted[0], &names("name2,name3")).unwrap();
        assert_eq!(journal.collect_dangling_records().unwrap().len(), 0);
        journal.shutdown();

        // The rotated file is picked as active on restart.
        let reopened = DiskJournal::new(&config, Arc::new(MonotonicClock::new()));
        reopened.open().unwrap();
        assert_eq!(reopened.active_path(), Some(config.log_part2_filename.clone()));
        assert_eq!(reopened.collect_dangling_records().unwrap().len(), 0);
        reopened.shutdown();
    }

    #[test]
    fn test_rotation_preserves_dangling_records() {
        let (_dir, _config, journal, uids) = setup(|c| c);
        journal.open().unwrap();

        let pending: Vec<_> = (0..10).map(|_| uids.generate_uid()).collect();
        for gtrid in &pending {
            journal.log(TxStatus::Committing, gtrid, &names("a,b")).unwrap();
            journal.log(TxStatus::Committed, gtrid, &names("a")).unwrap();
        }
        let before = journal.collect_dangling_records().unwrap();

        while journal.rotation_count() == 0 {
            let gtrid = uids.generate_uid();
            journal.log(TxStatus::Committing, &gtrid, &names("a")).unwrap();
            journal.log(TxStatus::Committed, &gtrid, &names("a")).unwrap();
        }

        let after = journal.collect_dangling_records().unwrap();
        assert_eq!(after.len(), before.len());
        for (gtrid, record) in &before {
            assert_eq!(after[gtrid].unique_names(), record.unique_names());
            assert_eq!(after[gtrid].sequence(), record.sequence());
        }
        // Each dangling record was copied exactly once.
        let copies = journal
            .read_records(false)
            .unwrap()
            .iter()
            .filter(|r| r.status() == TxStatus::Committing && before.contains_key(r.gtrid()))
            .count();
        assert_eq!(copies, before.len());
        journal.shutdown();
    }

    #[test]
    fn test_rotation_overflow() {
        let (_dir, _config, journal, uids) = setup(|c| c);
        journal.open().unwrap();

        let result = (0..20_000).try_for_each(|_| {
            journal.log(TxStatus::Committing, &uids.generate_uid(), &names("name1,name2,name3"))
        });
        assert!(matches!(result, Err(JournalError::Overflow { .. })));
        journal.shutdown();
    }

    #[test]
    fn test_migrate_to() {
        let (_dir, _config, journal, uids) = setup(|c| c);
        let (_dir2, _config2, target, _uids2) = setup(|c| c);
        journal.open().unwrap();
        target.open().unwrap();

        let gtrid = uids.generate_uid();
        journal.log(TxStatus::Committing, &gtrid, &names("a,b")).unwrap();
        journal.log(TxStatus::Committed, &gtrid, &names("a")).unwrap();
        journal.migrate_to(&target).unwrap();

        let migrated = target.collect_dangling_records().unwrap();
        assert_eq!(migrated[&gtrid].unique_names(), &names("b"));
        assert!(matches!(journal.migrate_to(&journal), Err(JournalError::SelfMigration)));

        journal.shutdown();
        target.shutdown();
    }

    #[test]
    fn test_concurrent_rollover_stress() {
        let (_dir, _config, journal, uids) =
            setup(|c| c.with_forced_write_enabled(false));
        journal.open().unwrap();
        let journal = Arc::new(journal);
        let uids = Arc::new(uids);

        let handles: Vec<_> = (0..4)
            .map(|ndx| {
                let journal = Arc::clone(&journal);
                let uids = Arc::clone(&uids);
                thread::spawn(move || {
                    let all = names(&format!("{0}.name1,{0}.name2,{0}.name3", ndx));
                    for _ in 0..2_500 {
                        let gtrid = uids.generate_uid();
                        journal.log(TxStatus::Committing, &gtrid, &all).unwrap();
                        journal.force().unwrap();
                        for name in &all {
                            journal
                                .log(TxStatus::Committed, &gtrid, &names(name))
                                .unwrap();
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("thread panicked");
        }

        assert!(journal.rotation_count() >= 1);
        assert_eq!(journal.collect_dangling_records().unwrap().len(), 0);
        assert!(journal
            .read_records(false)
            .unwrap()
            .iter()
            .all(LogRecord::is_crc32_correct));
        journal.shutdown();
    }

    #[test]
    fn test_conservative_journaling() {
        let (_dir, _config, journal, uids) = setup(|c| {
            c.with_conservative_journaling(true)
                .with_forced_write_enabled(false)
        });
        journal.open().unwrap();
        let journal = Arc::new(journal);
        let uids = Arc::new(uids);

        let handles: Vec<_> = (0..4)
            .map(|ndx| {
                let journal = Arc::clone(&journal);
                let uids = Arc::clone(&uids);
                thread::spawn(move || {
                    let name = names(&format!("res{}", ndx));
                    for _ in 0..500 {
                        let gtrid = uids.generate_uid();
                        journal.log(TxStatus::Committing, &gtrid, &name).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread panicked");
        }

        assert_eq!(journal.collect_dangling_records().unwrap().len(), 2_000);
        journal.shutdown();
    }
}
