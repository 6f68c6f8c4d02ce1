//! Append side of the log.
//!
//! One mutex serializes all appends, so frame order equals lock
//! acquisition order. Each append writes the whole frame and (by default)
//! syncs the file before returning. A failed append is cut back off the
//! file, so a write reported as failed never reappears on replay.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use meshreg_state::{Registry, StateResult};
use tracing::{debug, error, info, warn};

use crate::error::{WalError, WalResult};
use crate::frame;
use crate::record::WalRecord;
use crate::replay::{ReplayStats, apply_record, replay_reader};

/// Durability knobs.
#[derive(Debug, Clone)]
pub struct WalOptions {
    /// `fdatasync` after every append. Turning this off leaves durability
    /// to the OS page cache.
    pub sync: bool,
}

impl Default for WalOptions {
    fn default() -> Self {
        Self { sync: true }
    }
}

/// File the log appends to.
///
/// Writes must land at the end of the file, also after a `truncate`.
pub trait LogFile: Write + Send {
    /// Current length in bytes.
    fn byte_len(&self) -> io::Result<u64>;

    /// Cut the file back to `len` bytes.
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    /// Push written data to stable storage.
    fn sync(&mut self) -> io::Result<()>;
}

impl LogFile for File {
    fn byte_len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

struct WalWriter {
    file: Box<dyn LogFile>,
    /// Byte offset at which the next frame starts.
    offset: u64,
}

impl WalWriter {
    fn write_frame(&mut self, frame: &[u8], sync: bool) -> io::Result<()> {
        self.file.write_all(frame)?;
        self.file.flush()?;
        if sync {
            self.file.sync()?;
        }
        Ok(())
    }

    /// Drop whatever part of a failed frame reached the file.
    fn roll_back(&mut self, sync: bool) -> io::Result<()> {
        self.file.truncate(self.offset)?;
        if sync {
            self.file.sync()?;
        }
        Ok(())
    }
}

/// Append-only, CRC-framed mutation log.
pub struct Wal {
    path: PathBuf,
    options: WalOptions,
    writer: Mutex<Option<WalWriter>>,
}

/// Exclusive handle on the log.
///
/// Holding it across "append, then apply" makes the in-memory apply order
/// equal to the log order.
pub struct WalGuard<'a> {
    writer: MutexGuard<'a, Option<WalWriter>>,
    options: &'a WalOptions,
    path: &'a Path,
}

impl Wal {
    /// Open (or create) the log at `path` with default options.
    pub fn open(path: impl Into<PathBuf>) -> WalResult<Self> {
        Self::open_with(path, WalOptions::default())
    }

    /// Open (or create) the log at `path` in append mode. Existing frames
    /// are never truncated.
    pub fn open_with(path: impl Into<PathBuf>, options: WalOptions) -> WalResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Self::from_log_file(path, file, options)
    }

    /// Append through an already opened `file` backing `path`. Replay
    /// still reads from `path`.
    pub fn from_log_file(
        path: impl Into<PathBuf>,
        file: impl LogFile + 'static,
        options: WalOptions,
    ) -> WalResult<Self> {
        let path = path.into();
        let offset = file.byte_len()?;
        info!(path = %path.display(), bytes = offset, sync = options.sync, "wal opened");

        Ok(Self {
            path,
            options,
            writer: Mutex::new(Some(WalWriter {
                file: Box::new(file),
                offset,
            })),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the append lock.
    pub fn lock(&self) -> WalGuard<'_> {
        WalGuard {
            writer: self.writer.lock().expect("wal lock"),
            options: &self.options,
            path: &self.path,
        }
    }

    /// Append one record. Returns the frame's byte offset.
    pub fn append(&self, record: &WalRecord) -> WalResult<u64> {
        self.lock().append(record)
    }

    /// Flush and release the file. Later appends fail with
    /// [`WalError::Closed`]; closing twice is a no-op.
    pub fn close(&self) -> WalResult<()> {
        let mut writer = self.writer.lock().expect("wal lock");
        if let Some(mut w) = writer.take() {
            w.file.flush()?;
            w.file.sync()?;
            info!(path = %self.path.display(), bytes = w.offset, "wal closed");
        }
        Ok(())
    }

    /// Read the log from the start, handing each valid record to `apply`
    /// in file order. Stops at the first damaged frame; records already
    /// applied stay applied.
    pub fn replay<F>(&self, apply: F) -> WalResult<ReplayStats>
    where
        F: FnMut(WalRecord) -> StateResult<()>,
    {
        let file = File::open(&self.path)?;
        let result = replay_reader(BufReader::new(file), apply);
        match &result {
            Ok(stats) => info!(
                path = %self.path.display(),
                records = stats.records,
                bytes = stats.bytes,
                "wal replay complete"
            ),
            Err(e) => warn!(path = %self.path.display(), error = %e, "wal replay stopped"),
        }
        result
    }

    /// Replay the log into `registry`.
    pub fn replay_into(&self, registry: &Registry) -> WalResult<ReplayStats> {
        self.replay(|record| apply_record(registry, record))
    }
}

impl WalGuard<'_> {
    /// Write and sync one frame. Returns its byte offset.
    ///
    /// On failure the file is truncated back to where the frame started.
    /// If that fails too the log is closed, since its tail is unknown.
    pub fn append(&mut self, record: &WalRecord) -> WalResult<u64> {
        let frame = frame::encode(record)?;
        let sync = self.options.sync;
        let writer = self.writer.as_mut().ok_or(WalError::Closed)?;
        let offset = writer.offset;

        if let Err(e) = writer.write_frame(&frame, sync) {
            match writer.roll_back(sync) {
                Ok(()) => warn!(
                    path = %self.path.display(),
                    offset,
                    error = %e,
                    "wal append failed; tail rolled back"
                ),
                Err(rollback) => {
                    error!(
                        path = %self.path.display(),
                        offset,
                        error = %e,
                        rollback_error = %rollback,
                        "wal append failed and could not be rolled back; closing wal"
                    );
                    *self.writer = None;
                }
            }
            return Err(e.into());
        }

        writer.offset += frame.len() as u64;
        debug!(
            path = %self.path.display(),
            offset,
            op = ?record.op(),
            region = record.region(),
            len = frame.len(),
            "wal append"
        );
        Ok(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshreg_state::{AgentRegistration, Capacity, GatewayRegistration};

    fn gateway(ip: &str, cpu: u32) -> (String, GatewayRegistration) {
        let reg = GatewayRegistration {
            ip: ip.to_string(),
            port: 9000,
            capacity: Capacity {
                cpu,
                ..Capacity::default()
            },
            credential_hash: format!("cred-{ip}"),
            wss_port: None,
        };
        (reg.address().unwrap(), reg)
    }

    fn put_gateway(region: &str, ip: &str, cpu: u32) -> WalRecord {
        let (address, reg) = gateway(ip, cpu);
        WalRecord::put_gateway(region, &address, &reg)
    }

    fn put_agent(region: &str, domain: &str, gateway_key: &str) -> WalRecord {
        WalRecord::put_agent(
            region,
            &AgentRegistration {
                domain: domain.to_string(),
                gateway_key: gateway_key.to_string(),
                credential_hash: format!("cred-{domain}"),
            },
        )
    }

    fn collect(wal: &Wal) -> WalResult<Vec<WalRecord>> {
        let mut records = Vec::new();
        wal.replay(|r| {
            records.push(r);
            Ok(())
        })?;
        Ok(records)
    }

    #[test]
    fn appends_replay_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let wal = Wal::open(dir.path().join("wal.log")).unwrap();

        let records = vec![
            put_gateway("us-east", "10.0.0.1", 4),
            put_agent("us-east", "a1.example.com", "10.0.0.1:9000"),
            put_gateway("eu-west", "10.0.1.1", 2),
        ];
        let mut offsets = Vec::new();
        for r in &records {
            offsets.push(wal.append(r).unwrap());
        }

        assert_eq!(offsets[0], 0);
        assert!(offsets.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(collect(&wal).unwrap(), records);
    }

    #[test]
    fn reopen_appends_after_existing_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.log");

        let first = put_gateway("r", "10.0.0.1", 1);
        let second = put_gateway("r", "10.0.0.2", 2);
        {
            let wal = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
            wal.close().unwrap();
        }

        let wal = Wal::open(&path).unwrap();
        let offset = wal.append(&second).unwrap();
        assert_eq!(offset, std::fs::metadata(&path).unwrap().len() - frame::encode(&second).unwrap().len() as u64);
        assert_eq!(collect(&wal).unwrap(), vec![first, second]);
    }

    #[test]
    fn append_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let wal = Wal::open(dir.path().join("wal.log")).unwrap();
        wal.close().unwrap();
        wal.close().unwrap();

        let err = wal.append(&put_gateway("r", "10.0.0.1", 1)).unwrap_err();
        assert!(matches!(err, WalError::Closed));
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/data/wal.log");
        let wal = Wal::open_with(&path, WalOptions { sync: false }).unwrap();
        wal.append(&put_gateway("r", "10.0.0.1", 1)).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn guard_serializes_writers() {
        use std::sync::Arc;
        use std::thread;

        let dir = tempfile::tempdir().unwrap();
        let wal = Arc::new(Wal::open_with(dir.path().join("wal.log"), WalOptions { sync: false }).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let wal = Arc::clone(&wal);
                thread::spawn(move || {
                    for i in 0..25 {
                        wal.append(&put_gateway(&format!("r{t}"), &format!("10.0.{t}.{i}"), i))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let records = collect(&wal).unwrap();
        assert_eq!(records.len(), 100);
    }

    // ── Append failures ───────────────────────────────────────────

    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// File that accepts `budget` more bytes, then fails mid-write the way
    /// a full disk or a file size limit does.
    struct FaultyFile {
        inner: File,
        budget: Arc<AtomicUsize>,
        refuse_truncate: Arc<AtomicBool>,
    }

    impl Write for FaultyFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let left = self.budget.load(Ordering::SeqCst);
            if left == 0 {
                return Err(io::Error::other("file size limit exceeded"));
            }
            let n = self.inner.write(&buf[..buf.len().min(left)])?;
            self.budget.fetch_sub(n, Ordering::SeqCst);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    impl LogFile for FaultyFile {
        fn byte_len(&self) -> io::Result<u64> {
            self.inner.byte_len()
        }

        fn truncate(&mut self, len: u64) -> io::Result<()> {
            if self.refuse_truncate.load(Ordering::SeqCst) {
                return Err(io::Error::other("truncate refused"));
            }
            self.inner.truncate(len)
        }

        fn sync(&mut self) -> io::Result<()> {
            self.inner.sync()
        }
    }

    struct Faults {
        budget: Arc<AtomicUsize>,
        refuse_truncate: Arc<AtomicBool>,
    }

    fn faulty_wal(path: &Path) -> (Wal, Faults) {
        let faults = Faults {
            budget: Arc::new(AtomicUsize::new(usize::MAX)),
            refuse_truncate: Arc::new(AtomicBool::new(false)),
        };
        let file = FaultyFile {
            inner: OpenOptions::new().create(true).append(true).open(path).unwrap(),
            budget: Arc::clone(&faults.budget),
            refuse_truncate: Arc::clone(&faults.refuse_truncate),
        };
        let wal = Wal::from_log_file(path, file, WalOptions::default()).unwrap();
        (wal, faults)
    }

    fn ips(records: &[WalRecord]) -> Vec<&str> {
        records
            .iter()
            .map(|r| match r {
                WalRecord::PutGateway(entry) => entry.ip.as_str(),
                WalRecord::PutAgent(entry) => entry.domain.as_str(),
            })
            .collect()
    }

    #[test]
    fn failed_append_is_not_replayed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.log");
        let (wal, faults) = faulty_wal(&path);

        wal.append(&put_gateway("r", "10.0.0.1", 1)).unwrap();
        let len_after_a = std::fs::metadata(&path).unwrap().len();

        // Room for part of the next frame only.
        faults.budget.store(10, Ordering::SeqCst);
        let err = wal.append(&put_gateway("r", "10.0.0.2", 2)).unwrap_err();
        assert!(matches!(err, WalError::Io(_)), "{err}");
        assert_eq!(std::fs::metadata(&path).unwrap().len(), len_after_a);

        faults.budget.store(usize::MAX, Ordering::SeqCst);
        let offset = wal.append(&put_gateway("r", "10.0.0.3", 3)).unwrap();
        assert_eq!(offset, len_after_a);

        let records = collect(&wal).unwrap();
        assert_eq!(ips(&records), vec!["10.0.0.1", "10.0.0.3"]);
    }

    #[test]
    fn failed_rollback_closes_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.log");
        let (wal, faults) = faulty_wal(&path);

        wal.append(&put_gateway("r", "10.0.0.1", 1)).unwrap();
        faults.budget.store(10, Ordering::SeqCst);
        faults.refuse_truncate.store(true, Ordering::SeqCst);
        assert!(matches!(
            wal.append(&put_gateway("r", "10.0.0.2", 2)),
            Err(WalError::Io(_))
        ));

        faults.budget.store(usize::MAX, Ordering::SeqCst);
        let err = wal.append(&put_gateway("r", "10.0.0.3", 3)).unwrap_err();
        assert!(matches!(err, WalError::Closed));

        // The torn tail is left for replay to report.
        let err = collect(&wal).unwrap_err();
        assert!(matches!(err, WalError::Truncated { .. }), "{err}");
    }
}
