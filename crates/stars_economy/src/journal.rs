//! # Journal (Write-Ahead Log)
//!
//! **Crash-Safe Record of Every State Change**
//!
//! The ledger, referral graph and withdrawal book never change memory until
//! the entries describing the change are committed here. On restart the
//! journal is replayed to rebuild them:
//! - Committed units: replayed in order
//! - Uncommitted units: dropped (the operation never happened)
//!
//! ## Guarantees
//!
//! 1. **Durability**: Once `commit()` returns, the unit is on disk
//! 2. **Atomicity**: A unit's entries are replayed all together or not at all
//! 3. **No interleaving**: Units are framed under a single writer lock
//! 4. **Single writer**: `open` holds an exclusive file lock until drop;
//!    readers use `inspect`, which never writes
//!
//! ## Format
//!
//! ```text
//! [4 bytes: magic "STRJ"]
//! [4 bytes: version]
//! [8 bytes: reserved]
//!
//! Frame format:
//! [8 bytes: LSN (Log Sequence Number)]
//! [1 byte: frame kind (BEGIN/ENTRY/COMMIT)]
//! [4 bytes: payload length]
//! [N bytes: payload (encoded entry)]
//! [4 bytes: CRC32 of above]
//! ```

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use parking_lot::Mutex;
use tracing::warn;

use crate::error::{EconomyError, EconomyResult};
use crate::fixed_point::{Amount, Delta};
use crate::ledger::{AccountId, Timestamp, TxCategory};
use crate::withdrawal::{WithdrawalId, WithdrawalStatus};

/// Magic bytes identifying a journal file.
const JOURNAL_MAGIC: &[u8; 4] = b"STRJ";

/// Current journal format version.
const JOURNAL_VERSION: u32 = 1;

/// Header size in bytes.
const HEADER_LEN: u64 = 16;

/// Fixed bytes around a frame payload: LSN + kind + length + CRC.
const FRAME_OVERHEAD: u64 = 8 + 1 + 4 + 4;

/// Largest payload a frame may carry. Longer length fields read as a torn tail.
const MAX_PAYLOAD: usize = 1 << 20;

/// Journal frame kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
enum FrameKind {
    Begin = 1,
    Entry = 2,
    Commit = 3,
}

impl FrameKind {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Begin),
            2 => Some(Self::Entry),
            3 => Some(Self::Commit),
            _ => None,
        }
    }
}

/// One state change, as recorded in the journal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JournalEntry {
    /// First contact with an account.
    AccountOpened {
        /// The account.
        account: AccountId,
        /// Display name at registration.
        display_name: String,
        /// Registration time.
        at: Timestamp,
    },
    /// A balance change and its transaction row.
    Posted {
        /// The account.
        account: AccountId,
        /// Signed amount.
        amount: Delta,
        /// Transaction category.
        category: TxCategory,
        /// Free-text note.
        note: String,
        /// Posting time.
        at: Timestamp,
    },
    /// A successful click claim.
    ClickStamped {
        /// The account.
        account: AccountId,
        /// Claim time.
        at: Timestamp,
    },
    /// A referee linked to its referrer.
    ReferralLinked {
        /// The referred account.
        referee: AccountId,
        /// The referring account.
        referrer: AccountId,
        /// Link time.
        at: Timestamp,
    },
    /// A pending withdrawal request was created.
    WithdrawalOpened {
        /// Request identifier.
        id: WithdrawalId,
        /// The account.
        account: AccountId,
        /// Reserved amount.
        amount: Amount,
        /// Creation time.
        at: Timestamp,
    },
    /// A withdrawal moved to a terminal status.
    WithdrawalStatusSet {
        /// Request identifier.
        id: WithdrawalId,
        /// New status.
        status: WithdrawalStatus,
        /// Transition time.
        at: Timestamp,
    },
}

impl JournalEntry {
    /// Serializes the entry to bytes.
    fn encode(&self) -> Vec<u8> {
        let mut buf = Encoder::default();

        match self {
            Self::AccountOpened { account, display_name, at } => {
                buf.u8(1).u64(*account).u64(*at).str(display_name);
            }
            Self::Posted { account, amount, category, note, at } => {
                buf.u8(2)
                    .u64(*account)
                    .i64(amount.micros())
                    .u8(category.as_u8())
                    .u64(*at)
                    .str(note);
            }
            Self::ClickStamped { account, at } => {
                buf.u8(3).u64(*account).u64(*at);
            }
            Self::ReferralLinked { referee, referrer, at } => {
                buf.u8(4).u64(*referee).u64(*referrer).u64(*at);
            }
            Self::WithdrawalOpened { id, account, amount, at } => {
                buf.u8(5).u64(*id).u64(*account).u64(amount.micros()).u64(*at);
            }
            Self::WithdrawalStatusSet { id, status, at } => {
                buf.u8(6).u64(*id).u8(status.as_u8()).u64(*at);
            }
        }

        buf.0
    }

    /// Deserializes an entry from bytes.
    fn decode(data: &[u8]) -> Option<Self> {
        let mut d = Decoder(data);

        let entry = match d.u8()? {
            1 => Self::AccountOpened {
                account: d.u64()?,
                at: d.u64()?,
                display_name: d.str()?,
            },
            2 => Self::Posted {
                account: d.u64()?,
                amount: Delta::from_micros(d.i64()?),
                category: TxCategory::from_u8(d.u8()?)?,
                at: d.u64()?,
                note: d.str()?,
            },
            3 => Self::ClickStamped { account: d.u64()?, at: d.u64()? },
            4 => Self::ReferralLinked {
                referee: d.u64()?,
                referrer: d.u64()?,
                at: d.u64()?,
            },
            5 => Self::WithdrawalOpened {
                id: d.u64()?,
                account: d.u64()?,
                amount: Amount::from_micros(d.u64()?),
                at: d.u64()?,
            },
            6 => Self::WithdrawalStatusSet {
                id: d.u64()?,
                status: WithdrawalStatus::from_u8(d.u8()?)?,
                at: d.u64()?,
            },
            _ => return None,
        };

        d.0.is_empty().then_some(entry)
    }
}

#[derive(Default)]
struct Encoder(Vec<u8>);

impl Encoder {
    fn u8(&mut self, v: u8) -> &mut Self {
        self.0.push(v);
        self
    }

    fn u64(&mut self, v: u64) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn i64(&mut self, v: i64) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    #[allow(clippy::cast_possible_truncation)]
    fn str(&mut self, v: &str) -> &mut Self {
        // Notes and names are short; anything past u32::MAX bytes is cut.
        let bytes = &v.as_bytes()[..v.len().min(u32::MAX as usize)];
        self.0.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        self.0.extend_from_slice(bytes);
        self
    }
}

struct Decoder<'a>(&'a [u8]);

impl Decoder<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        if self.0.len() < N {
            return None;
        }
        let (head, rest) = self.0.split_at(N);
        self.0 = rest;
        head.try_into().ok()
    }

    fn u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|b| b[0])
    }

    fn u64(&mut self) -> Option<u64> {
        self.take::<8>().map(u64::from_le_bytes)
    }

    fn i64(&mut self) -> Option<i64> {
        self.take::<8>().map(i64::from_le_bytes)
    }

    fn str(&mut self) -> Option<String> {
        let len = self.take::<4>().map(u32::from_le_bytes)? as usize;
        if self.0.len() < len {
            return None;
        }
        let (head, rest) = self.0.split_at(len);
        self.0 = rest;
        String::from_utf8(head.to_vec()).ok()
    }
}

/// Durable sink for units of work.
///
/// Implementations must make a unit visible to replay only if every entry in
/// it is, and must return an error (never panic) when that cannot be ensured.
pub trait Journal: Send + Sync {
    /// Commits one unit of work. Returns the unit's sequence number.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::Journal` if the unit could not be made durable;
    /// the caller must then leave its in-memory state untouched.
    fn commit(&self, entries: &[JournalEntry]) -> EconomyResult<u64>;
}

/// In-memory journal.
///
/// Keeps committed units for inspection and replay. Used by tests and by
/// embedders that persist state elsewhere.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    units: Mutex<Vec<Vec<JournalEntry>>>,
}

impl MemoryJournal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All committed units, oldest first.
    #[must_use]
    pub fn units(&self) -> Vec<Vec<JournalEntry>> {
        self.units.lock().clone()
    }

    /// All committed entries, flattened in commit order.
    #[must_use]
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.units.lock().iter().flatten().cloned().collect()
    }
}

impl Journal for MemoryJournal {
    fn commit(&self, entries: &[JournalEntry]) -> EconomyResult<u64> {
        let mut units = self.units.lock();
        units.push(entries.to_vec());
        Ok(units.len() as u64)
    }
}

/// What `WriteAheadLog::open` or `WriteAheadLog::inspect` found on disk.
#[derive(Clone, Debug, Default)]
pub struct Recovery {
    /// Entries of every committed unit, in commit order.
    pub entries: Vec<JournalEntry>,
    /// Number of committed units.
    pub committed_units: u64,
    /// Units dropped because they never committed.
    pub discarded_units: u64,
    /// Bytes past the last complete unit. `open` cuts them off the file;
    /// `inspect` leaves them in place.
    pub truncated_bytes: u64,
}

struct WalWriter {
    file: File,
    /// Offset just past the last complete unit.
    len: u64,
    next_lsn: u64,
    /// Set when a failed write could not be cut back off the file.
    poisoned: bool,
}

/// File-backed write-ahead journal.
pub struct WriteAheadLog {
    /// Path to the journal file.
    path: PathBuf,
    /// fsync after each unit.
    sync_on_commit: bool,
    /// File handle (protected by mutex for writes).
    writer: Mutex<WalWriter>,
}

impl std::fmt::Debug for WriteAheadLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteAheadLog")
            .field("path", &self.path)
            .field("sync_on_commit", &self.sync_on_commit)
            .finish_non_exhaustive()
    }
}

impl WriteAheadLog {
    /// Opens or creates a journal file and recovers its committed entries.
    ///
    /// Uncommitted units and any torn tail are cut from the file so new
    /// units append after the last complete one. The file stays locked
    /// against other writers until the log is dropped.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::Journal` on I/O failure or when another
    /// writer holds the file, and `EconomyError::CorruptJournal` if the
    /// header is not a journal header.
    pub fn open(path: impl AsRef<Path>, sync_on_commit: bool) -> EconomyResult<(Self, Recovery)> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;

        // Released when `file` is closed.
        file.try_lock_exclusive().map_err(|e| {
            EconomyError::Journal(format!(
                "journal {} is held by another writer: {e}",
                path.display()
            ))
        })?;

        let file_len = file.metadata()?.len();
        if file_len == 0 {
            let mut header = Vec::with_capacity(HEADER_LEN as usize);
            header.extend_from_slice(JOURNAL_MAGIC);
            header.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
            header.extend_from_slice(&0u64.to_le_bytes());
            file.write_all(&header)?;
            file.sync_all()?;
        }

        let (mut recovery, good_len, next_lsn) = Self::scan(&path)?;
        let file_len = file.metadata()?.len();
        if file_len > good_len {
            recovery.truncated_bytes = file_len - good_len;
            file.set_len(good_len)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::Start(good_len))?;

        if recovery.discarded_units > 0 || recovery.truncated_bytes > 0 {
            warn!(
                path = %path.display(),
                discarded_units = recovery.discarded_units,
                truncated_bytes = recovery.truncated_bytes,
                "journal recovery dropped uncommitted work"
            );
        }

        let wal = Self {
            path,
            sync_on_commit,
            writer: Mutex::new(WalWriter {
                file,
                len: good_len,
                next_lsn,
                poisoned: false,
            }),
        };

        Ok((wal, recovery))
    }

    /// Reads the committed entries of a journal without writing to it.
    ///
    /// Takes no lock and never truncates, so it is safe against a journal a
    /// live writer holds open. A unit still being written reads as an
    /// uncommitted tail.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::Journal` on I/O failure (including a missing
    /// file) and `EconomyError::CorruptJournal` on a foreign header.
    pub fn inspect(path: impl AsRef<Path>) -> EconomyResult<Recovery> {
        let path = path.as_ref();
        let (mut recovery, good_len, _) = Self::scan(path)?;
        recovery.truncated_bytes = std::fs::metadata(path)?.len().saturating_sub(good_len);
        Ok(recovery)
    }

    /// Scans the file. Returns the recovery, the offset just past the last
    /// complete unit, and the next free LSN.
    fn scan(path: &Path) -> EconomyResult<(Recovery, u64, u64)> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut recovery = Recovery::default();

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != JOURNAL_MAGIC {
            return Err(EconomyError::CorruptJournal("invalid journal magic".to_string()));
        }

        let mut version_bytes = [0u8; 4];
        reader.read_exact(&mut version_bytes)?;
        let version = u32::from_le_bytes(version_bytes);
        if version != JOURNAL_VERSION {
            return Err(EconomyError::CorruptJournal(format!(
                "unsupported journal version: {version}"
            )));
        }

        let mut reserved = [0u8; 8];
        reader.read_exact(&mut reserved)?;

        let mut offset = HEADER_LEN;
        let mut good_len = HEADER_LEN;
        let mut next_lsn = 0u64;
        let mut open_unit: Option<Vec<JournalEntry>> = None;

        // A read error here is the end of file or a torn/corrupt frame.
        while let Some((lsn, kind, payload)) = Self::read_frame(&mut reader) {
            offset += FRAME_OVERHEAD + payload.len() as u64;
            next_lsn = next_lsn.max(lsn + 1);

            match kind {
                FrameKind::Begin => {
                    if open_unit.replace(Vec::new()).is_some() {
                        recovery.discarded_units += 1;
                    }
                }
                FrameKind::Entry => {
                    let (Some(unit), Some(entry)) =
                        (open_unit.as_mut(), JournalEntry::decode(&payload))
                    else {
                        break;
                    };
                    unit.push(entry);
                }
                FrameKind::Commit => {
                    let Some(unit) = open_unit.take() else {
                        break;
                    };
                    recovery.entries.extend(unit);
                    recovery.committed_units += 1;
                    good_len = offset;
                }
            }
        }

        if open_unit.is_some() {
            recovery.discarded_units += 1;
        }

        Ok((recovery, good_len, next_lsn))
    }

    /// Reads a single frame, verifying its CRC.
    fn read_frame(reader: &mut impl Read) -> Option<(u64, FrameKind, Vec<u8>)> {
        let mut head = [0u8; 13];
        reader.read_exact(&mut head).ok()?;

        let lsn = u64::from_le_bytes(head[0..8].try_into().ok()?);
        let kind = FrameKind::from_u8(head[8])?;
        let payload_len = u32::from_le_bytes(head[9..13].try_into().ok()?) as usize;
        if payload_len > MAX_PAYLOAD {
            return None;
        }

        let mut payload = vec![0u8; payload_len];
        reader.read_exact(&mut payload).ok()?;

        let mut crc_bytes = [0u8; 4];
        reader.read_exact(&mut crc_bytes).ok()?;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&head);
        hasher.update(&payload);
        if hasher.finalize() != u32::from_le_bytes(crc_bytes) {
            return None;
        }

        Some((lsn, kind, payload))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn push_frame(buf: &mut Vec<u8>, lsn: u64, kind: FrameKind, payload: &[u8]) {
        let start = buf.len();
        buf.extend_from_slice(&lsn.to_le_bytes());
        buf.push(kind as u8);
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(payload);
        let crc = crc32fast::hash(&buf[start..]);
        buf.extend_from_slice(&crc.to_le_bytes());
    }
}

impl Journal for WriteAheadLog {
    fn commit(&self, entries: &[JournalEntry]) -> EconomyResult<u64> {
        let mut writer = self.writer.lock();
        if writer.poisoned {
            return Err(EconomyError::Journal(
                "journal poisoned by an earlier failed write".to_string(),
            ));
        }

        let payloads: Vec<Vec<u8>> = entries.iter().map(JournalEntry::encode).collect();
        if payloads.iter().any(|p| p.len() > MAX_PAYLOAD) {
            return Err(EconomyError::Journal(format!(
                "journal entry exceeds {MAX_PAYLOAD} bytes"
            )));
        }

        let begin_lsn = writer.next_lsn;
        let mut lsn = begin_lsn;
        let mut buf = Vec::new();

        Self::push_frame(&mut buf, lsn, FrameKind::Begin, &[]);
        for payload in &payloads {
            lsn += 1;
            Self::push_frame(&mut buf, lsn, FrameKind::Entry, payload);
        }
        lsn += 1;
        Self::push_frame(&mut buf, lsn, FrameKind::Commit, &[]);

        let written = writer.file.write_all(&buf).and_then(|()| {
            if self.sync_on_commit {
                writer.file.sync_data()
            } else {
                Ok(())
            }
        });

        if let Err(e) = written {
            // Cut the partial unit so later units stay readable.
            let start = writer.len;
            let cut = writer
                .file
                .set_len(start)
                .and_then(|()| writer.file.seek(SeekFrom::Start(start)).map(|_| ()));
            if cut.is_err() {
                writer.poisoned = true;
            }
            return Err(e.into());
        }

        writer.len += buf.len() as u64;
        writer.next_lsn = lsn + 1;
        Ok(begin_lsn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_journal_path() -> PathBuf {
        let id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let thread = std::thread::current().id();
        std::env::temp_dir().join(format!("test_journal_{id}_{thread:?}.wal"))
    }

    fn sample_unit() -> Vec<JournalEntry> {
        vec![
            JournalEntry::AccountOpened {
                account: 7,
                display_name: "monkey".to_string(),
                at: 100,
            },
            JournalEntry::Posted {
                account: 7,
                amount: Delta::from_micros(200_000),
                category: TxCategory::Click,
                note: "Click".to_string(),
                at: 100,
            },
            JournalEntry::ClickStamped { account: 7, at: 100 },
        ]
    }

    #[test]
    fn test_entry_codec() {
        let entries = [
            JournalEntry::ReferralLinked { referee: 1, referrer: 2, at: 3 },
            JournalEntry::WithdrawalOpened {
                id: 9,
                account: 1,
                amount: Amount::from_whole(15),
                at: 4,
            },
            JournalEntry::WithdrawalStatusSet {
                id: 9,
                status: WithdrawalStatus::Rejected,
                at: 5,
            },
        ];
        for entry in entries {
            assert_eq!(JournalEntry::decode(&entry.encode()), Some(entry));
        }
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut bytes = JournalEntry::ClickStamped { account: 1, at: 2 }.encode();
        bytes.push(0);
        assert!(JournalEntry::decode(&bytes).is_none());
    }

    #[test]
    fn test_commit_and_recover() {
        let path = temp_journal_path();
        {
            let (wal, recovery) = WriteAheadLog::open(&path, true).unwrap();
            assert!(recovery.entries.is_empty());
            wal.commit(&sample_unit()).unwrap();
        }
        {
            let (_wal, recovery) = WriteAheadLog::open(&path, true).unwrap();
            assert_eq!(recovery.committed_units, 1);
            assert_eq!(recovery.entries, sample_unit());
            assert_eq!(recovery.truncated_bytes, 0);
        }
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let path = temp_journal_path();
        {
            let (wal, _) = WriteAheadLog::open(&path, false).unwrap();
            wal.commit(&sample_unit()).unwrap();
            wal.commit(&sample_unit()).unwrap();
        }

        // Simulate a crash mid-write of the second unit.
        let full_len = fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(full_len - 5).unwrap();
        drop(file);

        {
            let (wal, recovery) = WriteAheadLog::open(&path, false).unwrap();
            assert_eq!(recovery.committed_units, 1);
            assert_eq!(recovery.discarded_units, 1);
            assert!(recovery.truncated_bytes > 0);

            // New units land after the last good one.
            wal.commit(&[JournalEntry::ClickStamped { account: 7, at: 200 }]).unwrap();
        }
        {
            let (_wal, recovery) = WriteAheadLog::open(&path, false).unwrap();
            assert_eq!(recovery.committed_units, 2);
            assert_eq!(
                recovery.entries.last(),
                Some(&JournalEntry::ClickStamped { account: 7, at: 200 })
            );
        }
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_corrupt_frame_ends_scan() {
        let path = temp_journal_path();
        {
            let (wal, _) = WriteAheadLog::open(&path, false).unwrap();
            wal.commit(&sample_unit()).unwrap();
        }

        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 10;
        bytes[last] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        let (_wal, recovery) = WriteAheadLog::open(&path, false).unwrap();
        assert_eq!(recovery.committed_units, 0);
        assert!(recovery.entries.is_empty());
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_second_writer_is_refused() {
        let path = temp_journal_path();
        let (wal, _) = WriteAheadLog::open(&path, false).unwrap();
        wal.commit(&sample_unit()).unwrap();

        let err = WriteAheadLog::open(&path, false).unwrap_err();
        assert!(matches!(err, EconomyError::Journal(_)));

        // The refused open must not have touched the first writer's units.
        wal.commit(&[JournalEntry::ClickStamped { account: 7, at: 300 }]).unwrap();
        drop(wal);

        let (_wal, recovery) = WriteAheadLog::open(&path, false).unwrap();
        assert_eq!(recovery.committed_units, 2);
        assert_eq!(recovery.truncated_bytes, 0);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_inspect_never_writes() {
        let path = temp_journal_path();
        let (wal, _) = WriteAheadLog::open(&path, false).unwrap();
        wal.commit(&sample_unit()).unwrap();

        // A half-written unit from the live writer.
        let mut torn = Vec::new();
        WriteAheadLog::push_frame(&mut torn, 10, FrameKind::Begin, &[]);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&torn).unwrap();
        file.write_all(&[1, 2, 3]).unwrap();
        drop(file);
        let len = fs::metadata(&path).unwrap().len();

        let recovery = WriteAheadLog::inspect(&path).unwrap();
        assert_eq!(recovery.entries, sample_unit());
        assert_eq!(recovery.discarded_units, 1);
        assert_eq!(recovery.truncated_bytes, torn.len() as u64 + 3);
        assert_eq!(fs::metadata(&path).unwrap().len(), len);

        drop(wal);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_huge_length_field_reads_as_torn_tail() {
        let path = temp_journal_path();
        {
            let (wal, _) = WriteAheadLog::open(&path, false).unwrap();
            wal.commit(&sample_unit()).unwrap();
        }

        let mut head = Vec::new();
        head.extend_from_slice(&5u64.to_le_bytes());
        head.push(FrameKind::Entry as u8);
        head.extend_from_slice(&u32::MAX.to_le_bytes());
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&head).unwrap();
        drop(file);

        let (_wal, recovery) = WriteAheadLog::open(&path, false).unwrap();
        assert_eq!(recovery.committed_units, 1);
        assert_eq!(recovery.truncated_bytes, head.len() as u64);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_oversized_entry_is_refused() {
        let path = temp_journal_path();
        let (wal, _) = WriteAheadLog::open(&path, false).unwrap();
        let huge = JournalEntry::AccountOpened {
            account: 1,
            display_name: "x".repeat(MAX_PAYLOAD),
            at: 0,
        };
        assert!(matches!(wal.commit(&[huge]), Err(EconomyError::Journal(_))));
        wal.commit(&sample_unit()).unwrap();
        drop(wal);

        let (_wal, recovery) = WriteAheadLog::open(&path, false).unwrap();
        assert_eq!(recovery.entries, sample_unit());
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_rejects_foreign_file() {
        let path = temp_journal_path();
        fs::write(&path, b"not a journal at all").unwrap();
        let err = WriteAheadLog::open(&path, false).unwrap_err();
        assert!(matches!(err, EconomyError::CorruptJournal(_)));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_memory_journal_keeps_units() {
        let journal = MemoryJournal::new();
        journal.commit(&sample_unit()).unwrap();
        journal.commit(&[JournalEntry::ClickStamped { account: 7, at: 1 }]).unwrap();
        assert_eq!(journal.units().len(), 2);
        assert_eq!(journal.entries().len(), 4);
    }
}
