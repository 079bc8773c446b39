//! # Opening Ledger
//!
//! Append-only audit log of chest openings. One record per successful
//! opening, written after the grant commits. Records are never updated
//! or deleted.
//!
//! A ledger failure never rolls back the grant: the caller logs it and
//! the opening still succeeds.
//!
//! ## File Format
//!
//! ```text
//! [4 bytes: magic "CLDG"]
//! [4 bytes: version]
//!
//! Record format:
//! [8 bytes: record id]
//! [4 bytes: payload length]
//! [N bytes: payload]
//! [4 bytes: CRC32 of above]
//!
//! Payload:
//! [8 bytes: player id]
//! [8 bytes: opened_at, unix millis]
//! [1 byte: rarity]
//! [1 byte: currency]
//! [8 bytes: cost paid, raw fixed-point]
//! [2 bytes + N: chest id]
//! [2 bytes + N: item id]
//! ```
//!
//! All integers are little-endian. On open, a torn tail (a record that
//! fails to parse or verify) is truncated away. A failed append is rolled
//! back to the last complete record before the error is returned.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::catalog::{ChestId, Currency, ItemId};
use crate::error::{EconomyError, EconomyResult};
use crate::fixed_point::FixedPoint;
use crate::rarity::Rarity;
use crate::store::PlayerId;

/// Magic bytes identifying a ledger file.
const LEDGER_MAGIC: &[u8; 4] = b"CLDG";

/// Current ledger format version.
const LEDGER_VERSION: u32 = 1;

const HEADER_LEN: u64 = 8;

/// An opening to be recorded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpeningEntry {
    /// Who opened the chest.
    pub player_id: PlayerId,
    /// Which chest.
    pub chest_id: ChestId,
    /// What was awarded.
    pub item_id: ItemId,
    /// Rarity of the award.
    pub rarity: Rarity,
    /// Amount charged, zero when opening is free.
    pub cost_paid: FixedPoint,
    /// Currency charged.
    pub currency: Currency,
    /// When the opening completed.
    pub opened_at: DateTime<Utc>,
}

/// A stored opening record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChestOpeningRecord {
    /// Ledger-assigned id, strictly increasing.
    pub id: u64,
    /// Who opened the chest.
    pub player_id: PlayerId,
    /// Which chest.
    pub chest_id: ChestId,
    /// What was awarded.
    pub item_id: ItemId,
    /// Rarity of the award.
    pub rarity: Rarity,
    /// Amount charged.
    pub cost_paid: FixedPoint,
    /// Currency charged.
    pub currency: Currency,
    /// When the opening completed.
    pub opened_at: DateTime<Utc>,
}

impl ChestOpeningRecord {
    fn from_entry(id: u64, entry: OpeningEntry) -> Self {
        Self {
            id,
            player_id: entry.player_id,
            chest_id: entry.chest_id,
            item_id: entry.item_id,
            rarity: entry.rarity,
            cost_paid: entry.cost_paid,
            currency: entry.currency,
            opened_at: entry.opened_at,
        }
    }
}

/// Append-only store of opening records.
pub trait OpeningLedger: Send + Sync {
    /// Appends one record and returns it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::AuditFailure` if the record cannot be written.
    fn append(&self, entry: OpeningEntry) -> EconomyResult<ChestOpeningRecord>;

    /// Every record, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::AuditFailure` if the records cannot be read.
    fn records(&self) -> EconomyResult<Vec<ChestOpeningRecord>>;

    /// Forces buffered records to durable storage.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::AuditFailure` if syncing fails.
    fn sync(&self) -> EconomyResult<()> {
        Ok(())
    }
}

/// In-process ledger.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<ChestOpeningRecord>>,
}

impl MemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// True if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl OpeningLedger for MemoryLedger {
    fn append(&self, entry: OpeningEntry) -> EconomyResult<ChestOpeningRecord> {
        let mut records = self.records.lock();
        let id = records.last().map_or(1, |r| r.id + 1);
        let record = ChestOpeningRecord::from_entry(id, entry);
        records.push(record.clone());
        Ok(record)
    }

    fn records(&self) -> EconomyResult<Vec<ChestOpeningRecord>> {
        Ok(self.records.lock().clone())
    }
}

struct FileState {
    writer: BufWriter<File>,
    next_id: u64,
    /// File length covered by fully written records.
    committed_len: u64,
    /// Set when a failed write could not be rolled back.
    poisoned: bool,
}

impl FileState {
    /// Drops buffered bytes and truncates the file to the last committed
    /// record, so a failed append leaves nothing behind.
    fn rollback(&mut self) -> std::io::Result<()> {
        let file = self.writer.get_ref().try_clone()?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        let (_, _discarded) = stale.into_parts();

        let file = self.writer.get_mut();
        file.set_len(self.committed_len)?;
        file.seek(SeekFrom::Start(self.committed_len))?;
        Ok(())
    }
}

/// Ledger backed by a CRC-framed append-only file.
pub struct FileLedger {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl FileLedger {
    /// Opens or creates a ledger file.
    ///
    /// Existing records are scanned to recover the next id; anything after
    /// the last valid record is truncated.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::AuditFailure` if the file cannot be opened or
    /// has a foreign header.
    pub fn open(path: impl AsRef<Path>) -> EconomyResult<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| audit("failed to open ledger", &e))?;

        let len = file
            .metadata()
            .map_err(|e| audit("failed to read ledger metadata", &e))?
            .len();

        let (next_id, committed_len) = if len == 0 {
            file.write_all(LEDGER_MAGIC)
                .and_then(|()| file.write_all(&LEDGER_VERSION.to_le_bytes()))
                .and_then(|()| file.sync_all())
                .map_err(|e| audit("failed to write ledger header", &e))?;
            (1, HEADER_LEN)
        } else {
            let (records, valid_end) = scan(&path)?;
            if valid_end < len {
                tracing::warn!(
                    path = %path.display(),
                    dropped_bytes = len - valid_end,
                    "truncating torn ledger tail"
                );
                file.set_len(valid_end)
                    .map_err(|e| audit("failed to truncate ledger", &e))?;
            }
            (records.last().map_or(1, |r| r.id + 1), valid_end)
        };

        file.seek(SeekFrom::End(0))
            .map_err(|e| audit("failed to seek ledger", &e))?;

        tracing::debug!(path = %path.display(), next_id, "ledger opened");

        Ok(Self {
            path,
            state: Mutex::new(FileState {
                writer: BufWriter::new(file),
                next_id,
                committed_len,
                poisoned: false,
            }),
        })
    }

    /// Reads every valid record of an existing ledger file.
    ///
    /// The file is opened read-only: nothing is created, truncated or
    /// appended, and a torn tail is simply not returned.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::AuditFailure` if the file is missing,
    /// unreadable or not a ledger.
    pub fn read(path: impl AsRef<Path>) -> EconomyResult<Vec<ChestOpeningRecord>> {
        let (records, _) = scan(path.as_ref())?;
        Ok(records)
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OpeningLedger for FileLedger {
    fn append(&self, entry: OpeningEntry) -> EconomyResult<ChestOpeningRecord> {
        let mut state = self.state.lock();
        if state.poisoned {
            return Err(EconomyError::AuditFailure(format!(
                "ledger {} has an unrecovered write failure, reopen it",
                self.path.display()
            )));
        }
        let id = state.next_id;

        let mut record = ChestOpeningRecord::from_entry(id, entry);
        // Stored at millisecond precision.
        record.opened_at = DateTime::<Utc>::from_timestamp_millis(record.opened_at.timestamp_millis())
            .unwrap_or(record.opened_at);

        let frame = encode_frame(&record)?;
        let written = state
            .writer
            .write_all(&frame)
            .and_then(|()| state.writer.flush());
        if let Err(err) = written {
            if let Err(rollback_err) = state.rollback() {
                state.poisoned = true;
                tracing::warn!(
                    path = %self.path.display(),
                    error = %rollback_err,
                    "failed to roll back ledger tail"
                );
            }
            return Err(audit("ledger write failed", &err));
        }

        state.committed_len += frame.len() as u64;
        state.next_id += 1;
        Ok(record)
    }

    fn records(&self) -> EconomyResult<Vec<ChestOpeningRecord>> {
        let mut state = self.state.lock();
        state
            .writer
            .flush()
            .map_err(|e| audit("ledger flush failed", &e))?;
        let (records, _) = scan(&self.path)?;
        Ok(records)
    }

    fn sync(&self) -> EconomyResult<()> {
        let mut state = self.state.lock();
        state
            .writer
            .flush()
            .and_then(|()| state.writer.get_ref().sync_all())
            .map_err(|e| audit("ledger sync failed", &e))
    }
}

impl std::fmt::Debug for FileLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLedger").field("path", &self.path).finish()
    }
}

fn audit(context: &str, err: &std::io::Error) -> EconomyError {
    EconomyError::AuditFailure(format!("{context}: {err}"))
}

fn encode_frame(record: &ChestOpeningRecord) -> EconomyResult<Vec<u8>> {
    let mut payload = Vec::with_capacity(64);
    payload.extend_from_slice(&record.player_id.to_le_bytes());
    payload.extend_from_slice(&record.opened_at.timestamp_millis().to_le_bytes());
    payload.push(record.rarity as u8);
    payload.push(record.currency as u8);
    payload.extend_from_slice(&record.cost_paid.raw().to_le_bytes());
    push_str(&mut payload, &record.chest_id)?;
    push_str(&mut payload, &record.item_id)?;

    let payload_len = u32::try_from(payload.len())
        .map_err(|_| EconomyError::AuditFailure("ledger record too large".into()))?;

    let mut frame = Vec::with_capacity(8 + 4 + payload.len() + 4);
    frame.extend_from_slice(&record.id.to_le_bytes());
    frame.extend_from_slice(&payload_len.to_le_bytes());
    frame.extend_from_slice(&payload);
    let crc = crc32fast::hash(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

fn push_str(buf: &mut Vec<u8>, value: &str) -> EconomyResult<()> {
    let len = u16::try_from(value.len())
        .map_err(|_| EconomyError::AuditFailure(format!("identifier too long: {value}")))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(value.as_bytes());
    Ok(())
}

/// Reads every valid record and the byte offset just past the last one.
fn scan(path: &Path) -> EconomyResult<(Vec<ChestOpeningRecord>, u64)> {
    let file = File::open(path).map_err(|e| audit("failed to open ledger for reading", &e))?;
    let mut reader = BufReader::new(file);

    let mut header = [0u8; 8];
    reader
        .read_exact(&mut header)
        .map_err(|e| audit("failed to read ledger header", &e))?;
    if &header[0..4] != LEDGER_MAGIC {
        return Err(EconomyError::AuditFailure(format!(
            "{} is not a ledger file",
            path.display()
        )));
    }
    let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if version != LEDGER_VERSION {
        return Err(EconomyError::AuditFailure(format!(
            "unsupported ledger version: {version}"
        )));
    }

    let mut records = Vec::new();
    let mut offset = HEADER_LEN;
    while let Some((record, frame_len)) = read_frame(&mut reader) {
        records.push(record);
        offset += frame_len;
    }

    Ok((records, offset))
}

fn read_frame(reader: &mut impl Read) -> Option<(ChestOpeningRecord, u64)> {
    let mut head = [0u8; 12];
    reader.read_exact(&mut head).ok()?;
    let id = u64::from_le_bytes(head[0..8].try_into().ok()?);
    let payload_len = u32::from_le_bytes(head[8..12].try_into().ok()?) as usize;

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

    let record = decode_payload(id, &payload)?;
    Some((record, 12 + payload_len as u64 + 4))
}

fn decode_payload(id: u64, data: &[u8]) -> Option<ChestOpeningRecord> {
    let mut cursor = data;
    let player_id = u64::from_le_bytes(take(&mut cursor, 8)?.try_into().ok()?);
    let millis = i64::from_le_bytes(take(&mut cursor, 8)?.try_into().ok()?);
    let rarity = *take(&mut cursor, 1)?.first()?;
    let currency = Currency::from_u8(*take(&mut cursor, 1)?.first()?)?;
    let cost_raw = u64::from_le_bytes(take(&mut cursor, 8)?.try_into().ok()?);
    let chest_id = take_str(&mut cursor)?;
    let item_id = take_str(&mut cursor)?;

    Some(ChestOpeningRecord {
        id,
        player_id,
        chest_id,
        item_id,
        rarity: Rarity::from_u8(rarity),
        cost_paid: FixedPoint::from_raw(cost_raw),
        currency,
        opened_at: DateTime::<Utc>::from_timestamp_millis(millis)?,
    })
}

fn take<'a>(cursor: &mut &'a [u8], n: usize) -> Option<&'a [u8]> {
    if cursor.len() < n {
        return None;
    }
    let (head, rest) = cursor.split_at(n);
    *cursor = rest;
    Some(head)
}

fn take_str(cursor: &mut &[u8]) -> Option<String> {
    let len = u16::from_le_bytes(take(cursor, 2)?.try_into().ok()?) as usize;
    let bytes = take(cursor, len)?;
    String::from_utf8(bytes.to_vec()).ok()
}
