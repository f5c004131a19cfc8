//! # redb-backed Case and Tip Storage
//!
//! A disk-backed store using the redb embedded database.
//!
//! - ACID transactions: every mutating call is one write transaction
//! - Crash safety (copy-on-write B-trees)
//! - MVCC: readers never block the single writer
//!
//! ## Layout
//!
//! | Table | Key | Value |
//! |-------|-----|-------|
//! | `cases` | case id | postcard [`CaseRecord`] (case without evidence and notes) |
//! | `evidence` | (case id, evidence id) | postcard [`Evidence`] |
//! | `notes` | (case id, note id) | postcard [`Note`] |
//! | `timeline` | (case id, entry id) | postcard [`TimelineEntry`] |
//! | `tips` | tip id | postcard [`Tip`] |
//! | `metadata` | counter name | next id |

use crate::case::{
    Appended, AppliedChange, Case, CaseFilter, CaseMutation, EntityLink, Evidence, NewCase, Note,
    TenderLink, TimelineEntry,
};
use crate::store::{BatchOutcome, CaseStore, LinkOutcome, TipStore, prepare_batch, sort_tips};
use crate::tip::{self, Tip, TipFilter, TipPatch, TipSubmission, TriageAssessment};
use crate::types::{CaseId, IdSequence, TipId};
use crate::{CaseStatus, EngineError, Priority, TipStatus};
use chrono::{DateTime, Utc};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Table for case headers: CaseId(u64) -> serialized CaseRecord bytes
const CASES: TableDefinition<u64, &[u8]> = TableDefinition::new("cases");

/// Table for evidence: (case_id, evidence_id) -> serialized Evidence
const EVIDENCE: TableDefinition<(u64, u64), &[u8]> = TableDefinition::new("evidence");

/// Table for notes: (case_id, note_id) -> serialized Note
const NOTES: TableDefinition<(u64, u64), &[u8]> = TableDefinition::new("notes");

/// Table for the timeline: (case_id, entry_id) -> serialized TimelineEntry
const TIMELINE: TableDefinition<(u64, u64), &[u8]> = TableDefinition::new("timeline");

/// Table for tips: TipId(u64) -> serialized Tip
const TIPS: TableDefinition<u64, &[u8]> = TableDefinition::new("tips");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const SEQUENCE_KEYS: [&str; 5] = [
    "next_case",
    "next_evidence",
    "next_note",
    "next_timeline",
    "next_tip",
];

fn storage_err(e: impl std::fmt::Display) -> EngineError {
    EngineError::Storage(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, EngineError> {
    postcard::to_allocvec(value).map_err(|e| EngineError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, EngineError> {
    postcard::from_bytes(bytes).map_err(|e| EngineError::Serialization(e.to_string()))
}

/// Persisted form of a case. Evidence and notes live in their own tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CaseRecord {
    id: CaseId,
    title: String,
    description: String,
    status: CaseStatus,
    priority: Priority,
    assigned_to: Option<String>,
    tenders: Vec<TenderLink>,
    entities: Vec<EntityLink>,
    created_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl From<&Case> for CaseRecord {
    fn from(case: &Case) -> Self {
        Self {
            id: case.id,
            title: case.title.clone(),
            description: case.description.clone(),
            status: case.status,
            priority: case.priority,
            assigned_to: case.assigned_to.clone(),
            tenders: case.tenders.clone(),
            entities: case.entities.clone(),
            created_by: case.created_by.clone(),
            created_at: case.created_at,
            updated_at: case.updated_at,
            version: case.version,
        }
    }
}

impl CaseRecord {
    fn into_case(self, evidence: Vec<Evidence>, notes: Vec<Note>) -> Case {
        Case {
            id: self.id,
            title: self.title,
            description: self.description,
            status: self.status,
            priority: self.priority,
            assigned_to: self.assigned_to,
            tenders: self.tenders,
            entities: self.entities,
            evidence,
            notes,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        }
    }
}

/// A disk-backed case and tip store using redb.
pub struct RedbStore {
    /// The redb database handle.
    db: Database,
    /// Committed id sequence; mirrors the `metadata` table.
    ids: IdSequence,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("ids", &self.ids)
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let db = Database::create(path.as_ref()).map_err(storage_err)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(storage_err)?;
            let _ = write_txn.open_table(CASES).map_err(storage_err)?;
            let _ = write_txn.open_table(EVIDENCE).map_err(storage_err)?;
            let _ = write_txn.open_table(NOTES).map_err(storage_err)?;
            let _ = write_txn.open_table(TIMELINE).map_err(storage_err)?;
            let _ = write_txn.open_table(TIPS).map_err(storage_err)?;
            let _ = write_txn.open_table(METADATA).map_err(storage_err)?;
            write_txn.commit().map_err(storage_err)?;
        }

        // Load the id sequence
        let ids = {
            let read_txn = db.begin_read().map_err(storage_err)?;
            let table = read_txn.open_table(METADATA).map_err(storage_err)?;
            let mut counters = [1_u64; 5];
            for (slot, key) in counters.iter_mut().zip(SEQUENCE_KEYS) {
                if let Some(value) = table.get(key).map_err(storage_err)? {
                    *slot = value.value();
                }
            }
            let [next_case, next_evidence, next_note, next_timeline, next_tip] = counters;
            IdSequence {
                next_case,
                next_evidence,
                next_note,
                next_timeline,
                next_tip,
            }
        };

        Ok(Self { db, ids })
    }

    /// Number of stored cases.
    pub fn case_count(&self) -> Result<usize, EngineError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(CASES).map_err(storage_err)?;
        Ok(table.len().map_err(storage_err)? as usize)
    }

    /// Number of stored tips.
    pub fn tip_count(&self) -> Result<usize, EngineError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(TIPS).map_err(storage_err)?;
        Ok(table.len().map_err(storage_err)? as usize)
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), EngineError> {
        self.db.compact().map_err(storage_err)?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // reads
    // -------------------------------------------------------------------------

    fn load_case(&self, id: CaseId) -> Result<Case, EngineError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let cases = read_txn.open_table(CASES).map_err(storage_err)?;
        let record: CaseRecord = match cases.get(id.0).map_err(storage_err)? {
            Some(bytes) => decode(bytes.value())?,
            None => return Err(EngineError::CaseNotFound(id)),
        };

        let evidence_table = read_txn.open_table(EVIDENCE).map_err(storage_err)?;
        let mut evidence = Vec::new();
        for entry in evidence_table
            .range((id.0, 0)..=(id.0, u64::MAX))
            .map_err(storage_err)?
        {
            let (_, value) = entry.map_err(storage_err)?;
            evidence.push(decode::<Evidence>(value.value())?);
        }

        let notes_table = read_txn.open_table(NOTES).map_err(storage_err)?;
        let mut notes = Vec::new();
        for entry in notes_table
            .range((id.0, 0)..=(id.0, u64::MAX))
            .map_err(storage_err)?
        {
            let (_, value) = entry.map_err(storage_err)?;
            notes.push(decode::<Note>(value.value())?);
        }

        Ok(record.into_case(evidence, notes))
    }

    fn load_tip(&self, id: TipId) -> Result<Tip, EngineError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let tips = read_txn.open_table(TIPS).map_err(storage_err)?;
        match tips.get(id.0).map_err(storage_err)? {
            Some(bytes) => decode(bytes.value()),
            None => Err(EngineError::TipNotFound(id)),
        }
    }

    // -------------------------------------------------------------------------
    // writes
    // -------------------------------------------------------------------------

    /// Run `f` in one write transaction; commit, then adopt `ids`.
    fn commit<F>(&mut self, ids: IdSequence, f: F) -> Result<(), EngineError>
    where
        F: FnOnce(&WriteTransaction) -> Result<(), EngineError>,
    {
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        f(&write_txn)?;
        {
            let mut meta_table = write_txn.open_table(METADATA).map_err(storage_err)?;
            let values = [
                ids.next_case,
                ids.next_evidence,
                ids.next_note,
                ids.next_timeline,
                ids.next_tip,
            ];
            for (key, value) in SEQUENCE_KEYS.into_iter().zip(values) {
                meta_table.insert(key, value).map_err(storage_err)?;
            }
        }
        write_txn.commit().map_err(storage_err)?;

        // Update in-memory state only after successful commit.
        self.ids = ids;
        Ok(())
    }
}

fn put_case(txn: &WriteTransaction, case: &Case) -> Result<(), EngineError> {
    let bytes = encode(&CaseRecord::from(case))?;
    let mut table = txn.open_table(CASES).map_err(storage_err)?;
    table.insert(case.id.0, bytes.as_slice()).map_err(storage_err)?;
    Ok(())
}

fn put_entry(txn: &WriteTransaction, entry: &TimelineEntry) -> Result<(), EngineError> {
    let bytes = encode(entry)?;
    let mut table = txn.open_table(TIMELINE).map_err(storage_err)?;
    table
        .insert((entry.case_id.0, entry.id.0), bytes.as_slice())
        .map_err(storage_err)?;
    Ok(())
}

fn put_tip(txn: &WriteTransaction, tip: &Tip) -> Result<(), EngineError> {
    let bytes = encode(tip)?;
    let mut table = txn.open_table(TIPS).map_err(storage_err)?;
    table.insert(tip.id.0, bytes.as_slice()).map_err(storage_err)?;
    Ok(())
}

/// Case header, then the appended sub-record and timeline entry of each change.
fn put_changes(txn: &WriteTransaction, case: &Case, changes: &[AppliedChange]) -> Result<(), EngineError> {
    put_case(txn, case)?;
    for change in changes {
        put_appended(txn, case, change.appended.as_ref())?;
        put_entry(txn, &change.entry)?;
    }
    Ok(())
}

fn put_appended(txn: &WriteTransaction, case: &Case, appended: Option<&Appended>) -> Result<(), EngineError> {
    match appended {
        Some(Appended::Evidence(evidence)) => {
            let bytes = encode(evidence)?;
            let mut table = txn.open_table(EVIDENCE).map_err(storage_err)?;
            table
                .insert((case.id.0, evidence.id.0), bytes.as_slice())
                .map_err(storage_err)?;
        }
        Some(Appended::Note(note)) => {
            let bytes = encode(note)?;
            let mut table = txn.open_table(NOTES).map_err(storage_err)?;
            table
                .insert((case.id.0, note.id.0), bytes.as_slice())
                .map_err(storage_err)?;
        }
        None => {}
    }
    Ok(())
}

impl CaseStore for RedbStore {
    fn create_case(
        &mut self,
        draft: NewCase,
        actor: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Case, EngineError> {
        let mut ids = self.ids;
        let (case, entry) = Case::create(draft, actor, &mut ids, at)?;
        self.commit(ids, |txn| {
            put_case(txn, &case)?;
            put_entry(txn, &entry)
        })?;
        Ok(case)
    }

    fn case(&self, id: CaseId) -> Result<Case, EngineError> {
        self.load_case(id)
    }

    fn cases(&self, filter: &CaseFilter) -> Result<Vec<Case>, EngineError> {
        let matching: Vec<CaseId> = {
            let read_txn = self.db.begin_read().map_err(storage_err)?;
            let table = read_txn.open_table(CASES).map_err(storage_err)?;
            let mut ids = Vec::new();
            for entry in table.iter().map_err(storage_err)? {
                let (_, value) = entry.map_err(storage_err)?;
                let header = decode::<CaseRecord>(value.value())?.into_case(Vec::new(), Vec::new());
                if filter.matches(&header) {
                    ids.push(header.id);
                    if ids.len() >= filter.cap() {
                        break;
                    }
                }
            }
            ids
        };
        matching.into_iter().map(|id| self.load_case(id)).collect()
    }

    fn mutate_case_all(
        &mut self,
        id: CaseId,
        mutations: Vec<CaseMutation>,
        actor: Option<&str>,
        expected_version: Option<u64>,
        at: DateTime<Utc>,
    ) -> Result<BatchOutcome, EngineError> {
        let current = self.load_case(id)?;
        let (case, changes, ids) =
            prepare_batch(current, mutations, actor, expected_version, self.ids, at)?;

        if !changes.is_empty() {
            self.commit(ids, |txn| put_changes(txn, &case, &changes))?;
        }
        Ok(BatchOutcome {
            case,
            entries: changes.into_iter().map(|c| c.entry).collect(),
        })
    }

    fn timeline(&self, id: CaseId) -> Result<Vec<TimelineEntry>, EngineError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let cases = read_txn.open_table(CASES).map_err(storage_err)?;
        if cases.get(id.0).map_err(storage_err)?.is_none() {
            return Err(EngineError::CaseNotFound(id));
        }

        let table = read_txn.open_table(TIMELINE).map_err(storage_err)?;
        let mut entries = Vec::new();
        for entry in table
            .range((id.0, 0)..=(id.0, u64::MAX))
            .map_err(storage_err)?
        {
            let (_, value) = entry.map_err(storage_err)?;
            entries.push(decode::<TimelineEntry>(value.value())?);
        }
        Ok(entries)
    }
}

impl TipStore for RedbStore {
    fn submit_tip(
        &mut self,
        submission: TipSubmission,
        assessment: TriageAssessment,
        at: DateTime<Utc>,
    ) -> Result<Tip, EngineError> {
        let mut ids = self.ids;
        let tip = Tip::submit(submission, assessment, &mut ids, at)?;
        self.commit(ids, |txn| put_tip(txn, &tip))?;
        Ok(tip)
    }

    fn tip(&self, id: TipId) -> Result<Tip, EngineError> {
        self.load_tip(id)
    }

    fn tips(&self, filter: &TipFilter) -> Result<Vec<Tip>, EngineError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(TIPS).map_err(storage_err)?;
        let mut tips = Vec::new();
        for entry in table.iter().map_err(storage_err)? {
            let (_, value) = entry.map_err(storage_err)?;
            let tip = decode::<Tip>(value.value())?;
            if filter.matches(&tip) {
                tips.push(tip);
            }
        }
        sort_tips(&mut tips);
        tips.truncate(filter.cap());
        Ok(tips)
    }

    fn patch_tip(&mut self, id: TipId, patch: TipPatch, at: DateTime<Utc>) -> Result<Tip, EngineError> {
        let mut tip = self.load_tip(id)?;
        if tip.apply_patch(patch, at)? {
            let ids = self.ids;
            self.commit(ids, |txn| put_tip(txn, &tip))?;
        }
        Ok(tip)
    }

    fn link_tip(
        &mut self,
        id: TipId,
        case_id: CaseId,
        actor: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<LinkOutcome, EngineError> {
        let mut tip = self.load_tip(id)?;
        let mut case = self.load_case(case_id)?;
        let mut ids = self.ids;
        let change = tip::link(&mut tip, &mut case, actor, &mut ids, at)?;

        self.commit(ids, |txn| {
            put_tip(txn, &tip)?;
            put_changes(txn, &case, std::slice::from_ref(&change))
        })?;
        Ok(LinkOutcome {
            tip,
            case,
            entry: change.entry,
        })
    }

    fn unlink_tip(
        &mut self,
        id: TipId,
        actor: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<LinkOutcome, EngineError> {
        let mut tip = self.load_tip(id)?;
        let case_id = tip
            .linked_case_id
            .ok_or_else(|| EngineError::transition(tip.status, TipStatus::Investigating))?;
        let mut case = self.load_case(case_id)?;
        let mut ids = self.ids;
        let change = tip::unlink(&mut tip, &mut case, actor, &mut ids, at)?;

        self.commit(ids, |txn| {
            put_tip(txn, &tip)?;
            put_changes(txn, &case, std::slice::from_ref(&change))
        })?;
        Ok(LinkOutcome {
            tip,
            case,
            entry: change.entry,
        })
    }
}
