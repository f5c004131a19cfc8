//! # Ledger
//!
//! The case and tip ledger the application talks to.
//!
//! ## Storage Backends
//!
//! - `InMemory`: uses [`MemoryStore`] (fast, volatile)
//! - `Persistent`: uses [`RedbStore`] for disk-backed ACID storage
//!
//! The ledger stamps every write with the current UTC time; the stores
//! themselves take the timestamp as an argument so they stay testable.

use crate::case::{Case, CaseFilter, CaseMutation, NewCase, TimelineEntry};
use crate::storage::RedbStore;
use crate::store::{CaseStore, LinkOutcome, MemoryStore, MutationOutcome, TipStore};
use crate::tip::{Tip, TipFilter, TipPatch, TipSubmission};
use crate::triage::TipTriage;
use crate::types::{CaseId, TipId};
use crate::EngineError;
use chrono::Utc;
use serde::Serialize;
use std::path::Path;

/// Storage backend of a [`Ledger`].
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory store (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed store using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

// NOTE: StorageBackend does NOT implement Clone.
// RedbStore (database handle) cannot be safely cloned.

/// Record counts reported by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub cases: usize,
    pub tips: usize,
    pub persistent: bool,
}

/// Cases and tips behind one storage backend.
#[derive(Debug, Default)]
pub struct Ledger {
    backend: StorageBackend,
}

impl Ledger {
    /// Create an empty in-memory ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open or create a persistent ledger at `path`.
    pub fn with_redb(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let store = RedbStore::open(path)?;
        Ok(Self {
            backend: StorageBackend::Persistent(store),
        })
    }

    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StorageBackend::Persistent(_))
    }

    #[must_use]
    pub fn backend(&self) -> &StorageBackend {
        &self.backend
    }

    pub fn stats(&self) -> Result<LedgerStats, EngineError> {
        match &self.backend {
            StorageBackend::InMemory(store) => Ok(LedgerStats {
                cases: store.case_count(),
                tips: store.tip_count(),
                persistent: false,
            }),
            StorageBackend::Persistent(store) => Ok(LedgerStats {
                cases: store.case_count()?,
                tips: store.tip_count()?,
                persistent: true,
            }),
        }
    }

    fn case_store(&self) -> &dyn CaseStore {
        match &self.backend {
            StorageBackend::InMemory(store) => store,
            StorageBackend::Persistent(store) => store,
        }
    }

    fn case_store_mut(&mut self) -> &mut dyn CaseStore {
        match &mut self.backend {
            StorageBackend::InMemory(store) => store,
            StorageBackend::Persistent(store) => store,
        }
    }

    fn tip_store(&self) -> &dyn TipStore {
        match &self.backend {
            StorageBackend::InMemory(store) => store,
            StorageBackend::Persistent(store) => store,
        }
    }

    fn tip_store_mut(&mut self) -> &mut dyn TipStore {
        match &mut self.backend {
            StorageBackend::InMemory(store) => store,
            StorageBackend::Persistent(store) => store,
        }
    }

    // =========================================================================
    // CASES
    // =========================================================================

    pub fn create_case(&mut self, draft: NewCase, actor: Option<&str>) -> Result<Case, EngineError> {
        self.case_store_mut().create_case(draft, actor, Utc::now())
    }

    pub fn case(&self, id: CaseId) -> Result<Case, EngineError> {
        self.case_store().case(id)
    }

    pub fn cases(&self, filter: &CaseFilter) -> Result<Vec<Case>, EngineError> {
        self.case_store().cases(filter)
    }

    pub fn mutate_case(
        &mut self,
        id: CaseId,
        mutation: CaseMutation,
        actor: Option<&str>,
        expected_version: Option<u64>,
    ) -> Result<MutationOutcome, EngineError> {
        self.case_store_mut()
            .mutate_case(id, mutation, actor, expected_version, Utc::now())
    }

    /// Apply several mutations to one case as one all-or-nothing write.
    ///
    /// See [`CaseStore::mutate_case_all`].
    pub fn mutate_case_all(
        &mut self,
        id: CaseId,
        mutations: Vec<CaseMutation>,
        actor: Option<&str>,
        expected_version: Option<u64>,
    ) -> Result<(Case, Vec<TimelineEntry>), EngineError> {
        let outcome = self
            .case_store_mut()
            .mutate_case_all(id, mutations, actor, expected_version, Utc::now())?;
        Ok((outcome.case, outcome.entries))
    }

    pub fn timeline(&self, id: CaseId) -> Result<Vec<TimelineEntry>, EngineError> {
        self.case_store().timeline(id)
    }

    // =========================================================================
    // TIPS
    // =========================================================================

    /// Triage a submission and store it with its assessment.
    pub fn submit_tip(
        &mut self,
        submission: TipSubmission,
        triage: &dyn TipTriage,
    ) -> Result<Tip, EngineError> {
        let assessment = triage.assess(&submission);
        self.tip_store_mut().submit_tip(submission, assessment, Utc::now())
    }

    pub fn tip(&self, id: TipId) -> Result<Tip, EngineError> {
        self.tip_store().tip(id)
    }

    pub fn tips(&self, filter: &TipFilter) -> Result<Vec<Tip>, EngineError> {
        self.tip_store().tips(filter)
    }

    pub fn patch_tip(&mut self, id: TipId, patch: TipPatch) -> Result<Tip, EngineError> {
        self.tip_store_mut().patch_tip(id, patch, Utc::now())
    }

    pub fn link_tip(
        &mut self,
        id: TipId,
        case_id: CaseId,
        actor: Option<&str>,
    ) -> Result<LinkOutcome, EngineError> {
        self.tip_store_mut().link_tip(id, case_id, actor, Utc::now())
    }

    pub fn unlink_tip(&mut self, id: TipId, actor: Option<&str>) -> Result<LinkOutcome, EngineError> {
        self.tip_store_mut().unlink_tip(id, actor, Utc::now())
    }
}
