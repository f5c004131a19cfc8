//! # Store Traits
//!
//! [`CaseStore`] and [`TipStore`] abstract over the in-memory and
//! redb-backed implementations.
//!
//! ## Write discipline
//!
//! Every mutating call follows the same steps:
//! 1. Load the aggregate(s) and check the caller's expected version
//! 2. Apply the pure aggregate logic to a copy, drawing ids from a copy of
//!    the sequence
//! 3. Commit aggregate, sub-records, timeline entries and sequence together
//!
//! A failure in steps 1-2 writes nothing. Step 3 is one transaction, also
//! when a batch of case updates produces several timeline entries.

use crate::case::{AppliedChange, Case, CaseChange, CaseFilter, CaseMutation, NewCase, TimelineEntry};
use crate::tip::{self, Tip, TipFilter, TipPatch, TipSubmission, TriageAssessment};
use crate::types::{CaseId, IdSequence, TimelineId, TipId};
use crate::EngineError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Result of [`CaseStore::mutate_case`].
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    /// The case after the mutation.
    pub case: Case,
    /// The appended timeline entry; `None` when the mutation was a no-op.
    pub entry: Option<TimelineEntry>,
}

/// Result of [`CaseStore::mutate_case_all`].
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    /// The case after every mutation of the batch.
    pub case: Case,
    /// One entry per mutation that changed something, in application order.
    pub entries: Vec<TimelineEntry>,
}

/// Result of linking or unlinking a tip.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkOutcome {
    pub tip: Tip,
    pub case: Case,
    pub entry: TimelineEntry,
}

/// Storage of investigation cases and their timelines.
pub trait CaseStore {
    /// Validate and persist a new case plus its `case_created` entry.
    fn create_case(
        &mut self,
        draft: NewCase,
        actor: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Case, EngineError>;

    /// Fetch one case with its evidence and notes.
    fn case(&self, id: CaseId) -> Result<Case, EngineError>;

    /// Cases matching `filter`, ordered by id.
    fn cases(&self, filter: &CaseFilter) -> Result<Vec<Case>, EngineError>;

    /// Apply one field-level update atomically with its timeline entry.
    fn mutate_case(
        &mut self,
        id: CaseId,
        mutation: CaseMutation,
        actor: Option<&str>,
        expected_version: Option<u64>,
        at: DateTime<Utc>,
    ) -> Result<MutationOutcome, EngineError> {
        let mut outcome = self.mutate_case_all(id, vec![mutation], actor, expected_version, at)?;
        Ok(MutationOutcome {
            case: outcome.case,
            entry: outcome.entries.pop(),
        })
    }

    /// Apply several updates to one case in order, all or nothing.
    ///
    /// `expected_version` is checked once against the stored case. Every
    /// update is validated against the result of the previous one before
    /// anything is written; the case, its sub-records and one timeline entry
    /// per effective update are then committed together.
    fn mutate_case_all(
        &mut self,
        id: CaseId,
        mutations: Vec<CaseMutation>,
        actor: Option<&str>,
        expected_version: Option<u64>,
        at: DateTime<Utc>,
    ) -> Result<BatchOutcome, EngineError>;

    /// Timeline of a case in id order, which is the order of the writes.
    fn timeline(&self, id: CaseId) -> Result<Vec<TimelineEntry>, EngineError>;
}

/// Storage of whistleblower tips.
pub trait TipStore {
    fn submit_tip(
        &mut self,
        submission: TipSubmission,
        assessment: TriageAssessment,
        at: DateTime<Utc>,
    ) -> Result<Tip, EngineError>;

    fn tip(&self, id: TipId) -> Result<Tip, EngineError>;

    /// Tips matching `filter`, newest first.
    fn tips(&self, filter: &TipFilter) -> Result<Vec<Tip>, EngineError>;

    fn patch_tip(&mut self, id: TipId, patch: TipPatch, at: DateTime<Utc>) -> Result<Tip, EngineError>;

    /// Link a tip into a case; tip, evidence and timeline entry commit together.
    fn link_tip(
        &mut self,
        id: TipId,
        case_id: CaseId,
        actor: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<LinkOutcome, EngineError>;

    /// Undo a link made by [`TipStore::link_tip`].
    fn unlink_tip(
        &mut self,
        id: TipId,
        actor: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<LinkOutcome, EngineError>;
}

// =============================================================================
// SHARED STEPS
// =============================================================================

/// Steps 1-2 of a case mutation batch, independent of the backend.
pub(crate) fn prepare_batch(
    mut case: Case,
    mutations: Vec<CaseMutation>,
    actor: Option<&str>,
    expected_version: Option<u64>,
    mut ids: IdSequence,
    at: DateTime<Utc>,
) -> Result<(Case, Vec<AppliedChange>, IdSequence), EngineError> {
    case.check_version(expected_version)?;
    let mut changes = Vec::with_capacity(mutations.len());
    for mutation in mutations {
        if let CaseChange::Applied(applied) = case.apply(mutation, actor, &mut ids, at)? {
            changes.push(applied);
        }
    }
    Ok((case, changes, ids))
}

/// Newest tips first, ties broken by id.
pub(crate) fn sort_tips(tips: &mut [Tip]) {
    tips.sort_by(|a, b| (b.submitted_at, b.id).cmp(&(a.submitted_at, a.id)));
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

/// Volatile store for tests, demos and `--memory` runs.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    ids: IdSequence,
    cases: BTreeMap<CaseId, Case>,
    timeline: BTreeMap<(CaseId, TimelineId), TimelineEntry>,
    tips: BTreeMap<TipId, Tip>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ids: IdSequence::new(),
            cases: BTreeMap::new(),
            timeline: BTreeMap::new(),
            tips: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn case_count(&self) -> usize {
        self.cases.len()
    }

    #[must_use]
    pub fn tip_count(&self) -> usize {
        self.tips.len()
    }

    fn stored_case(&self, id: CaseId) -> Result<&Case, EngineError> {
        self.cases.get(&id).ok_or(EngineError::CaseNotFound(id))
    }

    fn stored_tip(&self, id: TipId) -> Result<&Tip, EngineError> {
        self.tips.get(&id).ok_or(EngineError::TipNotFound(id))
    }

    fn push_entry(&mut self, entry: TimelineEntry) {
        self.timeline.insert((entry.case_id, entry.id), entry);
    }
}

impl CaseStore for MemoryStore {
    fn create_case(
        &mut self,
        draft: NewCase,
        actor: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Case, EngineError> {
        let mut ids = self.ids;
        let (case, entry) = Case::create(draft, actor, &mut ids, at)?;
        self.ids = ids;
        self.cases.insert(case.id, case.clone());
        self.push_entry(entry);
        Ok(case)
    }

    fn case(&self, id: CaseId) -> Result<Case, EngineError> {
        self.stored_case(id).cloned()
    }

    fn cases(&self, filter: &CaseFilter) -> Result<Vec<Case>, EngineError> {
        Ok(self
            .cases
            .values()
            .filter(|c| filter.matches(c))
            .take(filter.cap())
            .cloned()
            .collect())
    }

    fn mutate_case_all(
        &mut self,
        id: CaseId,
        mutations: Vec<CaseMutation>,
        actor: Option<&str>,
        expected_version: Option<u64>,
        at: DateTime<Utc>,
    ) -> Result<BatchOutcome, EngineError> {
        let current = self.stored_case(id)?.clone();
        let (case, changes, ids) =
            prepare_batch(current, mutations, actor, expected_version, self.ids, at)?;

        if !changes.is_empty() {
            self.ids = ids;
            self.cases.insert(id, case.clone());
        }
        let entries: Vec<TimelineEntry> = changes.into_iter().map(|c| c.entry).collect();
        for entry in &entries {
            self.push_entry(entry.clone());
        }
        Ok(BatchOutcome { case, entries })
    }

    fn timeline(&self, id: CaseId) -> Result<Vec<TimelineEntry>, EngineError> {
        self.stored_case(id)?;
        Ok(self
            .timeline
            .range((id, TimelineId(0))..=(id, TimelineId(u64::MAX)))
            .map(|(_, e)| e.clone())
            .collect())
    }
}

impl TipStore for MemoryStore {
    fn submit_tip(
        &mut self,
        submission: TipSubmission,
        assessment: TriageAssessment,
        at: DateTime<Utc>,
    ) -> Result<Tip, EngineError> {
        let mut ids = self.ids;
        let tip = Tip::submit(submission, assessment, &mut ids, at)?;
        self.ids = ids;
        self.tips.insert(tip.id, tip.clone());
        Ok(tip)
    }

    fn tip(&self, id: TipId) -> Result<Tip, EngineError> {
        self.stored_tip(id).cloned()
    }

    fn tips(&self, filter: &TipFilter) -> Result<Vec<Tip>, EngineError> {
        let mut tips: Vec<Tip> = self
            .tips
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        sort_tips(&mut tips);
        tips.truncate(filter.cap());
        Ok(tips)
    }

    fn patch_tip(&mut self, id: TipId, patch: TipPatch, at: DateTime<Utc>) -> Result<Tip, EngineError> {
        let mut tip = self.stored_tip(id)?.clone();
        if tip.apply_patch(patch, at)? {
            self.tips.insert(id, tip.clone());
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
        let mut tip = self.stored_tip(id)?.clone();
        let mut case = self.stored_case(case_id)?.clone();
        let mut ids = self.ids;
        let change = tip::link(&mut tip, &mut case, actor, &mut ids, at)?;

        self.ids = ids;
        self.tips.insert(id, tip.clone());
        self.cases.insert(case_id, case.clone());
        self.push_entry(change.entry.clone());
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
        let mut tip = self.stored_tip(id)?.clone();
        let case_id = tip
            .linked_case_id
            .ok_or_else(|| EngineError::transition(tip.status, crate::TipStatus::Investigating))?;
        let mut case = self.stored_case(case_id)?.clone();
        let mut ids = self.ids;
        let change = tip::unlink(&mut tip, &mut case, actor, &mut ids, at)?;

        self.ids = ids;
        self.tips.insert(id, tip.clone());
        self.cases.insert(case_id, case.clone());
        self.push_entry(change.entry.clone());
        Ok(LinkOutcome {
            tip,
            case,
            entry: change.entry,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::{TenderLink, action};
    use crate::{CaseStatus, TipCategory, TipStatus};

    fn store_with_case() -> (MemoryStore, CaseId) {
        let mut store = MemoryStore::new();
        let case = store
            .create_case(NewCase::titled("Hospital generators"), Some("alice"), Utc::now())
            .expect("create");
        (store, case.id)
    }

    #[test]
    fn every_mutation_appends_exactly_one_entry() {
        let (mut store, id) = store_with_case();
        store
            .mutate_case(id, CaseMutation::SetStatus(CaseStatus::InProgress), None, None, Utc::now())
            .expect("status");
        store
            .mutate_case(
                id,
                CaseMutation::AddNote {
                    content: "Requested bid files".to_string(),
                    author: None,
                },
                Some("bob"),
                None,
                Utc::now(),
            )
            .expect("note");

        let timeline = store.timeline(id).expect("timeline");
        let actions: Vec<&str> = timeline.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(
            actions,
            vec![action::CASE_CREATED, action::STATUS_CHANGED, action::NOTE_ADDED]
        );
    }

    #[test]
    fn duplicate_attach_writes_nothing() {
        let (mut store, id) = store_with_case();
        let link = TenderLink {
            tender_id: "UA-2024-02-02-000001-a".to_string(),
            role: None,
        };
        let first = store
            .mutate_case(id, CaseMutation::AttachTender(link.clone()), None, None, Utc::now())
            .expect("attach");
        assert!(first.entry.is_some());
        let second = store
            .mutate_case(id, CaseMutation::AttachTender(link), None, None, Utc::now())
            .expect("attach again");
        assert!(second.entry.is_none());
        assert_eq!(store.timeline(id).expect("timeline").len(), 2);
    }

    #[test]
    fn stale_version_is_rejected_before_any_write() {
        let (mut store, id) = store_with_case();
        store
            .mutate_case(id, CaseMutation::SetStatus(CaseStatus::InProgress), None, Some(1), Utc::now())
            .expect("first writer");
        let stale = store.mutate_case(
            id,
            CaseMutation::SetStatus(CaseStatus::Archived),
            None,
            Some(1),
            Utc::now(),
        );
        assert!(matches!(stale, Err(EngineError::ConcurrentModification { .. })));
        assert_eq!(store.case(id).expect("case").status, CaseStatus::InProgress);
        assert_eq!(store.timeline(id).expect("timeline").len(), 2);
    }

    #[test]
    fn batch_is_one_write_guarded_by_one_version() {
        let (mut store, id) = store_with_case();
        let outcome = store
            .mutate_case_all(
                id,
                vec![
                    CaseMutation::SetPriority(crate::Priority::Critical),
                    CaseMutation::SetPriority(crate::Priority::Critical),
                    CaseMutation::SetStatus(CaseStatus::InProgress),
                ],
                Some("alice"),
                Some(1),
                Utc::now(),
            )
            .expect("batch");
        assert_eq!(outcome.entries.len(), 2);
        assert_eq!(outcome.case.version, 3);

        let stale = store.mutate_case_all(
            id,
            vec![CaseMutation::SetStatus(CaseStatus::Review)],
            None,
            Some(1),
            Utc::now(),
        );
        assert!(matches!(stale, Err(EngineError::ConcurrentModification { .. })));
        assert_eq!(store.timeline(id).expect("timeline").len(), 3);
    }

    #[test]
    fn invalid_change_late_in_batch_writes_nothing() {
        let (mut store, id) = store_with_case();
        let before = store.clone();
        let result = store.mutate_case_all(
            id,
            vec![
                CaseMutation::SetStatus(CaseStatus::InProgress),
                CaseMutation::SetStatus(CaseStatus::Review),
                CaseMutation::SetStatus(CaseStatus::Closed),
                CaseMutation::SetStatus(CaseStatus::Archived),
            ],
            None,
            None,
            Utc::now(),
        );
        assert!(matches!(result, Err(EngineError::InvalidTransition { .. })));
        assert_eq!(store.case(id).expect("case"), before.case(id).expect("case"));
        assert_eq!(store.ids, before.ids);
        assert_eq!(store.timeline(id).expect("timeline").len(), 1);
    }

    #[test]
    fn timeline_follows_write_order_when_the_clock_steps_back() {
        let (mut store, id) = store_with_case();
        let earlier = Utc::now() - chrono::Duration::hours(1);
        store
            .mutate_case(id, CaseMutation::SetStatus(CaseStatus::InProgress), None, None, earlier)
            .expect("status");

        let actions: Vec<String> = store
            .timeline(id)
            .expect("timeline")
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, vec!["case_created", "status_changed"]);
    }

    #[test]
    fn missing_records_are_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(store.case(CaseId(9)), Err(EngineError::CaseNotFound(_))));
        assert!(matches!(store.timeline(CaseId(9)), Err(EngineError::CaseNotFound(_))));
        assert!(matches!(store.tip(TipId(9)), Err(EngineError::TipNotFound(_))));
    }

    #[test]
    fn link_and_unlink_round_trip() {
        let (mut store, case_id) = store_with_case();
        let tip = store
            .submit_tip(
                TipSubmission {
                    category: TipCategory::Fraud,
                    description: "Invoices for work never done".to_string(),
                },
                TriageAssessment::default(),
                Utc::now(),
            )
            .expect("submit");
        store
            .patch_tip(
                tip.id,
                TipPatch {
                    status: Some(TipStatus::UnderReview),
                    ..TipPatch::default()
                },
                Utc::now(),
            )
            .expect("review");

        let linked = store.link_tip(tip.id, case_id, None, Utc::now()).expect("link");
        assert_eq!(linked.tip.linked_case_id, Some(case_id));
        assert_eq!(linked.case.evidence.len(), 1);

        let again = store.link_tip(tip.id, case_id, None, Utc::now());
        assert!(matches!(again, Err(EngineError::InvalidTransition { .. })));

        let unlinked = store.unlink_tip(tip.id, None, Utc::now()).expect("unlink");
        assert_eq!(unlinked.tip.status, TipStatus::Investigating);
        let actions: Vec<String> = store
            .timeline(case_id)
            .expect("timeline")
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, vec!["case_created", "tip_linked", "tip_unlinked"]);
    }

    #[test]
    fn rejected_link_keeps_sequence() {
        let (mut store, case_id) = store_with_case();
        let tip = store
            .submit_tip(
                TipSubmission {
                    category: TipCategory::Other,
                    description: "x".to_string(),
                },
                TriageAssessment::default(),
                Utc::now(),
            )
            .expect("submit");
        let before = store.ids;
        assert!(store.link_tip(tip.id, case_id, None, Utc::now()).is_err());
        assert_eq!(store.ids, before);
    }

    #[test]
    fn case_listing_honours_filter_and_limit() {
        let mut store = MemoryStore::new();
        for i in 0..5 {
            store
                .create_case(NewCase::titled(format!("case {i}")), None, Utc::now())
                .expect("create");
        }
        let filter = CaseFilter {
            limit: Some(3),
            ..CaseFilter::default()
        };
        let listed = store.cases(&filter).expect("list");
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].id, CaseId(1));
    }
}
