//! # Tip Triage
//!
//! Computes the triage output stored with a tip at intake.
//!
//! [`TipTriage`] is the seam for richer collaborators (an entity extraction
//! service, a tender search index). [`HeuristicTriage`] is the built-in
//! implementation: it only looks at the submitted text and a configured
//! catalog of known tenders, so it is deterministic and offline.
//!
//! ## Heuristic score
//!
//! ```text
//! score = base(category)
//!       + 0.10 if the description is at least 200 characters
//!       + 0.05 per extracted company (at most 0.15)
//!       + 0.10 if any tender was matched
//!       + 0.05 per distinct keyword hit (at most 0.15)
//! ```
//!
//! clamped to `[0, 1]`, then mapped to an urgency by fixed cut-offs.

use crate::tip::{ExtractedEntity, MatchedTender, TipSubmission, TriageAssessment};
use crate::{Metadata, TipCategory, Urgency};
use serde::{Deserialize, Serialize};

/// Legal-form tokens that end (or start) a company name.
const LEGAL_FORMS: &[&str] = &[
    "LLC", "LTD", "INC", "GMBH", "TOV", "LLP", "JSC", "PLC", "SA", "AG", "PJSC", "PP",
];

/// Longest company name, in words, excluding the legal form.
const MAX_NAME_WORDS: usize = 4;

const DESCRIPTION_LENGTH_FOR_BONUS: usize = 200;

/// Produces triage output for a submission.
pub trait TipTriage: Send + Sync {
    fn assess(&self, submission: &TipSubmission) -> TriageAssessment;
}

/// Configuration of [`HeuristicTriage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    /// Prefixes that identify a tender reference in free text, e.g. `UA-`.
    pub tender_prefixes: Vec<String>,
    /// Tenders whose id or title may be mentioned in tips.
    pub known_tenders: Vec<MatchedTender>,
    /// Lower-case words that raise the score when present.
    pub keywords: Vec<String>,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            tender_prefixes: vec!["UA-".to_string()],
            known_tenders: Vec::new(),
            keywords: [
                "bribe", "kickback", "cash", "collusion", "rigged", "cartel", "envelope",
                "relative", "inflated", "threat",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
        }
    }
}

/// Deterministic, text-only triage.
#[derive(Debug, Clone, Default)]
pub struct HeuristicTriage {
    config: TriageConfig,
}

impl HeuristicTriage {
    #[must_use]
    pub fn new(config: TriageConfig) -> Self {
        Self { config }
    }

    /// Base score by category.
    #[must_use]
    pub const fn category_base(category: TipCategory) -> f64 {
        match category {
            TipCategory::Bribery => 0.6,
            TipCategory::BidRigging | TipCategory::Fraud => 0.55,
            TipCategory::ConflictOfInterest => 0.5,
            TipCategory::Other => 0.3,
        }
    }

    /// Map a triage score to an urgency.
    #[must_use]
    pub fn urgency_for(score: f64) -> Urgency {
        if score >= 0.8 {
            Urgency::Critical
        } else if score >= 0.6 {
            Urgency::High
        } else if score >= 0.4 {
            Urgency::Medium
        } else {
            Urgency::Low
        }
    }

    /// Company names ending (or starting) with a legal-form token.
    #[must_use]
    pub fn extract_companies(text: &str) -> Vec<ExtractedEntity> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let mut found: Vec<ExtractedEntity> = Vec::new();

        for (i, word) in words.iter().enumerate() {
            if !is_legal_form(word) {
                continue;
            }
            let before = name_words(words[..i].iter().rev().copied());
            let name = if before.is_empty() {
                name_words(words[i + 1..].iter().copied())
            } else {
                before.into_iter().rev().collect()
            };
            if name.is_empty() {
                continue;
            }
            let form = clean(word).to_string();
            let full = if words[..i].last().is_some_and(|w| is_name_word(w)) {
                format!("{} {}", name.join(" "), form)
            } else {
                format!("{} {}", form, name.join(" "))
            };
            if !found.iter().any(|e| e.name.eq_ignore_ascii_case(&full)) {
                found.push(ExtractedEntity {
                    name: full,
                    entity_type: "company".to_string(),
                });
            }
        }
        found
    }

    /// Tender references found in `text`, in order of first appearance.
    #[must_use]
    pub fn match_tenders(&self, text: &str) -> Vec<MatchedTender> {
        let lowered = text.to_lowercase();
        let mut matched: Vec<MatchedTender> = Vec::new();

        for token in text.split_whitespace().map(clean) {
            let is_reference = self
                .config
                .tender_prefixes
                .iter()
                .any(|p| token.len() > p.len() && token.to_uppercase().starts_with(&p.to_uppercase()));
            if is_reference && !matched.iter().any(|m| m.tender_id.eq_ignore_ascii_case(token)) {
                let title = self
                    .config
                    .known_tenders
                    .iter()
                    .find(|k| k.tender_id.eq_ignore_ascii_case(token))
                    .and_then(|k| k.title.clone());
                matched.push(MatchedTender {
                    tender_id: token.to_string(),
                    title,
                });
            }
        }

        for known in &self.config.known_tenders {
            let title_hit = known
                .title
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty() && lowered.contains(&t.to_lowercase()));
            let already = matched
                .iter()
                .any(|m| m.tender_id.eq_ignore_ascii_case(&known.tender_id));
            if title_hit && !already {
                matched.push(known.clone());
            }
        }
        matched
    }

    fn keyword_hits(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let mut hits: Vec<String> = self
            .config
            .keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty() && lowered.contains(k.as_str()))
            .collect();
        hits.sort();
        hits.dedup();
        hits
    }
}

impl TipTriage for HeuristicTriage {
    fn assess(&self, submission: &TipSubmission) -> TriageAssessment {
        let text = submission.description.trim();
        let entities = Self::extract_companies(text);
        let tenders = self.match_tenders(text);
        let keywords = self.keyword_hits(text);

        let base = Self::category_base(submission.category);
        let length_bonus = if text.chars().count() >= DESCRIPTION_LENGTH_FOR_BONUS {
            0.1
        } else {
            0.0
        };
        let entity_bonus = (0.05 * entities.len() as f64).min(0.15);
        let tender_bonus = if tenders.is_empty() { 0.0 } else { 0.1 };
        let keyword_bonus = (0.05 * keywords.len() as f64).min(0.15);
        let score = (base + length_bonus + entity_bonus + tender_bonus + keyword_bonus).clamp(0.0, 1.0);
        // Two decimals keep stored scores stable across float noise.
        let score = (score * 100.0).round() / 100.0;

        let details = Metadata::new()
            .with("method", "heuristic")
            .with("category_base", base)
            .with("length_bonus", length_bonus)
            .with("entity_bonus", entity_bonus)
            .with("tender_bonus", tender_bonus)
            .with("keyword_hits", keywords);

        TriageAssessment {
            score: Some(score),
            urgency: Self::urgency_for(score),
            extracted_entities: entities,
            matched_tenders: tenders,
            details,
        }
    }
}

/// Strip surrounding punctuation and quotes.
fn clean(word: &str) -> &str {
    word.trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '&')
        .trim_end_matches('-')
}

fn is_legal_form(word: &str) -> bool {
    let token = clean(word).replace('.', "");
    LEGAL_FORMS.iter().any(|f| token.eq_ignore_ascii_case(f))
}

fn is_name_word(word: &str) -> bool {
    let token = clean(word);
    !is_legal_form(word)
        && token
            .chars()
            .next()
            .is_some_and(|c| c.is_uppercase() || c.is_ascii_digit())
}

/// Consecutive capitalized words, up to `MAX_NAME_WORDS`.
fn name_words<'a>(words: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    words
        .take_while(|w| is_name_word(w))
        .take(MAX_NAME_WORDS)
        .map(clean)
        .collect()
}
