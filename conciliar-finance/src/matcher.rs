//! Suggestion engine: propose who a statement record belongs to, with a
//! confidence tier.
//!
//! Order of evidence: learned history by tax ID / document digits, registry
//! tax IDs, then a narration heuristic over history.

use std::collections::HashSet;

use conciliar_core::{
    CounterpartyKind, IdentificationHistoryEntry, Registry, TransactionRecord, digits_only, normalize_field,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    None,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub kind: CounterpartyKind,
    pub entity_id: String,
    pub entity_name: String,
    pub confidence: Confidence,
    pub reason: String,
}

/// Tier of an optional suggestion; absence is [`Confidence::None`].
pub fn confidence_of(suggestion: Option<&Suggestion>) -> Confidence {
    suggestion.map(|s| s.confidence).unwrap_or(Confidence::None)
}

/// Narration-based history lookup used when no tax ID evidence exists.
pub trait NarrationMatcher: Send + Sync {
    fn find<'a>(
        &self,
        narration: &str,
        history: &'a [IdentificationHistoryEntry],
    ) -> Option<&'a IdentificationHistoryEntry>;
}

/// Case-insensitive substring match of the narration's first characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixMatcher {
    pub prefix_len: usize,
}

impl Default for PrefixMatcher {
    fn default() -> Self {
        Self { prefix_len: 20 }
    }
}

impl NarrationMatcher for PrefixMatcher {
    fn find<'a>(
        &self,
        narration: &str,
        history: &'a [IdentificationHistoryEntry],
    ) -> Option<&'a IdentificationHistoryEntry> {
        let key: String = narration.trim().to_lowercase().chars().take(self.prefix_len).collect();
        if key.is_empty() {
            return None;
        }
        history
            .iter()
            .rev()
            .find(|entry| entry.narration.to_lowercase().contains(&key))
    }
}

/// Jaccard similarity over normalized word tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenSetMatcher {
    pub threshold: f64,
}

impl Default for TokenSetMatcher {
    fn default() -> Self {
        Self { threshold: 0.6 }
    }
}

fn tokens(s: &str) -> HashSet<String> {
    normalize_field(s)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(str::to_string)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

impl NarrationMatcher for TokenSetMatcher {
    fn find<'a>(
        &self,
        narration: &str,
        history: &'a [IdentificationHistoryEntry],
    ) -> Option<&'a IdentificationHistoryEntry> {
        let wanted = tokens(narration);
        if wanted.is_empty() {
            return None;
        }

        let mut best: Option<(f64, &IdentificationHistoryEntry)> = None;
        for entry in history {
            let score = jaccard(&wanted, &tokens(&entry.narration));
            if score < self.threshold {
                continue;
            }
            // later entries win ties
            match best {
                Some((best_score, _)) if score < best_score => {}
                _ => best = Some((score, entry)),
            }
        }
        best.map(|(_, entry)| entry)
    }
}

/// Digit keys a record can be looked up by: extracted tax ID first, then the
/// document reference. Empty and duplicate keys are dropped.
pub fn lookup_keys(record: &TransactionRecord) -> Vec<String> {
    let mut keys = Vec::with_capacity(2);
    let tax = record.tax_id.as_deref().map(digits_only).unwrap_or_default();
    let doc = digits_only(&record.document_ref);
    for key in [tax, doc] {
        if !key.is_empty() && !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

/// [`suggest_with`] using the default [`PrefixMatcher`].
pub fn suggest(
    record: &TransactionRecord,
    registry: &Registry,
    history: &[IdentificationHistoryEntry],
) -> Option<Suggestion> {
    suggest_with(record, registry, history, &PrefixMatcher::default())
}

/// Best guess for a record. Pure: reads only its arguments.
pub fn suggest_with(
    record: &TransactionRecord,
    registry: &Registry,
    history: &[IdentificationHistoryEntry],
    narration_matcher: &dyn NarrationMatcher,
) -> Option<Suggestion> {
    let keys = lookup_keys(record);

    let history_hit = history
        .iter()
        .rev()
        .find(|entry| !entry.tax_id_digits.is_empty() && keys.contains(&entry.tax_id_digits));
    if let Some(entry) = history_hit {
        return Some(from_history(entry, Confidence::High, format!("history match on {}", entry.tax_id_digits)));
    }

    if let Some((key, entity)) = keys.iter().find_map(|k| registry.find_by_tax_id(k).map(|e| (k, e))) {
        return Some(Suggestion {
            kind: entity.kind(),
            entity_id: entity.id().to_string(),
            entity_name: entity.name().to_string(),
            confidence: Confidence::High,
            reason: format!("registry {} tax id {key}", entity.kind()),
        });
    }

    narration_matcher
        .find(&record.narration, history)
        .map(|entry| from_history(entry, Confidence::Medium, "similar narration in history".to_string()))
}

fn from_history(entry: &IdentificationHistoryEntry, confidence: Confidence, reason: String) -> Suggestion {
    Suggestion {
        kind: entry.entity_kind,
        entity_id: entry.entity_id.clone(),
        entity_name: entry.entity_name.clone(),
        confidence,
        reason,
    }
}
