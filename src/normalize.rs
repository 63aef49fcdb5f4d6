//! Column Normalizer: maps arbitrary export headers onto canonical fields.
//!
//! Resolution per canonical field, in configuration order:
//!
//! 1. Headers whose snake-cased form equals a snake-cased synonym are
//!    candidates (`"Serial Number"`, `"serial_number"` and `"SERIAL NUMBER"`
//!    are the same header).
//! 2. A field with a [`ContentRule`] also admits any unclaimed header that
//!    contains the rule's token, so `"Scope Type"` competes with `"Type"`.
//! 3. A lone synonym candidate wins outright. Otherwise candidates are scored
//!    on their first `sample_size` non-empty values (positive-lexicon hits
//!    minus negative-lexicon hits); ties, and fields without a rule, go to the
//!    first header in file order. A header admitted only by the token must
//!    score above zero, so `"Scope Type"` alone never stands in for `Type`.
//!    Every scored decision is reported as
//!    [`Notice::AmbiguousColumnCandidate`].
//!
//! A header is claimed by at most one field.

use std::collections::{BTreeMap, HashSet};

use heck::ToSnakeCase;
use log::{debug, info, warn};

use crate::{
    config::{CanonicalField, ContentRule, ReconcileConfig},
    error::ReconcileError,
    ingest::RawTable,
    model::{CandidateScore, Dataset, Notice, Record},
    naming,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnResolution {
    pub assignments: BTreeMap<CanonicalField, usize>,
    pub notices: Vec<Notice>,
}

fn header_key(value: &str) -> String {
    value.trim().to_snake_case()
}

pub fn resolve_columns(
    table: &RawTable,
    config: &ReconcileConfig,
) -> Result<ColumnResolution, ReconcileError> {
    let keys = table
        .headers
        .iter()
        .map(|h| header_key(h))
        .collect::<Vec<_>>();
    let synonym_claims = config
        .columns
        .iter()
        .flat_map(|rule| rule.synonyms.iter().map(|s| header_key(s)))
        .collect::<HashSet<_>>();

    let mut claimed: HashSet<usize> = HashSet::new();
    let mut assignments = BTreeMap::new();
    let mut notices = Vec::new();

    for rule in &config.columns {
        let synonyms = rule
            .synonyms
            .iter()
            .map(|s| header_key(s))
            .collect::<HashSet<_>>();
        let mut candidates = keys
            .iter()
            .enumerate()
            .filter(|(idx, key)| !claimed.contains(idx) && synonyms.contains(*key))
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();

        let content = config.content_rule(rule.field);
        let mut token_only = Vec::new();
        if let Some(content) = content {
            let token = content.header_token.to_lowercase();
            for (idx, header) in table.headers.iter().enumerate() {
                if claimed.contains(&idx)
                    || candidates.contains(&idx)
                    || synonym_claims.contains(&keys[idx])
                {
                    continue;
                }
                if header.to_lowercase().contains(&token) {
                    candidates.push(idx);
                    token_only.push(idx);
                }
            }
            candidates.sort_unstable();
        }

        let chosen = match candidates.as_slice() {
            [] => None,
            [only] if !token_only.contains(only) => Some(*only),
            many => {
                match choose_among(table, rule.field, many, &token_only, content) {
                    Some((winner, notice)) => {
                        warn!(
                            "Partition '{}': {} header candidate(s) for '{}', using '{}'",
                            table.partition,
                            many.len(),
                            rule.field,
                            table.headers[winner]
                        );
                        notices.push(notice);
                        Some(winner)
                    }
                    None => {
                        warn!(
                            "Partition '{}': no header candidate for '{}' passed content scoring",
                            table.partition, rule.field
                        );
                        None
                    }
                }
            }
        };

        match chosen {
            Some(idx) => {
                debug!(
                    "Partition '{}': '{}' -> {}",
                    table.partition, table.headers[idx], rule.field
                );
                claimed.insert(idx);
                assignments.insert(rule.field, idx);
            }
            None if rule.required => {
                return Err(ReconcileError::MissingRequiredColumn {
                    partition: table.partition.clone(),
                    field: rule.field.to_string(),
                    candidates: rule.synonyms.join(", "),
                });
            }
            None => debug!(
                "Partition '{}': optional field '{}' not present",
                table.partition, rule.field
            ),
        }
    }

    Ok(ColumnResolution {
        assignments,
        notices,
    })
}

/// Scores every candidate and picks the winner, or `None` when nothing qualifies.
///
/// Headers admitted only through the content rule's token must score above
/// zero; synonym headers always qualify.
fn choose_among(
    table: &RawTable,
    field: CanonicalField,
    candidates: &[usize],
    token_only: &[usize],
    content: Option<&ContentRule>,
) -> Option<(usize, Notice)> {
    let scores = candidates
        .iter()
        .map(|&idx| match content {
            Some(rule) => score_column(table, idx, rule),
            None => CandidateScore {
                column: table.headers[idx].clone(),
                positive: 0,
                negative: 0,
                score: 0,
            },
        })
        .collect::<Vec<_>>();
    let eligible = |pos: usize| !token_only.contains(&candidates[pos]) || scores[pos].score > 0;

    // Strictly greater keeps the earliest header on ties.
    let mut best: Option<usize> = None;
    for pos in (0..scores.len()).filter(|&pos| eligible(pos)) {
        if best.is_none_or(|b| scores[pos].score > scores[b].score) {
            best = Some(pos);
        }
    }
    let best = best?;
    let tied = (0..scores.len())
        .filter(|&pos| eligible(pos) && scores[pos].score == scores[best].score)
        .count();
    let reason = match (content, tied) {
        (None, _) => "several synonyms present; first header in file order wins".to_string(),
        (Some(_), _) if candidates.len() == 1 => {
            "only a header-token match; accepted on content score".to_string()
        }
        (Some(_), 1) => "highest content score".to_string(),
        (Some(_), _) => "content scores tied; first header in file order wins".to_string(),
    };

    let winner = candidates[best];
    let notice = Notice::AmbiguousColumnCandidate {
        partition: table.partition.clone(),
        field,
        chosen: table.headers[winner].clone(),
        candidates: scores,
        reason,
    };
    Some((winner, notice))
}

/// Positive minus negative lexicon hits over the first non-empty values.
pub fn score_column(table: &RawTable, column: usize, rule: &ContentRule) -> CandidateScore {
    let positive_terms = rule
        .positive
        .iter()
        .map(|t| t.to_lowercase())
        .collect::<Vec<_>>();
    let negative_terms = rule
        .negative
        .iter()
        .map(|t| t.to_lowercase())
        .collect::<Vec<_>>();

    let mut positive = 0usize;
    let mut negative = 0usize;
    let sample = (0..table.rows.len())
        .map(|row| table.cell(row, column))
        .filter(|value| !value.is_empty())
        .take(rule.sample_size);
    for value in sample {
        let lowered = value.to_lowercase();
        if positive_terms.iter().any(|t| lowered.contains(t.as_str())) {
            positive += 1;
        }
        if negative_terms.iter().any(|t| lowered.contains(t.as_str())) {
            negative += 1;
        }
    }
    CandidateScore {
        column: table.headers[column].clone(),
        positive,
        negative,
        score: positive as i64 - negative as i64,
    }
}

/// Resolves columns and builds the immutable record set for one partition.
pub fn normalize_table(
    table: &RawTable,
    config: &ReconcileConfig,
) -> Result<Dataset, ReconcileError> {
    let resolution = resolve_columns(table, config)?;
    let by_column = resolution
        .assignments
        .iter()
        .map(|(field, idx)| (*idx, *field))
        .collect::<BTreeMap<_, _>>();
    let column_of = |field: CanonicalField| resolution.assignments.get(&field).copied();
    let optional = |row: usize, field: CanonicalField| {
        column_of(field)
            .map(|idx| table.cell(row, idx))
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    let required = |row: usize, field: CanonicalField| {
        column_of(field)
            .map(|idx| table.cell(row, idx).to_string())
            .unwrap_or_default()
    };

    let mut records = Vec::with_capacity(table.rows.len());
    for row in 0..table.rows.len() {
        let full_name = required(row, CanonicalField::Name);
        let parts = naming::decompose(Some(full_name.as_str()), config.separator);
        let manual_entry = optional(row, CanonicalField::ManualEntry);
        let is_manual_entry = manual_entry
            .as_deref()
            .is_some_and(|value| config.is_truthy(value));

        let mut attributes = BTreeMap::new();
        for (idx, header) in table.headers.iter().enumerate() {
            let key = match by_column.get(&idx) {
                Some(field) if field.is_core() => continue,
                Some(field) => field.as_str().to_string(),
                None => header.clone(),
            };
            attributes.insert(key, table.cell(row, idx).to_string());
        }

        records.push(Record {
            ordinal: row,
            row_number: RawTable::row_number(row),
            source_partition: table.partition.clone(),
            plan: required(row, CanonicalField::Plan),
            full_name,
            name_prefix: parts.prefix,
            core_name: parts.core,
            ci_type: required(row, CanonicalField::CiType),
            serial_number: optional(row, CanonicalField::SerialNumber),
            environment: optional(row, CanonicalField::Environment),
            manual_entry,
            is_manual_entry,
            attributes,
        });
    }

    let resolved = resolution
        .assignments
        .iter()
        .map(|(field, idx)| (*field, table.headers[*idx].clone()))
        .collect::<BTreeMap<_, _>>();
    let dataset = Dataset::new(
        table.partition.clone(),
        table.headers.clone(),
        resolved,
        records,
        resolution.notices,
    );
    info!(
        "Partition '{}': normalized {} record(s) across {} plan(s); {} canonical field(s) resolved",
        dataset.partition,
        dataset.records.len(),
        dataset.plan_count(),
        dataset.resolved.len()
    );
    Ok(dataset)
}
