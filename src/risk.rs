//! Attribute-Loss Risk Analyzer.
//!
//! Before a duplicate is deleted, every critical attribute it holds must
//! either already exist on the authoritative record (no entry), be copied
//! over (`TransferNeeded`), or be reconciled by hand (`Conflict`).

use crate::{
    classify,
    grouping::ComparisonGroup,
    model::{AttributeIssue, AttributeRiskFinding, Dataset, Record, RiskLevel},
};

/// Per-attribute comparison of a duplicate against the authoritative record.
pub fn compare_attributes(
    authoritative: &Record,
    candidate: &Record,
    critical_attributes: &[String],
) -> Vec<AttributeIssue> {
    critical_attributes
        .iter()
        .filter_map(|attribute| {
            let kept = authoritative.attribute(attribute);
            match (candidate.attribute(attribute), kept) {
                (Some(value), None) => Some(AttributeIssue::TransferNeeded {
                    attribute: attribute.clone(),
                    value: value.to_string(),
                }),
                (Some(value), Some(kept)) if value != kept => Some(AttributeIssue::Conflict {
                    attribute: attribute.clone(),
                    candidate_value: value.to_string(),
                    authoritative_value: kept.to_string(),
                }),
                _ => None,
            }
        })
        .collect()
}

/// Conflict dominates transfer; no entries means no risk.
pub fn risk_level(issues: &[AttributeIssue]) -> RiskLevel {
    issues
        .iter()
        .map(|issue| match issue {
            AttributeIssue::TransferNeeded { .. } => RiskLevel::TransferNeeded,
            AttributeIssue::Conflict { .. } => RiskLevel::Conflict,
        })
        .max()
        .unwrap_or(RiskLevel::None)
}

fn action_for(risk: RiskLevel) -> &'static str {
    match risk {
        RiskLevel::Conflict => "Review conflicts before deletion",
        RiskLevel::TransferNeeded => "Transfer attributes before deletion",
        RiskLevel::None => "Safe to delete",
    }
}

/// One finding per non-authoritative member that would lose information.
pub fn assess_group(
    dataset: &Dataset,
    group: &ComparisonGroup<'_>,
    critical_attributes: &[String],
) -> Vec<AttributeRiskFinding> {
    let authoritative_idx = classify::authoritative_index(&group.members);
    let Some(authoritative) = group.members.get(authoritative_idx) else {
        return Vec::new();
    };

    group
        .members
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != authoritative_idx)
        .filter_map(|(_, candidate)| {
            let issues = compare_attributes(authoritative, candidate, critical_attributes);
            let risk = risk_level(&issues);
            (risk > RiskLevel::None).then(|| AttributeRiskFinding {
                grouping: group.spec.name.clone(),
                partition: dataset.partition.clone(),
                plan: group.plan.to_string(),
                plan_invalid: dataset.plan_status(group.plan),
                key: group.key_strings(),
                authoritative_name: authoritative.full_name.clone(),
                authoritative_row: authoritative.row_number,
                authoritative_serial: authoritative.serial_number.clone(),
                candidate_name: candidate.full_name.clone(),
                candidate_row: candidate.row_number,
                candidate_serial: candidate.serial_number.clone(),
                risk,
                issues,
                action: action_for(risk).to_string(),
            })
        })
        .collect()
}
