//! Canonical record model and the finding types every analysis emits.
//!
//! A [`Dataset`] is built once per source partition by
//! [`crate::normalize::normalize_table`] and is never mutated afterwards.
//! Every analysis pass borrows it read-only and returns plain finding values.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use heck::ToSnakeCase;
use serde::Serialize;

use crate::config::CanonicalField;

/// Marker reported for plans that carry no `plan_invalid` value.
pub const UNKNOWN_PLAN_STATUS: &str = "Unknown";

/// One normalized row. Derived fields are computed once during normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    /// Zero-based position in the dataset, i.e. original input order.
    pub ordinal: usize,
    /// Physical row in the source partition (header is row 1).
    pub row_number: usize,
    pub source_partition: String,
    pub plan: String,
    pub full_name: String,
    pub name_prefix: Option<String>,
    pub core_name: Option<String>,
    pub ci_type: String,
    pub serial_number: Option<String>,
    pub environment: Option<String>,
    pub manual_entry: Option<String>,
    pub is_manual_entry: bool,
    /// Remaining columns keyed by canonical name when resolved, otherwise by source header.
    pub attributes: BTreeMap<String, String>,
}

impl Record {
    /// Looks up an attribute by canonical name or source header; blank values read as `None`.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        let value = match self.attributes.get(name) {
            Some(value) => Some(value.as_str()),
            None => {
                let wanted = name.trim().to_snake_case();
                self.attributes
                    .iter()
                    .find(|(key, _)| key.to_snake_case() == wanted)
                    .map(|(_, value)| value.as_str())
            }
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }

    /// Names of the given attributes that hold a non-empty value, in the given order.
    pub fn populated_attributes(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .filter(|name| self.attribute(name).is_some())
            .cloned()
            .collect()
    }
}

/// All records of one source partition plus what the normalizer resolved.
#[derive(Debug, Clone, Serialize)]
pub struct Dataset {
    pub partition: String,
    pub source_columns: Vec<String>,
    /// Canonical field -> source header it was resolved from.
    pub resolved: BTreeMap<CanonicalField, String>,
    pub records: Vec<Record>,
    pub notices: Vec<Notice>,
    #[serde(skip)]
    plan_status: HashMap<String, String>,
}

impl Dataset {
    pub fn new(
        partition: String,
        source_columns: Vec<String>,
        resolved: BTreeMap<CanonicalField, String>,
        records: Vec<Record>,
        notices: Vec<Notice>,
    ) -> Self {
        let mut plan_status = HashMap::new();
        for record in &records {
            if let Some(flag) = record.attribute(CanonicalField::PlanInvalid.as_str()) {
                plan_status
                    .entry(record.plan.clone())
                    .or_insert_with(|| flag.to_string());
            }
        }
        Self {
            partition,
            source_columns,
            resolved,
            records,
            notices,
            plan_status,
        }
    }

    pub fn has_field(&self, field: CanonicalField) -> bool {
        self.resolved.contains_key(&field)
    }

    /// First non-empty `plan_invalid` value seen for the plan.
    pub fn plan_status(&self, plan: &str) -> String {
        self.plan_status
            .get(plan)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_PLAN_STATUS.to_string())
    }

    pub fn plan_count(&self) -> usize {
        self.records
            .iter()
            .map(|r| r.plan.as_str())
            .filter(|p| !p.is_empty())
            .collect::<BTreeSet<_>>()
            .len()
    }
}

/// Non-fatal conditions that change what was analyzed. Always surfaced in output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    AmbiguousColumnCandidate {
        partition: String,
        field: CanonicalField,
        chosen: String,
        candidates: Vec<CandidateScore>,
        reason: String,
    },
    EmptyKeyRecord {
        scope: String,
        source: String,
        row_number: usize,
        preview: String,
    },
    DuplicateKeyRecord {
        source: String,
        key: String,
        row_number: usize,
        replaced_row: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateScore {
    pub column: String,
    pub positive: usize,
    pub negative: usize,
    pub score: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKind {
    ExactDuplicate,
    TypeConflict,
    MismatchDuplicate,
    OtherDuplicate,
    NameVariation,
}

impl DuplicateKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::ExactDuplicate => "Exact Duplicate",
            Self::TypeConflict => "Type Conflict",
            Self::MismatchDuplicate => "Mismatch Duplicate",
            Self::OtherDuplicate => "Other Duplicate",
            Self::NameVariation => "Name Variation",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::ExactDuplicate => "Same full name and type; a true duplicate",
            Self::TypeConflict => {
                "Same key but different CI types; the asset is miscategorized and needs resolution"
            }
            Self::MismatchDuplicate => "Different name prefixes for the same device name and type",
            Self::OtherDuplicate => "Different full names for the same device name and type",
            Self::NameVariation => "Same key but different device names",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Self::TypeConflict => Severity::Critical,
            Self::MismatchDuplicate => Severity::High,
            Self::ExactDuplicate => Severity::Medium,
            Self::OtherDuplicate | Self::NameVariation => Severity::Low,
        }
    }
}

impl fmt::Display for DuplicateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateFinding {
    pub grouping: String,
    pub partition: String,
    pub plan: String,
    pub plan_invalid: String,
    pub key: Vec<String>,
    pub kind: DuplicateKind,
    pub severity: Severity,
    pub description: String,
    pub duplicate_count: usize,
    pub records: Vec<DuplicateRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateRecord {
    /// 1-based position within the group, in original input order.
    pub position: usize,
    pub row_number: usize,
    pub full_name: String,
    pub name_prefix: Option<String>,
    pub core_name: Option<String>,
    pub ci_type: String,
    pub serial_number: Option<String>,
    pub environment: Option<String>,
    pub manual_entry: Option<String>,
    pub is_manual_entry: bool,
    pub type_mismatch: bool,
    pub authoritative: bool,
    pub populated_attributes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    None,
    TransferNeeded,
    Conflict,
}

impl RiskLevel {
    pub fn label(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::TransferNeeded => "Transfer Needed",
            Self::Conflict => "Conflict - Data Loss",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeIssue {
    TransferNeeded {
        attribute: String,
        value: String,
    },
    Conflict {
        attribute: String,
        candidate_value: String,
        authoritative_value: String,
    },
}

impl AttributeIssue {
    pub fn attribute(&self) -> &str {
        match self {
            Self::TransferNeeded { attribute, .. } | Self::Conflict { attribute, .. } => attribute,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::TransferNeeded { attribute, value } => format!("{attribute}: '{value}'"),
            Self::Conflict {
                attribute,
                candidate_value,
                authoritative_value,
            } => format!(
                "{attribute}: duplicate='{candidate_value}' vs authoritative='{authoritative_value}'"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeRiskFinding {
    pub grouping: String,
    pub partition: String,
    pub plan: String,
    pub plan_invalid: String,
    pub key: Vec<String>,
    pub authoritative_name: String,
    pub authoritative_row: usize,
    pub authoritative_serial: Option<String>,
    pub candidate_name: String,
    pub candidate_row: usize,
    pub candidate_serial: Option<String>,
    pub risk: RiskLevel,
    pub issues: Vec<AttributeIssue>,
    pub action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyRule {
    ManualEntryNonProduction,
}

impl PolicyRule {
    pub fn id(self) -> &'static str {
        match self {
            Self::ManualEntryNonProduction => "manual-entry-non-production",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::ManualEntryNonProduction => {
                "Manual entry in non-production or blank environment"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyViolationFinding {
    pub rule: PolicyRule,
    pub partition: String,
    pub plan: String,
    pub plan_invalid: String,
    pub row_number: usize,
    pub full_name: String,
    pub core_name: Option<String>,
    pub ci_type: String,
    pub serial_number: Option<String>,
    pub manual_entry: Option<String>,
    pub environment: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    Missing,
    Different,
}

impl fmt::Display for DiffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("Missing"),
            Self::Different => f.write_str("Different"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffFinding {
    pub key: String,
    pub column: String,
    pub reference: String,
    pub comparison: String,
    pub kind: DiffKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeValue {
    pub attribute: String,
    pub value: String,
}

/// A record present in the "before" extract that no longer exists "after".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalFinding {
    pub partition: String,
    pub plan: String,
    pub full_name: String,
    pub ci_type: String,
    pub serial_number: Option<String>,
    pub manual_entry: Option<String>,
    pub lost_attributes: Vec<AttributeValue>,
}

impl RemovalFinding {
    pub fn had_critical_attributes(&self) -> bool {
        !self.lost_attributes.is_empty()
    }
}

/// Serial-number duplication still present in one plan once name duplicates are fixed.
///
/// Only records with a non-blank plan and serial number are counted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanDuplicateSummary {
    pub partition: String,
    pub plan: String,
    pub plan_invalid: String,
    pub total_records: usize,
    pub unique_serials: usize,
    /// Records beyond the first for each serial number.
    pub duplicate_records: usize,
    pub duplicated_serials: usize,
    pub duplicate_percentage: f64,
}

/// Result of a check that may not be applicable to a dataset.
///
/// `Skipped` is distinct from `Evaluated` with no findings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckOutcome<T> {
    Evaluated { findings: Vec<T> },
    Skipped { reason: String },
}

impl<T> CheckOutcome<T> {
    pub fn findings(&self) -> &[T] {
        match self {
            Self::Evaluated { findings } => findings,
            Self::Skipped { .. } => &[],
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with(attributes: &[(&str, &str)]) -> Record {
        Record {
            ordinal: 0,
            row_number: 2,
            source_partition: "CSV".into(),
            plan: "P1".into(),
            full_name: "DB:srv1".into(),
            name_prefix: Some("DB".into()),
            core_name: Some("srv1".into()),
            ci_type: "Database".into(),
            serial_number: None,
            environment: None,
            manual_entry: None,
            is_manual_entry: false,
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn attribute_lookup_tolerates_header_spelling() {
        let record = record_with(&[("Failover Strategy", "active"), ("nas", "  ")]);
        assert_eq!(record.attribute("failover_strategy"), Some("active"));
        assert_eq!(record.attribute("nas"), None);
        assert_eq!(record.attribute("comments"), None);
    }

    #[test]
    fn populated_attributes_keeps_requested_order() {
        let record = record_with(&[("nas", "filer01"), ("comments", "keep")]);
        let names = vec!["comments".to_string(), "dr_device".into(), "nas".into()];
        assert_eq!(record.populated_attributes(&names), vec!["comments", "nas"]);
    }

    #[test]
    fn type_conflict_is_the_most_severe_kind() {
        let kinds = [
            DuplicateKind::ExactDuplicate,
            DuplicateKind::MismatchDuplicate,
            DuplicateKind::OtherDuplicate,
            DuplicateKind::NameVariation,
        ];
        for kind in kinds {
            assert!(kind.severity() < DuplicateKind::TypeConflict.severity());
        }
    }
}
