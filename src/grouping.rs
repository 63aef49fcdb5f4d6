//! Grouping Engine: partitions records by plan, then by a candidate key.
//!
//! Output order is deterministic: plans in first-seen order, and within a
//! plan, keys in first-seen order. Members keep input order. Records with a
//! blank plan or a blank key field are excluded from that grouping and
//! returned separately so callers can report them.

use std::collections::HashMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    config::CanonicalField,
    model::{Dataset, Record},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyField {
    CoreName,
    FullName,
    CiType,
    SerialNumber,
}

impl KeyField {
    pub fn value(self, record: &Record) -> Option<&str> {
        let value = match self {
            Self::CoreName => record.core_name.as_deref(),
            Self::FullName => Some(record.full_name.as_str()),
            Self::CiType => Some(record.ci_type.as_str()),
            Self::SerialNumber => record.serial_number.as_deref(),
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }

    /// Source column the key depends on.
    pub fn source_field(self) -> CanonicalField {
        match self {
            Self::CoreName | Self::FullName => CanonicalField::Name,
            Self::CiType => CanonicalField::CiType,
            Self::SerialNumber => CanonicalField::SerialNumber,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CoreName => "core_name",
            Self::FullName => "full_name",
            Self::CiType => "ci_type",
            Self::SerialNumber => "serial_number",
        }
    }
}

/// One grouping-key specification. `plan` is always the outer scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupingSpec {
    pub name: String,
    pub fields: Vec<KeyField>,
    /// Run the attribute-loss analysis over this grouping's duplicates.
    #[serde(default)]
    pub assess_risk: bool,
}

impl GroupingSpec {
    pub fn new(name: &str, fields: &[KeyField], assess_risk: bool) -> Self {
        Self {
            name: name.to_string(),
            fields: fields.to_vec(),
            assess_risk,
        }
    }

    pub fn includes(&self, field: KeyField) -> bool {
        self.fields.contains(&field)
    }

    /// Name-keyed groupings compare records that already share a device name.
    pub fn is_name_keyed(&self) -> bool {
        self.includes(KeyField::CoreName) || self.includes(KeyField::FullName)
    }

    pub fn describe(&self) -> String {
        let fields = self.fields.iter().map(|f| f.as_str()).join(", ");
        format!("{} (plan, {fields})", self.name)
    }

    /// Key fields whose source column the dataset does not carry.
    pub fn unavailable_fields(&self, dataset: &Dataset) -> Vec<KeyField> {
        self.fields
            .iter()
            .copied()
            .filter(|f| !dataset.has_field(f.source_field()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonGroup<'a> {
    pub spec: &'a GroupingSpec,
    pub plan: &'a str,
    pub key: Vec<&'a str>,
    pub members: Vec<&'a Record>,
}

impl ComparisonGroup<'_> {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn key_strings(&self) -> Vec<String> {
        self.key.iter().map(|k| k.to_string()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupingOutcome<'a> {
    pub groups: Vec<ComparisonGroup<'a>>,
    pub excluded: Vec<&'a Record>,
}

fn plan_of(record: &Record) -> Option<&str> {
    let plan = record.plan.trim();
    (!plan.is_empty()).then_some(plan)
}

/// Every plan-scoped partition of size >= 2 for one key specification.
pub fn group_records<'a>(dataset: &'a Dataset, spec: &'a GroupingSpec) -> GroupingOutcome<'a> {
    let mut plan_rank: HashMap<&str, usize> = HashMap::new();
    let mut slots: HashMap<(&str, Vec<&str>), usize> = HashMap::new();
    let mut buckets: Vec<ComparisonGroup<'a>> = Vec::new();
    let mut excluded = Vec::new();

    for record in &dataset.records {
        let key = spec
            .fields
            .iter()
            .map(|field| field.value(record))
            .collect::<Option<Vec<_>>>();
        let (Some(plan), Some(key)) = (plan_of(record), key) else {
            excluded.push(record);
            continue;
        };
        let next_rank = plan_rank.len();
        plan_rank.entry(plan).or_insert(next_rank);
        let slot = *slots.entry((plan, key.clone())).or_insert_with(|| {
            buckets.push(ComparisonGroup {
                spec,
                plan,
                key,
                members: Vec::new(),
            });
            buckets.len() - 1
        });
        buckets[slot].members.push(record);
    }

    // Stable sort: plans by first appearance, keys keep first-seen order within a plan.
    let groups = buckets
        .into_iter()
        .filter(|group| group.len() >= 2)
        .sorted_by_key(|group| plan_rank.get(group.plan).copied().unwrap_or(usize::MAX))
        .collect();

    GroupingOutcome { groups, excluded }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn record(ordinal: usize, plan: &str, core: &str, ci_type: &str, serial: &str) -> Record {
        Record {
            ordinal,
            row_number: ordinal + 2,
            source_partition: "CSV".into(),
            plan: plan.into(),
            full_name: core.into(),
            name_prefix: None,
            core_name: (!core.is_empty()).then(|| core.to_string()),
            ci_type: ci_type.into(),
            serial_number: (!serial.is_empty()).then(|| serial.to_string()),
            environment: None,
            manual_entry: None,
            is_manual_entry: false,
            attributes: BTreeMap::new(),
        }
    }

    fn dataset(records: Vec<Record>) -> Dataset {
        let mut resolved = BTreeMap::new();
        for field in [
            CanonicalField::Name,
            CanonicalField::CiType,
            CanonicalField::Plan,
            CanonicalField::SerialNumber,
        ] {
            resolved.insert(field, field.as_str().to_string());
        }
        Dataset::new("CSV".into(), Vec::new(), resolved, records, Vec::new())
    }

    #[test]
    fn groups_follow_first_seen_plan_and_key_order() {
        let data = dataset(vec![
            record(0, "P2", "b", "Server", ""),
            record(1, "P1", "a", "Server", ""),
            record(2, "P2", "a", "Server", ""),
            record(3, "P1", "a", "Server", ""),
            record(4, "P2", "b", "Server", ""),
            record(5, "P2", "a", "Server", ""),
            record(6, "P1", "c", "Server", ""),
        ]);
        let spec = GroupingSpec::new("name_type", &[KeyField::CoreName, KeyField::CiType], true);
        let outcome = group_records(&data, &spec);
        let summary = outcome
            .groups
            .iter()
            .map(|g| {
                (
                    g.plan,
                    g.key[0],
                    g.members.iter().map(|r| r.ordinal).collect::<Vec<_>>(),
                )
            })
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![
                ("P2", "b", vec![0, 4]),
                ("P2", "a", vec![2, 5]),
                ("P1", "a", vec![1, 3]),
            ]
        );
    }

    #[test]
    fn blank_serials_are_never_grouped_together() {
        let data = dataset(vec![
            record(0, "P1", "a", "Server", ""),
            record(1, "P1", "b", "Server", ""),
            record(2, "P1", "c", "Server", "SN1"),
            record(3, "P1", "d", "Database", "SN1"),
        ]);
        let spec = GroupingSpec::new("serial", &[KeyField::SerialNumber], false);
        let outcome = group_records(&data, &spec);
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.groups[0].key, vec!["SN1"]);
        assert_eq!(outcome.excluded.len(), 2);
    }

    #[test]
    fn plans_scope_the_grouping() {
        let data = dataset(vec![
            record(0, "P1", "a", "Server", ""),
            record(1, "P2", "a", "Server", ""),
            record(2, "", "a", "Server", ""),
        ]);
        let spec = GroupingSpec::new("name_type", &[KeyField::CoreName, KeyField::CiType], true);
        let outcome = group_records(&data, &spec);
        assert!(outcome.groups.is_empty());
        assert_eq!(outcome.excluded.len(), 1);
    }

    #[test]
    fn unavailable_fields_reports_missing_source_columns() {
        let mut data = dataset(Vec::new());
        data.resolved.remove(&CanonicalField::SerialNumber);
        let spec = GroupingSpec::new("serial_type", &[KeyField::SerialNumber, KeyField::CiType], false);
        assert_eq!(spec.unavailable_fields(&data), vec![KeyField::SerialNumber]);
    }
}
