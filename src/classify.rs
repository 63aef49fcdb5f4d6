//! Duplicate Classifier and the authoritative-record ranking.

use std::collections::HashSet;

use crate::{
    grouping::ComparisonGroup,
    model::{Dataset, DuplicateFinding, DuplicateKind, DuplicateRecord, Record},
    naming,
};

fn distinct<'a, I>(values: I) -> usize
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    values.into_iter().collect::<HashSet<_>>().len()
}

/// Assigns exactly one subtype to a group.
///
/// Checked in order: type disagreement, full-name identity, prefix
/// disagreement over a shared core name, then the residual category
/// (`OtherDuplicate` for name-keyed groupings, `NameVariation` otherwise).
pub fn classify(group: &ComparisonGroup<'_>) -> DuplicateKind {
    let members = &group.members;
    let types = distinct(members.iter().map(|r| Some(r.ci_type.as_str())));
    if types > 1 {
        return DuplicateKind::TypeConflict;
    }

    let full_names = distinct(members.iter().map(|r| Some(r.full_name.as_str())));
    let core_names = distinct(members.iter().map(|r| r.core_name.as_deref()));
    let name_keyed = group.spec.is_name_keyed();
    if full_names == 1 && (name_keyed || core_names == 1) {
        return DuplicateKind::ExactDuplicate;
    }

    let prefixes = distinct(members.iter().map(|r| r.name_prefix.as_deref()));
    if core_names == 1 && prefixes > 1 {
        return DuplicateKind::MismatchDuplicate;
    }

    if name_keyed {
        DuplicateKind::OtherDuplicate
    } else {
        DuplicateKind::NameVariation
    }
}

/// Whether a record's name prefix agrees with its own declared type.
pub fn is_consistent(record: &Record) -> bool {
    record
        .name_prefix
        .as_deref()
        .is_some_and(|prefix| naming::prefix_matches_type(prefix, &record.ci_type))
}

/// Index of the authoritative member.
///
/// Ranking: the first member (input order) whose prefix is consistent with
/// its type; if none is, the first member. The fallback is a tie-break, not
/// evidence that the first record is correct.
pub fn authoritative_index(members: &[&Record]) -> usize {
    members
        .iter()
        .position(|record| is_consistent(record))
        .unwrap_or(0)
}

/// Builds the reportable finding for one classified group.
pub fn describe_group(
    dataset: &Dataset,
    group: &ComparisonGroup<'_>,
    critical_attributes: &[String],
) -> DuplicateFinding {
    let kind = classify(group);
    let authoritative = authoritative_index(&group.members);
    let records = group
        .members
        .iter()
        .enumerate()
        .map(|(idx, record)| DuplicateRecord {
            position: idx + 1,
            row_number: record.row_number,
            full_name: record.full_name.clone(),
            name_prefix: record.name_prefix.clone(),
            core_name: record.core_name.clone(),
            ci_type: record.ci_type.clone(),
            serial_number: record.serial_number.clone(),
            environment: record.environment.clone(),
            manual_entry: record.manual_entry.clone(),
            is_manual_entry: record.is_manual_entry,
            type_mismatch: naming::type_mismatch(record.name_prefix.as_deref(), &record.ci_type),
            authoritative: idx == authoritative,
            populated_attributes: record.populated_attributes(critical_attributes),
        })
        .collect();

    DuplicateFinding {
        grouping: group.spec.name.clone(),
        partition: dataset.partition.clone(),
        plan: group.plan.to_string(),
        plan_invalid: dataset.plan_status(group.plan),
        key: group.key_strings(),
        kind,
        severity: kind.severity(),
        description: kind.description().to_string(),
        duplicate_count: group.len(),
        records,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::grouping::{GroupingSpec, KeyField};

    fn record(full_name: &str, ci_type: &str) -> Record {
        let parts = naming::decompose(Some(full_name), ':');
        Record {
            ordinal: 0,
            row_number: 2,
            source_partition: "CSV".into(),
            plan: "P1".into(),
            full_name: full_name.into(),
            name_prefix: parts.prefix,
            core_name: parts.core,
            ci_type: ci_type.into(),
            serial_number: Some("SN123".into()),
            environment: None,
            manual_entry: None,
            is_manual_entry: false,
            attributes: BTreeMap::new(),
        }
    }

    fn classify_with(spec: &GroupingSpec, members: &[Record]) -> DuplicateKind {
        let group = ComparisonGroup {
            spec,
            plan: "P1",
            key: vec!["k"],
            members: members.iter().collect(),
        };
        classify(&group)
    }

    fn name_type() -> GroupingSpec {
        GroupingSpec::new("name_type", &[KeyField::CoreName, KeyField::CiType], true)
    }

    fn serial() -> GroupingSpec {
        GroupingSpec::new("serial", &[KeyField::SerialNumber], false)
    }

    #[test]
    fn identical_full_names_are_exact_duplicates() {
        let members = [record("DB:srv1", "Database"), record("DB:srv1", "Database")];
        assert_eq!(
            classify_with(&name_type(), &members),
            DuplicateKind::ExactDuplicate
        );
    }

    #[test]
    fn differing_prefixes_are_mismatch_duplicates() {
        let members = [
            record("DB:srv1", "Database"),
            record("Database:srv1", "Database"),
        ];
        assert_eq!(
            classify_with(&name_type(), &members),
            DuplicateKind::MismatchDuplicate
        );
    }

    #[test]
    fn type_disagreement_wins_over_every_other_rule() {
        let members = [record("Server:srv1", "Server"), record("Server:srv1", "Database")];
        assert_eq!(
            classify_with(&serial(), &members),
            DuplicateKind::TypeConflict
        );
    }

    #[test]
    fn residual_category_depends_on_key_kind() {
        let name_members = [record("DB: srv1", "Database"), record("DB:srv1 ", "Database")];
        assert_eq!(
            classify_with(&name_type(), &name_members),
            DuplicateKind::OtherDuplicate
        );
        let serial_members = [record("DB:srv1", "Database"), record("DB:srv9", "Database")];
        assert_eq!(
            classify_with(&serial(), &serial_members),
            DuplicateKind::NameVariation
        );
    }

    #[test]
    fn authoritative_prefers_consistent_prefix_then_first() {
        let a = record("Server:srv1", "Database");
        let b = record("Database:srv1", "Database");
        assert_eq!(authoritative_index(&[&a, &b]), 1);
        let c = record("srv1", "Database");
        let d = record("Host:srv1", "Database");
        assert_eq!(authoritative_index(&[&c, &d]), 0);
    }
}
