//! Before/after removal audit.
//!
//! A record is identified by `(plan, full_name, ci_type)`. Anything present
//! in the "before" extract but gone from the "after" extract is reported with
//! the critical attribute values that left with it.

use std::collections::HashSet;

use crate::model::{AttributeValue, Dataset, Record, RemovalFinding};

fn identity(record: &Record) -> (&str, &str, &str) {
    (
        record.plan.trim(),
        record.full_name.trim(),
        record.ci_type.trim(),
    )
}

/// Removed records in "before" input order (partition order, then row order).
pub fn find_removed(
    before: &[Dataset],
    after: &[Dataset],
    critical_attributes: &[String],
) -> Vec<RemovalFinding> {
    let remaining = after
        .iter()
        .flat_map(|dataset| dataset.records.iter())
        .map(identity)
        .collect::<HashSet<_>>();
    let mut reported = HashSet::new();

    before
        .iter()
        .flat_map(|dataset| dataset.records.iter())
        .filter(|record| !record.full_name.trim().is_empty())
        .filter(|record| !remaining.contains(&identity(record)))
        .filter(|record| reported.insert(identity(record)))
        .map(|record| RemovalFinding {
            partition: record.source_partition.clone(),
            plan: record.plan.clone(),
            full_name: record.full_name.clone(),
            ci_type: record.ci_type.clone(),
            serial_number: record.serial_number.clone(),
            manual_entry: record.manual_entry.clone(),
            lost_attributes: critical_attributes
                .iter()
                .filter_map(|attribute| {
                    record.attribute(attribute).map(|value| AttributeValue {
                        attribute: attribute.clone(),
                        value: value.to_string(),
                    })
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn record(plan: &str, full_name: &str, ci_type: &str, nas: &str) -> Record {
        let mut attributes = BTreeMap::new();
        attributes.insert("nas".to_string(), nas.to_string());
        Record {
            ordinal: 0,
            row_number: 2,
            source_partition: "before".into(),
            plan: plan.into(),
            full_name: full_name.into(),
            name_prefix: None,
            core_name: Some(full_name.into()),
            ci_type: ci_type.into(),
            serial_number: None,
            environment: None,
            manual_entry: Some("true".into()),
            is_manual_entry: true,
            attributes,
        }
    }

    fn dataset(records: Vec<Record>) -> Dataset {
        Dataset::new("before".into(), Vec::new(), BTreeMap::new(), records, Vec::new())
    }

    #[test]
    fn removed_records_carry_lost_critical_values() {
        let before = dataset(vec![
            record("P1", "DB:srv1", "Database", "filer01"),
            record("P1", "Database:srv1", "Database", ""),
        ]);
        let after = dataset(vec![record("P1", "Database:srv1", "Database", "")]);
        let removed = find_removed(&[before], &[after], &["nas".to_string()]);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].full_name, "DB:srv1");
        assert!(removed[0].had_critical_attributes());
        assert_eq!(removed[0].lost_attributes[0].value, "filer01");
    }

    #[test]
    fn identity_includes_plan_and_type() {
        let before = dataset(vec![
            record("P1", "srv1", "Server", ""),
            record("P2", "srv1", "Server", ""),
        ]);
        let after = dataset(vec![record("P1", "srv1", "Database", "")]);
        let removed = find_removed(&[before], &[after], &[]);
        assert_eq!(removed.len(), 2);
        assert!(removed.iter().all(|r| !r.had_critical_attributes()));
    }
}
