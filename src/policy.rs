//! Policy Violation Detector: manual entries outside production.

use crate::{
    config::{CanonicalField, ReconcileConfig},
    model::{CheckOutcome, Dataset, PolicyRule, PolicyViolationFinding, Record},
};

/// Manual entry with a blank, absent, or non-production environment.
pub fn violates_manual_entry_policy(record: &Record, config: &ReconcileConfig) -> bool {
    record.is_manual_entry && !config.is_production(record.environment.as_deref())
}

/// One finding per violating record, in input order.
///
/// Skipped when the dataset has no manual-entry column, since no record can
/// then be shown to be a manual entry. A missing environment column is not a
/// reason to skip: every manual entry then counts as non-production.
pub fn detect(dataset: &Dataset, config: &ReconcileConfig) -> CheckOutcome<PolicyViolationFinding> {
    if !dataset.has_field(CanonicalField::ManualEntry) {
        return CheckOutcome::Skipped {
            reason: "manual entry column not present".to_string(),
        };
    }
    let rule = PolicyRule::ManualEntryNonProduction;
    let findings = dataset
        .records
        .iter()
        .filter(|record| violates_manual_entry_policy(record, config))
        .map(|record| PolicyViolationFinding {
            rule,
            partition: dataset.partition.clone(),
            plan: record.plan.clone(),
            plan_invalid: dataset.plan_status(&record.plan),
            row_number: record.row_number,
            full_name: record.full_name.clone(),
            core_name: record.core_name.clone(),
            ci_type: record.ci_type.clone(),
            serial_number: record.serial_number.clone(),
            manual_entry: record.manual_entry.clone(),
            environment: record.environment.clone(),
            message: rule.message().to_string(),
        })
        .collect();
    CheckOutcome::Evaluated { findings }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn record(manual: Option<&str>, environment: Option<&str>) -> Record {
        let config = ReconcileConfig::default();
        Record {
            ordinal: 0,
            row_number: 2,
            source_partition: "CSV".into(),
            plan: "P1".into(),
            full_name: "Server:srv1".into(),
            name_prefix: Some("Server".into()),
            core_name: Some("srv1".into()),
            ci_type: "Server".into(),
            serial_number: None,
            environment: environment.map(str::to_string),
            manual_entry: manual.map(str::to_string),
            is_manual_entry: manual.is_some_and(|m| config.is_truthy(m)),
            attributes: BTreeMap::new(),
        }
    }

    fn dataset(records: Vec<Record>, with_manual_column: bool) -> Dataset {
        let mut resolved = BTreeMap::new();
        if with_manual_column {
            resolved.insert(CanonicalField::ManualEntry, "Manual Entry".to_string());
        }
        Dataset::new("CSV".into(), Vec::new(), resolved, records, Vec::new())
    }

    #[test]
    fn blank_environment_counts_as_non_production() {
        let config = ReconcileConfig::default();
        assert!(violates_manual_entry_policy(&record(Some("true"), None), &config));
        assert!(violates_manual_entry_policy(&record(Some("YES"), Some("Test")), &config));
        assert!(!violates_manual_entry_policy(&record(Some("t"), Some("PRD")), &config));
        assert!(!violates_manual_entry_policy(
            &record(Some("1"), Some("Pre-Production")),
            &config
        ));
        assert!(!violates_manual_entry_policy(&record(Some("false"), None), &config));
    }

    #[test]
    fn negated_production_environments_are_flagged() {
        let config = ReconcileConfig::default();
        let mut nonprod = record(Some("true"), Some("nonprod"));
        nonprod.row_number = 3;
        let data = dataset(
            vec![record(Some("true"), Some("Non-Production")), nonprod],
            true,
        );
        let rows = detect(&data, &config)
            .findings()
            .iter()
            .map(|f| f.row_number)
            .collect::<Vec<_>>();
        assert_eq!(rows, vec![2, 3]);
    }

    #[test]
    fn detection_reports_each_violation_in_order() {
        let config = ReconcileConfig::default();
        let mut second = record(Some("1"), Some("dev"));
        second.row_number = 5;
        let data = dataset(
            vec![
                record(Some("true"), None),
                record(Some("no"), None),
                second,
            ],
            true,
        );
        let outcome = detect(&data, &config);
        let rows = outcome
            .findings()
            .iter()
            .map(|f| f.row_number)
            .collect::<Vec<_>>();
        assert_eq!(rows, vec![2, 5]);
        assert_eq!(outcome.findings()[0].plan_invalid, "Unknown");
    }

    #[test]
    fn missing_manual_entry_column_is_skipped_not_clean() {
        let outcome = detect(&dataset(Vec::new(), false), &ReconcileConfig::default());
        assert!(outcome.is_skipped());
        let evaluated = detect(&dataset(Vec::new(), true), &ReconcileConfig::default());
        assert_eq!(evaluated, CheckOutcome::Evaluated { findings: Vec::new() });
    }
}
