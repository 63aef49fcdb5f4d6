//! Per-partition analysis pipeline and run summary.
//!
//! Each source partition is normalized on its own. A partition that cannot
//! be normalized is reported as [`PartitionOutcome::Aborted`] and the others
//! carry on; an aborted partition never shows up as "zero findings".

use std::{
    cmp::Reverse,
    collections::{BTreeMap, HashMap, HashSet},
};

use anyhow::{Context, Result};
use itertools::Itertools;
use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    classify,
    cli::AnalyzeArgs,
    config::{CanonicalField, ReconcileConfig},
    grouping::{self, GroupingSpec},
    ingest::{self, RawTable},
    io_utils,
    model::{
        AttributeRiskFinding, CheckOutcome, Dataset, DuplicateFinding, Notice,
        PlanDuplicateSummary, PolicyViolationFinding, Record, RemovalFinding, RiskLevel,
    },
    normalize, policy, printable_delimiter, removal, report, risk,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupingResult {
    pub grouping: String,
    pub description: String,
    /// Records left out because the plan or a key field was blank.
    pub excluded_records: usize,
    pub outcome: CheckOutcome<DuplicateFinding>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionFindings {
    pub notices: Vec<Notice>,
    pub duplicates: Vec<GroupingResult>,
    pub attribute_risks: Vec<AttributeRiskFinding>,
    pub policy_violations: CheckOutcome<PolicyViolationFinding>,
    /// Plans that keep serial-number duplicates, most duplicated first.
    pub plan_summary: CheckOutcome<PlanDuplicateSummary>,
}

impl PartitionFindings {
    pub fn duplicate_findings(&self) -> impl Iterator<Item = &DuplicateFinding> {
        self.duplicates
            .iter()
            .flat_map(|result| result.outcome.findings())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PartitionOutcome {
    Analyzed(PartitionFindings),
    Aborted { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionReport {
    pub partition: String,
    pub encoding: String,
    pub source_rows: usize,
    pub plans: usize,
    pub outcome: PartitionOutcome,
}

impl PartitionReport {
    pub fn findings(&self) -> Option<&PartitionFindings> {
        match &self.outcome {
            PartitionOutcome::Analyzed(findings) => Some(findings),
            PartitionOutcome::Aborted { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub partitions_analyzed: usize,
    pub partitions_aborted: usize,
    pub records: usize,
    pub duplicate_groups: usize,
    pub duplicates_by_kind: BTreeMap<String, usize>,
    pub transfer_needed: usize,
    pub conflicts: usize,
    pub policy_violations: usize,
    pub plans_with_serial_duplicates: usize,
    pub removed_records: usize,
    pub removed_with_critical_attributes: usize,
    pub notices: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub partitions: Vec<PartitionReport>,
    /// Partitions of the "after" extract, when one was supplied.
    pub after: Vec<PartitionReport>,
    pub removals: Option<Vec<RemovalFinding>>,
    pub summary: RunSummary,
}

fn record_preview(record: &Record) -> String {
    format!(
        "name: {} | type: {} | plan: {}",
        record.full_name, record.ci_type, record.plan
    )
}

fn run_grouping(
    dataset: &Dataset,
    spec: &GroupingSpec,
    config: &ReconcileConfig,
    notices: &mut Vec<Notice>,
    risks: &mut Vec<AttributeRiskFinding>,
) -> GroupingResult {
    let unavailable = spec.unavailable_fields(dataset);
    if !unavailable.is_empty() {
        let missing = unavailable
            .iter()
            .map(|f| f.source_field().as_str())
            .collect::<Vec<_>>()
            .join(", ");
        debug!(
            "Partition '{}': skipping grouping {} (no column for {missing})",
            dataset.partition,
            spec.describe()
        );
        return GroupingResult {
            grouping: spec.name.clone(),
            description: spec.describe(),
            excluded_records: 0,
            outcome: CheckOutcome::Skipped {
                reason: format!("column(s) not present: {missing}"),
            },
        };
    }

    let outcome = grouping::group_records(dataset, spec);
    for record in &outcome.excluded {
        notices.push(Notice::EmptyKeyRecord {
            scope: spec.name.clone(),
            source: dataset.partition.clone(),
            row_number: record.row_number,
            preview: record_preview(record),
        });
    }
    let findings = outcome
        .groups
        .iter()
        .map(|group| {
            if spec.assess_risk {
                risks.extend(risk::assess_group(
                    dataset,
                    group,
                    &config.critical_attributes,
                ));
            }
            classify::describe_group(dataset, group, &config.critical_attributes)
        })
        .collect::<Vec<_>>();
    debug!(
        "Partition '{}': {} group(s) for {}, {} record(s) excluded",
        dataset.partition,
        findings.len(),
        spec.describe(),
        outcome.excluded.len()
    );
    GroupingResult {
        grouping: spec.name.clone(),
        description: spec.describe(),
        excluded_records: outcome.excluded.len(),
        outcome: CheckOutcome::Evaluated { findings },
    }
}

/// Per-plan serial duplication: records, distinct serials and the surplus.
///
/// Plans without surplus are left out. Sorted by surplus, descending; equal
/// surpluses keep first-seen plan order.
pub fn summarize_plans(dataset: &Dataset) -> CheckOutcome<PlanDuplicateSummary> {
    if !dataset.has_field(CanonicalField::SerialNumber) {
        return CheckOutcome::Skipped {
            reason: "serial number column not present".to_string(),
        };
    }
    let mut plans: Vec<&str> = Vec::new();
    let mut serials: HashMap<&str, Vec<&str>> = HashMap::new();
    for record in &dataset.records {
        let plan = record.plan.trim();
        let serial = record.serial_number.as_deref().map(str::trim).unwrap_or_default();
        if plan.is_empty() || serial.is_empty() {
            continue;
        }
        serials
            .entry(plan)
            .or_insert_with(|| {
                plans.push(plan);
                Vec::new()
            })
            .push(serial);
    }

    let findings = plans
        .into_iter()
        .filter_map(|plan| {
            let values = serials.get(plan)?;
            let counts = values.iter().counts();
            let total_records = values.len();
            let unique_serials = counts.len();
            let duplicate_records = total_records - unique_serials;
            (duplicate_records > 0).then(|| PlanDuplicateSummary {
                partition: dataset.partition.clone(),
                plan: plan.to_string(),
                plan_invalid: dataset.plan_status(plan),
                total_records,
                unique_serials,
                duplicate_records,
                duplicated_serials: counts.values().filter(|&&n| n > 1).count(),
                duplicate_percentage: duplicate_records as f64 * 100.0 / total_records as f64,
            })
        })
        .sorted_by_key(|summary| Reverse(summary.duplicate_records))
        .collect();
    CheckOutcome::Evaluated { findings }
}

/// Every configured analysis over one normalized dataset.
pub fn analyze_dataset(dataset: &Dataset, config: &ReconcileConfig) -> PartitionFindings {
    let mut notices = dataset.notices.clone();
    let mut attribute_risks = Vec::new();
    let duplicates = config
        .grouping
        .iter()
        .map(|spec| run_grouping(dataset, spec, config, &mut notices, &mut attribute_risks))
        .collect();
    let policy_violations = policy::detect(dataset, config);
    PartitionFindings {
        notices,
        duplicates,
        attribute_risks,
        policy_violations,
        plan_summary: summarize_plans(dataset),
    }
}

fn analyze_tables(
    tables: &[RawTable],
    config: &ReconcileConfig,
) -> (Vec<PartitionReport>, Vec<Dataset>) {
    let mut reports = Vec::with_capacity(tables.len());
    let mut datasets = Vec::with_capacity(tables.len());
    for table in tables {
        match normalize::normalize_table(table, config) {
            Ok(dataset) => {
                let findings = analyze_dataset(&dataset, config);
                reports.push(PartitionReport {
                    partition: table.partition.clone(),
                    encoding: table.encoding.clone(),
                    source_rows: table.rows.len(),
                    plans: dataset.plan_count(),
                    outcome: PartitionOutcome::Analyzed(findings),
                });
                datasets.push(dataset);
            }
            Err(err) => {
                warn!("Partition '{}' aborted: {err}", table.partition);
                reports.push(PartitionReport {
                    partition: table.partition.clone(),
                    encoding: table.encoding.clone(),
                    source_rows: table.rows.len(),
                    plans: 0,
                    outcome: PartitionOutcome::Aborted {
                        error: err.to_string(),
                    },
                });
            }
        }
    }
    (reports, datasets)
}

fn summarize(
    partitions: &[PartitionReport],
    after: &[PartitionReport],
    removals: Option<&[RemovalFinding]>,
) -> RunSummary {
    let mut summary = RunSummary::default();
    for report in partitions.iter().chain(after) {
        let Some(findings) = report.findings() else {
            summary.partitions_aborted += 1;
            continue;
        };
        summary.partitions_analyzed += 1;
        summary.records += report.source_rows;
        summary.notices += findings.notices.len();
        for finding in findings.duplicate_findings() {
            summary.duplicate_groups += 1;
            *summary
                .duplicates_by_kind
                .entry(finding.kind.label().to_string())
                .or_default() += 1;
        }
        for finding in &findings.attribute_risks {
            match finding.risk {
                RiskLevel::Conflict => summary.conflicts += 1,
                RiskLevel::TransferNeeded => summary.transfer_needed += 1,
                RiskLevel::None => {}
            }
        }
        summary.policy_violations += findings.policy_violations.findings().len();
        summary.plans_with_serial_duplicates += findings.plan_summary.findings().len();
    }
    if let Some(removals) = removals {
        summary.removed_records = removals.len();
        summary.removed_with_critical_attributes = removals
            .iter()
            .filter(|r| r.had_critical_attributes())
            .count();
    }
    summary
}

/// Pure pipeline over already-loaded tables. `after` may be empty.
pub fn run_analysis(
    before: &[RawTable],
    after: &[RawTable],
    config: &ReconcileConfig,
) -> AnalysisReport {
    let (partitions, before_datasets) = analyze_tables(before, config);
    let (after_partitions, after_datasets) = analyze_tables(after, config);
    let removals = (!after.is_empty()).then(|| {
        removal::find_removed(
            &before_datasets,
            &after_datasets,
            &config.critical_attributes,
        )
    });
    let summary = summarize(&partitions, &after_partitions, removals.as_deref());
    AnalysisReport {
        partitions,
        after: after_partitions,
        removals,
        summary,
    }
}

pub fn execute(args: &AnalyzeArgs) -> Result<()> {
    let config = ReconcileConfig::load_or_default(args.config.as_deref())?;
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    if let Some(delimiter) = args.delimiter {
        info!("Using delimiter '{}'", printable_delimiter(delimiter));
    }
    let before = ingest::load_partitions(&args.inputs, args.delimiter, encoding)
        .context("Loading input partitions")?;
    let after = ingest::load_partitions(&args.after, args.delimiter, encoding)
        .context("Loading 'after' partitions")?;

    let report = run_analysis(&before, &after, &config);
    let summary = &report.summary;
    info!(
        "Analyzed {} partition(s) ({} aborted): {} duplicate group(s), {} transfer(s) needed, {} conflict(s), {} policy violation(s)",
        summary.partitions_analyzed,
        summary.partitions_aborted,
        summary.duplicate_groups,
        summary.transfer_needed,
        summary.conflicts,
        summary.policy_violations
    );
    if summary.notices > 0 {
        warn!("{} notice(s) raised; see report for details", summary.notices);
    }

    print!("{}", report::render_analysis_summary(&report));
    if let Some(path) = &args.json {
        report::write_json(path, &report::AnalysisDocument::new(&report)?)
            .with_context(|| format!("Writing JSON report to {path:?}"))?;
    }
    if let Some(dir) = &args.report_dir {
        report::write_analysis_bundle(dir, &report)
            .with_context(|| format!("Writing report bundle to {dir:?}"))?;
    }
    Ok(())
}
