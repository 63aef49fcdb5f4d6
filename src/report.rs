//! Rendering of findings: terminal tables, a JSON document and a CSV bundle.
//!
//! Nothing here decides anything; it only lays out what the analyses produced.

use std::{
    borrow::Cow,
    fmt::Write as _,
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use itertools::Itertools;
use log::info;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{
    analysis::{AnalysisReport, PartitionOutcome, PartitionReport},
    diff::{ColumnComparison, DiffReport, KeyedRowSummary},
    io_utils,
    model::{CheckOutcome, Notice},
};

/// Column-aligned plain-text table. Control characters in cells become spaces.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths = headers
        .iter()
        .map(|h| h.chars().count().max(3))
        .collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(flatten(cell).chars().count());
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "{}", format_line(headers.iter().map(|h| Cow::Borrowed(*h)), &widths));
    let _ = writeln!(
        out,
        "{}",
        format_line(widths.iter().map(|w| Cow::Owned("-".repeat(*w))), &widths)
    );
    for row in rows {
        let _ = writeln!(out, "{}", format_line(row.iter().map(|c| flatten(c)), &widths));
    }
    out
}

fn format_line<'a>(cells: impl Iterator<Item = Cow<'a, str>>, widths: &[usize]) -> String {
    let joined = cells
        .zip(widths.iter().copied())
        .map(|(cell, width)| format!("{cell:<width$}"))
        .join("  ");
    joined.trim_end().to_string()
}

fn flatten(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

fn outcome_cell<T>(outcome: &CheckOutcome<T>) -> String {
    match outcome {
        CheckOutcome::Evaluated { findings } => findings.len().to_string(),
        CheckOutcome::Skipped { .. } => "skipped".to_string(),
    }
}

fn partition_rows(label: &str, partitions: &[PartitionReport]) -> Vec<Vec<String>> {
    partitions
        .iter()
        .map(|p| match &p.outcome {
            PartitionOutcome::Analyzed(findings) => {
                let mut row = vec![
                    label.to_string(),
                    p.partition.clone(),
                    "analyzed".to_string(),
                    p.source_rows.to_string(),
                    p.plans.to_string(),
                ];
                row.extend(findings.duplicates.iter().map(|d| outcome_cell(&d.outcome)));
                row.push(findings.attribute_risks.len().to_string());
                row.push(outcome_cell(&findings.policy_violations));
                row.push(findings.notices.len().to_string());
                row
            }
            PartitionOutcome::Aborted { error } => vec![
                label.to_string(),
                p.partition.clone(),
                format!("aborted: {error}"),
                p.source_rows.to_string(),
            ],
        })
        .collect()
}

pub fn render_analysis_summary(report: &AnalysisReport) -> String {
    let groupings = report
        .partitions
        .iter()
        .chain(&report.after)
        .find_map(|p| p.findings())
        .map(|f| f.duplicates.iter().map(|d| d.grouping.clone()).collect_vec())
        .unwrap_or_default();

    let mut headers = vec!["extract", "partition", "status", "rows", "plans"];
    headers.extend(groupings.iter().map(String::as_str));
    headers.extend(["attribute risks", "policy", "notices"]);

    let mut rows = partition_rows("before", &report.partitions);
    rows.extend(partition_rows("after", &report.after));

    let mut out = render_table(&headers, &rows);
    let plans = plan_summary_rows(report);
    if !plans.is_empty() {
        out.push('\n');
        out.push_str(&render_table(&PLAN_SUMMARY_HEADERS, &plans));
    }
    out.push('\n');
    out.push_str(&render_table(&["category", "count"], &summary_rows(report)));
    out
}

const PLAN_SUMMARY_HEADERS: [&str; 9] = [
    "extract",
    "partition",
    "plan",
    "plan_invalid",
    "records",
    "unique_serials",
    "remaining_duplicates",
    "duplicated_serials",
    "duplicate_pct",
];

fn plan_summary_rows(report: &AnalysisReport) -> Vec<Vec<String>> {
    report
        .partitions
        .iter()
        .map(|p| ("before", p))
        .chain(report.after.iter().map(|p| ("after", p)))
        .filter_map(|(extract, p)| p.findings().map(|f| (extract, f)))
        .flat_map(|(extract, f)| f.plan_summary.findings().iter().map(move |s| (extract, s)))
        .map(|(extract, s)| {
            vec![
                extract.to_string(),
                s.partition.clone(),
                s.plan.clone(),
                s.plan_invalid.clone(),
                s.total_records.to_string(),
                s.unique_serials.to_string(),
                s.duplicate_records.to_string(),
                s.duplicated_serials.to_string(),
                format!("{:.2}", s.duplicate_percentage),
            ]
        })
        .collect()
}

fn summary_rows(report: &AnalysisReport) -> Vec<Vec<String>> {
    let s = &report.summary;
    let mut rows = vec![
        vec!["partitions analyzed".into(), s.partitions_analyzed.to_string()],
        vec!["partitions aborted".into(), s.partitions_aborted.to_string()],
        vec!["records".into(), s.records.to_string()],
        vec!["duplicate groups".into(), s.duplicate_groups.to_string()],
    ];
    for (kind, count) in &s.duplicates_by_kind {
        rows.push(vec![format!("  {kind}"), count.to_string()]);
    }
    rows.push(vec!["transfer needed".into(), s.transfer_needed.to_string()]);
    rows.push(vec!["attribute conflicts".into(), s.conflicts.to_string()]);
    rows.push(vec!["policy violations".into(), s.policy_violations.to_string()]);
    rows.push(vec![
        "plans with serial duplicates".into(),
        s.plans_with_serial_duplicates.to_string(),
    ]);
    if report.removals.is_some() {
        rows.push(vec!["removed records".into(), s.removed_records.to_string()]);
        rows.push(vec![
            "removed with critical attributes".into(),
            s.removed_with_critical_attributes.to_string(),
        ]);
    }
    rows.push(vec!["notices".into(), s.notices.to_string()]);
    rows
}

pub fn render_column_comparison(columns: &ColumnComparison) -> String {
    let rows = columns
        .common
        .iter()
        .map(|c| vec![c.clone(), "common".to_string()])
        .chain(columns.missing.iter().map(|c| vec![c.clone(), "missing".to_string()]))
        .chain(columns.extra.iter().map(|c| vec![c.clone(), "extra".to_string()]))
        .collect::<Vec<_>>();
    render_table(&["column", "status"], &rows)
}

fn diff_summary_rows(diff: &DiffReport) -> Vec<Vec<String>> {
    vec![
        vec!["key column".into(), diff.key_column.clone()],
        vec!["reference rows".into(), diff.reference_rows.to_string()],
        vec!["comparison rows".into(), diff.comparison_rows.to_string()],
        vec!["common columns".into(), diff.columns.common.len().to_string()],
        vec!["missing columns".into(), diff.columns.missing.len().to_string()],
        vec!["extra columns".into(), diff.columns.extra.len().to_string()],
        vec!["common keys".into(), diff.common_keys.len().to_string()],
        vec!["missing keys".into(), diff.missing_keys.len().to_string()],
        vec!["extra keys".into(), diff.extra_keys.len().to_string()],
        vec!["matching rows".into(), diff.matching_keys.len().to_string()],
        vec![
            "rows with differences".into(),
            diff.rows_with_differences().to_string(),
        ],
        vec!["value differences".into(), diff.differences.len().to_string()],
        vec!["completeness %".into(), format!("{:.2}", diff.completeness)],
        vec!["accuracy %".into(), format!("{:.2}", diff.accuracy)],
        vec!["notices".into(), diff.notices.len().to_string()],
    ]
}

pub fn render_diff_summary(diff: &DiffReport) -> String {
    render_table(&["metric", "value"], &diff_summary_rows(diff))
}

/// Hex SHA-256 of the value's compact JSON form.
pub fn fingerprint<T: Serialize>(value: &T) -> Result<String> {
    let bytes = serde_json::to_vec(value).context("Serializing findings for fingerprint")?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

#[derive(Debug, Serialize)]
pub struct AnalysisDocument<'a> {
    pub generated_at: String,
    pub fingerprint: String,
    #[serde(flatten)]
    pub report: &'a AnalysisReport,
}

impl<'a> AnalysisDocument<'a> {
    pub fn new(report: &'a AnalysisReport) -> Result<Self> {
        Ok(Self {
            generated_at: timestamp(),
            fingerprint: fingerprint(report)?,
            report,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct DiffDocument<'a> {
    pub generated_at: String,
    pub fingerprint: String,
    #[serde(flatten)]
    pub diff: &'a DiffReport,
}

impl<'a> DiffDocument<'a> {
    pub fn new(diff: &'a DiffReport) -> Result<Self> {
        Ok(Self {
            generated_at: timestamp(),
            fingerprint: fingerprint(diff)?,
            diff,
        })
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Creating JSON report {path:?}"))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("Writing JSON report {path:?}"))?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    info!("JSON report written to {path:?}");
    Ok(())
}

fn write_csv(dir: &Path, name: &str, headers: &[&str], rows: &[Vec<String>]) -> Result<()> {
    let path = dir.join(name);
    let mut writer = io_utils::open_csv_writer(&path)?;
    writer
        .write_record(headers)
        .with_context(|| format!("Writing header to {path:?}"))?;
    for row in rows {
        writer
            .write_record(row)
            .with_context(|| format!("Writing row to {path:?}"))?;
    }
    writer.flush()?;
    Ok(())
}

fn opt(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn notice_row(notice: &Notice) -> Vec<String> {
    match notice {
        Notice::AmbiguousColumnCandidate {
            partition,
            field,
            chosen,
            candidates,
            reason,
        } => vec![
            "ambiguous_column_candidate".into(),
            partition.clone(),
            String::new(),
            format!(
                "{field} -> '{chosen}' ({reason}); candidates: {}",
                candidates
                    .iter()
                    .map(|c| format!("{}={}", c.column, c.score))
                    .join(", ")
            ),
        ],
        Notice::EmptyKeyRecord {
            scope,
            source,
            row_number,
            preview,
        } => vec![
            "empty_key_record".into(),
            source.clone(),
            row_number.to_string(),
            format!("blank key for '{scope}': {preview}"),
        ],
        Notice::DuplicateKeyRecord {
            source,
            key,
            row_number,
            replaced_row,
        } => vec![
            "duplicate_key_record".into(),
            source.clone(),
            row_number.to_string(),
            format!("key '{key}' repeats row {replaced_row}; later row kept"),
        ],
    }
}

const NOTICE_HEADERS: [&str; 4] = ["kind", "source", "row", "detail"];

/// One CSV per finding category, `plan_summary.csv` and `summary.csv`.
pub fn write_analysis_bundle(dir: &Path, report: &AnalysisReport) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Creating report directory {dir:?}"))?;
    let all = report
        .partitions
        .iter()
        .map(|p| ("before", p))
        .chain(report.after.iter().map(|p| ("after", p)))
        .filter_map(|(extract, p)| p.findings().map(|f| (extract, f)))
        .collect_vec();

    let mut duplicates = Vec::new();
    for (extract, findings) in &all {
        for finding in findings.duplicate_findings() {
            for record in &finding.records {
                duplicates.push(vec![
                    extract.to_string(),
                    finding.partition.clone(),
                    finding.grouping.clone(),
                    finding.plan.clone(),
                    finding.plan_invalid.clone(),
                    finding.key.join(" / "),
                    finding.kind.label().to_string(),
                    finding.severity.to_string(),
                    finding.duplicate_count.to_string(),
                    record.position.to_string(),
                    record.row_number.to_string(),
                    record.full_name.clone(),
                    opt(&record.name_prefix),
                    record.ci_type.clone(),
                    opt(&record.serial_number),
                    opt(&record.environment),
                    opt(&record.manual_entry),
                    record.type_mismatch.to_string(),
                    record.authoritative.to_string(),
                    record.populated_attributes.join(", "),
                    finding.description.clone(),
                ]);
            }
        }
    }
    write_csv(
        dir,
        "duplicates.csv",
        &[
            "extract",
            "partition",
            "grouping",
            "plan",
            "plan_invalid",
            "key",
            "kind",
            "severity",
            "duplicate_count",
            "position",
            "row",
            "full_name",
            "prefix",
            "ci_type",
            "serial_number",
            "environment",
            "manual_entry",
            "type_mismatch",
            "authoritative",
            "populated_attributes",
            "description",
        ],
        &duplicates,
    )?;

    let risks = all
        .iter()
        .flat_map(|(extract, f)| f.attribute_risks.iter().map(move |r| (extract, r)))
        .map(|(extract, r)| {
            vec![
                extract.to_string(),
                r.partition.clone(),
                r.plan.clone(),
                r.plan_invalid.clone(),
                r.key.join(" / "),
                r.authoritative_name.clone(),
                r.authoritative_row.to_string(),
                opt(&r.authoritative_serial),
                r.candidate_name.clone(),
                r.candidate_row.to_string(),
                opt(&r.candidate_serial),
                r.risk.label().to_string(),
                r.issues.iter().map(|i| i.describe()).join("; "),
                r.action.clone(),
            ]
        })
        .collect_vec();
    write_csv(
        dir,
        "attribute_risks.csv",
        &[
            "extract",
            "partition",
            "plan",
            "plan_invalid",
            "key",
            "authoritative",
            "authoritative_row",
            "authoritative_serial",
            "duplicate",
            "duplicate_row",
            "duplicate_serial",
            "risk",
            "attributes",
            "action",
        ],
        &risks,
    )?;

    let violations = all
        .iter()
        .flat_map(|(extract, f)| {
            f.policy_violations
                .findings()
                .iter()
                .map(move |v| (extract, v))
        })
        .map(|(extract, v)| {
            vec![
                extract.to_string(),
                v.partition.clone(),
                v.rule.id().to_string(),
                v.plan.clone(),
                v.plan_invalid.clone(),
                v.row_number.to_string(),
                v.full_name.clone(),
                v.ci_type.clone(),
                opt(&v.serial_number),
                opt(&v.manual_entry),
                opt(&v.environment),
                v.message.clone(),
            ]
        })
        .collect_vec();
    write_csv(
        dir,
        "policy_violations.csv",
        &[
            "extract",
            "partition",
            "rule",
            "plan",
            "plan_invalid",
            "row",
            "full_name",
            "ci_type",
            "serial_number",
            "manual_entry",
            "environment",
            "message",
        ],
        &violations,
    )?;

    write_csv(
        dir,
        "plan_summary.csv",
        &PLAN_SUMMARY_HEADERS,
        &plan_summary_rows(report),
    )?;

    let mut notices = all
        .iter()
        .flat_map(|(_, f)| f.notices.iter().map(notice_row))
        .collect_vec();
    for p in report.partitions.iter().chain(&report.after) {
        if let PartitionOutcome::Aborted { error } = &p.outcome {
            notices.push(vec![
                "aborted_partition".into(),
                p.partition.clone(),
                String::new(),
                error.clone(),
            ]);
        }
    }
    write_csv(dir, "notices.csv", &NOTICE_HEADERS, &notices)?;

    if let Some(removals) = &report.removals {
        let rows = removals
            .iter()
            .map(|r| {
                vec![
                    r.partition.clone(),
                    r.plan.clone(),
                    r.full_name.clone(),
                    r.ci_type.clone(),
                    opt(&r.serial_number),
                    opt(&r.manual_entry),
                    r.had_critical_attributes().to_string(),
                    r.lost_attributes
                        .iter()
                        .map(|a| format!("{}: {}", a.attribute, a.value))
                        .join("; "),
                ]
            })
            .collect_vec();
        write_csv(
            dir,
            "removals.csv",
            &[
                "partition",
                "plan",
                "full_name",
                "ci_type",
                "serial_number",
                "manual_entry",
                "had_critical_attributes",
                "lost_attributes",
            ],
            &rows,
        )?;
    }

    write_csv(dir, "summary.csv", &["category", "count"], &summary_rows(report))?;
    info!("Report bundle written to {dir:?}");
    Ok(())
}

pub fn write_diff_bundle(dir: &Path, diff: &DiffReport) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Creating report directory {dir:?}"))?;
    let key_rows = |keys: &[KeyedRowSummary]| {
        keys.iter()
            .map(|k| vec![k.key.clone(), k.row_number.to_string(), k.preview.clone()])
            .collect_vec()
    };
    write_csv(
        dir,
        "missing_keys.csv",
        &["key", "reference_row", "preview"],
        &key_rows(&diff.missing_keys),
    )?;
    write_csv(
        dir,
        "extra_keys.csv",
        &["key", "comparison_row", "preview"],
        &key_rows(&diff.extra_keys),
    )?;
    let differences = diff
        .differences
        .iter()
        .map(|d| {
            vec![
                d.key.clone(),
                d.column.clone(),
                d.reference.clone(),
                d.comparison.clone(),
                d.kind.to_string(),
            ]
        })
        .collect_vec();
    write_csv(
        dir,
        "differences.csv",
        &["key", "column", "reference", "comparison", "kind"],
        &differences,
    )?;
    let columns = diff
        .columns
        .common
        .iter()
        .map(|c| vec![c.clone(), "common".to_string()])
        .chain(diff.columns.missing.iter().map(|c| vec![c.clone(), "missing".to_string()]))
        .chain(diff.columns.extra.iter().map(|c| vec![c.clone(), "extra".to_string()]))
        .collect_vec();
    write_csv(dir, "columns.csv", &["column", "status"], &columns)?;
    write_csv(
        dir,
        "notices.csv",
        &NOTICE_HEADERS,
        &diff.notices.iter().map(notice_row).collect_vec(),
    )?;
    write_csv(dir, "summary.csv", &["metric", "value"], &diff_summary_rows(diff))?;
    info!("Diff bundle written to {dir:?}");
    Ok(())
}
