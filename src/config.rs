//! Reconciliation policy: column synonyms, lexicons, token sets, grouping keys.
//!
//! Everything the engine decides from is declared here so a run is a pure
//! function of its input tables and this configuration. The defaults describe
//! the ServiceNow DR master-plan extract; a YAML file with the same shape
//! overrides them wholesale (`ci-reconcile config -o reconcile.yml` writes the
//! defaults out as a starting point).

use std::{
    fmt,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::grouping::{GroupingSpec, KeyField};

/// Markers that negate a production fragment directly after them.
const NEGATIONS: [&str; 2] = ["non", "not"];

fn compact(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Name,
    SerialNumber,
    ManualEntry,
    CiType,
    Plan,
    Environment,
    DrDevice,
    GlobalLoadBalancer,
    Nas,
    Comments,
    FailoverStrategy,
    PlanInvalid,
}

impl CanonicalField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::SerialNumber => "serial_number",
            Self::ManualEntry => "manual_entry",
            Self::CiType => "ci_type",
            Self::Plan => "plan",
            Self::Environment => "environment",
            Self::DrDevice => "dr_device",
            Self::GlobalLoadBalancer => "global_load_balancer",
            Self::Nas => "nas",
            Self::Comments => "comments",
            Self::FailoverStrategy => "failover_strategy",
            Self::PlanInvalid => "plan_invalid",
        }
    }

    /// Fields that become dedicated [`crate::model::Record`] members rather than attributes.
    pub fn is_core(self) -> bool {
        matches!(
            self,
            Self::Name
                | Self::SerialNumber
                | Self::ManualEntry
                | Self::CiType
                | Self::Plan
                | Self::Environment
        )
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnRule {
    pub field: CanonicalField,
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub required: bool,
}

/// Content scoring used when several headers could hold the same field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentRule {
    pub field: CanonicalField,
    /// Headers containing this token (case-insensitive) join the candidate list.
    pub header_token: String,
    pub positive: Vec<String>,
    pub negative: Vec<String>,
    /// Number of leading non-empty values inspected per candidate column.
    pub sample_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ReconcileConfig {
    pub separator: char,
    pub columns: Vec<ColumnRule>,
    pub content_rules: Vec<ContentRule>,
    pub critical_attributes: Vec<String>,
    pub truthy_tokens: Vec<String>,
    pub production_tokens: Vec<String>,
    pub production_substring: Option<String>,
    pub grouping: Vec<GroupingSpec>,
    pub key_candidates: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn rule(field: CanonicalField, synonyms: &[&str], required: bool) -> ColumnRule {
    ColumnRule {
        field,
        synonyms: strings(synonyms),
        required,
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        use CanonicalField::*;
        Self {
            separator: ':',
            columns: vec![
                rule(Name, &["Name", "Device Name", "u_device_name"], true),
                rule(SerialNumber, &["Serial Number", "u_serial_number"], false),
                rule(ManualEntry, &["Manual Entry", "u_manual_entry"], false),
                rule(
                    CiType,
                    &["Type", "u_type", "CI Type", "Configuration Item Type"],
                    true,
                ),
                rule(Plan, &["Plan", "Plan Name", "u_plan"], true),
                rule(
                    Environment,
                    &[
                        "Environment",
                        "u_environment",
                        "Server Environment",
                        "u_server_environment",
                    ],
                    false,
                ),
                rule(DrDevice, &["DR Device", "u_dr_device"], false),
                rule(
                    GlobalLoadBalancer,
                    &["Global Load Balancer", "u_global_load_balancer"],
                    false,
                ),
                rule(Nas, &["NAS", "u_nas"], false),
                rule(Comments, &["Comments", "u_comments"], false),
                rule(
                    FailoverStrategy,
                    &["Failover Strategy", "u_failover_strategy"],
                    false,
                ),
                rule(PlanInvalid, &["Plan Invalid", "plan.u_plan_invalid"], false),
            ],
            content_rules: vec![ContentRule {
                field: CiType,
                header_token: "type".to_string(),
                positive: strings(&[
                    "server",
                    "database",
                    "storage",
                    "switch",
                    "router",
                    "firewall",
                    "load balancer",
                    "appliance",
                    "cluster",
                    "host",
                ]),
                negative: strings(&["scope", "relationship", "primary", "secondary"]),
                sample_size: 200,
            }],
            critical_attributes: strings(&[
                "dr_device",
                "global_load_balancer",
                "nas",
                "comments",
                "failover_strategy",
            ]),
            truthy_tokens: strings(&["true", "1", "yes", "t"]),
            production_tokens: strings(&["production", "prod", "prd"]),
            production_substring: Some("prod".to_string()),
            grouping: vec![
                GroupingSpec::new("name", &[KeyField::CoreName], false),
                GroupingSpec::new("name_type", &[KeyField::CoreName, KeyField::CiType], true),
                GroupingSpec::new(
                    "serial_type",
                    &[KeyField::SerialNumber, KeyField::CiType],
                    false,
                ),
                GroupingSpec::new("serial", &[KeyField::SerialNumber], false),
            ],
            key_candidates: strings(&[
                "sys_id",
                "id",
                "ID",
                "number",
                "Number",
                "record_id",
                "recordid",
                "ticket_number",
                "user_id",
                "userid",
                "email",
                "employee_id",
                "employeeid",
            ]),
        }
    }
}

impl ReconcileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let config: Self = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config YAML {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = self.to_yaml_string()?;
        let mut file =
            File::create(path).with_context(|| format!("Creating config file {path:?}"))?;
        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Writing config file {path:?}"))?;
        file.flush()?;
        Ok(())
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing config to YAML")
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for field in [
            CanonicalField::Name,
            CanonicalField::CiType,
            CanonicalField::Plan,
        ] {
            ensure!(
                self.column_rule(field).is_some_and(|rule| rule.required),
                "Config must declare '{field}' as a required column"
            );
        }
        let mut seen = Vec::new();
        for rule in &self.columns {
            ensure!(
                !seen.contains(&rule.field),
                "Column '{}' is declared more than once",
                rule.field
            );
            seen.push(rule.field);
        }
        let mut names = Vec::new();
        for spec in &self.grouping {
            ensure!(
                !spec.fields.is_empty(),
                "Grouping '{}' must list at least one key field",
                spec.name
            );
            ensure!(
                !names.contains(&spec.name),
                "Grouping '{}' is declared more than once",
                spec.name
            );
            names.push(spec.name.clone());
        }
        for content in &self.content_rules {
            ensure!(
                content.sample_size > 0,
                "Content rule for '{}' needs a positive sample_size",
                content.field
            );
        }
        Ok(())
    }

    pub fn column_rule(&self, field: CanonicalField) -> Option<&ColumnRule> {
        self.columns.iter().find(|rule| rule.field == field)
    }

    pub fn content_rule(&self, field: CanonicalField) -> Option<&ContentRule> {
        self.content_rules.iter().find(|rule| rule.field == field)
    }

    pub fn is_truthy(&self, value: &str) -> bool {
        let value = value.trim();
        self.truthy_tokens
            .iter()
            .any(|token| token.eq_ignore_ascii_case(value))
    }

    /// Exact production token first, then the substring heuristic when configured.
    ///
    /// The heuristic ignores punctuation and spacing, and a fragment preceded by
    /// a negation (`"Non-Production"`, `"non prod"`, `"nonprod"`) never matches.
    pub fn is_production(&self, environment: Option<&str>) -> bool {
        let Some(environment) = environment.map(str::trim).filter(|e| !e.is_empty()) else {
            return false;
        };
        if self
            .production_tokens
            .iter()
            .any(|token| token.eq_ignore_ascii_case(environment))
        {
            return true;
        }
        let Some(fragment) = self.production_substring.as_deref().map(compact) else {
            return false;
        };
        if fragment.is_empty() {
            return false;
        }
        let environment = compact(environment);
        environment.contains(&fragment)
            && !NEGATIONS
                .iter()
                .any(|negation| environment.contains(&format!("{negation}{fragment}")))
    }
}
