//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats. Attribute values of
//! sensitive attributes never reach the output.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ValidationResult;
use crate::planner::{ActionType, ChangeAction, Plan, ResourcePlan};
use crate::reconciler::ReadResult;
use crate::resource::{self, AttributeSet, REDACTED, ReconciliationState};
use crate::session::{ApplyReport, RefreshReport};
use crate::state::{LockInfo, StateRecord};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan action row for table display.
#[derive(Tabled)]
struct PlanActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Record row for table display.
#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    resource_type: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Identity")]
    identity: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a reconciliation plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &Plan, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&PlanJson::from(plan)).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_plan_text(plan, detailed),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &Plan, detailed: bool) -> String {
        if plan.is_empty() {
            return format!(
                "{} No changes required - objects match the configuration.\n",
                "✓".green()
            );
        }

        let actionable = plan.actionable();
        let mut output = String::from("\nReconciliation Plan\n\n");

        let rows: Vec<PlanActionRow> = actionable
            .iter()
            .enumerate()
            .map(|(i, r)| PlanActionRow {
                index: i + 1,
                action: Self::format_action_type(r.action),
                resource: r.address.clone(),
                reason: Self::truncate(&r.reason, 48),
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if detailed {
            for entry in &actionable {
                Self::write_plan_detail(&mut output, entry);
            }
        }

        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} to replace, {} to destroy\n",
            plan.count(ActionType::Create).to_string().green(),
            plan.count(ActionType::Update).to_string().yellow(),
            plan.count(ActionType::Replace).to_string().magenta(),
            plan.count(ActionType::Delete).to_string().red()
        );

        let repairs = plan.count(ActionType::Repair);
        if repairs > 0 {
            let _ = write!(
                output,
                "\n{} {repairs} resource(s) need repair first; run `vantage repair <name>`\n",
                "⚠".yellow()
            );
        }

        output
    }

    fn write_plan_detail(output: &mut String, entry: &ResourcePlan) {
        let _ = writeln!(output, "\n  {}", entry.description().bold());
        for change in entry.changes.iter().filter(|c| c.action != ChangeAction::Unchanged) {
            let _ = writeln!(output, "    {change}");
        }
        for command in &entry.commands {
            let _ = writeln!(output, "    > {}", command.redacted().dimmed());
        }
    }

    /// Formats the outcome of an apply or destroy run.
    #[must_use]
    pub fn format_apply(&self, report: &ApplyReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                let status = if report.success {
                    format!("{} Apply complete", "✓".green())
                } else {
                    format!("{} Apply finished with errors", "✗".red())
                };

                let mut output = format!("{status}\n\n");
                let _ = writeln!(output, "   Created: {}", report.created);
                let _ = writeln!(output, "   Updated: {}", report.updated);
                let _ = writeln!(output, "   Replaced: {}", report.replaced);
                let _ = writeln!(output, "   Deleted: {}", report.deleted);
                let _ = writeln!(output, "   Unchanged: {}", report.unchanged);

                if !report.errors.is_empty() {
                    let _ = write!(output, "\n{} Errors:\n", "⚠".yellow());
                    for error in &report.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }

                if !report.tainted.is_empty() {
                    let _ = write!(
                        output,
                        "\n{} Tainted: {}\n   Run `vantage repair <name>` before the next apply.\n",
                        "⚠".yellow(),
                        report.tainted.join(", ")
                    );
                }

                output
            }
        }
    }

    /// Formats a refresh report.
    #[must_use]
    pub fn format_refresh(&self, report: &RefreshReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = if report.is_converged() {
                    format!("{} No drift detected - records match the remote system.\n", "✓".green())
                } else {
                    format!("{} Drift detected:\n\n", "⚠".yellow())
                };

                for entry in report.drifted() {
                    let _ = writeln!(
                        output,
                        "   - {} ({} -> {})",
                        entry.address,
                        Self::format_state(entry.before),
                        Self::format_state(entry.after)
                    );
                }

                for error in &report.errors {
                    let _ = writeln!(output, "   {} {error}", "✗".red());
                }

                let _ = write!(
                    output,
                    "\n{}/{} records drifted.\n",
                    report.drifted().count(),
                    report.entries.len()
                );
                output
            }
        }
    }

    /// Formats the outcome of a repair.
    #[must_use]
    pub fn format_repair(&self, target: &str, result: &ReadResult) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                "target": target,
                "present": result.present,
                "state": result.state,
            }))
            .unwrap_or_default(),
            OutputFormat::Text => match (result.present, result.state) {
                (false, _) => format!(
                    "{} {target} no longer exists; its record was removed\n",
                    "✓".green()
                ),
                (true, ReconciliationState::Tainted) => format!(
                    "{} {target} is still tainted; check the remote system and retry\n",
                    "✗".red()
                ),
                (true, state) => format!("{} {target} repaired: {}\n", "✓".green(), Self::format_state(state)),
            },
        }
    }

    /// Formats a list of records.
    #[must_use]
    pub fn format_records(&self, records: &[StateRecord]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(
                &records.iter().map(RecordJson::from).collect::<Vec<_>>(),
            )
            .unwrap_or_default(),
            OutputFormat::Text => {
                if records.is_empty() {
                    return String::from("   No managed objects.\n");
                }

                let rows: Vec<RecordRow> = records
                    .iter()
                    .map(|r| RecordRow {
                        name: r.address.clone().unwrap_or_else(|| String::from("-")),
                        resource_type: r.resource_type.clone(),
                        state: Self::format_state(r.state),
                        identity: r.identity.short().to_string(),
                        updated: r.updated_at.format("%Y-%m-%d %H:%M").to_string(),
                    })
                    .collect();

                let mut output = Table::new(rows).to_string();
                output.push('\n');
                output
            }
        }
    }

    /// Formats one record with its lease and recent history.
    #[must_use]
    pub fn format_record(&self, record: &StateRecord, lock: Option<&LockInfo>) -> String {
        match self.format {
            OutputFormat::Json => {
                let mut json = RecordJson::from(record);
                json.lock = lock.cloned();
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();
                let name = record.address.as_deref().unwrap_or("(unnamed)");

                let _ = write!(output, "\n{} {name}\n\n", record.resource_type.bold());
                let _ = writeln!(output, "   Identity: {}", record.identity);
                let _ = writeln!(output, "   State: {}", Self::format_state(record.state));
                let _ = writeln!(output, "   Created: {}", record.created_at);
                let _ = writeln!(output, "   Last updated: {}", record.updated_at);
                if let Some(error) = &record.last_error {
                    let _ = writeln!(output, "   Last error: {}", error.red());
                }
                if let Some(lock) = lock {
                    let _ = writeln!(
                        output,
                        "   Locked by {} ({}, {}s left)",
                        lock.holder,
                        lock.lock_id,
                        lock.remaining_secs()
                    );
                }

                output.push_str("\n   Attributes:\n");
                for (name, value) in shown_attributes(&record.resource_type, &record.attributes) {
                    let _ = writeln!(output, "     {name} = {value}");
                }

                if !record.history.is_empty() {
                    let _ = writeln!(output, "\n   Recent history ({}):", record.history.len());
                    for entry in record.history.iter().rev().take(5) {
                        let status = if entry.error.is_some() { "✗" } else { "✓" };
                        let _ = writeln!(
                            output,
                            "     {status} {} - {} {} -> {}",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            entry.operation,
                            entry.from,
                            entry.to
                        );
                    }
                }

                output
            }
        }
    }

    /// Formats validation results.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                "valid": result.is_valid(),
                "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "warnings": result.warnings,
            }))
            .unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!("{} Configuration is valid\n", "✓".green())
                } else {
                    format!("{} Configuration has {} error(s)\n", "✗".red(), result.error_count())
                };

                for error in &result.errors {
                    let _ = writeln!(output, "   - {error}");
                }

                if show_warnings {
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   {} {warning}", "⚠".yellow());
                    }
                } else if result.warning_count() > 0 {
                    let _ = writeln!(
                        output,
                        "   {} warning(s); use --warnings to show them",
                        result.warning_count()
                    );
                }

                output
            }
        }
    }

    /// Formats an action type with color.
    fn format_action_type(action_type: ActionType) -> String {
        match action_type {
            ActionType::Create => "+create".green().to_string(),
            ActionType::Update => "~update".yellow().to_string(),
            ActionType::Replace => "-/+replace".magenta().to_string(),
            ActionType::Delete => "-delete".red().to_string(),
            ActionType::Repair => "!repair".red().bold().to_string(),
            ActionType::NoOp => "noop".dimmed().to_string(),
        }
    }

    /// Formats a reconciliation state with color.
    fn format_state(state: ReconciliationState) -> String {
        let s = state.to_string();
        match state {
            ReconciliationState::Present => s.green().to_string(),
            ReconciliationState::Creating
            | ReconciliationState::Updating
            | ReconciliationState::Deleting => s.yellow().to_string(),
            ReconciliationState::Tainted => s.red().to_string(),
            ReconciliationState::Absent => s.dimmed().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }

    /// Formats a success message.
    #[must_use]
    pub fn success(&self, message: &str) -> String {
        self.message("success", &format!("{} {message}", "✓".green()), message)
    }

    /// Formats an error message.
    #[must_use]
    pub fn error(&self, message: &str) -> String {
        self.message("error", &format!("{} {message}", "✗".red()), message)
    }

    /// Formats a warning message.
    #[must_use]
    pub fn warning(&self, message: &str) -> String {
        self.message("warning", &format!("{} {message}", "⚠".yellow()), message)
    }

    fn message(&self, status: &str, text: &str, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": status, "message": message });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => text.to_string(),
        }
    }
}

/// Renders attribute values, masking sensitive ones. Values of unknown
/// resource types are all masked.
fn shown_attributes(resource_type: &str, attributes: &AttributeSet) -> Vec<(String, String)> {
    let definition = resource::definition(resource_type);
    attributes
        .iter()
        .map(|(name, value)| {
            let masked = definition.as_ref().is_none_or(|d| d.schema.is_sensitive(name));
            let shown = if masked { REDACTED.to_string() } else { value.to_string() };
            (name.to_string(), shown)
        })
        .collect()
}

// JSON serialization helpers

#[derive(serde::Serialize)]
struct PlanJson {
    created_at: String,
    action_count: usize,
    actions: Vec<ActionJson>,
}

#[derive(serde::Serialize)]
struct ActionJson {
    action: String,
    resource: String,
    resource_type: String,
    identity: Option<String>,
    reason: String,
    changes: Vec<String>,
    commands: Vec<String>,
}

#[derive(serde::Serialize)]
struct RecordJson {
    name: Option<String>,
    resource_type: String,
    identity: String,
    state: ReconciliationState,
    attributes: serde_json::Map<String, serde_json::Value>,
    last_error: Option<String>,
    created_at: String,
    updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    lock: Option<LockInfo>,
}

impl From<&Plan> for PlanJson {
    fn from(plan: &Plan) -> Self {
        let actions: Vec<ActionJson> = plan.actionable().into_iter().map(ActionJson::from).collect();
        Self {
            created_at: plan.created_at.to_rfc3339(),
            action_count: actions.len(),
            actions,
        }
    }
}

impl From<&ResourcePlan> for ActionJson {
    fn from(entry: &ResourcePlan) -> Self {
        Self {
            action: entry.action.to_string(),
            resource: entry.address.clone(),
            resource_type: entry.resource_type.clone(),
            identity: entry.identity.as_ref().map(ToString::to_string),
            reason: entry.reason.clone(),
            changes: entry
                .changes
                .iter()
                .filter(|c| c.action != ChangeAction::Unchanged)
                .map(ToString::to_string)
                .collect(),
            commands: entry.commands.iter().map(|c| c.redacted().to_string()).collect(),
        }
    }
}

impl From<&StateRecord> for RecordJson {
    fn from(record: &StateRecord) -> Self {
        Self {
            name: record.address.clone(),
            resource_type: record.resource_type.clone(),
            identity: record.identity.to_string(),
            state: record.state,
            attributes: shown_attributes(&record.resource_type, &record.attributes)
                .into_iter()
                .map(|(name, value)| (name, serde_json::Value::String(value)))
                .collect(),
            last_error: record.last_error.clone(),
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
            lock: None,
        }
    }
}
