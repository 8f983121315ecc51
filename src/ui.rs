use std::io::{self, IsTerminal};

use crate::alerts::SyncOutcome;
use crate::app::ListFilter;
use crate::domain::alert::Alert;
use crate::domain::status::{AlertStatus, MatchStatus};

pub fn print_sync_summary(outcome: &SyncOutcome) {
    let palette = Palette::auto();
    let summary = &outcome.index.summary;
    println!("{}", palette.heading("Alerts"));
    println!(
        "{} alert(s): {} matched, {} unmatched, {} missing identifier",
        summary.total, summary.matched, summary.unmatched, summary.missing_identifier
    );
    println!("{} open, {} resolved", summary.open, summary.resolved);
    if outcome.orphaned > 0 {
        println!(
            "{}",
            palette.dim(&format!(
                "{} stored entr(ies) without a current alert",
                outcome.orphaned
            ))
        );
    }
    println!("{}", palette.dim(&persist_line(outcome)));
}

fn persist_line(outcome: &SyncOutcome) -> String {
    if outcome.reasons.is_empty() {
        return "workflow document unchanged".to_string();
    }
    let reasons = outcome
        .reasons
        .iter()
        .map(|reason| reason.as_str())
        .collect::<Vec<_>>()
        .join(",");
    if outcome.wrote {
        format!("workflow document written ({reasons})")
    } else {
        format!("workflow document not written ({reasons})")
    }
}

pub fn print_alert_list(alerts: &[Alert], filter: &ListFilter) {
    let palette = Palette::auto();
    println!("{}", palette.heading("Alerts"));
    if let Some(summary) = filter_summary(filter) {
        println!("{}", palette.dim(&format!("filters: {summary}")));
    }

    if alerts.is_empty() {
        println!("{}", palette.dim("no alerts matched"));
        return;
    }

    for alert in alerts {
        println!("{}", format_alert_row(alert, &palette));
    }
    println!("{}", palette.dim(&format!("{} alert(s)", alerts.len())));
}

fn format_alert_row(alert: &Alert, palette: &Palette) -> String {
    let mut line = format!(
        "{} {} {}",
        palette.id(&alert.key),
        palette.status(alert.status),
        palette.match_label(alert.match_status)
    );
    if let Some(name) = alert.matched_case_name() {
        line.push(' ');
        line.push_str(name);
    } else if let Some(reference) = alert.case_reference.as_deref() {
        line.push(' ');
        line.push_str(&palette.dim(reference));
    }
    if let Some(first) = alert
        .description
        .as_deref()
        .and_then(|text| text.lines().next())
    {
        line.push_str(" - ");
        line.push_str(first);
    }
    line
}

fn filter_summary(filter: &ListFilter) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(case_id) = filter.case_id.as_deref() {
        parts.push(format!("case={case_id}"));
    }
    if let Some(status) = filter.status {
        parts.push(format!("status={status}"));
    }
    if filter.unmatched {
        parts.push("unmatched=true".to_string());
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

pub fn print_alert_show(alert: &Alert) {
    let palette = Palette::auto();
    println!("{} {}", palette.id(&alert.key), palette.status(alert.status));
    for (label, value) in alert_show_fields(alert) {
        println!("{} {}", palette.dim(&format!("{label:>12}:")), value);
    }
}

fn alert_show_fields(alert: &Alert) -> Vec<(&'static str, String)> {
    let mut fields = vec![("match", alert.match_status.to_string())];
    let optional = [
        ("case", alert.matched_case_name()),
        ("reference", alert.case_reference.as_deref()),
        ("type", alert.alert_type.as_deref()),
        ("program", alert.program.as_deref()),
        ("source", alert.source.as_deref()),
        ("alert date", alert.alert_date.as_deref()),
        ("resolved at", alert.resolved_at.as_deref()),
        ("notes", alert.resolution_notes.as_deref()),
        ("updated at", alert.updated_at.as_deref()),
        ("first seen", alert.first_seen_at.as_deref()),
        ("description", alert.description.as_deref()),
        ("text", alert.text.as_deref()),
    ];
    for (label, value) in optional {
        if let Some(value) = value {
            fields.push((label, value.replace('\n', " / ")));
        }
    }
    fields
}

struct Palette {
    enabled: bool,
}

impl Palette {
    fn auto() -> Self {
        let enabled = std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal();
        Self { enabled }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn heading(&self, text: &str) -> String {
        self.paint("1;36", text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }

    fn id(&self, text: &str) -> String {
        self.paint("1;94", text)
    }

    fn status(&self, status: AlertStatus) -> String {
        let upper = status.as_str().to_ascii_uppercase();
        self.paint(status_color_code(status), &format!("[{upper}]"))
    }

    fn match_label(&self, status: MatchStatus) -> String {
        let code = match status {
            MatchStatus::Matched => "32",
            MatchStatus::Unmatched => "33",
            MatchStatus::MissingIdentifier => "31",
        };
        self.paint(code, &format!("({status})"))
    }
}

fn status_color_code(status: AlertStatus) -> &'static str {
    match status {
        AlertStatus::New => "34",
        AlertStatus::InProgress => "33",
        AlertStatus::Acknowledged => "36",
        AlertStatus::Snoozed => "35",
        AlertStatus::Resolved => "32",
    }
}

#[cfg(test)]
#[path = "ui_tests_ext.rs"]
mod tests;
