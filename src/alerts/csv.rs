use std::collections::HashMap;

use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::domain::alert::Alert;
use crate::domain::case::CaseRecord;

use super::errors::CsvParseError;
use super::matcher::{apply_match, CaseLookup};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Column {
    ReportId,
    AlertId,
    AlertCode,
    AlertType,
    Description,
    Program,
    Source,
    Text,
    CaseReference,
    AlertDate,
    UpdatedAt,
    ResolvedAt,
}

impl Column {
    fn from_header(raw: &str) -> Option<Self> {
        let name = raw
            .chars()
            .filter(|ch| ch.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        let column = match name.as_str() {
            "reportid" | "reportnumber" | "reportno" | "report" => Column::ReportId,
            "alertid" | "id" | "internalid" => Column::AlertId,
            "alertcode" | "code" => Column::AlertCode,
            "alerttype" | "type" => Column::AlertType,
            "description" | "alertdescription" | "desc" => Column::Description,
            "program" | "programname" => Column::Program,
            "source" | "alertsource" => Column::Source,
            "text" | "alerttext" | "message" | "comments" | "details" => Column::Text,
            "mcn" | "mcnumber" | "casenumber" | "case" | "caseid" | "casereference"
            | "caseno" => Column::CaseReference,
            "alertdate" | "date" | "created" | "createdat" | "createddate" => Column::AlertDate,
            "updatedat" | "lastupdated" | "updated" | "updateddate" => Column::UpdatedAt,
            "resolvedat" | "resolved" | "resolveddate" => Column::ResolvedAt,
            _ => return None,
        };
        Some(column)
    }

    fn is_key_bearing(self) -> bool {
        matches!(
            self,
            Column::ReportId | Column::AlertId | Column::AlertCode | Column::CaseReference
        )
    }

    fn is_stacked_text(self) -> bool {
        matches!(self, Column::Description | Column::Text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Row {
    line: usize,
    fields: Vec<String>,
}

impl Row {
    fn is_blank(&self) -> bool {
        self.fields.iter().all(|field| field.trim().is_empty())
    }
}

#[derive(Debug, Default)]
struct StackedRecord {
    values: HashMap<Column, String>,
    fragments: HashMap<Column, Vec<String>>,
}

impl StackedRecord {
    fn absorb(&mut self, cells: &[(Column, String)]) {
        for (column, value) in cells {
            if column.is_stacked_text() {
                let fragments = self.fragments.entry(*column).or_default();
                if !fragments.iter().any(|existing| existing == value) {
                    fragments.push(value.clone());
                }
            } else {
                self.values.entry(*column).or_insert_with(|| value.clone());
            }
        }
    }

    fn value(&self, column: Column) -> Option<String> {
        if column.is_stacked_text() {
            return self
                .fragments
                .get(&column)
                .filter(|fragments| !fragments.is_empty())
                .map(|fragments| fragments.join("\n"));
        }
        self.values.get(&column).cloned()
    }

    fn into_alert(self) -> Alert {
        let report_id = self.value(Column::ReportId);
        let alert_id = self.value(Column::AlertId);
        let alert_code = self.value(Column::AlertCode);
        let alert_type = self.value(Column::AlertType);
        let description = self.value(Column::Description);
        let case_reference = self.value(Column::CaseReference);
        let alert_date = self
            .value(Column::AlertDate)
            .and_then(|raw| parse_source_date(&raw));

        let key = report_id
            .clone()
            .or_else(|| alert_id.clone())
            .or_else(|| alert_code.clone())
            .unwrap_or_else(|| {
                synthesize_key(&[
                    case_reference.as_deref(),
                    alert_type.as_deref(),
                    alert_date.as_deref(),
                    description.as_deref(),
                ])
            });

        Alert {
            key,
            report_id,
            alert_id,
            alert_code,
            alert_type,
            description,
            program: self.value(Column::Program),
            source: self.value(Column::Source),
            text: self.value(Column::Text),
            case_reference,
            alert_date,
            updated_at: self
                .value(Column::UpdatedAt)
                .and_then(|raw| parse_source_date(&raw)),
            resolved_at: self
                .value(Column::ResolvedAt)
                .and_then(|raw| parse_source_date(&raw)),
            ..Alert::default()
        }
    }
}

/// Parses a stacked alert export and matches every alert against `cases`.
/// Absent or blank input yields no alerts.
pub fn parse_alerts(
    text: Option<&str>,
    cases: &[CaseRecord],
) -> Result<Vec<Alert>, CsvParseError> {
    let lookup = CaseLookup::build(cases);
    parse_alerts_with(text, &lookup)
}

pub fn parse_alerts_with(
    text: Option<&str>,
    lookup: &CaseLookup,
) -> Result<Vec<Alert>, CsvParseError> {
    let text = match text {
        Some(value) if !value.trim().is_empty() => value,
        _ => return Ok(Vec::new()),
    };

    let rows = tokenize(text)?;
    let mut rows = rows.into_iter().filter(|row| !row.is_blank()).peekable();
    let first_line = rows.peek().map(|row| row.line).unwrap_or(1);
    let header = loop {
        match rows.next() {
            Some(row) => {
                if let Some(columns) = header_columns(&row) {
                    break columns;
                }
            }
            None => {
                return Err(CsvParseError {
                    line: first_line,
                    message: "no header row with alert columns found".to_string(),
                })
            }
        }
    };

    let mut records: Vec<StackedRecord> = Vec::new();
    let mut by_report_id: HashMap<String, usize> = HashMap::new();
    for row in rows {
        let cells = row
            .fields
            .iter()
            .enumerate()
            .filter_map(|(index, raw)| {
                let column = (*header.get(index)?)?;
                let value = raw.trim();
                if value.is_empty() {
                    None
                } else {
                    Some((column, value.to_string()))
                }
            })
            .collect::<Vec<_>>();
        if cells.is_empty() {
            continue;
        }

        let report_id = cells
            .iter()
            .find(|(column, _)| *column == Column::ReportId)
            .map(|(_, value)| value.clone());
        let target = match report_id {
            Some(report_id) => match by_report_id.get(&report_id) {
                Some(index) => *index,
                None => {
                    records.push(StackedRecord::default());
                    by_report_id.insert(report_id, records.len() - 1);
                    records.len() - 1
                }
            },
            None if !records.is_empty()
                && !cells.iter().any(|(column, _)| column.is_key_bearing()) =>
            {
                records.len() - 1
            }
            None => {
                records.push(StackedRecord::default());
                records.len() - 1
            }
        };
        records[target].absorb(&cells);
    }

    Ok(records
        .into_iter()
        .map(|record| {
            let mut alert = record.into_alert();
            apply_match(lookup, &mut alert);
            alert
        })
        .collect())
}

fn header_columns(row: &Row) -> Option<Vec<Option<Column>>> {
    let columns = row
        .fields
        .iter()
        .map(|field| Column::from_header(field))
        .collect::<Vec<_>>();
    let recognized = columns.iter().flatten().count();
    let has_key = columns.iter().flatten().any(|column| column.is_key_bearing());
    if recognized >= 2 && has_key {
        Some(columns)
    } else {
        None
    }
}

fn tokenize(text: &str) -> Result<Vec<Row>, CsvParseError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut rows = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1usize;
    let mut row_line = 1usize;
    let mut quote_line = 1usize;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push('\n');
                }
                '\r' => {}
                _ => field.push(ch),
            }
            continue;
        }

        match ch {
            '"' if field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
                quote_line = line;
            }
            ',' => fields.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                fields.push(std::mem::take(&mut field));
                rows.push(Row {
                    line: row_line,
                    fields: std::mem::take(&mut fields),
                });
                line += 1;
                row_line = line;
            }
            _ => field.push(ch),
        }
    }

    if in_quotes {
        return Err(CsvParseError {
            line: quote_line,
            message: "unterminated quoted field".to_string(),
        });
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        rows.push(Row {
            line: row_line,
            fields,
        });
    }
    Ok(rows)
}

/// Normalizes the export's date spellings to RFC3339 UTC.
pub fn parse_source_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return ts
            .checked_to_offset(UtcOffset::UTC)
            .and_then(|utc| utc.format(&Rfc3339).ok());
    }

    let spaced = raw.replacen('T', " ", 1);
    let date_times = [
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]"),
        format_description!(
            "[month padding:none]/[day padding:none]/[year] [hour padding:none]:[minute]:[second]"
        ),
        format_description!("[month padding:none]/[day padding:none]/[year] [hour padding:none]:[minute]"),
    ];
    for format in date_times {
        if let Ok(value) = PrimitiveDateTime::parse(&spaced, format) {
            return value.assume_utc().format(&Rfc3339).ok();
        }
    }

    let dates = [
        format_description!("[year]-[month]-[day]"),
        format_description!("[month padding:none]/[day padding:none]/[year]"),
    ];
    for format in dates {
        if let Ok(value) = Date::parse(raw, format) {
            return value.midnight().assume_utc().format(&Rfc3339).ok();
        }
    }
    None
}

fn synthesize_key(parts: &[Option<&str>]) -> String {
    let mut hasher = Sha256::new();
    for (index, part) in parts.iter().enumerate() {
        if index > 0 {
            hasher.update(b"|");
        }
        hasher.update(part.unwrap_or_default().as_bytes());
    }
    let digest = hasher.finalize();
    let mut out = String::from("alert-");
    for byte in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(out, "{:02x}", byte);
    }
    out
}
