use crate::sheet::cell_text;
use serde_json::Value;
use std::collections::BTreeMap;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, PrimitiveDateTime};

/// `MM/DD/YYYY`, the date printed on the report.
pub const LONG_DATE: &[FormatItem<'static>] = format_description!("[month]/[day]/[year]");

/// `MM-DD-YY`, the date used in report filenames.
pub const SHORT_DATE: &[FormatItem<'static>] =
    format_description!("[month]-[day]-[year repr:last_two]");

const COMPLETION_TIME: &[FormatItem<'static>] = format_description!(
    "[month padding:none]/[day padding:none]/[year] [hour repr:12 padding:none]:[minute]:[second] [period]"
);

const COMPLETION_DATE: &[FormatItem<'static>] =
    format_description!("[month padding:none]/[day padding:none]/[year]");

/// Report date in both renderings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportDate(pub Date);

impl ReportDate {
    pub fn long(&self) -> String {
        self.0.format(LONG_DATE).unwrap_or_default()
    }

    pub fn short(&self) -> String {
        self.0.format(SHORT_DATE).unwrap_or_default()
    }
}

/// One row of the online form workbook.
///
/// Every recognised column is present; cells missing from the workbook are
/// empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormSubmission {
    pub id: String,
    pub ticket_number: String,
    pub email: String,
    pub name: String,
    pub work_done: String,
    pub time_spent: String,
    pub status: String,
    pub completion_time: String,
    pub additional_techs: String,
    pub other_times: String,
}

impl FormSubmission {
    /// Build from a header → cell mapping whose keys are already lower-cased.
    pub fn from_cells(cells: &BTreeMap<String, Value>) -> Self {
        let get = |key: &str| {
            cells
                .get(key)
                .map(cell_text)
                .unwrap_or_default()
                .trim()
                .to_string()
        };

        Self {
            id: get("id"),
            ticket_number: get("ticket number"),
            email: get("email"),
            name: get("name"),
            work_done: get("work done"),
            time_spent: get("time spent"),
            status: get("ticket status").to_lowercase(),
            completion_time: get("completion time"),
            additional_techs: get("additional tech names"),
            other_times: get("other techs time spent"),
        }
    }

    /// `ongoing`, `close` and `closed` pass through; anything else is ongoing.
    pub fn report_status(&self) -> &str {
        match self.status.as_str() {
            s @ ("ongoing" | "close" | "closed") => s,
            _ => "ongoing",
        }
    }

    pub fn extra_tech_names(&self) -> Vec<String> {
        split_list(&self.additional_techs)
    }

    pub fn extra_tech_hours(&self) -> Vec<String> {
        split_list(&self.other_times)
    }

    /// Date the form was completed, or `fallback` when the cell is unreadable.
    pub fn report_date(&self, fallback: Date) -> ReportDate {
        ReportDate(parse_completion_date(&self.completion_time).unwrap_or(fallback))
    }
}

/// `M/D/YYYY h:mm:ss AM` as exported by the forms workbook, or just its
/// leading `M/D/YYYY`.
pub fn parse_completion_date(raw: &str) -> Option<Date> {
    let raw = raw.trim();
    if let Ok(dt) = PrimitiveDateTime::parse(raw, COMPLETION_TIME) {
        return Some(dt.date());
    }
    let first = raw.split_whitespace().next()?;
    Date::parse(first, COMPLETION_DATE).ok()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use time::macros::date;

    fn cells(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_missing_cells_are_empty() {
        let form = FormSubmission::from_cells(&BTreeMap::new());
        assert_eq!(form, FormSubmission::default());
        assert_eq!(form.report_status(), "ongoing");
        assert!(form.extra_tech_names().is_empty());
    }

    #[test]
    fn test_numeric_ticket_and_hours() {
        let form = FormSubmission::from_cells(&cells(&[
            ("id", json!(17)),
            ("ticket number", json!(123456.0)),
            ("time spent", json!(2.5)),
            ("ticket status", json!(" Closed ")),
        ]));
        assert_eq!(form.id, "17");
        assert_eq!(form.ticket_number, "123456.0");
        assert_eq!(form.time_spent, "2.5");
        assert_eq!(form.report_status(), "closed");
    }

    #[test]
    fn test_unknown_status_is_ongoing() {
        let form = FormSubmission::from_cells(&cells(&[("ticket status", json!("Waiting"))]));
        assert_eq!(form.report_status(), "ongoing");
    }

    #[test]
    fn test_extra_tech_lists() {
        let form = FormSubmission::from_cells(&cells(&[
            ("additional tech names", json!("Bob, ,Cy ,")),
            ("other techs time spent", json!("1.5")),
        ]));
        assert_eq!(form.extra_tech_names(), vec!["Bob", "Cy"]);
        assert_eq!(form.extra_tech_hours(), vec!["1.5"]);
    }

    #[test]
    fn test_completion_time_formats() {
        assert_eq!(
            parse_completion_date("3/7/2025 2:05:09 PM"),
            Some(date!(2025 - 03 - 07))
        );
        assert_eq!(
            parse_completion_date("12/31/2024 11:59:00 AM"),
            Some(date!(2024 - 12 - 31))
        );
        assert_eq!(parse_completion_date("3/7/2025"), Some(date!(2025 - 03 - 07)));
        assert_eq!(parse_completion_date("yesterday"), None);
        assert_eq!(parse_completion_date(""), None);
    }

    #[test]
    fn test_report_date_renderings() {
        let form = FormSubmission {
            completion_time: "3/7/2025 2:05:09 PM".into(),
            ..Default::default()
        };
        let d = form.report_date(date!(2000 - 01 - 01));
        assert_eq!(d.long(), "03/07/2025");
        assert_eq!(d.short(), "03-07-25");

        let fallback = FormSubmission::default().report_date(date!(2026 - 10 - 18));
        assert_eq!(fallback.long(), "10/18/2026");
    }
}
