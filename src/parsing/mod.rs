// src/parsing/mod.rs

pub mod normalize;
pub mod rules;

use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub use normalize::{BodyType, clean_body};

/// Ticket state reported by the technician.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Close,
    #[default]
    Ongoing,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Close => "close",
            Status::Ongoing => "ongoing",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notes and hours attributed to one `@Name` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TechEntry {
    pub name: String,
    pub notes: String,
    pub time: String,
}

/// A time token that could not be converted to decimal hours.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid time format '{raw}'")]
pub struct TimeFormatError {
    pub raw: String,
}

/// Everything we can read out of a technician's email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedTicket {
    pub ticket: Option<String>,
    /// In order of first appearance; never empty.
    pub techs: Vec<TechEntry>,
    /// Notes of the first technician.
    pub tech_notes: String,
    /// Hours of the first technician.
    pub time_spent: String,
    #[serde(rename = "additional_notes")]
    pub status: Status,
    pub error: Option<String>,
}

impl ParsedTicket {
    pub fn tech(&self, name: &str) -> Option<&TechEntry> {
        self.techs.iter().find(|t| t.name == name)
    }

    pub fn tech_names(&self) -> Vec<&str> {
        self.techs.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn primary(&self) -> Option<&TechEntry> {
        self.techs.first()
    }
}

/// Parse a normalized email body into a ticket record.
///
/// Never fails: a missing ticket number is `None` and a bad time value is
/// reported through `error` while the remaining sections are still parsed.
pub fn parse_ticket(body: &str, default_tech: &str) -> ParsedTicket {
    let body = normalize::br_to_newline(&normalize::normalize_line_endings(body));
    let body = normalize::strip_signature(&body);
    let body = rules::strip_line_prefixes(&body);

    let lines = rules::split_lines(&body);
    let flattened = rules::flatten(&lines);

    let ticket = rules::find_ticket_number(&lines, &flattened);
    let status = rules::detect_status(&flattened);

    let mut techs = Vec::new();
    let mut error = None;
    for (name, section) in rules::split_sections(&lines, default_tech) {
        let (entry, section_error) = rules::summarize_section(&name, &section);
        if error.is_none() {
            error = section_error;
        }
        techs.push(entry);
    }

    let (tech_notes, time_spent) = techs
        .first()
        .map(|t| (t.notes.clone(), t.time.clone()))
        .unwrap_or_default();

    ParsedTicket {
        ticket,
        techs,
        tech_notes,
        time_spent,
        status,
        error,
    }
}
