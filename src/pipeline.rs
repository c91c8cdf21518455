use crate::fields::{self, FieldMap};
use crate::forms::{FormSubmission, LONG_DATE, SHORT_DATE};
use crate::parsing::{self, BodyType};
use crate::sheet::{SheetRow, find_ticket};
use thiserror::Error;
use time::{Date, OffsetDateTime};
use tracing::{debug, info};

/// Subject line that marks a message as a report request.
pub const REQUEST_SUBJECT: &str = "pd";

pub const REPORT_BODY: &str = "Here is your pre-filled Purple Doc form. Please complete any remaining fields and return it as needed.";

/// What the mailbox hands us for one message.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: String,
    pub subject: String,
    pub body: String,
    pub body_type: BodyType,
    pub sender: String,
    pub received: OffsetDateTime,
}

/// Reasons a submission does not produce a report.
///
/// None of these are retried; the sender is told what went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    #[error("no ticket number found in message")]
    NoTicketFound,
    #[error("ticket {0} not found in sheet")]
    TicketNotInSheet(String),
    #[error("{message}")]
    TimeFormat {
        ticket: Option<String>,
        message: String,
    },
    #[error("form row has no ticket number")]
    MissingFormTicket,
}

impl ReportError {
    pub fn reply_subject(&self) -> String {
        match self {
            ReportError::TicketNotInSheet(t) => format!("Ticket {t} Not Found"),
            ReportError::TimeFormat {
                ticket: Some(t), ..
            } => format!("Issue Processing Ticket {t}"),
            _ => "Issue Processing Ticket".to_string(),
        }
    }

    pub fn reply_body(&self) -> String {
        match self {
            ReportError::NoTicketFound => "No ticket number was found in your message.".to_string(),
            ReportError::TicketNotInSheet(t) => format!("Ticket #{t} not found in Smartsheet."),
            ReportError::TimeFormat { message, .. } => message.clone(),
            ReportError::MissingFormTicket => "No ticket number was found in your form.".to_string(),
        }
    }
}

/// A filled-in report ready for the PDF filler and the mailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub recipient: String,
    pub ticket: String,
    pub fields: FieldMap,
    pub filename: String,
}

impl Report {
    pub fn subject(&self) -> String {
        format!("Purple Doc Report for Ticket #{}", self.ticket)
    }
}

pub fn is_report_request(subject: &str) -> bool {
    subject.trim().eq_ignore_ascii_case(REQUEST_SUBJECT)
}

/// `john.doe@example.com` → `John Doe`.
pub fn sender_display_name(address: &str) -> String {
    let local = address.split('@').next().unwrap_or_default();
    local
        .replace('.', " ")
        .split(' ')
        .map(title_case)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Email pipeline: clean body → parse → match → fields.
pub fn prepare_email_report(
    msg: &InboundMessage,
    rows: &[SheetRow],
    default_tech: &str,
) -> Result<Report, ReportError> {
    let body = parsing::clean_body(&msg.body, msg.body_type);
    debug!(id = %msg.id, body = %body, "Cleaned message body");

    let parsed = parsing::parse_ticket(&body, default_tech);

    if let Some(message) = parsed.error.clone() {
        return Err(ReportError::TimeFormat {
            ticket: parsed.ticket.clone(),
            message,
        });
    }
    let Some(ticket) = parsed.ticket.clone() else {
        return Err(ReportError::NoTicketFound);
    };
    let row = find_ticket(&ticket, rows).ok_or_else(|| ReportError::TicketNotInSheet(ticket.clone()))?;

    let date = msg.received.date();
    let fields = fields::build_field_map(
        &ticket,
        row,
        &sender_display_name(&msg.sender),
        &format_date(date, LONG_DATE),
        Some(&parsed),
    );
    let filename = fields::report_filename(
        &ticket,
        &fields::site_token(row),
        &format_date(date, SHORT_DATE),
    );

    info!(
        ticket = %ticket,
        techs = parsed.techs.len(),
        status = %parsed.status,
        hours = %parsed.time_spent,
        "Prepared email report"
    );

    Ok(Report {
        recipient: msg.sender.clone(),
        ticket,
        fields,
        filename,
    })
}

/// Form pipeline: the row is already structured, so parsing is skipped.
pub fn prepare_form_report(
    form: &FormSubmission,
    rows: &[SheetRow],
    today: Date,
) -> Result<Report, ReportError> {
    let ticket = form
        .ticket_number
        .strip_suffix(".0")
        .unwrap_or(&form.ticket_number)
        .to_string();
    if ticket.is_empty() {
        return Err(ReportError::MissingFormTicket);
    }
    let row = find_ticket(&ticket, rows).ok_or_else(|| ReportError::TicketNotInSheet(ticket.clone()))?;

    let date = form.report_date(today);
    let mut fields = fields::build_field_map(&ticket, row, &form.name, &date.long(), None);
    fields.set(fields::TECH_NOTES, form.work_done.as_str());
    fields.set(fields::HOURS, form.time_spent.as_str());
    fields.set(fields::ADDITIONAL_NOTES, form.report_status());
    fields.push_extra_techs(&form.extra_tech_names(), &form.extra_tech_hours());

    let filename = fields::report_filename(&ticket, &fields::site_token(row), &date.short());

    info!(ticket = %ticket, form_id = %form.id, "Prepared form report");

    Ok(Report {
        recipient: form.email.clone(),
        ticket,
        fields,
        filename,
    })
}

fn format_date(date: Date, format: &[time::format_description::FormatItem<'_>]) -> String {
    date.format(format).unwrap_or_default()
}
