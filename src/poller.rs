// src/poller.rs

use crate::BoxError;
use crate::forms::FormSubmission;
use crate::graph::{FormSource, MessageSource};
use crate::mail::Mailer;
use crate::pdf_fill::PdfFiller;
use crate::pipeline::{self, InboundMessage, REPORT_BODY, Report, ReportError};
use crate::sheet::RowCollection;
use crate::smartsheet::SheetSource;
use crate::store::TicketStore;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Static settings for the loop, lifted out of `Config`.
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub template: PathBuf,
    pub output_dir: PathBuf,
    pub default_tech: String,
    pub interval: Duration,
}

/// What one cycle did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    pub reports: usize,
    pub replies: usize,
    pub form_reports: usize,
    pub failures: usize,
}

pub struct Poller {
    messages: Box<dyn MessageSource>,
    sheet: Box<dyn SheetSource>,
    forms: Option<Box<dyn FormSource>>,
    mailer: Box<dyn Mailer>,
    filler: Box<dyn PdfFiller>,
    store: TicketStore,
    rows: RowCollection,
    settings: PollSettings,
}

impl Poller {
    /// Starts from the cached sheet snapshot when the store has one.
    pub fn new(
        messages: Box<dyn MessageSource>,
        sheet: Box<dyn SheetSource>,
        forms: Option<Box<dyn FormSource>>,
        mailer: Box<dyn Mailer>,
        filler: Box<dyn PdfFiller>,
        store: TicketStore,
        settings: PollSettings,
    ) -> Self {
        let rows = match store.load_rows() {
            Ok(Some(rows)) => {
                info!(rows = rows.len(), "Loaded cached ticket sheet");
                rows
            }
            Ok(None) => RowCollection::default(),
            Err(e) => {
                warn!(error = %e, "Could not read sheet cache");
                RowCollection::default()
            }
        };

        Self {
            messages,
            sheet,
            forms,
            mailer,
            filler,
            store,
            rows,
            settings,
        }
    }

    pub fn rows(&self) -> &RowCollection {
        &self.rows
    }

    pub fn store(&self) -> &TicketStore {
        &self.store
    }

    pub async fn run(&mut self) {
        info!(interval_secs = self.settings.interval.as_secs(), "Polling started");
        loop {
            let summary = self.run_cycle().await;
            info!(
                reports = summary.reports,
                replies = summary.replies,
                form_reports = summary.form_reports,
                failures = summary.failures,
                "Cycle complete"
            );
            tokio::time::sleep(self.settings.interval).await;
        }
    }

    /// One pass: refresh the sheet, answer mail, then the online form.
    pub async fn run_cycle(&mut self) -> CycleSummary {
        let mut summary = CycleSummary::default();
        self.refresh_rows().await;
        self.process_messages(&mut summary).await;
        self.process_forms(&mut summary).await;
        summary
    }

    /// Merge the latest sheet into the current one. On failure the previous
    /// collection stays in place.
    pub async fn refresh_rows(&mut self) {
        let latest = match self.sheet.fetch_rows().await {
            Ok(latest) => latest,
            Err(e) => {
                warn!(error = %e, "Sheet refresh failed, keeping previous rows");
                return;
            }
        };

        let merged = if self.rows.is_empty() {
            latest
        } else {
            self.rows.merged_with(&latest)
        };

        if merged.len() != self.rows.len() {
            info!(before = self.rows.len(), after = merged.len(), "Ticket sheet changed");
        }
        if let Err(e) = self.store.save_rows(&merged) {
            warn!(error = %e, "Could not persist sheet cache");
        }
        self.rows = merged;
    }

    async fn process_messages(&self, summary: &mut CycleSummary) {
        let inbox = match self.messages.fetch_unread().await {
            Ok(m) => m,
            Err(e) => {
                error!(error = %e, "Fetching unread messages failed");
                return;
            }
        };

        for msg in inbox {
            if !pipeline::is_report_request(&msg.subject) {
                debug!(id = %msg.id, subject = %msg.subject, "Not a report request");
                continue;
            }
            let span = info_span!("message", id = %msg.id, sender = %msg.sender);
            self.handle_message(&msg, summary).instrument(span).await;
        }
    }

    async fn handle_message(&self, msg: &InboundMessage, summary: &mut CycleSummary) {
        let received = msg.received.format(&Rfc3339).unwrap_or_default();
        let uid = TicketStore::generate_uid(&msg.id, &received, &msg.sender);

        match self.store.is_message_processed(&uid) {
            Ok(true) => {
                info!("Already answered, marking read");
                self.mark_read(&msg.id).await;
                return;
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Processed lookup failed"),
        }

        let outcome = match pipeline::prepare_email_report(
            msg,
            &self.rows.rows,
            &self.settings.default_tech,
        ) {
            Ok(report) => match self.deliver(&report) {
                Ok(()) => {
                    summary.reports += 1;
                    Some(("report", Some(report.ticket)))
                }
                Err(e) => {
                    // Left unread so the next cycle tries again.
                    error!(ticket = %report.ticket, error = %e, "Report delivery failed");
                    summary.failures += 1;
                    None
                }
            },
            Err(reason) => {
                warn!(reason = %reason, "Request rejected");
                match self.reply(&msg.sender, &reason) {
                    Ok(()) => {
                        summary.replies += 1;
                        Some(("rejected", ticket_of(&reason)))
                    }
                    Err(e) => {
                        error!(error = %e, "Error reply failed");
                        summary.failures += 1;
                        None
                    }
                }
            }
        };

        let Some((outcome, ticket)) = outcome else {
            return;
        };
        if let Err(e) = self
            .store
            .mark_message_processed(&uid, &msg.id, ticket.as_deref(), outcome)
        {
            warn!(error = %e, "Could not record processed message");
        }
        self.mark_read(&msg.id).await;
    }

    async fn process_forms(&self, summary: &mut CycleSummary) {
        let Some(forms) = self.forms.as_ref() else {
            return;
        };
        let cells = match forms.fetch_form_rows().await {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "Fetching form rows failed");
                return;
            }
        };

        let today = OffsetDateTime::now_utc().date();
        for row in &cells {
            let form = FormSubmission::from_cells(row);
            if form.id.is_empty() {
                continue;
            }
            match self.store.is_form_row_processed(&form.id) {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    warn!(form_id = %form.id, error = %e, "Processed lookup failed");
                    continue;
                }
            }

            let _span = info_span!("form_row", form_id = %form.id).entered();
            match pipeline::prepare_form_report(&form, &self.rows.rows, today) {
                Ok(report) => match self.deliver(&report) {
                    Ok(()) => {
                        summary.form_reports += 1;
                        if let Err(e) = self.store.mark_form_row_processed(&form.id, &report.ticket) {
                            warn!(error = %e, "Could not record processed form row");
                        }
                    }
                    Err(e) => {
                        error!(ticket = %report.ticket, error = %e, "Form report delivery failed");
                        summary.failures += 1;
                    }
                },
                Err(ReportError::MissingFormTicket) => debug!("Form row has no ticket yet"),
                Err(reason) => info!(reason = %reason, "Form row skipped"),
            }
        }
    }

    /// Fill the template into the output directory and mail it.
    fn deliver(&self, report: &Report) -> Result<(), BoxError> {
        fs::create_dir_all(&self.settings.output_dir)?;
        let output = self.settings.output_dir.join(&report.filename);
        self.filler
            .fill(&self.settings.template, &output, &report.fields)?;
        self.mailer
            .send(&report.recipient, &report.subject(), REPORT_BODY, &[output])?;
        info!(ticket = %report.ticket, to = %report.recipient, file = %report.filename, "Report sent");
        Ok(())
    }

    fn reply(&self, to: &str, reason: &ReportError) -> Result<(), BoxError> {
        self.mailer
            .send(to, &reason.reply_subject(), &reason.reply_body(), &[])
    }

    async fn mark_read(&self, id: &str) {
        if let Err(e) = self.messages.mark_read(id).await {
            warn!(id = %id, error = %e, "Could not mark message read");
        }
    }
}

fn ticket_of(reason: &ReportError) -> Option<String> {
    match reason {
        ReportError::TicketNotInSheet(t) => Some(t.clone()),
        ReportError::TimeFormat { ticket, .. } => ticket.clone(),
        _ => None,
    }
}
