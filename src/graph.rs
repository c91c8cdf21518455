// src/graph.rs
//
// Mailbox and form workbook access over the Microsoft Graph REST API.
// The access token is supplied by configuration.

use crate::BoxError;
use crate::config::{FormsConfig, GraphConfig};
use crate::parsing::BodyType;
use crate::pipeline::InboundMessage;
use crate::sheet::cell_text;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};
use urlencoding::encode;

/// Unread messages in, read flags out.
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn fetch_unread(&self) -> Result<Vec<InboundMessage>, BoxError>;
    async fn mark_read(&self, id: &str) -> Result<(), BoxError>;
}

/// Rows of the online form, one map per submission keyed by lower-cased header.
#[async_trait]
pub trait FormSource: Send + Sync {
    async fn fetch_form_rows(&self) -> Result<Vec<BTreeMap<String, Value>>, BoxError>;
}

#[derive(Debug, Deserialize)]
struct ValueList<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMessage {
    pub id: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<GraphBody>,
    #[serde(default)]
    pub from: Option<GraphRecipient>,
    #[serde(default)]
    pub received_date_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphBody {
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRecipient {
    pub email_address: GraphAddress,
}

#[derive(Debug, Deserialize)]
pub struct GraphAddress {
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Deserialize)]
struct DriveItem {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Worksheet {
    name: String,
}

#[derive(Debug, Deserialize)]
struct UsedRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl GraphMessage {
    /// Boundary conversion; an unreadable timestamp falls back to `now`.
    pub fn into_inbound(self, now: OffsetDateTime) -> InboundMessage {
        let (body, body_type) = match self.body {
            Some(b) => (b.content, BodyType::from_tag(b.content_type.as_deref())),
            None => (String::new(), BodyType::Text),
        };
        let received = self
            .received_date_time
            .as_deref()
            .and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok())
            .unwrap_or(now);

        InboundMessage {
            id: self.id,
            subject: self.subject.unwrap_or_default(),
            body,
            body_type,
            sender: self.from.map(|f| f.email_address.address).unwrap_or_default(),
            received,
        }
    }
}

/// Header row lower-cased; rows without any non-empty cell are skipped.
pub fn rows_from_used_range(values: Vec<Vec<Value>>) -> Vec<BTreeMap<String, Value>> {
    let mut iter = values.into_iter();
    let Some(header) = iter.next() else {
        return Vec::new();
    };
    let header: Vec<String> = header
        .iter()
        .map(|h| cell_text(h).trim().to_lowercase())
        .collect();

    iter.filter(|row| row.iter().any(|c| !cell_text(c).trim().is_empty()))
        .map(|row| header.iter().cloned().zip(row).collect())
        .collect()
}

/// The configured worksheet if present, else the first one.
pub fn pick_worksheet(names: &[String], wanted: &str) -> String {
    if names.iter().any(|n| n == wanted) {
        wanted.to_string()
    } else {
        names.first().cloned().unwrap_or_else(|| wanted.to_string())
    }
}

pub struct GraphClient {
    client: Client,
    base_url: String,
    token: String,
    fetch_limit: u32,
    forms: Option<FormLocation>,
}

struct FormLocation {
    drive_id: String,
    filename: String,
    worksheet: String,
}

impl GraphClient {
    pub fn new(cfg: &GraphConfig, forms: Option<&FormsConfig>) -> Self {
        Self {
            client: Client::new(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            token: cfg.access_token.clone(),
            fetch_limit: cfg.fetch_limit,
            forms: forms.map(|f| FormLocation {
                drive_id: f.drive_id.clone(),
                filename: f.filename.clone(),
                worksheet: f.worksheet.clone(),
            }),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, BoxError> {
        let resp = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("Graph API error {status} for {url}: {body}").into());
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl MessageSource for GraphClient {
    async fn fetch_unread(&self) -> Result<Vec<InboundMessage>, BoxError> {
        let url = format!(
            "{}/me/mailFolders/inbox/messages?$filter={}&$top={}&$select={}",
            self.base_url,
            encode("isRead eq false"),
            self.fetch_limit,
            encode("id,subject,body,from,receivedDateTime"),
        );
        let list: ValueList<GraphMessage> = self.get_json(&url).await?;
        let now = OffsetDateTime::now_utc();
        info!(count = list.value.len(), "Fetched unread messages");
        Ok(list.value.into_iter().map(|m| m.into_inbound(now)).collect())
    }

    async fn mark_read(&self, id: &str) -> Result<(), BoxError> {
        let url = format!("{}/me/messages/{}", self.base_url, encode(id));
        let resp = self
            .client
            .patch(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(&serde_json::json!({ "isRead": true }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("Graph API error {status} marking {id} read: {body}").into());
        }
        Ok(())
    }
}

#[async_trait]
impl FormSource for GraphClient {
    async fn fetch_form_rows(&self) -> Result<Vec<BTreeMap<String, Value>>, BoxError> {
        let Some(form) = &self.forms else {
            return Ok(Vec::new());
        };

        let item_url = format!(
            "{}/drives/{}/root:/{}",
            self.base_url,
            form.drive_id,
            encode(&form.filename)
        );
        let item: DriveItem = self.get_json(&item_url).await?;

        let sheets_url = format!(
            "{}/drives/{}/items/{}/workbook/worksheets",
            self.base_url, form.drive_id, item.id
        );
        let sheets: ValueList<Worksheet> = self.get_json(&sheets_url).await?;
        let names: Vec<String> = sheets.value.into_iter().map(|w| w.name).collect();
        let worksheet = pick_worksheet(&names, &form.worksheet);
        if worksheet != form.worksheet {
            warn!(wanted = %form.worksheet, using = %worksheet, "Worksheet not found, using first sheet");
        }

        let range_url = format!(
            "{}/drives/{}/items/{}/workbook/worksheets('{}')/usedRange",
            self.base_url,
            form.drive_id,
            item.id,
            encode(&worksheet)
        );
        let range: UsedRange = self.get_json(&range_url).await?;
        let rows = rows_from_used_range(range.values);
        info!(count = rows.len(), worksheet = %worksheet, "Fetched form rows");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn test_graph_message_conversion() {
        let raw = json!({
            "id": "AAMk1",
            "subject": "PD",
            "body": {"contentType": "html", "content": "<p>Ticket 123456</p>"},
            "from": {"emailAddress": {"name": "John", "address": "john.doe@example.com"}},
            "receivedDateTime": "2025-03-04T15:30:00Z"
        });
        let msg: GraphMessage = serde_json::from_value(raw).unwrap();
        let inbound = msg.into_inbound(datetime!(2000-01-01 0:00 UTC));

        assert_eq!(inbound.id, "AAMk1");
        assert_eq!(inbound.subject, "PD");
        assert_eq!(inbound.body_type, BodyType::Html);
        assert_eq!(inbound.sender, "john.doe@example.com");
        assert_eq!(inbound.received, datetime!(2025-03-04 15:30 UTC));
    }

    #[test]
    fn test_sparse_graph_message() {
        let msg: GraphMessage = serde_json::from_value(json!({"id": "x"})).unwrap();
        let now = datetime!(2026-10-18 9:00 UTC);
        let inbound = msg.into_inbound(now);
        assert_eq!(inbound.body, "");
        assert_eq!(inbound.body_type, BodyType::Text);
        assert_eq!(inbound.sender, "");
        assert_eq!(inbound.received, now);
    }

    #[test]
    fn test_used_range_rows() {
        let values = vec![
            vec![json!("ID"), json!(" Ticket Number "), json!("Name")],
            vec![json!(1), json!(123456), json!("Ann")],
            vec![json!(""), json!(""), json!("")],
            vec![json!(2), json!("654321"), json!(null)],
        ];
        let rows = rows_from_used_range(values);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], json!(1));
        assert_eq!(rows[0]["ticket number"], json!(123456));
        assert_eq!(rows[1]["name"], Value::Null);
        assert!(rows_from_used_range(vec![vec![json!("id")]]).is_empty());
        assert!(rows_from_used_range(Vec::new()).is_empty());
    }

    #[test]
    fn test_pick_worksheet() {
        let names = vec!["Form1".to_string(), "Sheet1".to_string()];
        assert_eq!(pick_worksheet(&names, "Sheet1"), "Sheet1");
        assert_eq!(pick_worksheet(&names, "Missing"), "Form1");
        assert_eq!(pick_worksheet(&[], "Sheet1"), "Sheet1");
    }
}
