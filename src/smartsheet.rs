// src/smartsheet.rs

use crate::BoxError;
use crate::config::SmartsheetConfig;
use crate::sheet::{RowCollection, SheetRow};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use time::OffsetDateTime;
use tracing::info;

/// Where the ticket sheet comes from.
#[async_trait]
pub trait SheetSource: Send + Sync {
    async fn fetch_rows(&self) -> Result<RowCollection, BoxError>;
}

#[derive(Debug, Deserialize)]
pub struct SheetResponse {
    #[serde(default)]
    pub columns: Vec<SheetColumn>,
    #[serde(default)]
    pub rows: Vec<SheetRowResponse>,
}

#[derive(Debug, Deserialize)]
pub struct SheetColumn {
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct SheetRowResponse {
    pub id: i64,
    #[serde(default)]
    pub cells: Vec<SheetCell>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetCell {
    pub column_id: i64,
    #[serde(default)]
    pub value: Option<Value>,
}

/// Turn the API's column-id keyed cells into rows keyed by lower-cased title.
pub fn rows_from_sheet(sheet: SheetResponse, fetched_at: i64) -> RowCollection {
    let titles: HashMap<i64, String> = sheet
        .columns
        .iter()
        .map(|c| (c.id, c.title.trim().to_lowercase()))
        .collect();

    let rows = sheet
        .rows
        .into_iter()
        .map(|r| {
            let mut row = SheetRow::new(Some(r.id));
            for cell in r.cells {
                if let Some(title) = titles.get(&cell.column_id) {
                    row.insert(title, cell.value.unwrap_or(Value::Null));
                }
            }
            row
        })
        .collect();

    let columns = sheet
        .columns
        .into_iter()
        .map(|c| c.title.trim().to_lowercase())
        .collect();

    RowCollection::new(columns, rows, fetched_at)
}

pub struct SmartsheetClient {
    client: Client,
    base_url: String,
    token: String,
    sheet_id: i64,
}

impl SmartsheetClient {
    pub fn new(cfg: &SmartsheetConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            token: cfg.token.clone(),
            sheet_id: cfg.sheet_id,
        }
    }
}

#[async_trait]
impl SheetSource for SmartsheetClient {
    async fn fetch_rows(&self) -> Result<RowCollection, BoxError> {
        let url = format!("{}/sheets/{}", self.base_url, self.sheet_id);
        info!(sheet_id = self.sheet_id, "Fetching ticket sheet");

        let resp = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("Smartsheet API error {status}: {body}").into());
        }

        let sheet: SheetResponse = resp.json().await?;
        let rows = rows_from_sheet(sheet, OffsetDateTime::now_utc().unix_timestamp());
        info!(rows = rows.len(), columns = rows.columns.len(), "Ticket sheet fetched");
        Ok(rows)
    }
}
