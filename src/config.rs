use crate::BoxError;
use serde::Deserialize;
use std::{fs, path::Path};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub graph: GraphConfig,
    pub smartsheet: SmartsheetConfig,
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub forms: Option<FormsConfig>,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_pdf_template")]
    pub pdf_template: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_tech_name")]
    pub default_tech_name: String,
}

fn default_db_path() -> String {
    "purpledoc/state.db".to_string()
}

fn default_pdf_template() -> String {
    "000000 - Template.pdf".to_string()
}

fn default_output_dir() -> String {
    "reports".to_string()
}

fn default_poll_interval() -> u64 {
    30
}

fn default_tech_name() -> String {
    "Unknown".to_string()
}

/// Microsoft Graph access for the shared mailbox. Token acquisition happens
/// outside this program.
#[derive(Debug, Deserialize)]
pub struct GraphConfig {
    pub access_token: String,
    #[serde(default = "default_graph_url")]
    pub base_url: String,
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: u32,
}

fn default_graph_url() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

fn default_fetch_limit() -> u32 {
    20
}

#[derive(Debug, Deserialize)]
pub struct SmartsheetConfig {
    pub token: String,
    pub sheet_id: i64,
    #[serde(default = "default_smartsheet_url")]
    pub base_url: String,
}

fn default_smartsheet_url() -> String {
    "https://api.smartsheet.com/2.0".to_string()
}

#[derive(Debug, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_server")]
    pub server: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Sender address; the login name is used when absent.
    #[serde(default)]
    pub from: Option<String>,
}

fn default_smtp_server() -> String {
    "smtp.office365.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

/// Online form workbook on OneDrive. Form processing is off without it.
#[derive(Debug, Deserialize)]
pub struct FormsConfig {
    pub drive_id: String,
    #[serde(default = "default_form_file")]
    pub filename: String,
    #[serde(default = "default_worksheet")]
    pub worksheet: String,
}

fn default_form_file() -> String {
    "Purple Doc _Online Form.xlsx".to_string()
}

fn default_worksheet() -> String {
    "Sheet1".to_string()
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BoxError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, BoxError> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [graph]
        access_token = "abc"

        [smartsheet]
        token = "ss"
        sheet_id = 4242

        [smtp]
        username = "bot@example.com"
        password = "pw"
    "#;

    #[test]
    fn test_defaults_fill_in() {
        let cfg = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(cfg.db_path, "purpledoc/state.db");
        assert_eq!(cfg.pdf_template, "000000 - Template.pdf");
        assert_eq!(cfg.poll_interval_secs, 30);
        assert_eq!(cfg.default_tech_name, "Unknown");
        assert_eq!(cfg.graph.base_url, "https://graph.microsoft.com/v1.0");
        assert_eq!(cfg.graph.fetch_limit, 20);
        assert_eq!(cfg.smartsheet.sheet_id, 4242);
        assert_eq!(cfg.smtp.server, "smtp.office365.com");
        assert_eq!(cfg.smtp.port, 587);
        assert!(cfg.forms.is_none());
    }

    #[test]
    fn test_forms_section() {
        let content = format!("{MINIMAL}\n[forms]\ndrive_id = \"b!xyz\"\n");
        let cfg = Config::from_toml(&content).unwrap();
        let forms = cfg.forms.unwrap();
        assert_eq!(forms.drive_id, "b!xyz");
        assert_eq!(forms.filename, "Purple Doc _Online Form.xlsx");
        assert_eq!(forms.worksheet, "Sheet1");
    }

    #[test]
    fn test_missing_section_is_error() {
        assert!(Config::from_toml("[graph]\naccess_token = \"x\"\n").is_err());
    }
}
