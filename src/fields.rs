use crate::parsing::ParsedTicket;
use crate::sheet::SheetRow;
use serde::{Serialize, Serializer};

pub const SERVICE_TICKET: &str = "SERVICE TICKET";
pub const COMPANY: &str = "COMPANY";
pub const SITE_NAME: &str = "SITE NAME";
pub const REQUESTED_BY: &str = "REQUESTED BY";
pub const SITE_ADDRESS: &str = "SITE ADDRESS";
pub const TICKET_REQUEST: &str = "TICKET REQUESTRow1";
pub const TECH: &str = "TECHRow1";
pub const TECH_NOTES: &str = "TECHNICIAN NOTESRow1";
pub const ADDITIONAL_NOTES: &str = "ADDITIONAL NOTESRow1";
pub const HOURS: &str = "HOURSRow1";
pub const DATE: &str = "DATERow1";

/// Form fields every report carries, in template order.
pub const FIXED_KEYS: [&str; 11] = [
    SERVICE_TICKET,
    COMPANY,
    SITE_NAME,
    REQUESTED_BY,
    SITE_ADDRESS,
    TICKET_REQUEST,
    TECH,
    TECH_NOTES,
    ADDITIONAL_NOTES,
    HOURS,
    DATE,
];

/// Placeholder used when a row has no usable site name.
pub const NO_SITE: &str = "NO_SITE";

/// PDF form field name → value, in insertion order.
///
/// Created with every fixed key present and empty; values are plain strings
/// and never absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMap {
    entries: Vec<(String, String)>,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            entries: FIXED_KEYS
                .iter()
                .map(|k| (k.to_string(), String::new()))
                .collect(),
        }
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `key`, keeping its original position.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    /// Value for `key`, `""` when the key is not present.
    pub fn get(&self, key: &str) -> &str {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rows 2.. for technicians beyond the primary one.
    ///
    /// Hours pair up positionally; a technician without a matching entry
    /// gets empty hours. Notes rows are left blank for the tech to fill in.
    pub fn push_extra_techs<S: AsRef<str>>(&mut self, names: &[S], hours: &[S]) {
        for (i, name) in names.iter().enumerate() {
            let n = i + 2;
            let h = hours.get(i).map(|h| h.as_ref()).unwrap_or("");
            self.set(&format!("TECHRow{n}"), name.as_ref());
            self.set(&format!("TECHNICIAN NOTESRow{n}"), "");
            self.set(&format!("HOURSRow{n}"), h);
        }
    }
}

/// Assemble the report fields from the matched sheet row and, for email
/// submissions, the parsed message.
pub fn build_field_map(
    ticket: &str,
    row: &SheetRow,
    tech_name: &str,
    date: &str,
    parsed: Option<&ParsedTicket>,
) -> FieldMap {
    let mut fields = FieldMap::new();
    let site = row.site();

    fields.set(SERVICE_TICKET, ticket);
    fields.set(COMPANY, site.clone());
    fields.set(SITE_NAME, site);
    fields.set(REQUESTED_BY, row.requestor());
    fields.set(SITE_ADDRESS, row.address());
    fields.set(TICKET_REQUEST, row.problem());
    fields.set(TECH, tech_name);
    fields.set(DATE, date);

    if let Some(parsed) = parsed {
        fields.set(TECH_NOTES, parsed.tech_notes.as_str());
        fields.set(ADDITIONAL_NOTES, parsed.status.as_str());
        fields.set(HOURS, parsed.time_spent.as_str());
    }
    fields
}

/// Filesystem-safe token for the row's site name.
pub fn site_token(row: &SheetRow) -> String {
    let token: String = row
        .site()
        .trim()
        .to_uppercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-')
        .map(|c| if c == ' ' { '_' } else { c })
        .collect();

    if token.is_empty() {
        NO_SITE.to_string()
    } else {
        token
    }
}

/// `"<ticket> - <SITE> - <MM-DD-YY> - PurpleDoc.pdf"`
pub fn report_filename(ticket: &str, site_token: &str, short_date: &str) -> String {
    format!("{ticket} - {site_token} - {short_date} - PurpleDoc.pdf")
}
