use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\W+").expect("valid non-word regex"));

/// Column that carries the ticket identifier in both the ticket sheet and the form.
pub const TICKET_COLUMN: &str = "ticket number";

/// Render a spreadsheet cell the way it reads in the sheet.
///
/// Numbers keep their JSON rendering, so a float-coerced ticket comes
/// through as `"123456.0"` and is undone by [`normalize_ticket`].
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// One row of the ticket sheet, keyed by lower-cased column title.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SheetRow {
    #[serde(rename = "_row_id")]
    pub row_id: Option<i64>,
    pub cells: BTreeMap<String, Value>,
}

impl SheetRow {
    pub fn new(row_id: Option<i64>) -> Self {
        Self {
            row_id,
            cells: BTreeMap::new(),
        }
    }

    /// Builder-style insert; the column title is lower-cased and trimmed.
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: impl Into<Value>) {
        self.cells
            .insert(column.trim().to_lowercase(), value.into());
    }

    /// Cell text for `column`; a missing column or null cell is `""`.
    pub fn text(&self, column: &str) -> String {
        self.cells.get(column).map(cell_text).unwrap_or_default()
    }

    pub fn ticket_number(&self) -> String {
        self.text(TICKET_COLUMN)
    }

    pub fn site(&self) -> String {
        self.text("site")
    }

    pub fn requestor(&self) -> String {
        self.text("requestor")
    }

    pub fn address(&self) -> String {
        self.text("address")
    }

    pub fn problem(&self) -> String {
        self.text("problem")
    }
}

/// A snapshot of the ticket sheet.
///
/// Owned by the caller and passed by reference to lookups. A refresh builds a
/// new collection with [`RowCollection::merged_with`]; nothing here mutates a
/// collection in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowCollection {
    pub columns: Vec<String>,
    pub rows: Vec<SheetRow>,
    /// Unix seconds of the fetch that produced this snapshot.
    pub fetched_at: i64,
}

impl RowCollection {
    pub fn new(columns: Vec<String>, rows: Vec<SheetRow>, fetched_at: i64) -> Self {
        Self {
            columns,
            rows,
            fetched_at,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn find(&self, ticket: &str) -> Option<&SheetRow> {
        find_ticket(ticket, &self.rows)
    }

    /// Cached rows in their existing order, followed by rows of `latest`
    /// whose `_row_id` has not been seen. Columns and timestamp come from
    /// `latest`.
    pub fn merged_with(&self, latest: &RowCollection) -> RowCollection {
        let known: HashSet<Option<i64>> = self.rows.iter().map(|r| r.row_id).collect();
        let mut rows = self.rows.clone();
        rows.extend(
            latest
                .rows
                .iter()
                .filter(|r| !known.contains(&r.row_id))
                .cloned(),
        );
        RowCollection {
            columns: latest.columns.clone(),
            rows,
            fetched_at: latest.fetched_at,
        }
    }
}

/// Reduce a ticket identifier to lower-case word characters.
///
/// A single trailing `.0` left by spreadsheet float coercion is removed
/// before punctuation is stripped.
pub fn normalize_ticket(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let unfloated = lowered.strip_suffix(".0").unwrap_or(&lowered);
    NON_WORD.replace_all(unfloated, "").into_owned()
}

/// First row, in collection order, whose ticket normalizes to the same value
/// as `query`. An empty query matches nothing.
pub fn find_ticket<'a>(query: &str, rows: &'a [SheetRow]) -> Option<&'a SheetRow> {
    let target = normalize_ticket(query);
    if target.is_empty() {
        return None;
    }
    rows.iter()
        .find(|row| normalize_ticket(&row.ticket_number()) == target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn row(id: i64, ticket: Value) -> SheetRow {
        SheetRow::new(Some(id)).with("Ticket Number", ticket)
    }

    #[test]
    fn test_normalize_ticket_forms() {
        assert_eq!(normalize_ticket("123456.0"), "123456");
        assert_eq!(normalize_ticket(" 123456 "), "123456");
        assert_eq!(normalize_ticket("TK-123456"), "tk123456");
        assert_eq!(normalize_ticket("TK-123,456"), normalize_ticket("tk123456"));
        assert_eq!(normalize_ticket("123456.00"), "12345600");
        assert_eq!(normalize_ticket(""), "");
    }

    #[test]
    fn test_float_suffixed_row_matches_first() {
        let rows = vec![row(1, json!("55.0")), row(2, json!("99"))];
        let found = find_ticket("55", &rows).unwrap();
        assert_eq!(found.row_id, Some(1));
    }

    #[test]
    fn test_numeric_cells_match() {
        let rows = vec![row(1, json!(123456.0)), row(2, json!(654321))];
        assert_eq!(cell_text(&json!(123456.0)), "123456.0");
        assert_eq!(find_ticket("123456", &rows).unwrap().row_id, Some(1));
        assert_eq!(find_ticket("654321", &rows).unwrap().row_id, Some(2));
    }

    #[test]
    fn test_first_duplicate_wins() {
        let rows = vec![row(7, json!("100200")), row(8, json!("100200"))];
        assert_eq!(find_ticket("100200", &rows).unwrap().row_id, Some(7));
    }

    #[test]
    fn test_not_found_and_empty_query() {
        let rows = vec![row(1, json!("123456")), SheetRow::new(Some(2))];
        assert!(find_ticket("999999", &rows).is_none());
        assert!(find_ticket("  ", &rows).is_none());
    }

    #[test]
    fn test_missing_columns_read_as_empty() {
        let r = SheetRow::new(None).with("site", Value::Null);
        assert_eq!(r.site(), "");
        assert_eq!(r.requestor(), "");
        assert_eq!(r.ticket_number(), "");
    }

    #[test]
    fn test_merge_appends_only_new_rows() {
        let cached = RowCollection::new(
            vec!["ticket number".into()],
            vec![row(1, json!("111111")), row(2, json!("222222"))],
            10,
        );
        let latest = RowCollection::new(
            vec!["ticket number".into(), "site".into()],
            vec![row(2, json!("222222-edited")), row(3, json!("333333"))],
            20,
        );

        let merged = cached.merged_with(&latest);

        let ids: Vec<_> = merged.rows.iter().map(|r| r.row_id).collect();
        assert_eq!(ids, vec![Some(1), Some(2), Some(3)]);
        assert_eq!(merged.rows[1].ticket_number(), "222222");
        assert_eq!(merged.columns.len(), 2);
        assert_eq!(merged.fetched_at, 20);
        assert_eq!(cached.len(), 2);
    }
}
