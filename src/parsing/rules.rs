// src/parsing/rules.rs
//
// Each rule is a pure function over already-normalized lines so it can be
// exercised on its own.

use super::{Status, TechEntry, TimeFormatError};
use regex::Regex;
use std::sync::LazyLock;

static LINE_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:service|update|note)[ \t]*[:\-][ \t]*")
        .expect("valid line prefix regex")
});

static SIX_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{6}").expect("valid six digit regex"));

static STANDALONE_SIX_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{6}\b").expect("valid standalone ticket regex"));

static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@([A-Za-z\s.]+)").expect("valid mention regex"));

// H:MM is tried before the decimal form so "time 2:30" is not read as "2".
static TIME_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\btime\s*[:\-]?\s*(\d{1,2}:\d{2}|\d+(?:\.\d+)?)")
        .expect("valid time keyword regex")
});

static BARE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{1,2}:\d{2}|\d+(?:\.\d+)?)\s*$").expect("valid bare time regex")
});

/// Remove leading `service:`, `update:` and `note:` labels from every line.
pub fn strip_line_prefixes(text: &str) -> String {
    LINE_PREFIX.replace_all(text, "").into_owned()
}

/// Non-empty trimmed lines.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

/// All lines joined by spaces and lower-cased, for whole-message keyword search.
pub fn flatten(lines: &[&str]) -> String {
    lines.join(" ").to_lowercase()
}

/// A line mentioning "ticket" with a six digit run wins; otherwise the first
/// standalone six digit number anywhere in the message.
pub fn find_ticket_number(lines: &[&str], flattened: &str) -> Option<String> {
    lines
        .iter()
        .filter(|line| line.to_lowercase().contains("ticket"))
        .find_map(|line| SIX_DIGITS.find(line))
        .or_else(|| STANDALONE_SIX_DIGITS.find(flattened))
        .map(|m| m.as_str().to_string())
}

/// "close" anywhere beats "ongoing"; neither means ongoing.
pub fn detect_status(flattened: &str) -> Status {
    let flattened = flattened.to_lowercase();
    if flattened.contains("close") {
        Status::Close
    } else {
        Status::Ongoing
    }
}

/// Technician name from an `@Name` marker line.
pub fn mention(line: &str) -> Option<&str> {
    MENTION
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
}

/// Group lines under the technician marker that precedes them.
///
/// Lines before the first marker form the message header. They belong to
/// `default_tech` only when the message has no markers at all; otherwise they
/// are not attributed to anyone. A marker line is consumed and opens its
/// section even when nothing follows it. Repeated markers for the same name
/// continue the existing section.
pub fn split_sections<'a>(lines: &[&'a str], default_tech: &str) -> Vec<(String, Vec<&'a str>)> {
    let mut header: Vec<&'a str> = Vec::new();
    let mut sections: Vec<(String, Vec<&'a str>)> = Vec::new();
    let mut current: Option<usize> = None;

    for &line in lines {
        if let Some(name) = mention(line) {
            let idx = match sections.iter().position(|(n, _)| n == name) {
                Some(idx) => idx,
                None => {
                    sections.push((name.to_string(), Vec::new()));
                    sections.len() - 1
                }
            };
            current = Some(idx);
            continue;
        }
        match current {
            Some(idx) => sections[idx].1.push(line),
            None => header.push(line),
        }
    }

    if sections.is_empty() {
        sections.push((default_tech.to_string(), header));
    }
    sections
}

/// The raw time token on a line, if the line reads as a time entry.
pub fn time_token(line: &str) -> Option<&str> {
    TIME_KEYWORD
        .captures(line)
        .or_else(|| BARE_TIME.captures(line))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// `H:MM` becomes decimal hours; decimals are printed with two places.
pub fn format_hours(raw: &str) -> Result<String, TimeFormatError> {
    let invalid = || TimeFormatError {
        raw: raw.to_string(),
    };

    let hours = match raw.split_once(':') {
        Some((h, m)) => {
            let h: u32 = h.trim().parse().map_err(|_| invalid())?;
            let m: u32 = m.trim().parse().map_err(|_| invalid())?;
            let decimal = f64::from(h) + f64::from(m) / 60.0;
            (decimal * 100.0).round() / 100.0
        }
        None => raw.trim().parse::<f64>().map_err(|_| invalid())?,
    };

    if !hours.is_finite() {
        return Err(invalid());
    }
    Ok(format!("{hours:.2}"))
}

/// Notes and time for one technician section.
///
/// The first time line sets the hours; every time line is left out of the
/// notes. A token that fails conversion yields an error message and leaves
/// the time empty.
pub fn summarize_section(name: &str, lines: &[&str]) -> (TechEntry, Option<String>) {
    let mut notes = Vec::new();
    let mut time: Option<String> = None;
    let mut error = None;

    for &line in lines {
        let Some(raw) = time_token(line) else {
            notes.push(line);
            continue;
        };
        if time.is_some() || error.is_some() {
            continue;
        }
        match format_hours(raw) {
            Ok(hours) => time = Some(hours),
            Err(e) => error = Some(format!("{e} for tech {name}")),
        }
    }

    let entry = TechEntry {
        name: name.to_string(),
        notes: notes.join("\n").trim().to_string(),
        time: time.unwrap_or_default(),
    };
    (entry, error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_prefixes_removed_case_insensitive() {
        let text = "SERVICE: swapped fan\nUpdate - waiting on parts\nnote:1.5\nServiced router";
        assert_eq!(
            strip_line_prefixes(text),
            "swapped fan\nwaiting on parts\n1.5\nServiced router"
        );
    }

    #[test]
    fn test_ticket_line_wins_over_earlier_number() {
        let lines = vec!["PO 654321 received", "Ticket #123456 done"];
        let flat = flatten(&lines);
        assert_eq!(find_ticket_number(&lines, &flat).as_deref(), Some("123456"));
    }

    #[test]
    fn test_ticket_line_accepts_embedded_run() {
        let lines = vec!["ticket TK1234567"];
        let flat = flatten(&lines);
        assert_eq!(find_ticket_number(&lines, &flat).as_deref(), Some("123456"));
    }

    #[test]
    fn test_ticket_fallback_needs_word_boundaries() {
        let lines = vec!["called 5551234567", "work for 246810 done"];
        let flat = flatten(&lines);
        assert_eq!(find_ticket_number(&lines, &flat).as_deref(), Some("246810"));
    }

    #[test]
    fn test_no_ticket() {
        let lines = vec!["ticket pending", "12345"];
        let flat = flatten(&lines);
        assert_eq!(find_ticket_number(&lines, &flat), None);
        assert_eq!(find_ticket_number(&[], ""), None);
    }

    #[test]
    fn test_status_priority() {
        assert_eq!(detect_status("still ongoing"), Status::Ongoing);
        assert_eq!(detect_status("nothing to report"), Status::Ongoing);
        assert_eq!(detect_status("ongoing until now, ticket closed"), Status::Close);
        assert_eq!(detect_status("please CLOSE"), Status::Close);
    }

    #[test]
    fn test_mention() {
        assert_eq!(mention("@Alice"), Some("Alice"));
        assert_eq!(mention("@Mary J. Smith "), Some("Mary J. Smith"));
        assert_eq!(mention("@bob: on site"), Some("bob"));
        assert_eq!(mention("cc @Alice"), None);
        assert_eq!(mention("@123"), None);
    }

    #[test]
    fn test_sections_without_markers_use_default() {
        let lines = vec!["Ticket 123456", "fixed it"];
        let sections = split_sections(&lines, "Unknown");
        assert_eq!(
            sections,
            vec![("Unknown".to_string(), vec!["Ticket 123456", "fixed it"])]
        );
    }

    #[test]
    fn test_sections_keep_first_appearance_order() {
        let lines = vec!["Ticket 123456", "@Bob", "a", "@Alice", "b", "@Bob", "c", "@Carol"];
        let sections = split_sections(&lines, "Unknown");
        assert_eq!(
            sections,
            vec![
                ("Bob".to_string(), vec!["a", "c"]),
                ("Alice".to_string(), vec!["b"]),
                ("Carol".to_string(), vec![]),
            ]
        );
    }

    #[test]
    fn test_empty_message_has_default_section() {
        let sections = split_sections(&[], "Unknown");
        assert_eq!(sections, vec![("Unknown".to_string(), vec![])]);
    }

    #[test]
    fn test_time_token_forms() {
        assert_eq!(time_token("Time: 1.5"), Some("1.5"));
        assert_eq!(time_token("time - 2:30 on site"), Some("2:30"));
        assert_eq!(time_token("TIME 3"), Some("3"));
        assert_eq!(time_token(" 2:30 "), Some("2:30"));
        assert_eq!(time_token("4"), Some("4"));
        assert_eq!(time_token("spent 4 hours"), None);
        assert_eq!(time_token("overtime"), None);
    }

    #[test]
    fn test_format_hours() {
        assert_eq!(format_hours("1.5").unwrap(), "1.50");
        assert_eq!(format_hours("2:30").unwrap(), "2.50");
        assert_eq!(format_hours("0:20").unwrap(), "0.33");
        assert_eq!(format_hours("1:05").unwrap(), "1.08");
        assert_eq!(format_hours("3").unwrap(), "3.00");
    }

    #[test]
    fn test_format_hours_rejects_garbage() {
        let err = format_hours("1:xx").unwrap_err();
        assert_eq!(err.raw, "1:xx");
    }

    #[test]
    fn test_first_time_line_wins() {
        let lines = vec!["2:30", "replaced switch", "Time: 1.5"];
        let (entry, error) = summarize_section("Alice", &lines);
        assert_eq!(entry.time, "2.50");
        assert_eq!(entry.notes, "replaced switch");
        assert_eq!(error, None);
    }

    #[test]
    fn test_keyword_line_before_bare_line() {
        let lines = vec!["time: 1", "3:15"];
        let (entry, _) = summarize_section("Bob", &lines);
        assert_eq!(entry.time, "1.00");
        assert_eq!(entry.notes, "");
    }
}
