use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

pub const NO_SUBJECT: &str = "No Subject";
pub const UNKNOWN_SENDER: &str = "Unknown Sender";
pub const NO_CONTENT: &str = "No content available";
pub const DATE_UNKNOWN: &str = "Date unknown";

const GMAIL_INBOX_URL: &str = "https://mail.google.com/mail/u/0/#inbox/";
const STAGGER: Duration = Duration::from_millis(100);

/// An email the backend used to answer, in the backend's relevance order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SourceEmail {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub subject: String,
    pub sender: String,
    pub date: String,
    pub body: String,
    pub message_id: Option<String>,
    pub reveal_delay: Duration,
}

impl SourceEntry {
    fn from_source(index: usize, source: &SourceEmail) -> Self {
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());

        SourceEntry {
            subject: non_empty(&source.subject).unwrap_or_else(|| NO_SUBJECT.to_string()),
            sender: non_empty(&source.sender).unwrap_or_else(|| UNKNOWN_SENDER.to_string()),
            date: source
                .date
                .as_deref()
                .map(format_date)
                .unwrap_or_else(|| DATE_UNKNOWN.to_string()),
            body: non_empty(&source.body)
                .or_else(|| non_empty(&source.snippet))
                .unwrap_or_else(|| NO_CONTENT.to_string()),
            message_id: non_empty(&source.message_id),
            reveal_delay: STAGGER * index as u32,
        }
    }

    /// Gmail web deep link for this message, if the backend sent an id.
    pub fn link(&self) -> Option<String> {
        self.message_id
            .as_ref()
            .map(|id| format!("{}{}", GMAIL_INBOX_URL, id))
    }

    pub fn is_revealed(&self, shown_for: Duration) -> bool {
        shown_for >= self.reveal_delay
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePanel {
    pub header: String,
    pub entries: Vec<SourceEntry>,
}

impl SourcePanel {
    pub fn render(sources: &[SourceEmail]) -> Self {
        SourcePanel {
            header: format!("Related Emails ({} found)", sources.len()),
            entries: sources
                .iter()
                .enumerate()
                .map(|(i, s)| SourceEntry::from_source(i, s))
                .collect(),
        }
    }
}

/// Open the entry in the browser. Entries without an id do nothing.
pub fn open_in_gmail(entry: &SourceEntry) -> Result<()> {
    if let Some(url) = entry.link() {
        open::that(&url).with_context(|| format!("Failed to open {}", url))?;
    }
    Ok(())
}

fn strip_zone_comment(raw: &str) -> &str {
    // "Tue, 1 Jul 2025 10:00:00 -0700 (PDT)"
    match raw.rfind(" (") {
        Some(pos) if raw.ends_with(')') => &raw[..pos],
        _ => raw,
    }
}

/// Drops a leading `Ddd, ` so a wrong weekday does not reject the date.
fn strip_weekday(raw: &str) -> &str {
    match raw.split_once(", ") {
        Some((day, rest)) if day.len() == 3 && day.chars().all(|c| c.is_ascii_alphabetic()) => rest,
        _ => raw,
    }
}

fn parse_header_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let header = strip_zone_comment(raw);
    if let Ok(dt) = DateTime::parse_from_rfc2822(header) {
        return Some(dt);
    }

    let header = strip_weekday(header);
    if let Ok(dt) = DateTime::parse_from_rfc2822(header) {
        return Some(dt);
    }
    // Loose senders write single-digit hours or drop the seconds.
    ["%e %b %Y %k:%M:%S %z", "%e %b %Y %k:%M %z"]
        .into_iter()
        .find_map(|fmt| DateTime::parse_from_str(header, fmt).ok())
}

fn parse_date(raw: &str) -> Option<DateTime<Local>> {
    let raw = raw.trim();

    if let Some(dt) = parse_header_date(raw) {
        return Some(dt.with_timezone(&Local));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local));
    }

    // Date-times without an offset are wall-clock local time.
    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Local.from_local_datetime(&naive).earliest();
        }
    }

    // A bare date is midnight UTC.
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        return Some(Utc.from_utc_datetime(&midnight).with_timezone(&Local));
    }

    None
}

/// `Jul 1, 2025, 2:05 PM` for anything parseable, the raw text otherwise.
pub fn format_date(raw: &str) -> String {
    if raw.trim().is_empty() || raw == "Unknown Date" {
        return DATE_UNKNOWN.to_string();
    }
    match parse_date(raw) {
        Some(dt) => dt.format("%b %-d, %Y, %-I:%M %p").to_string(),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(subject: Option<&str>, id: Option<&str>) -> SourceEmail {
        SourceEmail {
            subject: subject.map(String::from),
            message_id: id.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_order_and_placeholders() {
        let sources = vec![
            SourceEmail {
                message_id: Some("18f0a".into()),
                subject: Some("Invoice #4411".into()),
                sender: Some("billing@acme.io".into()),
                date: Some("2025-07-01T14:05:00".into()),
                body: Some("Your invoice is attached.".into()),
                snippet: Some("Your invoice...".into()),
            },
            source(None, None),
            SourceEmail {
                subject: Some("Lunch?".into()),
                snippet: Some("Are you free at noon".into()),
                ..Default::default()
            },
        ];

        let panel = SourcePanel::render(&sources);
        assert_eq!(panel.header, "Related Emails (3 found)");
        assert_eq!(panel.entries.len(), 3);

        let first = &panel.entries[0];
        assert_eq!(first.subject, "Invoice #4411");
        assert_eq!(first.sender, "billing@acme.io");
        assert_eq!(first.date, "Jul 1, 2025, 2:05 PM");
        assert_eq!(first.body, "Your invoice is attached.");

        let second = &panel.entries[1];
        assert_eq!(second.subject, NO_SUBJECT);
        assert_eq!(second.sender, UNKNOWN_SENDER);
        assert_eq!(second.date, DATE_UNKNOWN);
        assert_eq!(second.body, NO_CONTENT);

        let third = &panel.entries[2];
        assert_eq!(third.subject, "Lunch?");
        assert_eq!(third.body, "Are you free at noon");
    }

    #[test]
    fn test_reveal_stagger() {
        let sources = vec![SourceEmail::default(); 3];
        let panel = SourcePanel::render(&sources);
        let delays: Vec<_> = panel.entries.iter().map(|e| e.reveal_delay).collect();
        assert_eq!(
            delays,
            vec![Duration::ZERO, Duration::from_millis(100), Duration::from_millis(200)]
        );
        assert!(panel.entries[1].is_revealed(Duration::from_millis(100)));
        assert!(!panel.entries[2].is_revealed(Duration::from_millis(150)));
    }

    #[test]
    fn test_link() {
        let panel = SourcePanel::render(&[source(None, Some("18c2f9")), source(None, None), source(None, Some(""))]);
        assert_eq!(
            panel.entries[0].link().as_deref(),
            Some("https://mail.google.com/mail/u/0/#inbox/18c2f9")
        );
        assert_eq!(panel.entries[1].link(), None);
        assert_eq!(panel.entries[2].link(), None);
    }

    #[test]
    fn test_open_without_id_is_noop() {
        let panel = SourcePanel::render(&[source(Some("no id"), None)]);
        assert!(open_in_gmail(&panel.entries[0]).is_ok());
    }

    #[test]
    fn test_unparsable_date_is_unchanged() {
        assert_eq!(format_date("not-a-date"), "not-a-date");
        assert_eq!(format_date("yesterday-ish"), "yesterday-ish");
    }

    #[test]
    fn test_unknown_date() {
        assert_eq!(format_date("Unknown Date"), DATE_UNKNOWN);
        assert_eq!(format_date(""), DATE_UNKNOWN);
    }

    #[test]
    fn test_naive_datetime_is_local_wall_clock() {
        assert_eq!(format_date("2024-12-24 09:30:00"), "Dec 24, 2024, 9:30 AM");
        assert_eq!(format_date("2024-03-05T00:07"), "Mar 5, 2024, 12:07 AM");
    }

    #[test]
    fn test_rfc2822_header_dates_parse() {
        let formatted = format_date("Tue, 1 Jul 2025 10:00:00 -0700 (PDT)");
        assert_ne!(formatted, "Tue, 1 Jul 2025 10:00:00 -0700 (PDT)");
        assert!(formatted.contains("2025"));
        assert!(formatted.ends_with("AM") || formatted.ends_with("PM"));

        let rfc3339 = format_date("2025-07-01T17:00:00Z");
        assert!(rfc3339.starts_with("Jul "));
    }

    #[test]
    fn test_loose_header_dates_parse() {
        assert_eq!(
            format_date("Mon, 1 Jul 2025 10:00:00 -0700"),
            format_date("2025-07-01T10:00:00-07:00")
        );
        assert_eq!(
            format_date("Thu, 3 Jul 2025 8:05:00 +0200"),
            format_date("2025-07-03T08:05:00+02:00")
        );
        assert_eq!(
            format_date("3 Jul 2025 08:05 +0200 (CEST)"),
            format_date("2025-07-03T08:05:00+02:00")
        );
        assert_eq!(format_date("Someday, 3 Jul"), "Someday, 3 Jul");
    }

    #[test]
    fn test_source_payload_ignores_extra_fields() {
        let source: SourceEmail = serde_json::from_str(
            r#"{"subject": "Hi", "sender": "a@b.c", "internal_date": 1719842400000,
                "attachments": [], "message_id": "abc"}"#,
        )
        .unwrap();
        assert_eq!(source.subject.as_deref(), Some("Hi"));
        assert_eq!(source.message_id.as_deref(), Some("abc"));
        assert_eq!(source.body, None);
    }
}
