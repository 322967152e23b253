//! Daily summaries over the event store.
//!
//! Records are grouped by the local calendar date of their timestamp.
//! `Sitting` and `Standing` are reported together as `Sitting/Standing`.

use crate::core::events::{EventKind, EventRecord};
use crate::core::labels;
use crate::sink::{read_records, StoreError};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Longest stretch one record may account for.
pub const MAX_RECORD_SPAN: Duration = Duration::from_secs(5);

/// Totals for one label on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelSummary {
    pub label: String,
    pub records: usize,
    pub duration: Duration,
}

/// Per-label totals for one local date.
#[derive(Debug, Clone, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub timezone: String,
    pub activity: Vec<LabelSummary>,
    pub respiratory: Vec<LabelSummary>,
}

impl DailySummary {
    /// True when no record fell on this day.
    pub fn is_empty(&self) -> bool {
        self.activity.is_empty() && self.respiratory.is_empty()
    }
}

impl std::fmt::Display for DailySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "History for {} ({})", self.date, self.timezone)?;
        if self.is_empty() {
            return write!(f, "  no records");
        }
        for (title, rows) in [("Activity", &self.activity), ("Respiratory", &self.respiratory)] {
            writeln!(f, "{title}:")?;
            for row in rows {
                writeln!(
                    f,
                    "  {:<28} {:>6} records  {}",
                    row.label,
                    row.records,
                    format_duration(row.duration)
                )?;
            }
        }
        Ok(())
    }
}

/// Report label used for history.
pub fn history_label(label: &str) -> &str {
    match label {
        labels::SITTING | labels::STANDING => labels::SITTING_STANDING,
        other => other,
    }
}

/// Local calendar date of a timestamp.
pub fn local_date(timestamp: DateTime<Utc>, tz: Tz) -> NaiveDate {
    timestamp.with_timezone(&tz).date_naive()
}

/// Summarize the records that fall on `date` in `tz`.
pub fn summarize(records: &[EventRecord], date: NaiveDate, tz: Tz) -> DailySummary {
    let mut day: Vec<&EventRecord> = records
        .iter()
        .filter(|r| local_date(r.timestamp, tz) == date)
        .collect();
    day.sort_by_key(|r| r.timestamp);

    DailySummary {
        date,
        timezone: tz.name().to_string(),
        activity: summarize_kind(&day, EventKind::Activity),
        respiratory: summarize_kind(&day, EventKind::RespiratoryState),
    }
}

fn summarize_kind(day: &[&EventRecord], kind: EventKind) -> Vec<LabelSummary> {
    let of_kind: Vec<&EventRecord> = day.iter().copied().filter(|r| r.kind == kind).collect();
    let mut totals: BTreeMap<&str, (usize, Duration)> = BTreeMap::new();

    for (i, record) in of_kind.iter().enumerate() {
        let span = of_kind
            .get(i + 1)
            .and_then(|next| (next.timestamp - record.timestamp).to_std().ok())
            .map(|gap| gap.min(MAX_RECORD_SPAN))
            .unwrap_or_default();

        let entry = totals.entry(history_label(&record.label)).or_default();
        entry.0 += 1;
        entry.1 += span;
    }

    totals
        .into_iter()
        .map(|(label, (records, duration))| LabelSummary {
            label: label.to_string(),
            records,
            duration,
        })
        .collect()
}

/// Read the store at `path` and summarize one day.
pub fn load_day(path: &Path, date: NaiveDate, tz: Tz) -> Result<DailySummary, StoreError> {
    let records = read_records(path)?;
    Ok(summarize(&records, date, tz))
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn record(kind: EventKind, label: &str, at: DateTime<Utc>) -> EventRecord {
        EventRecord::new(Uuid::nil(), kind, label, at, false)
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, s).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
    }

    #[test]
    fn test_sitting_and_standing_fold_together() {
        let records = vec![
            record(EventKind::Activity, labels::SITTING, at(10, 0, 0)),
            record(EventKind::Activity, labels::STANDING, at(10, 0, 2)),
            record(EventKind::Activity, labels::RUNNING, at(10, 0, 4)),
        ];

        let summary = summarize(&records, date(), chrono_tz::UTC);
        let folded = summary
            .activity
            .iter()
            .find(|s| s.label == labels::SITTING_STANDING)
            .unwrap();
        assert_eq!(folded.records, 2);
        assert_eq!(folded.duration, Duration::from_secs(4));
        assert!(summary.activity.iter().all(|s| s.label != labels::SITTING));
    }

    #[test]
    fn test_gap_is_capped_and_last_record_counts_nothing() {
        let records = vec![
            record(EventKind::Activity, labels::RUNNING, at(9, 0, 0)),
            record(EventKind::Activity, labels::RUNNING, at(9, 1, 0)),
        ];

        let summary = summarize(&records, date(), chrono_tz::UTC);
        assert_eq!(summary.activity[0].records, 2);
        assert_eq!(summary.activity[0].duration, MAX_RECORD_SPAN);
    }

    #[test]
    fn test_kinds_are_timed_independently() {
        let records = vec![
            record(EventKind::Activity, labels::RUNNING, at(9, 0, 0)),
            record(EventKind::RespiratoryState, labels::NORMAL_BREATHING, at(9, 0, 1)),
            record(EventKind::Activity, labels::RUNNING, at(9, 0, 3)),
        ];

        let summary = summarize(&records, date(), chrono_tz::UTC);
        assert_eq!(summary.activity[0].duration, Duration::from_secs(3));
        assert_eq!(summary.respiratory[0].records, 1);
        assert_eq!(summary.respiratory[0].duration, Duration::ZERO);
    }

    #[test]
    fn test_local_date_filtering() {
        // 23:30 UTC on the 9th is the 10th in Tokyo.
        let late = Utc.with_ymd_and_hms(2024, 3, 9, 23, 30, 0).unwrap();
        let records = vec![record(EventKind::Activity, labels::RUNNING, late)];

        assert!(summarize(&records, date(), chrono_tz::UTC).is_empty());
        let tokyo = summarize(&records, date(), chrono_tz::Asia::Tokyo);
        assert_eq!(tokyo.activity.len(), 1);
        assert_eq!(tokyo.timezone, "Asia/Tokyo");
    }

    #[test]
    fn test_display_lists_labels() {
        let records = vec![record(EventKind::Activity, labels::RUNNING, at(9, 0, 0))];
        let text = summarize(&records, date(), chrono_tz::UTC).to_string();
        assert!(text.contains("2024-03-10"));
        assert!(text.contains(labels::RUNNING));
    }

    #[test]
    fn test_missing_store_is_empty_day() {
        let path = std::env::temp_dir().join(format!("missing-{}.jsonl", Uuid::new_v4()));
        let summary = load_day(&path, date(), chrono_tz::UTC).unwrap();
        assert!(summary.is_empty());
    }
}
