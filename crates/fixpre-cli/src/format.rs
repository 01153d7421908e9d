//! Formatting helpers for terminal output.

use fixpre_core::models::{DashboardStats, FeedbackReport};
use serde_json::Value;

/// Keys the service has used for an entry's display name, in preference order
const TITLE_KEYS: &[&str] = &["fileName", "filename", "originalName", "title", "name"];
const SCORE_KEYS: &[&str] = &["score", "overallScore", "totalScore"];
const DATE_KEYS: &[&str] = &["createdAt", "created_at", "date", "uploadedAt"];

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format a date string to a more readable format
pub fn format_date(date: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(date) {
        dt.format("%b %d, %Y").to_string()
    } else if date.len() >= 10 && date.is_char_boundary(10) {
        date[..10].to_string()
    } else {
        date.to_string()
    }
}

/// Scores print with at most one decimal place
pub fn format_score(score: f64) -> String {
    if score.fract() == 0.0 {
        format!("{}", score as i64)
    } else {
        format!("{:.1}", score)
    }
}

fn first_field<'a>(report: &'a FeedbackReport, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| report.get(key).filter(|v| !v.is_null()))
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One line per history entry: date, score and name
pub fn history_line(index: usize, report: &FeedbackReport) -> String {
    let title = first_field(report, TITLE_KEYS)
        .map(value_text)
        .unwrap_or_else(|| format!("Presentation #{}", index + 1));
    let score = first_field(report, SCORE_KEYS)
        .and_then(Value::as_f64)
        .map(format_score)
        .unwrap_or_else(|| "-".to_string());
    let date = first_field(report, DATE_KEYS)
        .and_then(Value::as_str)
        .map(format_date)
        .unwrap_or_default();
    format!("{:<12} {:>5}  {}", date, score, truncate_string(&title, 50))
}

pub fn stats_summary(stats: &DashboardStats) -> String {
    format!(
        "Presentations analysed: {}\nYour average score:     {}\nPlatform average:       {}",
        stats.total_presentations(),
        format_score(stats.average_score()),
        format_score(stats.platform_average_score()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("short", 10), "short");
        assert_eq!(truncate_string("exactly10!", 10), "exactly10!");
        assert_eq!(truncate_string("this is too long", 10), "this is...");
        assert_eq!(truncate_string("abc", 2), "ab");
        assert_eq!(truncate_string("презентация", 6), "пре...");
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date("2025-03-14T09:30:00+00:00"), "Mar 14, 2025");
        assert_eq!(format_date("2025-03-14 09:30:00"), "2025-03-14");
        assert_eq!(format_date("soon"), "soon");
    }

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(8.0), "8");
        assert_eq!(format_score(7.3), "7.3");
        assert_eq!(format_score(6.66), "6.7");
        assert_eq!(format_score(0.0), "0");
    }

    #[test]
    fn test_history_line_uses_known_fields() {
        let report = FeedbackReport(json!({
            "fileName": "Quarterly review.pptx",
            "score": 8.5,
            "createdAt": "2025-03-14T09:30:00+00:00"
        }));
        let line = history_line(0, &report);
        assert!(line.starts_with("Mar 14, 2025"));
        assert!(line.contains("8.5"));
        assert!(line.ends_with("Quarterly review.pptx"));
    }

    #[test]
    fn test_history_line_falls_back() {
        let line = history_line(2, &FeedbackReport(json!({"id": 9, "score": null})));
        assert!(line.contains("Presentation #3"));
        assert!(line.contains('-'));
    }

    #[test]
    fn test_stats_summary_defaults() {
        let summary = stats_summary(&DashboardStats::default());
        assert!(summary.contains("Presentations analysed: 0"));
        assert!(summary.contains("Platform average:       0"));
    }
}
