use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::models::ProcessingTime;

/// Normalize a backend timestamp to `YYYY-MM-DD HH:MM`. Unparseable input
/// is returned trimmed as-is; empty input gives `None`.
pub fn normalize_timestamp(value: Option<&str>) -> Option<String> {
    let raw = value?.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.format("%Y-%m-%d %H:%M").to_string());
    }
    let formats = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"];
    for fmt in formats.iter() {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.format("%Y-%m-%d %H:%M").to_string());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.format("%Y-%m-%d 00:00").to_string());
    }
    Some(raw.to_string())
}

/// Human duration: `42.3s`, `3m 05s`, `1h 02m`.
pub fn format_seconds(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "-".to_string();
    }
    if seconds < 60.0 {
        return format!("{:.1}s", seconds);
    }
    let total = seconds.round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}h {:02}m", h, m)
    } else {
        format!("{}m {:02}s", m, s)
    }
}

/// One line per known processing stage, e.g. `reconocimiento: 31.0s`.
pub fn format_processing_time(timing: &ProcessingTime) -> Vec<String> {
    [
        ("carga y conversión", timing.upload_convert),
        ("reconocimiento", timing.recognize),
        ("extracción", timing.extract),
        ("validación", timing.validation),
        ("total", timing.total),
    ]
    .into_iter()
    .filter_map(|(label, value)| value.map(|v| format!("{}: {}", label, format_seconds(v))))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_normalize_to_minutes() {
        assert_eq!(
            normalize_timestamp(Some("2024-05-02T14:21:09.123456")).as_deref(),
            Some("2024-05-02 14:21")
        );
        assert_eq!(
            normalize_timestamp(Some("2024-05-02T14:21:09+00:00")).as_deref(),
            Some("2024-05-02 14:21")
        );
        assert_eq!(normalize_timestamp(Some("2023-12-31")).as_deref(), Some("2023-12-31 00:00"));
        assert_eq!(normalize_timestamp(Some("ayer")).as_deref(), Some("ayer"));
        assert_eq!(normalize_timestamp(Some("   ")), None);
        assert_eq!(normalize_timestamp(None), None);
    }

    #[test]
    fn durations() {
        assert_eq!(format_seconds(4.24), "4.2s");
        assert_eq!(format_seconds(185.0), "3m 05s");
        assert_eq!(format_seconds(3725.0), "1h 02m");
        assert_eq!(format_seconds(-1.0), "-");
    }

    #[test]
    fn processing_time_skips_missing_stages() {
        let timing = ProcessingTime {
            recognize: Some(31.0),
            total: Some(93.1),
            ..Default::default()
        };
        assert_eq!(
            format_processing_time(&timing),
            vec!["reconocimiento: 31.0s".to_string(), "total: 1m 33s".to_string()]
        );
    }
}
