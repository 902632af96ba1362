//! Output formatting utilities

use crate::OutputFormat;
use serde::Serialize;

/// Print output in the specified format
pub fn print_output<T: Serialize + std::fmt::Display>(
    value: &T,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Human | OutputFormat::Table => {
            println!("{}", value);
        }
    }
    Ok(())
}

/// Format bytes as human-readable
pub fn format_bytes(bytes: u64) -> String {
    human_bytes::human_bytes(bytes as f64)
}

/// Format speed as human-readable
pub fn format_speed(bytes_per_sec: u64) -> String {
    format!("{}/s", human_bytes::human_bytes(bytes_per_sec as f64))
}

/// Format a 0..=1 ratio as a percentage
pub fn format_progress(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

/// Remaining time at the current speed
pub fn format_eta(remaining_bytes: u64, bytes_per_sec: u64) -> String {
    if bytes_per_sec == 0 || remaining_bytes == 0 {
        return "-".to_string();
    }

    let seconds = remaining_bytes.div_ceil(bytes_per_sec);
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eta_formats() {
        assert_eq!(format_eta(100, 0), "-");
        assert_eq!(format_eta(0, 10), "-");
        assert_eq!(format_eta(95, 10), "10s");
        assert_eq!(format_eta(3_725, 1), "1h 2m 5s");
        assert_eq!(format_eta(125, 1), "2m 5s");
    }

    #[test]
    fn progress_formats() {
        assert_eq!(format_progress(0.0), "0.0%");
        assert_eq!(format_progress(0.256), "25.6%");
        assert_eq!(format_progress(1.0), "100.0%");
    }
}
