use std::fmt::Write;
use std::time::Duration;

/// Convert bytes to a human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Convert a duration to a human-readable format
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs_f64();
    let mut result = String::with_capacity(10);

    if seconds >= 3600.0 {
        let _ = write!(result, "{:.2}h", seconds / 3600.0);
    } else if seconds >= 60.0 {
        let _ = write!(result, "{:.2}m", seconds / 60.0);
    } else {
        let _ = write!(result, "{seconds:.2}s");
    }

    result
}
