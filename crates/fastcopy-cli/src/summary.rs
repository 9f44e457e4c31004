use fastcopy_core::RunSummary;
use std::fmt::Write as _;

pub(crate) fn render_summary(summary: &RunSummary, verbose: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Copy{} complete: {} files, {} in {} ms",
        if summary.cancelled { " (cancelled)" } else { "" },
        summary.files_copied,
        format_bytes(summary.total_bytes),
        summary.elapsed_ms
    );
    let _ = writeln!(
        out,
        "• Dirs created: {} | Failed: {} | Skipped: {}",
        summary.dirs_created, summary.files_failed, summary.files_skipped
    );
    let _ = write!(
        out,
        "• Throughput: {}/s",
        format_bytes(summary.bytes_per_sec())
    );

    if verbose {
        for bucket in summary.buckets.iter().filter(|b| b.file_count > 0) {
            let _ = write!(
                out,
                "\n• Files {}: {} file(s), {} | min {}/s, max {}/s, avg {}/s",
                bucket.name,
                bucket.file_count,
                format_bytes(bucket.total_bytes),
                format_bytes(bucket.min_bytes_per_sec),
                format_bytes(bucket.max_bytes_per_sec),
                format_bytes(bucket.avg_bytes_per_sec),
            );
        }
    }
    out
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes == 0 {
        return "0 B".to_owned();
    }
    let mut value = bytes as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}
