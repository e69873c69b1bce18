//! Output formatting for CLI operations.

use arcupdate::codec::ArchiveEntry;
use arcupdate::{ErrorCategory, UpdateReport};
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};

/// Trait for output formatting
pub trait OutputFormatter {
    /// Formats a list of entries
    fn format_list(&self, entries: &[ArchiveEntry], technical: bool) -> String;

    /// Formats the result of an update run
    fn format_update(&self, report: &UpdateReport) -> String;
}

/// Human-readable output formatter
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn format_list(&self, entries: &[ArchiveEntry], technical: bool) -> String {
        let mut output = String::new();

        if technical {
            output.push_str(&format!(
                "{:>12} {:>19} {:>10} {:>4} {}\n",
                "Size", "Modified", "Attrib", "Kind", "Name"
            ));
        } else {
            output.push_str(&format!("{:>12} {:>19} {}\n", "Size", "Modified", "Name"));
        }
        output.push_str(&"-".repeat(70));
        output.push('\n');

        let mut total_size: u64 = 0;
        let mut file_count = 0;
        let mut dir_count = 0;

        for entry in entries {
            if entry.is_dir {
                dir_count += 1;
            } else {
                file_count += 1;
                total_size += entry.size.unwrap_or(0);
            }

            let size_str = match (entry.is_dir, entry.size) {
                (false, Some(size)) => humanize_bytes(size),
                _ => String::new(),
            };
            let mtime_str = entry
                .mtime
                .map(|t| format_timestamp(t.as_system_time()))
                .unwrap_or_else(|| "-".to_string());
            let type_indicator = if entry.is_dir { "/" } else { "" };

            if technical {
                let attrib_str = entry
                    .attributes
                    .map(|a| format!("{:08X}", a.raw()))
                    .unwrap_or_else(|| "-".to_string());
                let kind = if entry.is_anti {
                    "anti"
                } else if entry.is_alt_stream {
                    "ads"
                } else {
                    ""
                };
                output.push_str(&format!(
                    "{:>12} {:>19} {:>10} {:>4} {}{}\n",
                    size_str, mtime_str, attrib_str, kind, entry.path, type_indicator
                ));
            } else {
                output.push_str(&format!(
                    "{:>12} {:>19} {}{}\n",
                    size_str, mtime_str, entry.path, type_indicator
                ));
            }
        }

        output.push_str(&"-".repeat(70));
        output.push('\n');
        output.push_str(&format!(
            "{} files, {} directories, {} total\n",
            file_count,
            dir_count,
            humanize_bytes(total_size)
        ));

        output
    }

    fn format_update(&self, report: &UpdateReport) -> String {
        let mut output = String::new();
        let plan = &report.stats.plan;

        if report.success {
            output.push_str(&format!(
                "Added {}, updated {}, deleted {}, renamed {}, kept {}\n",
                plan.added, plan.updated, plan.deleted, plan.renamed, plan.kept
            ));
            output.push_str(&format!(
                "Archive size: {} ({} read, {:.1}s)\n",
                humanize_bytes(report.output_size),
                humanize_bytes(report.stats.bytes_in),
                report.elapsed_ms as f64 / 1000.0
            ));
            if report.volume_count > 0 {
                output.push_str(&format!("Volumes: {}\n", report.volume_count));
            }
            if report.stats.files_deleted > 0 {
                output.push_str(&format!("Deleted {} files from disk\n", report.stats.files_deleted));
            }
            if !report.failures.is_empty() {
                output.push_str(&format!("\nWarnings ({}):\n", report.failures.len()));
            }
        } else {
            output.push_str(&format!(
                "Update failed ({}): {}\n",
                report.category.map(category_name).unwrap_or("error"),
                report.message.as_deref().unwrap_or("unknown error")
            ));
            match report.category {
                Some(ErrorCategory::Commit) => {
                    output.push_str("The new archive could not be moved into place; check the paths below.\n");
                }
                Some(ErrorCategory::Cancelled) => {}
                _ => output.push_str("The existing archive was not modified.\n"),
            }
        }

        for failure in &report.failures {
            output.push_str(&format!("  {}: {}\n", failure.path.display(), failure.message));
        }

        output
    }
}

/// JSON output formatter
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn format_list(&self, entries: &[ArchiveEntry], _technical: bool) -> String {
        let items: Vec<_> = entries
            .iter()
            .map(|e| {
                json!({
                    "path": e.path,
                    "size": e.size,
                    "modified": e.mtime.map(|t| t.as_unix_secs()),
                    "attributes": e.attributes.map(|a| a.raw()),
                    "is_directory": e.is_dir,
                    "is_alt_stream": e.is_alt_stream,
                    "is_anti": e.is_anti,
                })
            })
            .collect();

        serde_json::to_string_pretty(&items).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_update(&self, report: &UpdateReport) -> String {
        let plan = &report.stats.plan;
        let obj = json!({
            "success": report.success,
            "category": report.category.map(category_name),
            "message": report.message,
            "output_size": report.output_size,
            "volume_count": report.volume_count,
            "elapsed_ms": report.elapsed_ms,
            "plan": {
                "added": plan.added,
                "updated": plan.updated,
                "deleted": plan.deleted,
                "kept": plan.kept,
                "renamed": plan.renamed,
                "new_bytes": plan.new_bytes,
            },
            "items_written": report.stats.items_written,
            "items_skipped": report.stats.items_skipped,
            "bytes_in": report.stats.bytes_in,
            "bytes_out": report.stats.bytes_out,
            "files_deleted": report.stats.files_deleted,
            "failures": report.failures.iter().map(|f| json!({
                "path": f.path.display().to_string(),
                "os_code": f.os_code,
                "error": f.message,
            })).collect::<Vec<_>>(),
        });

        serde_json::to_string_pretty(&obj).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Creates the appropriate formatter based on output format
pub fn create_formatter(format: super::OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        super::OutputFormat::Human => Box::new(HumanFormatter),
        super::OutputFormat::Json => Box::new(JsonFormatter),
    }
}

fn category_name(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::Scan => "scan",
        ErrorCategory::Plan => "plan",
        ErrorCategory::Open => "open",
        ErrorCategory::Write => "write",
        ErrorCategory::Leak => "leak",
        ErrorCategory::Commit => "commit",
        ErrorCategory::Cancelled => "cancelled",
    }
}

/// Converts bytes to a human-readable string
pub fn humanize_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.1} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Formats a SystemTime as a UTC datetime string
pub fn format_timestamp(time: SystemTime) -> String {
    let Ok(duration) = time.duration_since(UNIX_EPOCH) else {
        return "-".to_string();
    };
    let secs = duration.as_secs();
    let time_of_day = secs % 86400;
    let (year, month, day) = civil_from_days((secs / 86400) as i64);

    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        year,
        month,
        day,
        time_of_day / 3600,
        (time_of_day % 3600) / 60,
        time_of_day % 60
    )
}

// Days since 1970-01-01 to a proleptic Gregorian date.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_humanize_bytes() {
        assert_eq!(humanize_bytes(512), "512 B");
        assert_eq!(humanize_bytes(1536), "1.5 KB");
        assert_eq!(humanize_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(UNIX_EPOCH), "1970-01-01 00:00:00");
        // 2000-03-01 12:34:56 UTC
        let time = UNIX_EPOCH + Duration::from_secs(951_914_096);
        assert_eq!(format_timestamp(time), "2000-03-01 12:34:56");
    }

    #[test]
    fn test_json_update_report() {
        let report = UpdateReport {
            success: false,
            category: Some(ErrorCategory::Cancelled),
            message: Some("Operation cancelled".into()),
            ..Default::default()
        };
        let text = JsonFormatter.format_update(&report);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["category"], "cancelled");
    }
}
