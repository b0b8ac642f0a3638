//! JSON run reports.

use crate::models::RunReport;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Write a [`RunReport`] to `{report_dir}/{local_date}/{HHMMSS}.json`.
///
/// # Arguments
///
/// * `report` - The finished run, serialized as pretty JSON
/// * `report_dir` - Root of the dated report folders; created if missing
///
/// # Returns
///
/// The path of the file written.
#[instrument(level = "info", skip_all, fields(report_dir = %report_dir.display()))]
pub async fn write_run_report(
    report: &RunReport,
    report_dir: &Path,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(report)?;

    let full_dir = report_dir.join(&report.local_date);
    if let Err(e) = fs::create_dir_all(&full_dir).await {
        error!(dir = %full_dir.display(), error = %e, "Failed to create report dir");
        return Err(e.into());
    }

    let path = full_dir.join(format!("{}.json", report.local_time.replace(':', "")));
    fs::write(&path, json).await?;
    info!(path = %path.display(), categories = report.categories.len(), "Wrote run report");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CategoryReport;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_report_lands_under_date_directory() {
        let dir = TempDir::new().unwrap();
        let report = RunReport {
            local_date: "2025-05-06".into(),
            local_time: "20:30:05".into(),
            categories: vec![CategoryReport {
                category: 0,
                name: "independent".into(),
                ..Default::default()
            }],
        };

        let path = write_run_report(&report, dir.path()).await.unwrap();

        assert_eq!(path, dir.path().join("2025-05-06").join("203005.json"));
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["categories"][0]["name"], "independent");
    }
}
