//! Report command implementation.

use crate::config::{Config, OutputFormat};
use crate::reports::{NewReport, Report, ReportStats, ReportStatus, ReportStore};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;

/// Manages abuse reports in the configured store.
pub struct ReportCommand {
    store: ReportStore,
    format: OutputFormat,
}

impl ReportCommand {
    pub fn new(config: &Config) -> Result<Self> {
        let store = ReportStore::open(&config.reports_path).with_context(|| {
            format!("Failed to open report store: {}", config.reports_path.display())
        })?;
        Ok(Self { store, format: config.format })
    }

    pub fn create(&self, report: NewReport) -> Result<String> {
        let report = self.store.create(report)?;
        Ok(match self.format {
            OutputFormat::Json => to_json(&report),
            _ => format!(
                "Report {} received for listing {}. It will be reviewed shortly.",
                report.report_id, report.listing_id
            ),
        })
    }

    pub fn show(&self, report_id: &str) -> Result<String> {
        let report = self
            .store
            .get(report_id)?
            .ok_or_else(|| anyhow!("Report not found: {}", report_id))?;
        Ok(self.render(std::slice::from_ref(&report)))
    }

    /// Lists reports newest first, optionally for one listing only.
    pub fn list(
        &self,
        status: Option<ReportStatus>,
        listing_id: Option<&str>,
        limit: usize,
    ) -> Result<String> {
        let reports = match listing_id {
            Some(id) => {
                let mut reports = self.store.for_listing(id)?;
                reports.retain(|r| status.is_none_or(|s| r.status == s));
                reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                reports.truncate(limit);
                reports
            }
            None => self.store.list(status, limit)?,
        };
        Ok(self.render(&reports))
    }

    pub fn set_status(&self, report_id: &str, status: ReportStatus) -> Result<String> {
        let report = self
            .store
            .update_status(report_id, status)?
            .ok_or_else(|| anyhow!("Report not found: {}", report_id))?;
        Ok(match self.format {
            OutputFormat::Json => to_json(&report),
            _ => format!("Report {} is now {}", report.report_id, report.status),
        })
    }

    pub fn stats(&self) -> Result<String> {
        let stats = self.store.stats()?;
        Ok(match self.format {
            OutputFormat::Json => to_json(&stats),
            _ => stats_table(&stats),
        })
    }

    fn render(&self, reports: &[Report]) -> String {
        if self.format == OutputFormat::Json {
            return to_json(reports);
        }
        if reports.is_empty() {
            return "No reports found.".to_string();
        }

        let mut lines = Vec::new();
        lines.push(format!("{:<16}  {:<10}  {:<12}  {:<16}  {}", "ID", "Status", "Listing", "Created", "Reason"));
        lines.push(format!("{:-<16}  {:-<10}  {:-<12}  {:-<16}  {:-<40}", "", "", "", "", ""));
        for report in reports {
            let reason: String = report.reason.chars().take(40).collect();
            lines.push(format!(
                "{:<16}  {:<10}  {:<12}  {:<16}  {}",
                report.report_id,
                report.status.to_string(),
                report.listing_id,
                report.created_at.format("%Y-%m-%d %H:%M"),
                reason
            ));
        }
        lines.join("\n")
    }
}

fn stats_table(stats: &ReportStats) -> String {
    let mut lines = vec![format!("Total reports: {}", stats.total)];
    for status in ReportStatus::all() {
        let count = stats.by_status.get(status).copied().unwrap_or(0);
        lines.push(format!("  {:<10} {}", status.to_string(), count));
    }
    lines.join("\n")
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn command(format: OutputFormat) -> (ReportCommand, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            format,
            reports_path: dir.path().join("reports.json"),
            ..Config::default()
        };
        (ReportCommand::new(&config).unwrap(), dir)
    }

    fn new_report(listing_id: &str) -> NewReport {
        NewReport::new(
            listing_id,
            format!("https://www.subito.it/arredamento/divano-torino-{}.htm", listing_id),
            "Le foto sono prese da un altro annuncio",
        )
    }

    #[test]
    fn test_create_and_show() {
        let (cmd, _dir) = command(OutputFormat::Json);
        let created: Report = serde_json::from_str(&cmd.create(new_report("777")).unwrap()).unwrap();

        let shown: Vec<Report> = serde_json::from_str(&cmd.show(&created.report_id).unwrap()).unwrap();
        assert_eq!(shown, vec![created]);
    }

    #[test]
    fn test_create_message() {
        let (cmd, _dir) = command(OutputFormat::Table);
        let output = cmd.create(new_report("777")).unwrap();
        assert!(output.starts_with("Report rep_"));
        assert!(output.contains("listing 777"));
    }

    #[test]
    fn test_invalid_report_is_rejected() {
        let (cmd, _dir) = command(OutputFormat::Table);
        let mut report = new_report("777");
        report.reason = "spam".to_string();
        assert!(cmd.create(report).unwrap_err().to_string().contains("invalid report"));
    }

    #[test]
    fn test_show_unknown_report() {
        let (cmd, _dir) = command(OutputFormat::Table);
        assert!(cmd.show("rep_000000000000").unwrap_err().to_string().contains("Report not found"));
    }

    #[test]
    fn test_list_by_listing_and_status() {
        let (cmd, _dir) = command(OutputFormat::Table);
        cmd.create(new_report("777")).unwrap();
        cmd.create(new_report("888")).unwrap();

        let output = cmd.list(None, Some("777"), 50).unwrap();
        assert!(output.contains("777"));
        assert!(!output.contains("888"));

        assert_eq!(cmd.list(Some(ReportStatus::Dismissed), None, 50).unwrap(), "No reports found.");
    }

    #[test]
    fn test_set_status_and_stats() {
        let (cmd, _dir) = command(OutputFormat::Json);
        let created: Report = serde_json::from_str(&cmd.create(new_report("777")).unwrap()).unwrap();
        cmd.create(new_report("888")).unwrap();

        let updated: Report =
            serde_json::from_str(&cmd.set_status(&created.report_id, ReportStatus::Reviewing).unwrap())
                .unwrap();
        assert_eq!(updated.status, ReportStatus::Reviewing);

        let stats: ReportStats = serde_json::from_str(&cmd.stats().unwrap()).unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_status.get(&ReportStatus::Reviewing), Some(&1));
    }

    #[test]
    fn test_stats_table_lists_every_status() {
        let (cmd, _dir) = command(OutputFormat::Table);
        cmd.create(new_report("777")).unwrap();

        let output = cmd.stats().unwrap();
        assert!(output.starts_with("Total reports: 1"));
        assert!(output.contains("received   1"));
        assert!(output.contains("dismissed  0"));
    }
}
