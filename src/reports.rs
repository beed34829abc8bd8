//! Abuse reports for suspicious listings, stored in a JSON file.

use crate::error::ReportError;
use crate::platforms::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

/// Reasons rejected outright.
const SPAM_REASONS: [&str; 3] = ["test", "spam", "prova"];

/// Review state of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    #[default]
    Received,
    Reviewing,
    Confirmed,
    Dismissed,
}

impl ReportStatus {
    pub fn all() -> &'static [ReportStatus] {
        &[ReportStatus::Received, ReportStatus::Reviewing, ReportStatus::Confirmed, ReportStatus::Dismissed]
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "received" => Ok(ReportStatus::Received),
            "reviewing" => Ok(ReportStatus::Reviewing),
            "confirmed" => Ok(ReportStatus::Confirmed),
            "dismissed" => Ok(ReportStatus::Dismissed),
            _ => Err(format!(
                "Unknown status: {}. Use: received, reviewing, confirmed, dismissed",
                s
            )),
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReportStatus::Received => "received",
            ReportStatus::Reviewing => "reviewing",
            ReportStatus::Confirmed => "confirmed",
            ReportStatus::Dismissed => "dismissed",
        };
        f.write_str(name)
    }
}

/// A report as submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReport {
    pub listing_id: String,
    pub listing_url: String,
    pub reason: String,
    pub reporter_email: Option<String>,
    pub additional_info: Option<String>,
}

impl NewReport {
    pub fn new(
        listing_id: impl Into<String>,
        listing_url: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            listing_id: listing_id.into(),
            listing_url: listing_url.into(),
            reason: reason.into(),
            reporter_email: None,
            additional_info: None,
        }
    }

    pub fn reporter_email(mut self, email: impl Into<String>) -> Self {
        self.reporter_email = Some(email.into());
        self
    }

    pub fn additional_info(mut self, info: impl Into<String>) -> Self {
        self.additional_info = Some(info.into());
        self
    }

    /// Checks field lengths, the reporter email, the spam list and the URL's marketplace.
    pub fn validate(&self) -> Result<(), ReportError> {
        let invalid = |msg: &str| Err(ReportError::Invalid(msg.to_string()));

        let id_len = self.listing_id.trim().chars().count();
        if !(1..=100).contains(&id_len) {
            return invalid("listing id must be between 1 and 100 characters");
        }

        if Platform::from_url(&self.listing_url).is_none() {
            return invalid("listing URL must belong to Subito.it or eBay");
        }

        let reason = self.reason.trim();
        if !(10..=1000).contains(&reason.chars().count()) {
            return invalid("reason must be between 10 and 1000 characters");
        }
        if SPAM_REASONS.contains(&reason.to_lowercase().as_str()) {
            return invalid("reason is not acceptable");
        }

        if let Some(email) = &self.reporter_email {
            if email.chars().count() > 100 || !email.contains('@') {
                return invalid("reporter email is not valid");
            }
        }

        if self.additional_info.as_ref().is_some_and(|info| info.chars().count() > 2000) {
            return invalid("additional info must be at most 2000 characters");
        }

        Ok(())
    }
}

/// A stored report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub report_id: String,
    pub listing_id: String,
    pub listing_url: String,
    pub reason: String,
    pub reporter_email: Option<String>,
    pub additional_info: Option<String>,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Report counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStats {
    pub total: usize,
    pub by_status: BTreeMap<ReportStatus, usize>,
}

/// JSON-file report store. Writes are serialized by a mutex.
pub struct ReportStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ReportStore {
    /// Opens the store, creating an empty one (and its directory) if missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ReportError> {
        let store = Self { path: path.into(), lock: Mutex::new(()) };
        if !store.path.exists() {
            std::fs::create_dir_all(store.dir())?;
            store.save(&[])?;
            info!("Created report store: {}", store.path.display());
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validates and stores a new report.
    pub fn create(&self, new: NewReport) -> Result<Report, ReportError> {
        new.validate()?;

        let _guard = self.guard()?;
        let mut reports = self.load()?;

        let now = Utc::now();
        let report = Report {
            report_id: format!("rep_{}", &Uuid::new_v4().simple().to_string()[..12]),
            listing_id: new.listing_id.trim().to_string(),
            listing_url: new.listing_url.trim().to_string(),
            reason: new.reason.trim().to_string(),
            reporter_email: new.reporter_email,
            additional_info: new.additional_info,
            status: ReportStatus::Received,
            created_at: now,
            updated_at: now,
        };

        reports.push(report.clone());
        self.save(&reports)?;

        info!("Report {} created for listing {}", report.report_id, report.listing_id);
        Ok(report)
    }

    pub fn get(&self, report_id: &str) -> Result<Option<Report>, ReportError> {
        Ok(self.load()?.into_iter().find(|r| r.report_id == report_id))
    }

    pub fn for_listing(&self, listing_id: &str) -> Result<Vec<Report>, ReportError> {
        Ok(self.load()?.into_iter().filter(|r| r.listing_id == listing_id).collect())
    }

    /// Newest first, optionally only one status.
    pub fn list(&self, status: Option<ReportStatus>, limit: usize) -> Result<Vec<Report>, ReportError> {
        let mut reports: Vec<Report> = self
            .load()?
            .into_iter()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .collect();
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        reports.truncate(limit);
        Ok(reports)
    }

    /// Returns the updated report, or `None` if the id is unknown.
    pub fn update_status(
        &self,
        report_id: &str,
        status: ReportStatus,
    ) -> Result<Option<Report>, ReportError> {
        let _guard = self.guard()?;
        let mut reports = self.load()?;

        let Some(report) = reports.iter_mut().find(|r| r.report_id == report_id) else {
            return Ok(None);
        };
        report.status = status;
        report.updated_at = Utc::now();
        let updated = report.clone();

        self.save(&reports)?;
        info!("Report {} is now {}", report_id, status);
        Ok(Some(updated))
    }

    pub fn stats(&self) -> Result<ReportStats, ReportError> {
        let reports = self.load()?;
        let mut stats = ReportStats { total: reports.len(), ..ReportStats::default() };
        for report in &reports {
            *stats.by_status.entry(report.status).or_insert(0) += 1;
        }
        Ok(stats)
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>, ReportError> {
        self.lock.lock().map_err(|_| ReportError::Invalid("report store lock poisoned".to_string()))
    }

    fn load(&self) -> Result<Vec<Report>, ReportError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn dir(&self) -> &Path {
        self.path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."))
    }

    /// Writes a sibling temporary file and renames it over the store.
    fn save(&self, reports: &[Report]) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(reports)?;

        let mut tmp = NamedTempFile::new_in(self.dir())?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        debug!("Saved {} reports to {}", reports.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (ReportStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::open(dir.path().join("data").join("reports.json")).unwrap();
        (store, dir)
    }

    fn valid_report() -> NewReport {
        NewReport::new(
            "48213",
            "https://www.subito.it/telefonia/iphone-13-roma-48213.htm",
            "Prezzo troppo basso, probabilmente truffa",
        )
    }

    #[test]
    fn test_open_creates_empty_store() {
        let (store, _dir) = store();
        assert!(store.path().exists());
        assert_eq!(store.stats().unwrap().total, 0);
    }

    #[test]
    fn test_create_and_get() {
        let (store, _dir) = store();
        let report = store.create(valid_report().reporter_email("mario@example.com")).unwrap();

        assert!(report.report_id.starts_with("rep_"));
        assert_eq!(report.report_id.len(), 16);
        assert_eq!(report.status, ReportStatus::Received);
        assert_eq!(report.created_at, report.updated_at);

        assert_eq!(store.get(&report.report_id).unwrap(), Some(report));
        assert_eq!(store.get("rep_missing").unwrap(), None);
    }

    #[test]
    fn test_reports_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports.json");

        let created = ReportStore::open(&path).unwrap().create(valid_report()).unwrap();
        let reopened = ReportStore::open(&path).unwrap();
        assert_eq!(reopened.get(&created.report_id).unwrap(), Some(created));
    }

    #[test]
    fn test_validation() {
        let rejected = |report: NewReport| matches!(report.validate(), Err(ReportError::Invalid(_)));

        assert!(valid_report().validate().is_ok());
        assert!(rejected(NewReport { reason: "troppo".to_string(), ..valid_report() }));
        assert!(rejected(NewReport { reason: "   spam     ".to_string(), ..valid_report() }));
        assert!(rejected(NewReport { reason: "x".repeat(1001), ..valid_report() }));
        assert!(rejected(NewReport {
            listing_url: "https://www.kijiji.it/annuncio/1".to_string(),
            ..valid_report()
        }));
        assert!(rejected(valid_report().reporter_email("not-an-email")));
        assert!(rejected(NewReport { listing_id: String::new(), ..valid_report() }));
        assert!(rejected(valid_report().additional_info("x".repeat(2001))));
    }

    #[test]
    fn test_invalid_report_is_not_stored() {
        let (store, _dir) = store();
        let bad = NewReport { reason: "test".to_string(), ..valid_report() };
        assert!(store.create(bad).is_err());
        assert_eq!(store.stats().unwrap().total, 0);
    }

    #[test]
    fn test_for_listing() {
        let (store, _dir) = store();
        store.create(valid_report()).unwrap();
        store.create(valid_report()).unwrap();
        store
            .create(NewReport::new(
                "2251234567",
                "https://www.ebay.it/itm/2251234567",
                "Venditore chiede pagamento fuori piattaforma",
            ))
            .unwrap();

        assert_eq!(store.for_listing("48213").unwrap().len(), 2);
        assert_eq!(store.for_listing("2251234567").unwrap().len(), 1);
        assert!(store.for_listing("0").unwrap().is_empty());
    }

    #[test]
    fn test_list_filters_and_limits() {
        let (store, _dir) = store();
        let first = store.create(valid_report()).unwrap();
        let second = store.create(valid_report()).unwrap();
        let third = store.create(valid_report()).unwrap();
        store.update_status(&second.report_id, ReportStatus::Dismissed).unwrap();

        let received = store.list(Some(ReportStatus::Received), 100).unwrap();
        let ids: Vec<_> = received.iter().map(|r| r.report_id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first.report_id.as_str()));
        assert!(ids.contains(&third.report_id.as_str()));

        assert_eq!(store.list(None, 1).unwrap().len(), 1);
        let all = store.list(None, 10).unwrap();
        assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }

    #[test]
    fn test_update_status() {
        let (store, _dir) = store();
        let report = store.create(valid_report()).unwrap();

        let updated = store.update_status(&report.report_id, ReportStatus::Confirmed).unwrap().unwrap();
        assert_eq!(updated.status, ReportStatus::Confirmed);
        assert!(updated.updated_at >= report.updated_at);
        assert_eq!(store.get(&report.report_id).unwrap().unwrap().status, ReportStatus::Confirmed);

        assert_eq!(store.update_status("rep_missing", ReportStatus::Dismissed).unwrap(), None);
    }

    #[test]
    fn test_stats() {
        let (store, _dir) = store();
        let a = store.create(valid_report()).unwrap();
        store.create(valid_report()).unwrap();
        store.update_status(&a.report_id, ReportStatus::Reviewing).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_status.get(&ReportStatus::Received), Some(&1));
        assert_eq!(stats.by_status.get(&ReportStatus::Reviewing), Some(&1));
    }

    #[test]
    fn test_corrupt_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = ReportStore::open(&path).unwrap();
        assert!(matches!(store.stats(), Err(ReportError::Json(_))));
    }

    #[test]
    fn test_writes_leave_only_the_store_behind() {
        let (store, dir) = store();
        let first = store.create(valid_report()).unwrap();
        store.create(valid_report()).unwrap();
        store.update_status(&first.report_id, ReportStatus::Reviewing).unwrap();

        let files: Vec<_> = std::fs::read_dir(dir.path().join("data"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(files, vec!["reports.json"]);

        let content = std::fs::read_to_string(store.path()).unwrap();
        let saved: Vec<Report> = serde_json::from_str(&content).unwrap();
        assert_eq!(saved.len(), 2);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Confirmed".parse::<ReportStatus>().unwrap(), ReportStatus::Confirmed);
        assert!("closed".parse::<ReportStatus>().is_err());
        assert_eq!(ReportStatus::Dismissed.to_string(), "dismissed");
    }
}
