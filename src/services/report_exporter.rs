use std::{
    io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use uuid::Uuid;

use crate::{domain::page_report::PageReport, error::AuditError};

pub const REPORT_HEADER: [&str; 6] = [
    "URL",
    "Title",
    "Status Code",
    "Load Time (ms)",
    "Self-Referencing URL with #",
    "Anchor Details",
];

const REPORT_PREFIX: &str = "report-";
const REPORT_EXTENSION: &str = ".csv";

#[derive(Debug, Clone, PartialEq)]
pub struct ReportLocation {
    pub file_name: String,
    pub path: PathBuf,
}

impl ReportLocation {
    pub fn download_link(&self) -> String {
        format!("/download/{}", self.file_name)
    }
}

/// Writes one report file per session into `report_dir`. The file only
/// appears under its final name once fully written. Reports older than
/// `retention` are removed whenever a new one is exported.
#[derive(Debug, Clone)]
pub struct ReportExporter {
    report_dir: PathBuf,
    retention: Duration,
}

impl ReportExporter {
    pub fn new(report_dir: impl Into<PathBuf>, retention: Duration) -> Self {
        ReportExporter {
            report_dir: report_dir.into(),
            retention,
        }
    }

    pub fn export(&self, reports: Vec<PageReport>) -> Result<ReportLocation, AuditError> {
        std::fs::create_dir_all(&self.report_dir).map_err(AuditError::ExportIo)?;
        self.sweep_expired();

        let staging =
            tempfile::NamedTempFile::new_in(&self.report_dir).map_err(AuditError::ExportIo)?;
        write_report(&mut csv::Writer::from_writer(staging.as_file()), &reports)?;

        let file_name = format!("{}{}{}", REPORT_PREFIX, Uuid::new_v4(), REPORT_EXTENSION);
        let path = self.report_dir.join(&file_name);
        staging
            .persist(&path)
            .map_err(|e| AuditError::ExportIo(e.error))?;

        log::info!("Wrote report with {} rows to {:?}", reports.len(), path);
        Ok(ReportLocation { file_name, path })
    }

    /// Removes expired reports. Failures are logged and never block an export.
    fn sweep_expired(&self) {
        let entries = match std::fs::read_dir(&self.report_dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Could not list {:?}: {}", self.report_dir, e);
                return;
            }
        };

        let now = SystemTime::now();
        for entry in entries.flatten() {
            let path = entry.path();
            let is_report = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(is_report_name);
            if !is_report || !is_expired(&path, now, self.retention) {
                continue;
            }

            match std::fs::remove_file(&path) {
                Ok(()) => log::info!("Removed expired report {:?}", path),
                Err(e) => log::warn!("Could not remove expired report {:?}: {}", path, e),
            }
        }
    }

    /// Resolves a download name to a report path. Anything that is not a
    /// report name this exporter could have produced yields `None`.
    pub fn locate(&self, file_name: &str) -> Option<PathBuf> {
        is_report_name(file_name).then(|| self.report_dir.join(file_name))
    }
}

fn is_expired(path: &Path, now: SystemTime, retention: Duration) -> bool {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| now.duration_since(modified).ok())
        .is_some_and(|age| age > retention)
}

fn is_report_name(file_name: &str) -> bool {
    file_name
        .strip_prefix(REPORT_PREFIX)
        .and_then(|rest| rest.strip_suffix(REPORT_EXTENSION))
        .map(|id| Uuid::parse_str(id).is_ok())
        .unwrap_or(false)
}

pub fn write_report<W: io::Write>(
    writer: &mut csv::Writer<W>,
    reports: &[PageReport],
) -> Result<(), csv::Error> {
    writer.write_record(REPORT_HEADER)?;

    for report in reports {
        writer.write_record(&[
            report.url.clone(),
            report.title.clone(),
            report.status_code.to_string(),
            report.load_time_ms().to_string(),
            report.self_referencing.to_string(),
            report.joined_anchor_details(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::{write_report, ReportExporter, REPORT_HEADER};
    use crate::{
        domain::page_report::{AnchorDescriptor, PageReport},
        error::AuditError,
    };

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn render(reports: &[PageReport]) -> Vec<Vec<String>> {
        let mut bytes = vec![];
        write_report(&mut csv::Writer::from_writer(&mut bytes), reports).unwrap();

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(bytes.as_slice());
        let rows = reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect();
        rows
    }

    #[test]
    fn header_then_one_row_per_report() {
        let reports = vec![
            PageReport::analyzed(
                "http://example.com".to_string(),
                200,
                Duration::from_millis(153),
                "Example".to_string(),
                vec![],
            ),
            PageReport::fetch_failed("http://down.invalid".to_string()),
        ];

        let rows = render(&reports);

        assert_eq!(rows[0], REPORT_HEADER);
        assert_eq!(
            rows[1],
            ["http://example.com", "Example", "200", "153", "false", ""]
        );
        assert_eq!(
            rows[2],
            ["http://down.invalid", "Error", "0", "0", "false", ""]
        );
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn anchor_details_with_commas_stay_in_one_field() {
        let anchor = |title: &str| AnchorDescriptor {
            href: "#".to_string(),
            class: "cta".to_string(),
            title: title.to_string(),
        };
        let report = PageReport::analyzed(
            "http://shop.test".to_string(),
            200,
            Duration::from_millis(9),
            "Shop, Inc".to_string(),
            vec![anchor("Buy, now"), anchor("No title")],
        );

        let rows = render(&[report]);

        assert_eq!(rows[1].len(), 6);
        assert_eq!(rows[1][1], "Shop, Inc");
        assert_eq!(rows[1][4], "true");
        assert_eq!(
            rows[1][5],
            r##"<a href="#" class="cta" title="Buy, now">,<a href="#" class="cta" title="No title">"##
        );
    }

    #[test]
    fn export_uses_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ReportExporter::new(dir.path().join("reports"), DAY);

        let first = exporter.export(vec![]).unwrap();
        let second = exporter.export(vec![]).unwrap();

        assert_ne!(first.file_name, second.file_name);
        assert!(first.path.exists());
        assert!(second.path.exists());
        assert_eq!(
            first.download_link(),
            format!("/download/{}", first.file_name)
        );
        // only the two reports, no staging leftovers
        assert_eq!(std::fs::read_dir(dir.path().join("reports")).unwrap().count(), 2);
    }

    #[test]
    fn locate_rejects_foreign_names() {
        let exporter = ReportExporter::new("reports", DAY);

        assert!(exporter
            .locate("report-67e55044-10b1-426f-9247-bb680e5fe0c8.csv")
            .is_some());
        assert!(exporter.locate("../Cargo.toml").is_none());
        assert!(exporter.locate("report-../../etc/passwd.csv").is_none());
        assert!(exporter.locate("output.csv").is_none());
    }

    #[test]
    fn export_into_a_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("reports");
        std::fs::write(&blocked, b"not a directory").unwrap();

        let err = ReportExporter::new(&blocked, DAY).export(vec![]).unwrap_err();

        assert!(matches!(err, AuditError::ExportIo(_)));
    }

    #[test]
    fn expired_reports_are_swept_on_export() {
        let dir = tempfile::tempdir().unwrap();
        let backdate = |name: &str| {
            let path = dir.path().join(name);
            std::fs::write(&path, b"URL\n").unwrap();
            std::fs::File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(SystemTime::now() - 2 * DAY)
                .unwrap();
            path
        };
        let old_report = backdate("report-67e55044-10b1-426f-9247-bb680e5fe0c8.csv");
        let unrelated = backdate("notes.csv");
        let exporter = ReportExporter::new(dir.path(), DAY);

        let recent = exporter.export(vec![]).unwrap();
        let newest = exporter.export(vec![]).unwrap();

        assert!(!old_report.exists());
        assert!(unrelated.exists());
        assert!(recent.path.exists());
        assert!(newest.path.exists());
    }
}
