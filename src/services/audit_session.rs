use std::{pin::pin, time::Duration};

use futures::{stream, StreamExt};
use tokio::sync::mpsc::Sender;

use crate::{
    configuration::AuditSettings,
    domain::{
        page_report::PageReport,
        session::{progress_percent, SessionEvent, SessionState},
    },
    error::AuditError,
};

use super::{BatchIngestor, PageAuditor, ReportExporter, ReportLocation};

/// Everything a session needs, shared by all client connections.
pub struct AuditService {
    ingestor: BatchIngestor,
    auditor: PageAuditor,
    exporter: ReportExporter,
    concurrency: usize,
}

impl AuditService {
    pub fn new(settings: &AuditSettings) -> Result<Self, reqwest::Error> {
        Ok(AuditService {
            ingestor: BatchIngestor::from_settings(settings),
            auditor: PageAuditor::new(settings)?,
            exporter: ReportExporter::new(
                settings.report_dir.clone(),
                Duration::from_secs(settings.report_retention_secs),
            ),
            concurrency: settings.concurrency.max(1),
        })
    }

    pub fn exporter(&self) -> &ReportExporter {
        &self.exporter
    }

    pub fn max_batch_bytes(&self) -> usize {
        self.ingestor.max_bytes()
    }

    pub fn start_session(&self, events: Sender<SessionEvent>) -> AuditSession<'_> {
        AuditSession {
            service: self,
            events,
            state: SessionState::Idle,
        }
    }
}

/// One batch from upload to report. Events go out through `events` in input
/// order; if the receiving side is gone the session stops fetching.
pub struct AuditSession<'a> {
    service: &'a AuditService,
    events: Sender<SessionEvent>,
    state: SessionState,
}

impl AuditSession<'_> {
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub async fn run(&mut self, raw_batch: &[u8]) -> Result<ReportLocation, AuditError> {
        self.transition(SessionState::ReceivingInput);
        let urls = match self.service.ingestor.ingest(raw_batch) {
            Ok(urls) => urls,
            Err(e) => {
                log::error!("Error reading CSV batch: {}", e);
                self.transition(SessionState::Failed);
                // the client may already be gone, the decode error wins
                let _ = self.emit(SessionEvent::InputRejected).await;
                return Err(e);
            }
        };

        let reports = match self.audit_all(urls).await {
            Ok(reports) => reports,
            Err(e) => {
                log::warn!("Aborting session: {}", e);
                self.transition(SessionState::Failed);
                return Err(e);
            }
        };

        self.transition(SessionState::Finalizing);
        let exporter = self.service.exporter.clone();
        let exported = tokio::task::spawn_blocking(move || exporter.export(reports))
            .await
            .map_err(AuditError::ExportTask)
            .and_then(|result| result);

        let location = match exported {
            Ok(location) => location,
            Err(e) => {
                log::error!("Error creating output file: {}", e);
                self.transition(SessionState::Failed);
                let _ = self.emit(SessionEvent::ExportFailed).await;
                return Err(e);
            }
        };

        if let Err(e) = self.finish(&location).await {
            self.transition(SessionState::Failed);
            return Err(e);
        }

        self.transition(SessionState::Done);
        Ok(location)
    }

    async fn audit_all(&mut self, urls: Vec<String>) -> Result<Vec<PageReport>, AuditError> {
        let service = self.service;
        let total = urls.len();
        let mut aggregated = Vec::with_capacity(total);

        // buffered() keeps results in input order whatever the concurrency
        let mut audits = pin!(stream::iter(urls.clone())
            .map(move |url| service.auditor.audit(url))
            .buffered(service.concurrency));

        for (index, url) in urls.into_iter().enumerate() {
            self.transition(SessionState::Processing { index, total });
            log::info!("Processing URL: {}", url);
            self.emit(SessionEvent::Processing(url)).await?;

            // a dropped receiver cancels the fetch in flight
            let report = tokio::select! {
                report = audits.next() => report,
                _ = self.events.closed() => return Err(AuditError::ChannelClosed),
            };
            let Some(report) = report else {
                break;
            };
            aggregated.push(report);

            self.emit(SessionEvent::Progress(progress_percent(index, total)))
                .await?;
        }

        Ok(aggregated)
    }

    async fn finish(&self, location: &ReportLocation) -> Result<(), AuditError> {
        self.emit(SessionEvent::Completed).await?;
        self.emit(SessionEvent::ReportReady(location.download_link()))
            .await
    }

    async fn emit(&self, event: SessionEvent) -> Result<(), AuditError> {
        self.events
            .send(event)
            .await
            .map_err(|_| AuditError::ChannelClosed)
    }

    fn transition(&mut self, next: SessionState) {
        log::debug!("Session state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
