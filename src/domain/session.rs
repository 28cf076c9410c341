use std::fmt;

/// Lifecycle of one audit session.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SessionState {
    Idle,
    ReceivingInput,
    Processing { index: usize, total: usize },
    Finalizing,
    Done,
    Failed,
}

/// Text events pushed to the client, in the order they are emitted.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum SessionEvent {
    Processing(String),
    Progress(u8),
    Completed,
    ReportReady(String),
    InputRejected,
    ExportFailed,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::Processing(url) => write!(f, "Processing: {}", url),
            SessionEvent::Progress(percent) => write!(f, "Progress: {}%", percent),
            SessionEvent::Completed => write!(f, "Processing completed"),
            SessionEvent::ReportReady(link) => write!(f, "Download link: {}", link),
            SessionEvent::InputRejected => write!(f, "Error reading CSV file"),
            SessionEvent::ExportFailed => write!(f, "Error creating output file"),
        }
    }
}

/// Integer percentage after `index` (0-based) of `total` URLs, truncated.
pub fn progress_percent(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((index + 1).min(total) * 100 / total) as u8
}

#[cfg(test)]
mod tests {
    use super::{progress_percent, SessionEvent};

    #[test]
    fn percent_truncates() {
        assert_eq!(progress_percent(0, 3), 33);
        assert_eq!(progress_percent(1, 3), 66);
        assert_eq!(progress_percent(2, 3), 100);
        assert_eq!(progress_percent(0, 7), 14);
    }

    #[test]
    fn percent_is_monotonic() {
        let total = 17;
        let percents: Vec<u8> = (0..total).map(|i| progress_percent(i, total)).collect();

        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(percents.last(), Some(&100));
    }

    #[test]
    fn events_render_client_messages() {
        assert_eq!(
            SessionEvent::Processing("http://example.com".to_string()).to_string(),
            "Processing: http://example.com"
        );
        assert_eq!(SessionEvent::Progress(50).to_string(), "Progress: 50%");
        assert_eq!(SessionEvent::Completed.to_string(), "Processing completed");
        assert_eq!(
            SessionEvent::ReportReady("/download/report.csv".to_string()).to_string(),
            "Download link: /download/report.csv"
        );
    }
}
