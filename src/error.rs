use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("could not open websocket connection: {0}")]
    ChannelEstablishment(String),

    #[error("malformed batch on line {line}: {reason}")]
    InputDecode { line: u64, reason: String },

    #[error("failed to write report: {0}")]
    Export(#[from] csv::Error),

    #[error("failed to store report: {0}")]
    ExportIo(#[source] std::io::Error),

    #[error("report task did not finish: {0}")]
    ExportTask(#[from] tokio::task::JoinError),

    #[error("event channel closed by the client")]
    ChannelClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AuditError {
    pub fn input_decode(line: u64, reason: impl Into<String>) -> Self {
        AuditError::InputDecode {
            line,
            reason: reason.into(),
        }
    }
}
