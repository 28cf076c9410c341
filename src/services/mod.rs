pub mod audit_session;
pub mod batch_ingestor;
pub mod page_auditor;
pub mod report_exporter;

pub use audit_session::*;
pub use batch_ingestor::*;
pub use page_auditor::*;
pub use report_exporter::*;
