pub mod page_report;
pub mod session;
