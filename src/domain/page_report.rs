use std::{fmt, time::Duration};

pub const ERROR_TITLE: &str = "Error";
pub const MISSING_ANCHOR_TITLE: &str = "No title";

/// A dead `href="#"` anchor found on an audited page.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct AnchorDescriptor {
    pub href: String,
    pub class: String,
    pub title: String,
}

impl fmt::Display for AnchorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<a href=\"{}\" class=\"{}\" title=\"{}\">",
            self.href, self.class, self.title
        )
    }
}

/// One audited URL. `status_code == 0` means no response was ever received.
#[derive(Debug, PartialEq, Clone)]
pub struct PageReport {
    pub url: String,
    pub title: String,
    pub status_code: u16,
    pub load_time: Duration,
    pub self_referencing: bool,
    pub anchor_details: Vec<AnchorDescriptor>,
}

impl PageReport {
    pub fn fetch_failed(url: String) -> Self {
        Self {
            url,
            title: ERROR_TITLE.to_string(),
            status_code: 0,
            load_time: Duration::ZERO,
            self_referencing: false,
            anchor_details: vec![],
        }
    }

    pub fn parse_failed(url: String, status_code: u16, load_time: Duration) -> Self {
        Self {
            url,
            title: ERROR_TITLE.to_string(),
            status_code,
            load_time,
            self_referencing: false,
            anchor_details: vec![],
        }
    }

    pub fn analyzed(
        url: String,
        status_code: u16,
        load_time: Duration,
        title: String,
        anchor_details: Vec<AnchorDescriptor>,
    ) -> Self {
        Self {
            url,
            title,
            status_code,
            load_time,
            self_referencing: !anchor_details.is_empty(),
            anchor_details,
        }
    }

    pub fn load_time_ms(&self) -> u128 {
        self.load_time.as_millis()
    }

    pub fn joined_anchor_details(&self) -> String {
        itertools::join(self.anchor_details.iter(), ",")
    }
}
