use std::{
    collections::HashSet,
    sync::LazyLock,
    time::{Duration, Instant},
};

use reqwest::{Client, Response};
use scraper::{Html, Selector};
use thiserror::Error;
use url::Url;

use crate::{
    configuration::AuditSettings,
    domain::page_report::{AnchorDescriptor, PageReport, MISSING_ANCHOR_TITLE},
};

const DEAD_HREF: &str = "#";

static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("title selector is valid"));
static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("anchor selector is valid"));

#[derive(Debug, Error)]
enum BodyError {
    #[error("response too large: {0} bytes")]
    TooLarge(u64),
    #[error("could not read body: {0}")]
    Read(#[from] reqwest::Error),
}

/// Fetches one page and derives its diagnostics. Never fails: transport and
/// body errors are folded into the returned report.
pub struct PageAuditor {
    client: Client,
    ignored_classes: HashSet<String>,
    max_body_bytes: usize,
}

impl PageAuditor {
    pub fn new(settings: &AuditSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.fetch_timeout_secs))
            .connect_timeout(Duration::from_secs(settings.fetch_timeout_secs))
            .user_agent(settings.user_agent.as_str())
            .build()?;

        Ok(PageAuditor {
            client,
            ignored_classes: settings.ignored_classes.iter().cloned().collect(),
            max_body_bytes: settings.max_body_bytes,
        })
    }

    pub async fn audit(&self, url: String) -> PageReport {
        if let Err(e) = Url::parse(&url) {
            log::error!("Invalid URL: {}, error: {}", url, e);
            return PageReport::fetch_failed(url);
        }

        let start = Instant::now();
        let response = match self.client.get(&url).send().await {
            Ok(res) => res,
            Err(e) => {
                log::error!("Error fetching URL: {}, error: {:?}", url, e);
                return PageReport::fetch_failed(url);
            }
        };
        let load_time = start.elapsed();
        let status_code = response.status().as_u16();

        let body = match self.read_body(response).await {
            Ok(body) => body,
            Err(e) => {
                log::error!("Error parsing HTML for URL: {}, error: {}", url, e);
                return PageReport::parse_failed(url, status_code, load_time);
            }
        };

        let analysis = analyze_html(&body, &self.ignored_classes);
        if !analysis.dead_anchors.is_empty() {
            log::info!(
                "Found {} self-referencing anchors on {}",
                analysis.dead_anchors.len(),
                url
            );
        }

        PageReport::analyzed(
            url,
            status_code,
            load_time,
            analysis.title,
            analysis.dead_anchors,
        )
    }

    /// Reads the body chunk by chunk so responses without a length are
    /// dropped as soon as they pass the cap.
    async fn read_body(&self, mut response: Response) -> Result<String, BodyError> {
        if let Some(content_length) = response.content_length() {
            if content_length > self.max_body_bytes as u64 {
                return Err(BodyError::TooLarge(content_length));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let read = body.len() + chunk.len();
            if read > self.max_body_bytes {
                return Err(BodyError::TooLarge(read as u64));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

#[derive(Debug, PartialEq)]
pub struct PageAnalysis {
    pub title: String,
    pub dead_anchors: Vec<AnchorDescriptor>,
}

/// Reads the first `<title>` and collects every `href="#"` anchor whose
/// `class` attribute, compared as a whole string, is not ignored.
pub fn analyze_html(html: &str, ignored_classes: &HashSet<String>) -> PageAnalysis {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|tag| tag.text().collect())
        .unwrap_or_default();

    let dead_anchors = document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|tag| {
            let element = tag.value();
            let href = element.attr("href").unwrap_or_default();
            let class = element.attr("class").unwrap_or_default();

            if href != DEAD_HREF || ignored_classes.contains(class) {
                return None;
            }

            Some(AnchorDescriptor {
                href: href.to_string(),
                class: class.to_string(),
                title: element
                    .attr("title")
                    .unwrap_or(MISSING_ANCHOR_TITLE)
                    .to_string(),
            })
        })
        .collect();

    PageAnalysis {
        title,
        dead_anchors,
    }
}
