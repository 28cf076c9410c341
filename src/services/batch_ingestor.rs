use std::io::{Seek, SeekFrom, Write};

use crate::{configuration::AuditSettings, error::AuditError};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Decodes an uploaded CSV batch into the ordered list of URLs to audit.
/// Only the first column of each record is read; bytes in it that are not
/// UTF-8 become U+FFFD and the URL is left for the fetch to judge.
pub struct BatchIngestor {
    max_bytes: usize,
    max_urls: usize,
}

impl BatchIngestor {
    pub fn new(max_bytes: usize, max_urls: usize) -> Self {
        BatchIngestor {
            max_bytes,
            max_urls,
        }
    }

    pub fn from_settings(settings: &AuditSettings) -> Self {
        Self::new(settings.max_batch_bytes, settings.max_batch_urls)
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn ingest(&self, raw: &[u8]) -> Result<Vec<String>, AuditError> {
        if raw.len() > self.max_bytes {
            return Err(AuditError::input_decode(
                0,
                format!("batch is {} bytes, limit is {}", raw.len(), self.max_bytes),
            ));
        }

        let raw = raw.strip_prefix(UTF8_BOM).unwrap_or(raw);
        check_quoting(raw)?;

        // Anonymous temp file, removed by the OS once dropped
        let mut spool = tempfile::tempfile()?;
        spool.write_all(raw)?;
        spool.seek(SeekFrom::Start(0))?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(spool);

        let mut urls = Vec::new();
        for result in reader.byte_records() {
            let record = result.map_err(|e| {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                AuditError::input_decode(line, e.to_string())
            })?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            // other columns are never decoded, so their encoding does not matter
            let url = record
                .get(0)
                .map(|field| normalize_url(&String::from_utf8_lossy(field)))
                .unwrap_or_default();
            if url.is_empty() {
                log::debug!("Empty URL found on line {}, skipping", line);
                continue;
            }

            if urls.len() == self.max_urls {
                return Err(AuditError::input_decode(
                    line,
                    format!("batch has more than {} URLs", self.max_urls),
                ));
            }
            urls.push(url);
        }

        log::info!("Ingested batch of {} URLs", urls.len());
        Ok(urls)
    }
}

pub fn normalize_url(field: &str) -> String {
    field
        .trim()
        .trim_start_matches('\u{feff}')
        .trim()
        .to_string()
}

#[derive(Clone, Copy)]
enum FieldState {
    Start,
    Unquoted,
    Quoted,
    QuoteInQuoted,
    AfterClosingQuote,
}

/// The csv reader accepts stray and unterminated quotes silently, so
/// quoting is validated up front.
fn check_quoting(raw: &[u8]) -> Result<(), AuditError> {
    let mut state = FieldState::Start;
    let mut line: u64 = 1;
    let mut quote_opened_on = 1;

    for &byte in raw {
        state = match (state, byte) {
            (FieldState::Start, b'"') => {
                quote_opened_on = line;
                FieldState::Quoted
            }
            (FieldState::Unquoted, b'"') => {
                return Err(AuditError::input_decode(line, "bare \" in non-quoted field"));
            }
            (FieldState::Start | FieldState::Unquoted, b',') => FieldState::Start,
            (FieldState::Start | FieldState::Unquoted, b'\n') => {
                line += 1;
                FieldState::Start
            }
            (FieldState::Start | FieldState::Unquoted, _) => FieldState::Unquoted,
            (FieldState::Quoted, b'"') => FieldState::QuoteInQuoted,
            (FieldState::Quoted, b'\n') => {
                line += 1;
                FieldState::Quoted
            }
            (FieldState::Quoted, _) => FieldState::Quoted,
            (FieldState::QuoteInQuoted, b'"') => FieldState::Quoted,
            (FieldState::QuoteInQuoted | FieldState::AfterClosingQuote, b',') => FieldState::Start,
            (FieldState::QuoteInQuoted | FieldState::AfterClosingQuote, b'\n') => {
                line += 1;
                FieldState::Start
            }
            (FieldState::QuoteInQuoted | FieldState::AfterClosingQuote, b'\r') => {
                FieldState::AfterClosingQuote
            }
            (FieldState::QuoteInQuoted | FieldState::AfterClosingQuote, _) => {
                return Err(AuditError::input_decode(
                    line,
                    "extraneous or missing \" in quoted field",
                ));
            }
        };
    }

    match state {
        FieldState::Quoted => Err(AuditError::input_decode(
            quote_opened_on,
            "unterminated quoted field",
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_url, BatchIngestor};
    use crate::error::AuditError;

    fn ingestor() -> BatchIngestor {
        BatchIngestor::new(1024 * 1024, 100)
    }

    #[test]
    fn normalize_strips_bom_and_whitespace() {
        assert_eq!(normalize_url("\u{feff}http://a.test"), "http://a.test");
        assert_eq!(normalize_url("  http://a.test \t"), "http://a.test");
        assert_eq!(normalize_url(" \u{feff} http://a.test"), "http://a.test");
        assert_eq!(normalize_url("   "), "");
    }

    #[test]
    fn bom_and_blank_lines_are_dropped() {
        let raw = "\u{feff}http://a.test\n\n   \nhttp://b.test\n";

        let urls = ingestor().ingest(raw.as_bytes()).unwrap();

        assert_eq!(urls, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn only_first_column_is_kept() {
        let raw = "http://a.test,Expected title,42\r\nhttp://b.test\r\n,orphan\r\n";

        let urls = ingestor().ingest(raw.as_bytes()).unwrap();

        assert_eq!(urls, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn quoted_fields_are_unescaped() {
        let raw = "\"http://a.test/?q=\"\"x\"\"\",extra\n\"http://b.test\"\r\n";

        let urls = ingestor().ingest(raw.as_bytes()).unwrap();

        assert_eq!(urls, vec!["http://a.test/?q=\"x\"", "http://b.test"]);
    }

    #[test]
    fn unterminated_quote_is_rejected() {
        let raw = "http://a.test\n\"http://b.test\nhttp://c.test\n";

        let err = ingestor().ingest(raw.as_bytes()).unwrap_err();

        match err {
            AuditError::InputDecode { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn bare_quote_is_rejected() {
        let err = ingestor().ingest(b"http://a.test/\"oops\n").unwrap_err();

        assert!(matches!(err, AuditError::InputDecode { line: 1, .. }));
    }

    #[test]
    fn text_after_closing_quote_is_rejected() {
        let err = ingestor()
            .ingest(b"http://a.test\n\"http://b.test\"x\n")
            .unwrap_err();

        assert!(matches!(err, AuditError::InputDecode { line: 2, .. }));
    }

    #[test]
    fn limits_are_enforced() {
        let too_many = BatchIngestor::new(1024, 2)
            .ingest(b"http://a.test\nhttp://b.test\nhttp://c.test\n")
            .unwrap_err();
        let too_big = BatchIngestor::new(8, 100)
            .ingest(b"http://a.test\n")
            .unwrap_err();

        assert!(matches!(too_many, AuditError::InputDecode { .. }));
        assert!(matches!(too_big, AuditError::InputDecode { line: 0, .. }));
    }

    #[test]
    fn latin1_in_other_columns_is_accepted() {
        let urls = ingestor()
            .ingest(b"http://a.test,Caf\xe9\nhttp://b.test\n")
            .unwrap();

        assert_eq!(urls, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn invalid_utf8_in_url_is_replaced() {
        let urls = ingestor()
            .ingest(b"http://a.test/caf\xe9\n\xff\xfe\n")
            .unwrap();

        assert_eq!(urls, vec!["http://a.test/caf\u{fffd}", "\u{fffd}\u{fffd}"]);
    }
}
