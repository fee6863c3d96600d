//! Strict `Content-Range` header parsing (§4.1).
//!
//! Two fixed forms are accepted: `bytes F-T/N` for chunk requests and
//! `bytes */N` for status requests. Neither parser is permissive — a
//! client that omits `total` is rejected outright, since accurate byte
//! accounting and orphan recovery depend on it.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::UploadError;

static CHUNK_RANGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^bytes (\d+)-(\d+)/(\d+)$").expect("valid regex"));

static STATUS_RANGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^bytes \*/(\d+)$").expect("valid regex"));

/// A parsed `Content-Range: bytes F-T/N` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub from: u64,
    pub to: u64,
    pub total: u64,
}

impl ContentRange {
    /// Parse the chunk form, `bytes F-T/N`.
    pub fn parse_chunk(header: &str) -> Result<Self, UploadError> {
        let caps = CHUNK_RANGE_RE
            .captures(header)
            .ok_or_else(|| UploadError::unparsable("Content-Range must match 'bytes F-T/N'"))?;
        let from = parse_u64(&caps[1])?;
        let to = parse_u64(&caps[2])?;
        let total = parse_u64(&caps[3])?;
        if from > to || to >= total {
            return Err(UploadError::unparsable(
                "Content-Range must satisfy from <= to < total",
            ));
        }
        Ok(Self { from, to, total })
    }

    /// Parse the status form, `bytes */N`, returning the announced total.
    pub fn parse_status_total(header: &str) -> Result<u64, UploadError> {
        let caps = STATUS_RANGE_RE
            .captures(header)
            .ok_or_else(|| UploadError::unparsable("Content-Range must match 'bytes */N'"))?;
        parse_u64(&caps[1])
    }

    /// Number of bytes this range spans, `to - from + 1`.
    pub fn body_len(&self) -> u64 {
        self.to - self.from + 1
    }

    /// Check that an actual body length matches the announced span.
    pub fn check_body_len(&self, actual: u64) -> Result<(), UploadError> {
        if actual != self.body_len() {
            return Err(UploadError::unparsable(format!(
                "Content-Range span {} does not match body length {actual}",
                self.body_len()
            )));
        }
        Ok(())
    }
}

fn parse_u64(raw: &str) -> Result<u64, UploadError> {
    raw.parse()
        .map_err(|_| UploadError::unparsable("Content-Range component overflowed u64"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_chunk_range() {
        let cr = ContentRange::parse_chunk("bytes 0-9/10").unwrap();
        assert_eq!(cr, ContentRange { from: 0, to: 9, total: 10 });
        assert_eq!(cr.body_len(), 10);
    }

    #[test]
    fn rejects_wildcard_in_chunk_form() {
        assert!(ContentRange::parse_chunk("bytes */10").is_err());
    }

    #[test]
    fn rejects_from_greater_than_to_or_to_past_total() {
        assert!(ContentRange::parse_chunk("bytes 5-2/10").is_err());
        assert!(ContentRange::parse_chunk("bytes 0-10/10").is_err());
    }

    #[test]
    fn rejects_missing_total() {
        assert!(ContentRange::parse_chunk("bytes 0-9").is_err());
    }

    #[test]
    fn parses_status_wildcard_form() {
        assert_eq!(ContentRange::parse_status_total("bytes */10").unwrap(), 10);
        assert!(ContentRange::parse_status_total("bytes 0-9/10").is_err());
    }

    #[test]
    fn check_body_len_matches_span() {
        let cr = ContentRange::parse_chunk("bytes 0-4/10").unwrap();
        assert!(cr.check_body_len(5).is_ok());
        assert!(cr.check_body_len(4).is_err());
    }
}
