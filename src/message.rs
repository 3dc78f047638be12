//! Message loading and deterministic ordering.
//!
//! Raw messages fetched from the server are parsed into [`ParsedEmail`]
//! views and sorted oldest-first. The ordering is correctness-critical, not
//! cosmetic: when several matching emails exist for one recipient, the most
//! recent one must be written to the store last so that it wins.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use mailparse::{parse_mail, MailHeaderMap};
use tracing::warn;

/// Derived view of one raw message.
///
/// Immutable once built; discarded after extraction. The raw bytes are kept
/// so the extractor can walk the MIME tree for an HTML part.
#[derive(Debug, Clone)]
pub struct ParsedEmail {
    /// Server-assigned UID of the message.
    pub uid: u32,
    /// Decoded subject (RFC 2047 words handled by the parser).
    pub subject: String,
    /// Raw `To` header value, if present. Matching is case-insensitive.
    pub recipient: Option<String>,
    /// Parsed `Date` header; `None` when missing or malformed.
    pub date: Option<DateTime<Utc>>,
    raw: Vec<u8>,
}

impl ParsedEmail {
    /// Parses a raw message into its derived view.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ParseEmail`] if the message structure is malformed.
    /// Callers skip such messages rather than failing the pass.
    pub fn parse(uid: u32, raw: Vec<u8>) -> Result<Self> {
        let (subject, recipient, date) = {
            let parsed = parse_mail(&raw).map_err(|source| Error::ParseEmail { uid, source })?;
            let subject = parsed
                .headers
                .get_first_value("Subject")
                .unwrap_or_default();
            let recipient = parsed.headers.get_first_value("To");
            let date = parsed
                .headers
                .get_first_value("Date")
                .and_then(|value| mailparse::dateparse(&value).ok())
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
            (subject, recipient, date)
        };

        Ok(Self {
            uid,
            subject,
            recipient,
            date,
            raw,
        })
    }

    /// Returns the raw message bytes.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

/// Parses fetched messages and orders them oldest-first.
///
/// Messages that fail to parse are logged and skipped - a single malformed
/// message never aborts the batch. A message whose date header is missing or
/// malformed is still included and sorts as earliest (stable, deterministic).
#[must_use]
pub fn build_ordered(fetched: Vec<(u32, Vec<u8>)>) -> Vec<ParsedEmail> {
    let mut messages = Vec::with_capacity(fetched.len());

    for (uid, raw) in fetched {
        match ParsedEmail::parse(uid, raw) {
            Ok(message) => messages.push(message),
            Err(e) => warn!(uid, error = %e, "Failed to parse email, skipping message"),
        }
    }

    // Undated messages sort as earliest; sort is stable so ties keep fetch order.
    messages.sort_by_key(|m| m.date.map_or(i64::MIN, |d| d.timestamp()));

    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_message(subject: &str, to: &str, date: Option<&str>) -> Vec<u8> {
        let date_header = date.map_or(String::new(), |d| format!("Date: {d}\r\n"));
        format!(
            "Subject: {subject}\r\nTo: {to}\r\nFrom: noreply@example.com\r\n{date_header}\r\n\
             body text\r\n"
        )
        .into_bytes()
    }

    #[test]
    fn test_parse_headers() {
        let raw = raw_message(
            "482913 is your verification code",
            "USER@Example.com",
            Some("Mon, 12 Aug 2024 10:00:00 +0000"),
        );
        let message = ParsedEmail::parse(7, raw).unwrap();

        assert_eq!(message.uid, 7);
        assert_eq!(message.subject, "482913 is your verification code");
        assert_eq!(message.recipient.as_deref(), Some("USER@Example.com"));
        assert!(message.date.is_some());
    }

    #[test]
    fn test_parse_encoded_subject() {
        // RFC 2047 encoded-word subjects are decoded by the parser.
        let raw = format!(
            "Subject: =?utf-8?B?{}?=\r\nTo: user@example.com\r\n\r\nbody\r\n",
            "NDgyOTEzIGlzIHlvdXIgdmVyaWZpY2F0aW9uIGNvZGU=" // "482913 is your verification code"
        )
        .into_bytes();
        let message = ParsedEmail::parse(1, raw).unwrap();
        assert_eq!(message.subject, "482913 is your verification code");
    }

    #[test]
    fn test_malformed_message_reports_uid() {
        // A header line with no colon is unparseable.
        let raw = b"Not A Header Line\r\n\r\nbody\r\n".to_vec();
        let err = ParsedEmail::parse(9, raw).unwrap_err();
        assert!(matches!(err, Error::ParseEmail { uid: 9, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_missing_date_is_none() {
        let raw = raw_message("hello", "user@example.com", None);
        let message = ParsedEmail::parse(1, raw).unwrap();
        assert!(message.date.is_none());

        let raw = raw_message("hello", "user@example.com", Some("not a date"));
        let message = ParsedEmail::parse(2, raw).unwrap();
        assert!(message.date.is_none());
    }

    #[test]
    fn test_ordering_oldest_first() {
        let newest = raw_message("c", "a@b.c", Some("Wed, 14 Aug 2024 10:00:00 +0000"));
        let oldest = raw_message("a", "a@b.c", Some("Mon, 12 Aug 2024 10:00:00 +0000"));
        let middle = raw_message("b", "a@b.c", Some("Tue, 13 Aug 2024 10:00:00 +0000"));

        // Server order is not chronological.
        let ordered = build_ordered(vec![(3, newest), (1, oldest), (2, middle)]);

        let subjects: Vec<&str> = ordered.iter().map(|m| m.subject.as_str()).collect();
        assert_eq!(subjects, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_undated_sorts_earliest() {
        let dated = raw_message("dated", "a@b.c", Some("Mon, 12 Aug 2024 10:00:00 +0000"));
        let undated = raw_message("undated", "a@b.c", None);

        let ordered = build_ordered(vec![(1, dated), (2, undated)]);

        assert_eq!(ordered[0].subject, "undated");
        assert_eq!(ordered[1].subject, "dated");
    }
}
