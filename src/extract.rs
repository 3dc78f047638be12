//! Classification and payload extraction.
//!
//! Each ordered message is classified by case-insensitive subject substring,
//! in priority order: verification code first, then activation link. A message
//! matching neither rule yields no result, not an error.

use crate::message::ParsedEmail;
use mailparse::{parse_mail, ParsedMail};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Store-key suffix for verification codes.
pub const VERIFY_SUFFIX: &str = "-verify";

/// Store-key suffix for activation links.
pub const ACTIVATE_SUFFIX: &str = "-activate";

const VERIFICATION_SUBJECT: &str = "verification code";
const ACTIVATION_SUBJECT: &str = "activate your account";

/// Anchor href whose target starts with the known activation-domain prefix.
static ACTIVATION_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)href="(https://seller-us-accounts\.tiktok\.com/profile/activate-page[^"]+)""#,
    )
    .expect("valid regex")
});

/// Payload extracted from exactly one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// A one-time verification code.
    VerificationCode {
        /// Lower-cased recipient address.
        recipient: String,
        /// The code token.
        code: String,
    },
    /// An account-activation link.
    ActivationLink {
        /// Lower-cased recipient address.
        recipient: String,
        /// The entity-unescaped URL.
        url: String,
    },
}

impl Extraction {
    /// Returns the deterministic store key for this payload.
    #[must_use]
    pub fn store_key(&self) -> String {
        match self {
            Extraction::VerificationCode { recipient, .. } => {
                format!("{recipient}{VERIFY_SUFFIX}")
            }
            Extraction::ActivationLink { recipient, .. } => {
                format!("{recipient}{ACTIVATE_SUFFIX}")
            }
        }
    }

    /// Returns the payload text to store.
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Extraction::VerificationCode { code, .. } => code,
            Extraction::ActivationLink { url, .. } => url,
        }
    }

    /// Returns the kind name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Extraction::VerificationCode { .. } => "verification_code",
            Extraction::ActivationLink { .. } => "activation_link",
        }
    }
}

/// Classifies a message and extracts its payload, if any.
///
/// At most one result per message. A message with no `To` header is logged
/// and skipped - a store entry is never written with an empty key.
#[must_use]
pub fn extract(message: &ParsedEmail) -> Option<Extraction> {
    let subject_lower = message.subject.to_lowercase();

    if subject_lower.contains(VERIFICATION_SUBJECT) {
        let recipient = recipient(message)?;
        // The sender always places the code as the first word of the subject;
        // no further validation of code shape is performed.
        let Some(code) = message.subject.split_whitespace().next() else {
            warn!(uid = message.uid, "Verification subject is empty, skipping");
            return None;
        };
        debug!(uid = message.uid, recipient = %recipient, "Found verification email");
        Some(Extraction::VerificationCode {
            recipient,
            code: code.to_string(),
        })
    } else if subject_lower.contains(ACTIVATION_SUBJECT) {
        let recipient = recipient(message)?;
        let url = find_activation_link(message)?;
        debug!(uid = message.uid, recipient = %recipient, "Found activation email");
        Some(Extraction::ActivationLink { recipient, url })
    } else {
        None
    }
}

fn recipient(message: &ParsedEmail) -> Option<String> {
    match &message.recipient {
        Some(to) => Some(to.trim().to_lowercase()),
        None => {
            warn!(uid = message.uid, "Message has no To header, skipping");
            None
        }
    }
}

/// Walks the MIME tree for an HTML part containing an activation anchor.
///
/// Returns the entity-unescaped URL, or `None` when no HTML part matches.
fn find_activation_link(message: &ParsedEmail) -> Option<String> {
    let parsed = match parse_mail(message.raw()) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(uid = message.uid, error = %e, "Failed to re-parse email body, skipping");
            return None;
        }
    };

    find_in_part(&parsed)
}

fn find_in_part(part: &ParsedMail<'_>) -> Option<String> {
    if part.ctype.mimetype.eq_ignore_ascii_case("text/html") {
        if let Ok(body) = part.get_body() {
            if let Some(url) = ACTIVATION_LINK
                .captures(&body)
                .and_then(|caps| caps.get(1))
            {
                return Some(html_escape::decode_html_entities(url.as_str()).into_owned());
            }
        }
    }

    part.subparts.iter().find_map(find_in_part)
}
