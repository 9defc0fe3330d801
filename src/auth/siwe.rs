//! Sign-In with Ethereum (EIP-4361) messages.
//!
//! The server builds the message a wallet signs, and parses the exact text
//! that comes back. Parsing is strict: anything that does not follow the
//! EIP-4361 layout line for line is rejected.

use crate::auth::address::{AddressError, WalletAddress};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::iter::Peekable;
use std::str::{FromStr, Split};

/// Statement shown to the user in the wallet prompt.
pub const SIGN_IN_STATEMENT: &str = "Sign in to Should I?";

const HEADER_SUFFIX: &str = " wants you to sign in with your Ethereum account:";
const MIN_NONCE_LEN: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum SiweError {
    #[error("missing {0}")]
    Missing(&'static str),

    #[error("malformed header line")]
    InvalidHeader,

    #[error("invalid domain")]
    InvalidDomain,

    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("expected blank line")]
    ExpectedBlankLine,

    #[error("invalid URI")]
    InvalidUri,

    #[error("unsupported version: {0}")]
    UnsupportedVersion(String),

    #[error("invalid chain id")]
    InvalidChainId,

    #[error("nonce must be at least 8 alphanumeric characters")]
    InvalidNonce,

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("unexpected trailing content")]
    TrailingContent,

    #[error("domain mismatch: expected {expected}, got {actual}")]
    DomainMismatch { expected: String, actual: String },

    #[error("nonce mismatch")]
    NonceMismatch,

    #[error("message has expired")]
    Expired,

    #[error("message is not yet valid")]
    NotYetValid,
}

/// An RFC 3339 instant that remembers its original spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    raw: String,
    at: DateTime<Utc>,
}

impl Timestamp {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Timestamp {
            raw: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            at,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, SiweError> {
        let at = DateTime::parse_from_rfc3339(raw)
            .map_err(|_| SiweError::InvalidTimestamp(raw.to_string()))?
            .with_timezone(&Utc);
        Ok(Timestamp {
            raw: raw.to_string(),
            at,
        })
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A parsed EIP-4361 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiweMessage {
    pub scheme: Option<String>,
    pub domain: String,
    pub address: WalletAddress,
    pub statement: Option<String>,
    pub uri: String,
    pub version: String,
    pub chain_id: u64,
    pub nonce: String,
    pub issued_at: Timestamp,
    pub expiration_time: Option<Timestamp>,
    pub not_before: Option<Timestamp>,
    pub request_id: Option<String>,
    pub resources: Vec<String>,
}

/// Expectations a parsed message is checked against.
#[derive(Debug, Clone)]
pub struct VerifyOptions<'a> {
    pub domain: Option<&'a str>,
    pub nonce: Option<&'a str>,
    pub time: DateTime<Utc>,
}

impl SiweMessage {
    /// Build the canonical sign-in message for this app.
    ///
    /// `origin` and `domain` come from configuration so the message stays the
    /// same when the app runs inside a wallet's embedded browser.
    pub fn sign_in(
        address: WalletAddress,
        nonce: &str,
        origin: &str,
        domain: &str,
        chain_id: u64,
        now: DateTime<Utc>,
    ) -> Result<Self, SiweError> {
        if !is_valid_nonce(nonce) {
            return Err(SiweError::InvalidNonce);
        }
        Ok(SiweMessage {
            scheme: None,
            domain: domain.to_string(),
            address,
            statement: Some(SIGN_IN_STATEMENT.to_string()),
            uri: origin.to_string(),
            version: "1".to_string(),
            chain_id,
            nonce: nonce.to_string(),
            issued_at: Timestamp::from_datetime(now),
            expiration_time: None,
            not_before: None,
            request_id: None,
            resources: Vec::new(),
        })
    }

    /// Check domain binding, nonce and validity window.
    pub fn validate(&self, opts: &VerifyOptions<'_>) -> Result<(), SiweError> {
        if let Some(expected) = opts.domain {
            if !self.domain.eq_ignore_ascii_case(expected) {
                return Err(SiweError::DomainMismatch {
                    expected: expected.to_string(),
                    actual: self.domain.clone(),
                });
            }
        }

        if let Some(expected) = opts.nonce {
            if self.nonce != expected {
                return Err(SiweError::NonceMismatch);
            }
        }

        if let Some(expiration) = &self.expiration_time {
            if opts.time >= expiration.at() {
                return Err(SiweError::Expired);
            }
        }

        if let Some(not_before) = &self.not_before {
            if opts.time < not_before.at() {
                return Err(SiweError::NotYetValid);
            }
        }

        Ok(())
    }
}

impl fmt::Display for SiweMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scheme) = &self.scheme {
            write!(f, "{}://", scheme)?;
        }
        writeln!(f, "{}{}", self.domain, HEADER_SUFFIX)?;
        writeln!(f, "{}", self.address.to_checksum())?;
        writeln!(f)?;
        if let Some(statement) = &self.statement {
            writeln!(f, "{}", statement)?;
        }
        write!(
            f,
            "\nURI: {}\nVersion: {}\nChain ID: {}\nNonce: {}\nIssued At: {}",
            self.uri, self.version, self.chain_id, self.nonce, self.issued_at
        )?;
        if let Some(expiration) = &self.expiration_time {
            write!(f, "\nExpiration Time: {}", expiration)?;
        }
        if let Some(not_before) = &self.not_before {
            write!(f, "\nNot Before: {}", not_before)?;
        }
        if let Some(request_id) = &self.request_id {
            write!(f, "\nRequest ID: {}", request_id)?;
        }
        if !self.resources.is_empty() {
            write!(f, "\nResources:")?;
            for resource in &self.resources {
                write!(f, "\n- {}", resource)?;
            }
        }
        Ok(())
    }
}

type Lines<'a> = Peekable<Split<'a, char>>;

impl FromStr for SiweMessage {
    type Err = SiweError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lines: Lines<'_> = s.split('\n').peekable();

        let header = lines.next().ok_or(SiweError::Missing("header"))?;
        let authority = header
            .strip_suffix(HEADER_SUFFIX)
            .ok_or(SiweError::InvalidHeader)?;
        let (scheme, domain) = match authority.split_once("://") {
            Some((scheme, domain)) => {
                if !is_valid_scheme(scheme) {
                    return Err(SiweError::InvalidHeader);
                }
                (Some(scheme.to_string()), domain)
            }
            None => (None, authority),
        };
        if !is_valid_domain(domain) {
            return Err(SiweError::InvalidDomain);
        }

        let address = lines
            .next()
            .ok_or(SiweError::Missing("address"))?
            .parse::<WalletAddress>()?;
        expect_blank(&mut lines)?;

        // Either a statement followed by a blank line, or a second blank line
        let statement = match lines.next() {
            Some("") => None,
            Some(line) => {
                expect_blank(&mut lines)?;
                Some(line.to_string())
            }
            None => return Err(SiweError::Missing("URI")),
        };

        let uri = tagged(&mut lines, "URI")?;
        if !is_valid_uri(uri) {
            return Err(SiweError::InvalidUri);
        }

        let version = tagged(&mut lines, "Version")?;
        if version != "1" {
            return Err(SiweError::UnsupportedVersion(version.to_string()));
        }

        let chain_id = tagged(&mut lines, "Chain ID")?
            .parse::<u64>()
            .map_err(|_| SiweError::InvalidChainId)?;

        let nonce = tagged(&mut lines, "Nonce")?;
        if !is_valid_nonce(nonce) {
            return Err(SiweError::InvalidNonce);
        }

        let issued_at = Timestamp::parse(tagged(&mut lines, "Issued At")?)?;
        let expiration_time = optional_tagged(&mut lines, "Expiration Time")
            .map(Timestamp::parse)
            .transpose()?;
        let not_before = optional_tagged(&mut lines, "Not Before")
            .map(Timestamp::parse)
            .transpose()?;
        let request_id = optional_tagged(&mut lines, "Request ID").map(str::to_string);

        let mut resources = Vec::new();
        if lines.next_if_eq(&"Resources:").is_some() {
            while let Some(line) = lines.next_if(|line| line.starts_with("- ")) {
                let resource = &line[2..];
                if !is_valid_uri(resource) {
                    return Err(SiweError::InvalidUri);
                }
                resources.push(resource.to_string());
            }
        }

        // A single trailing newline is tolerated
        lines.next_if_eq(&"");
        if lines.next().is_some() {
            return Err(SiweError::TrailingContent);
        }

        Ok(SiweMessage {
            scheme,
            domain: domain.to_string(),
            address,
            statement,
            uri: uri.to_string(),
            version: version.to_string(),
            chain_id,
            nonce: nonce.to_string(),
            issued_at,
            expiration_time,
            not_before,
            request_id,
            resources,
        })
    }
}

fn expect_blank(lines: &mut Lines<'_>) -> Result<(), SiweError> {
    match lines.next() {
        Some("") => Ok(()),
        _ => Err(SiweError::ExpectedBlankLine),
    }
}

fn tagged<'a>(lines: &mut Lines<'a>, tag: &'static str) -> Result<&'a str, SiweError> {
    optional_tagged(lines, tag).ok_or(SiweError::Missing(tag))
}

fn optional_tagged<'a>(lines: &mut Lines<'a>, tag: &str) -> Option<&'a str> {
    let line: &'a str = lines.peek().copied()?;
    let value = line.strip_prefix(tag)?.strip_prefix(": ")?;
    lines.next();
    Some(value)
}

pub fn is_valid_nonce(nonce: &str) -> bool {
    nonce.len() >= MIN_NONCE_LEN && nonce.chars().all(|c| c.is_ascii_alphanumeric())
}

fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn is_valid_domain(domain: &str) -> bool {
    !domain.is_empty()
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-._~%!$&'()*+,;=:@[]".contains(c))
}

fn is_valid_uri(uri: &str) -> bool {
    match uri.split_once(':') {
        Some((scheme, rest)) => {
            is_valid_scheme(scheme) && !rest.is_empty() && !uri.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SPEC_EXAMPLE: &str = "service.invalid wants you to sign in with your Ethereum account:
0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2

I accept the ServiceOrg Terms of Service: https://service.invalid/tos

URI: https://service.invalid/login
Version: 1
Chain ID: 1
Nonce: 32891756
Issued At: 2021-09-30T16:25:24Z
Resources:
- ipfs://bafybeiemxf5abjwjbikoz4mc3a3dla6ual3jsgpdr4cjr3oz3evfyavhwq/
- https://example.com/my-web2-claim.json";

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, m, s).unwrap()
    }

    fn test_address() -> WalletAddress {
        "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf".parse().unwrap()
    }

    #[test]
    fn test_parse_eip4361_example() {
        let msg: SiweMessage = SPEC_EXAMPLE.parse().unwrap();
        assert_eq!(msg.scheme, None);
        assert_eq!(msg.domain, "service.invalid");
        assert_eq!(
            msg.address.to_checksum(),
            "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"
        );
        assert_eq!(
            msg.statement.as_deref(),
            Some("I accept the ServiceOrg Terms of Service: https://service.invalid/tos")
        );
        assert_eq!(msg.uri, "https://service.invalid/login");
        assert_eq!(msg.chain_id, 1);
        assert_eq!(msg.nonce, "32891756");
        assert_eq!(msg.resources.len(), 2);
        // Rendering reproduces the signed text byte for byte
        assert_eq!(msg.to_string(), SPEC_EXAMPLE);
    }

    #[test]
    fn test_sign_in_message_text() {
        let msg = SiweMessage::sign_in(
            test_address(),
            "0123456789abcdef0123456789abcdef",
            "https://shouldi.example.app",
            "shouldi.example.app",
            84532,
            at(12, 0, 0),
        )
        .unwrap();

        let expected = "shouldi.example.app wants you to sign in with your Ethereum account:
0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf

Sign in to Should I?

URI: https://shouldi.example.app
Version: 1
Chain ID: 84532
Nonce: 0123456789abcdef0123456789abcdef
Issued At: 2026-03-01T12:00:00.000Z";
        assert_eq!(msg.to_string(), expected);

        let reparsed: SiweMessage = expected.parse().unwrap();
        assert_eq!(reparsed, msg);
    }

    #[test]
    fn test_parse_without_statement_with_scheme_and_optionals() {
        let text = "https://example.app wants you to sign in with your Ethereum account:
0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf


URI: https://example.app
Version: 1
Chain ID: 8453
Nonce: abcdefgh1234
Issued At: 2026-03-01T12:00:00Z
Expiration Time: 2026-03-01T13:00:00Z
Not Before: 2026-03-01T11:00:00Z
Request ID: req-7
";
        let msg: SiweMessage = text.parse().unwrap();
        assert_eq!(msg.scheme.as_deref(), Some("https"));
        assert_eq!(msg.domain, "example.app");
        assert_eq!(msg.statement, None);
        assert_eq!(msg.chain_id, 8453);
        assert_eq!(msg.request_id.as_deref(), Some("req-7"));
        assert_eq!(msg.expiration_time.as_ref().unwrap().at(), at(13, 0, 0));
        assert_eq!(msg.not_before.as_ref().unwrap().at(), at(11, 0, 0));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let good = SiweMessage::sign_in(
            test_address(),
            "abcdefgh1234",
            "https://example.app",
            "example.app",
            1,
            at(12, 0, 0),
        )
        .unwrap()
        .to_string();

        let cases = [
            good.replace(" wants you to sign in", " wants to sign in"),
            good.replace("0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf", "0x7e5F"),
            good.replace("Version: 1", "Version: 2"),
            good.replace("Chain ID: 1", "Chain ID: one"),
            good.replace("Nonce: abcdefgh1234", "Nonce: short"),
            good.replace("Nonce: abcdefgh1234", "Nonce: has-dash-1234"),
            good.replace("Issued At: 2026-03-01T12:00:00.000Z", "Issued At: yesterday"),
            good.replace("URI: https://example.app", "URI: not a uri"),
            good.replace("\n\nURI:", "\nURI:"),
            format!("{}\nunexpected", good),
            String::new(),
        ];
        for case in cases {
            assert!(case.parse::<SiweMessage>().is_err(), "accepted: {case:?}");
        }
    }

    #[test]
    fn test_validate_domain_binding() {
        let msg = SiweMessage::sign_in(
            test_address(),
            "abcdefgh1234",
            "https://example.app",
            "example.app",
            1,
            at(12, 0, 0),
        )
        .unwrap();

        let ok = VerifyOptions {
            domain: Some("Example.App"),
            nonce: Some("abcdefgh1234"),
            time: at(12, 0, 1),
        };
        assert!(msg.validate(&ok).is_ok());

        let wrong_domain = VerifyOptions {
            domain: Some("evil.example"),
            ..ok.clone()
        };
        assert!(matches!(
            msg.validate(&wrong_domain),
            Err(SiweError::DomainMismatch { .. })
        ));

        let wrong_nonce = VerifyOptions {
            nonce: Some("zzzzzzzz9999"),
            ..ok
        };
        assert!(matches!(
            msg.validate(&wrong_nonce),
            Err(SiweError::NonceMismatch)
        ));
    }

    #[test]
    fn test_validate_time_window() {
        let mut msg = SiweMessage::sign_in(
            test_address(),
            "abcdefgh1234",
            "https://example.app",
            "example.app",
            1,
            at(12, 0, 0),
        )
        .unwrap();
        msg.expiration_time = Some(Timestamp::from_datetime(at(13, 0, 0)));
        msg.not_before = Some(Timestamp::from_datetime(at(11, 0, 0)));

        let opts = |time| VerifyOptions {
            domain: None,
            nonce: None,
            time,
        };
        assert!(msg.validate(&opts(at(12, 30, 0))).is_ok());
        assert!(msg.validate(&opts(at(11, 0, 0))).is_ok());
        assert!(matches!(
            msg.validate(&opts(at(13, 0, 0))),
            Err(SiweError::Expired)
        ));
        assert!(matches!(
            msg.validate(&opts(at(10, 59, 59))),
            Err(SiweError::NotYetValid)
        ));
    }

    #[test]
    fn test_sign_in_rejects_bad_nonce() {
        let result = SiweMessage::sign_in(
            test_address(),
            "bad nonce",
            "https://example.app",
            "example.app",
            1,
            at(12, 0, 0),
        );
        assert!(matches!(result, Err(SiweError::InvalidNonce)));
    }
}
