//! # Address and message parsing
//!
//! Address extraction and validation for `MAIL FROM`/`RCPT TO`, plus the
//! bit of `mailparse` boilerplate the store needs to pull a subject out of a
//! finished message.

use std::sync::LazyLock;

use mailparse::{parse_headers, MailHeaderMap};
use regex::Regex;

const EMAIL_REGEX: &str = concat!(
    r#"^[A-Za-z0-9_\-\.\+]+"#,
    r#"@[A-Za-z0-9\-\.]+"#,
    r#"\.[A-Za-z]{2,}$"#
);

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(EMAIL_REGEX).expect("EMAIL_REGEX is a valid pattern")
});

/// Checks `localpart@domain.tld` syntax.
///
/// ```
/// # use maildrop::smtp::parse::validate_email;
/// assert!(validate_email("user@example.com"));
/// assert!(!validate_email("user@@bad"));
/// ```
pub fn validate_email(address: &str) -> bool {
    EMAIL.is_match(address)
}

/// Pulls the address out of the argument of `MAIL FROM:`/`RCPT TO:`.
///
/// The `<...>` form wins; otherwise the first bare token is taken. An
/// unterminated `<` yields `None`.
pub fn extract_address(argument: &str) -> Option<String> {
    let argument = argument.trim();

    if let Some(rest) = argument.strip_prefix('<') {
        let end = rest.find('>')?;
        return Some(rest[..end].trim().to_owned());
    }

    argument
        .split_whitespace()
        .next()
        .map(|token| token.to_owned())
}

/// Reads the `Subject` header of a finished message body, if any.
pub fn extract_subject(body: &[u8]) -> Option<String> {
    let (headers, _) = parse_headers(body).ok()?;
    headers
        .get_first_value("Subject")
        .map(|subject| subject.trim().to_owned())
        .filter(|subject| !subject.is_empty())
}
