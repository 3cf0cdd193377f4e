//! # Command lines
//!
//! Turns one CRLF-stripped line into a [`Command`]. Verbs are matched
//! case-insensitively, arguments keep their case.

use thiserror::Error;

use crate::smtp::parse::extract_address;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Helo(String),
    /// `None` when the path after `FROM:` holds no usable address.
    Mail(Option<String>),
    /// `None` when the path after `TO:` holds no usable address.
    Rcpt(Option<String>),
    Data,
    Rset,
    Noop,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Syntax error, command unrecognized")]
pub struct SyntaxError;

impl Command {
    pub fn parse(line: &str) -> Result<Command, SyntaxError> {
        let line = line.trim();
        let (verb, argument) = match line.find(' ') {
            Some(idx) => (&line[..idx], line[idx + 1..].trim()),
            None => (line, ""),
        };

        match verb.to_ascii_uppercase().as_str() {
            "HELO" => helo(argument),
            #[cfg(feature = "ehlo")]
            "EHLO" => helo(argument),
            "MAIL" => path_argument(argument, "FROM:").map(Command::Mail),
            "RCPT" => path_argument(argument, "TO:").map(Command::Rcpt),
            "DATA" => bare(argument, Command::Data),
            "RSET" => bare(argument, Command::Rset),
            "NOOP" => bare(argument, Command::Noop),
            "QUIT" => bare(argument, Command::Quit),
            _ => Err(SyntaxError),
        }
    }
}

fn helo(argument: &str) -> Result<Command, SyntaxError> {
    match argument.split_whitespace().next() {
        Some(domain) => Ok(Command::Helo(domain.to_owned())),
        None => Err(SyntaxError),
    }
}

fn bare(argument: &str, command: Command) -> Result<Command, SyntaxError> {
    if argument.is_empty() {
        Ok(command)
    } else {
        Err(SyntaxError)
    }
}

/// Strips the `FROM:`/`TO:` keyword and extracts the address behind it.
fn path_argument(
    argument: &str,
    keyword: &str,
) -> Result<Option<String>, SyntaxError> {
    match argument.get(..keyword.len()) {
        Some(head) if head.eq_ignore_ascii_case(keyword) => {
            Ok(extract_address(&argument[keyword.len()..]))
        }
        _ => Err(SyntaxError),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbs_are_case_insensitive() {
        assert_eq!(Command::parse("quit"), Ok(Command::Quit));
        assert_eq!(Command::parse("QuIt"), Ok(Command::Quit));
        assert_eq!(
            Command::parse("helo Client.Example"),
            Ok(Command::Helo("Client.Example".to_owned()))
        );
    }

    #[test]
    fn mail_and_rcpt_keep_address_case() {
        assert_eq!(
            Command::parse("mail from:<Alice@Example.com>"),
            Ok(Command::Mail(Some("Alice@Example.com".to_owned())))
        );
        assert_eq!(
            Command::parse("RCPT TO: <Bob@Example.com>"),
            Ok(Command::Rcpt(Some("Bob@Example.com".to_owned())))
        );
        assert_eq!(
            Command::parse("RCPT TO:bob@example.com"),
            Ok(Command::Rcpt(Some("bob@example.com".to_owned())))
        );
    }

    #[test]
    fn unusable_path_is_not_a_syntax_error() {
        assert_eq!(
            Command::parse("MAIL FROM:<x@y.com"),
            Ok(Command::Mail(None))
        );
        assert_eq!(Command::parse("RCPT TO:"), Ok(Command::Rcpt(None)));
    }

    #[test]
    fn malformed_commands_are_syntax_errors() {
        for line in [
            "",
            "HELO",
            "HELO   ",
            "MAIL",
            "MAIL TO:<x@y.com>",
            "RCPT FROM:<x@y.com>",
            "DATA now",
            "QUIT please",
            "VRFY user",
            "MAILFROM:<x@y.com>",
        ] {
            assert_eq!(Command::parse(line), Err(SyntaxError), "{:?}", line);
        }
    }

    #[cfg(not(feature = "ehlo"))]
    #[test]
    fn ehlo_is_unknown_without_feature() {
        assert_eq!(Command::parse("EHLO a"), Err(SyntaxError));
    }

    #[cfg(feature = "ehlo")]
    #[test]
    fn ehlo_is_helo_alias() {
        assert_eq!(
            Command::parse("EHLO a"),
            Ok(Command::Helo("a".to_owned()))
        );
    }
}
