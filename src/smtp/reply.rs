//! # SMTP replies
//!
//! Every line the server writes back to a client is a [`Reply`]: a three
//! digit code and a short human readable text.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub text: String,
}

impl Reply {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }

    pub fn greeting(hostname: &str) -> Self {
        Self::new(220, format!("{} ESMTP Ready", hostname))
    }

    pub fn hello(client_domain: &str) -> Self {
        Self::new(250, format!("Hello {}", client_domain))
    }

    pub fn ok() -> Self {
        Self::new(250, "OK")
    }

    pub fn sender_ok() -> Self {
        Self::new(250, "Sender OK")
    }

    pub fn recipient_ok() -> Self {
        Self::new(250, "Recipient OK")
    }

    pub fn start_mail_input() -> Self {
        Self::new(354, "Start mail input; end with <CRLF>.<CRLF>")
    }

    pub fn accepted() -> Self {
        Self::new(250, "Message accepted for delivery")
    }

    pub fn rejected_as_spam() -> Self {
        Self::new(554, "Message rejected as spam")
    }

    pub fn invalid_sender() -> Self {
        Self::new(550, "Invalid sender")
    }

    pub fn invalid_recipient() -> Self {
        Self::new(550, "Invalid recipient")
    }

    pub fn bye() -> Self {
        Self::new(221, "Bye")
    }

    pub fn syntax_error() -> Self {
        Self::new(500, "Syntax error, command unrecognized")
    }

    pub fn line_too_long() -> Self {
        Self::new(500, "Line too long")
    }

    pub fn message_too_big() -> Self {
        Self::new(552, "Message size exceeds fixed maximum")
    }

    pub fn timeout(hostname: &str) -> Self {
        Self::new(421, format!("{} Timeout, closing connection", hostname))
    }

    /// Wire form, CRLF included.
    pub fn to_wire(&self) -> String {
        format!("{}\r\n", self)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.text)
    }
}
