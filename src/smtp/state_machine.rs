//! # SMTP session state machine
//!
//! The protocol side of a connection, without any I/O. Bytes read from the
//! socket are [`Session::feed`]ed in, and [`Session::poll`] hands back one
//! [`Action`] per complete line until more bytes are needed.
//!
//! ```text
//!   Init --HELO--> Greeted --MAIL--> SenderSet --RCPT--> RecipientSet
//!                                        ^                    |
//!                                        |                  DATA
//!                                        |                    v
//!                                        +---<CRLF>.<CRLF>-- Collecting
//! ```

use tracing::debug;

use crate::smtp::command::Command;
use crate::smtp::parse::validate_email;
use crate::smtp::reply::Reply;
use crate::smtp::sanitize::Sanitizer;
use crate::store::Email;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Greeted,
    SenderSet,
    RecipientSet,
    Collecting,
}

/// What the connection driver has to do after a line was processed.
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    Reply(Reply),
    /// Send the reply, then close the connection.
    Close(Reply),
    /// A full message body arrived. The driver classifies and stores it,
    /// then answers with [`Delivery::reply`].
    Deliver(Email),
    /// A body line was absorbed; nothing to send.
    Continue,
}

/// Outcome of handing a finished message to the spam oracle and the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Accepted,
    RejectedAsSpam,
}

impl Delivery {
    pub fn reply(self) -> Reply {
        match self {
            Delivery::Accepted => Reply::accepted(),
            Delivery::RejectedAsSpam => Reply::rejected_as_spam(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Longest accepted line, CRLF included.
    pub max_line_length: usize,
    /// Largest accepted message body, after dot-unstuffing.
    pub max_message_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_line_length: 512,
            max_message_size: 10 * 1024 * 1024,
        }
    }
}

/// DATA payload collected so far.
#[derive(Debug)]
struct PendingMessage {
    body: Vec<u8>,
    size: usize,
    overflowed: bool,
    at_line_start: bool,
}

impl PendingMessage {
    fn new() -> Self {
        Self {
            body: Vec::new(),
            size: 0,
            overflowed: false,
            at_line_start: true,
        }
    }

    fn push(&mut self, bytes: &[u8], max_size: usize) {
        self.size += bytes.len();
        if self.size > max_size {
            if !self.overflowed {
                self.overflowed = true;
                self.body = Vec::new();
            }
            return;
        }
        self.body.extend_from_slice(bytes);
    }

    /// Undoes dot-stuffing on a chunk that starts at a line start.
    fn unstuff(chunk: &[u8]) -> &[u8] {
        match chunk.first() {
            Some(b'.') => &chunk[1..],
            _ => chunk,
        }
    }
}

/// Per-connection protocol state.
#[derive(Debug)]
pub struct Session {
    state: State,
    sender: Option<String>,
    recipient: Option<String>,
    client_domain: Option<String>,
    inbound: Vec<u8>,
    sanitizer: Sanitizer,
    pending: Option<PendingMessage>,
    /// Set while the rest of an overlong command line is being dropped.
    discarding: bool,
    limits: Limits,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Limits::default())
    }
}

impl Session {
    pub fn new(limits: Limits) -> Self {
        Self {
            state: State::Init,
            sender: None,
            recipient: None,
            client_domain: None,
            inbound: Vec::new(),
            sanitizer: Sanitizer::new(),
            pending: None,
            discarding: false,
            limits,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    pub fn recipient(&self) -> Option<&str> {
        self.recipient.as_deref()
    }

    pub fn client_domain(&self) -> Option<&str> {
        self.client_domain.as_deref()
    }

    /// Sanitizes freshly read bytes into the inbound buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.sanitizer.feed(bytes, &mut self.inbound);
    }

    /// Processes the next complete line, if there is one.
    pub fn poll(&mut self) -> Option<Action> {
        let Some(idx) = find_crlf(&self.inbound) else {
            return self.poll_partial();
        };

        let mut line: Vec<u8> = self.inbound.drain(..idx + 2).collect();
        line.truncate(idx);

        if self.state == State::Collecting {
            return Some(self.collect_line(&line));
        }

        if self.discarding {
            self.discarding = false;
            return Some(Action::Reply(Reply::line_too_long()));
        }

        if line.len() + 2 > self.limits.max_line_length {
            return Some(Action::Reply(Reply::line_too_long()));
        }

        // Sanitized input is plain ASCII, so this never actually replaces.
        let line = String::from_utf8_lossy(&line);
        Some(self.process_command(&line))
    }

    /// No CRLF in sight: keep waiting unless the buffer outgrew a line.
    fn poll_partial(&mut self) -> Option<Action> {
        if self.inbound.len() <= self.limits.max_line_length {
            return None;
        }

        if self.state == State::Collecting {
            let fragment: Vec<u8> = self.inbound.drain(..).collect();
            self.collect_fragment(&fragment);
            return Some(Action::Continue);
        }

        debug!("Discarding overlong command line");
        self.inbound.clear();
        self.discarding = true;
        None
    }

    fn process_command(&mut self, line: &str) -> Action {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(_) => {
                debug!("Unrecognized command in {:?}: {}", self.state, line);
                return Action::Reply(Reply::syntax_error());
            }
        };

        match (self.state, command) {
            (_, Command::Quit) => Action::Close(Reply::bye()),
            (_, Command::Noop) => Action::Reply(Reply::ok()),
            (_, Command::Rset) => {
                self.reset_transaction();
                if self.state != State::Init {
                    self.state = State::Greeted;
                }
                Action::Reply(Reply::ok())
            }
            (State::Init, Command::Helo(domain)) => {
                let reply = Reply::hello(&domain);
                self.client_domain = Some(domain);
                self.state = State::Greeted;
                Action::Reply(reply)
            }
            (State::Greeted, Command::Mail(address)) => {
                match address.filter(|a| validate_email(a)) {
                    Some(address) => {
                        self.sender = Some(address);
                        self.state = State::SenderSet;
                        Action::Reply(Reply::sender_ok())
                    }
                    None => Action::Reply(Reply::invalid_sender()),
                }
            }
            (State::SenderSet, Command::Rcpt(address)) => {
                match address.filter(|a| validate_email(a)) {
                    Some(address) => {
                        self.recipient = Some(address);
                        self.state = State::RecipientSet;
                        Action::Reply(Reply::recipient_ok())
                    }
                    None => Action::Reply(Reply::invalid_recipient()),
                }
            }
            (State::RecipientSet, Command::Data) => {
                self.pending = Some(PendingMessage::new());
                self.state = State::Collecting;
                Action::Reply(Reply::start_mail_input())
            }
            (state, command) => {
                debug!("{:?} is out of sequence in {:?}", command, state);
                Action::Reply(Reply::syntax_error())
            }
        }
    }

    fn collect_line(&mut self, line: &[u8]) -> Action {
        let at_line_start =
            self.pending.as_ref().map_or(true, |p| p.at_line_start);
        if at_line_start && line == b"." {
            return self.end_of_data();
        }

        let max_size = self.limits.max_message_size;
        let pending = self.pending.get_or_insert_with(PendingMessage::new);
        let content = if at_line_start {
            PendingMessage::unstuff(line)
        } else {
            line
        };
        pending.push(content, max_size);
        pending.push(b"\r\n", max_size);
        pending.at_line_start = true;

        Action::Continue
    }

    fn collect_fragment(&mut self, fragment: &[u8]) {
        let max_size = self.limits.max_message_size;
        let pending = self.pending.get_or_insert_with(PendingMessage::new);
        let content = if pending.at_line_start {
            PendingMessage::unstuff(fragment)
        } else {
            fragment
        };
        pending.push(content, max_size);
        pending.at_line_start = false;
    }

    /// Terminator seen: back to `SenderSet` whatever happens next.
    fn end_of_data(&mut self) -> Action {
        let pending = self.pending.take();
        let recipient = self.recipient.take();
        self.state = State::SenderSet;

        let Some(pending) = pending else {
            return Action::Reply(Reply::syntax_error());
        };
        if pending.overflowed {
            debug!("Message of {} bytes dropped", pending.size);
            return Action::Reply(Reply::message_too_big());
        }

        match (self.sender.clone(), recipient) {
            (Some(sender), Some(recipient)) => Action::Deliver(Email {
                sender,
                recipient,
                body: pending.body,
            }),
            _ => Action::Reply(Reply::syntax_error()),
        }
    }

    fn reset_transaction(&mut self) {
        self.sender = None;
        self.recipient = None;
        self.pending = None;
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}
