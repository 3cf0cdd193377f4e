//! # Inbound byte sanitizing
//!
//! Everything a client sends goes through here before it is split into
//! lines. Only printable ASCII survives, plus the `\r\n` pairs the protocol
//! itself uses as line terminators. Bare `\r` or `\n` bytes are dropped so a
//! client can't smuggle a second command (or a fake reply) inside one line.

/// Printable ASCII, space included.
fn is_printable(byte: u8) -> bool {
    (0x20..=0x7e).contains(&byte)
}

/// Strips every byte that isn't printable ASCII or part of a `\r\n` pair.
///
/// ```
/// # use maildrop::smtp::sanitize::sanitize;
/// assert_eq!(sanitize(b"HELO a\r\n"), b"HELO a\r\n");
/// assert_eq!(sanitize(b"HE\x00LO\ta\rb\nc\r\n"), b"HELOabc\r\n");
/// ```
pub fn sanitize(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];
        if byte == b'\r' && data.get(i + 1) == Some(&b'\n') {
            out.extend_from_slice(b"\r\n");
            i += 2;
            continue;
        }
        if is_printable(byte) {
            out.push(byte);
        }
        i += 1;
    }

    out
}

/// Streaming version of [`sanitize`] for data that arrives in chunks.
///
/// A `\r` at the very end of a chunk may be the first half of a CRLF whose
/// `\n` is still in flight, so it is held back until the next chunk shows
/// up.
#[derive(Debug, Default)]
pub struct Sanitizer {
    pending_cr: bool,
}

impl Sanitizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitizes `chunk` and appends the result to `out`.
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<u8>) {
        let mut data = Vec::with_capacity(chunk.len() + 1);
        if self.pending_cr {
            data.push(b'\r');
        }
        data.extend_from_slice(chunk);

        self.pending_cr = data.last() == Some(&b'\r');
        if self.pending_cr {
            data.pop();
        }

        out.extend_from_slice(&sanitize(&data));
    }
}
