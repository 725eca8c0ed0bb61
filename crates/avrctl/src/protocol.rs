//! Wire framing for the receiver control protocol.
//!
//! The receiver speaks free-text ASCII lines. Status lines arriving from
//! the unit are terminated with a bare carriage return (`\r`); commands
//! sent to it are terminated with `\r\n`. A status line is a command code
//! immediately followed by its payload with no delimiter (`MV505`,
//! `PWSTANDBY`, `Z2CD`), so payload extraction is prefix-stripping, not
//! splitting -- that part lives in [`crate::commands`]. This module only
//! handles bytes-to-lines framing and line-to-bytes assembly.
//!
//! Inbound TCP chunks carry zero, one, or several status lines, and a line
//! may span two chunks, so [`LineSplitter`] buffers across reads.

use bytes::{BufMut, BytesMut};

/// Terminator of status lines received from the unit.
pub const RECV_TERMINATOR: u8 = b'\r';

/// Terminator appended to every command sent to the unit.
pub const SEND_TERMINATOR: &str = "\r\n";

/// Maximum reassembly buffer size before reset.
///
/// Status lines are 3-15 bytes; a buffer this large means the peer is not
/// actually speaking the protocol, and resynchronizing beats growing
/// without bound.
const MAX_BUF: usize = 8192;

/// Frame a command line for transmission.
///
/// Appends the CR+LF send terminator. The line itself may contain an
/// embedded `\r` -- the compound volume-set command is two protocol lines
/// delivered in a single write.
///
/// # Example
///
/// ```
/// use avrctl::protocol::frame;
///
/// assert_eq!(frame("PW?"), b"PW?\r\n");
/// assert_eq!(frame("MV40\rMVMAX 98"), b"MV40\rMVMAX 98\r\n");
/// ```
pub fn frame(line: &str) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(line.len() + SEND_TERMINATOR.len());
    buf.put_slice(line.as_bytes());
    buf.put_slice(SEND_TERMINATOR.as_bytes());
    buf.to_vec()
}

/// Reassembles raw inbound byte chunks into complete status lines.
///
/// Splits on the carriage-return terminator, tolerates stray line feeds
/// (some firmware revisions echo CRLF), and drops empty lines. One
/// splitter instance belongs to one connection; a reconnect gets a fresh
/// one so partial data from a dead link can never prefix a new line.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: Vec<u8>,
}

impl LineSplitter {
    /// Create an empty splitter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a raw chunk of received bytes into the splitter.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
        if self.buf.len() > MAX_BUF {
            tracing::warn!(len = self.buf.len(), "line buffer overflow, resetting");
            self.buf.clear();
        }
    }

    /// Pop the next complete line, if one is buffered.
    ///
    /// Returns lines in arrival order. Empty lines are skipped. Bytes that
    /// do not yet form a complete line stay buffered for the next read.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let pos = self.buf.iter().position(|&b| b == RECV_TERMINATOR)?;
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1])
                .trim()
                .to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }

    /// Number of buffered bytes not yet forming a complete line.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(splitter: &mut LineSplitter) -> Vec<String> {
        std::iter::from_fn(|| splitter.next_line()).collect()
    }

    #[test]
    fn frame_appends_crlf() {
        assert_eq!(frame("PW?"), b"PW?\r\n");
        assert_eq!(frame("Z2MUOFF"), b"Z2MUOFF\r\n");
    }

    #[test]
    fn frame_preserves_embedded_cr() {
        // The compound volume set is two protocol lines in one write.
        assert_eq!(frame("Z2MV40\rZ2MVMAX 98"), b"Z2MV40\rZ2MVMAX 98\r\n");
    }

    #[test]
    fn single_line_in_one_chunk() {
        let mut s = LineSplitter::new();
        s.push(b"PWON\r");
        assert_eq!(drain(&mut s), vec!["PWON"]);
    }

    #[test]
    fn multiple_lines_in_one_chunk_preserve_order() {
        let mut s = LineSplitter::new();
        s.push(b"PWON\rMV505\rSICD\r");
        assert_eq!(drain(&mut s), vec!["PWON", "MV505", "SICD"]);
    }

    #[test]
    fn line_spanning_chunks() {
        let mut s = LineSplitter::new();
        s.push(b"MV5");
        assert_eq!(s.next_line(), None);
        assert_eq!(s.pending(), 3);
        s.push(b"05\r");
        assert_eq!(drain(&mut s), vec!["MV505"]);
        assert_eq!(s.pending(), 0);
    }

    #[test]
    fn empty_lines_are_dropped() {
        let mut s = LineSplitter::new();
        s.push(b"\r\rPWON\r\r");
        assert_eq!(drain(&mut s), vec!["PWON"]);
    }

    #[test]
    fn stray_line_feeds_are_tolerated() {
        // CRLF echo firmware: the LF lands at the start of the next line.
        let mut s = LineSplitter::new();
        s.push(b"PWON\r\nMV505\r\n");
        assert_eq!(drain(&mut s), vec!["PWON", "MV505"]);
    }

    #[test]
    fn incomplete_tail_stays_buffered() {
        let mut s = LineSplitter::new();
        s.push(b"PWON\rMV50");
        assert_eq!(s.next_line(), Some("PWON".to_string()));
        assert_eq!(s.next_line(), None);
        s.push(b"5\r");
        assert_eq!(s.next_line(), Some("MV505".to_string()));
    }

    #[test]
    fn overflow_resets_buffer() {
        let mut s = LineSplitter::new();
        s.push(&vec![b'A'; MAX_BUF + 1]);
        assert_eq!(s.pending(), 0);
        // Still usable after the reset.
        s.push(b"PWON\r");
        assert_eq!(drain(&mut s), vec!["PWON"]);
    }

    #[test]
    fn non_utf8_bytes_are_replaced_not_fatal() {
        let mut s = LineSplitter::new();
        s.push(&[0xFF, 0xFE, b'\r', b'P', b'W', b'O', b'N', b'\r']);
        let lines = drain(&mut s);
        // The garbage line decodes lossily; the real line still comes out.
        assert_eq!(lines.last().unwrap(), "PWON");
    }
}
