//! Ping protocol parser.

use bytes::BytesMut;

/// Parsed ping command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// Simple ping (no message).
    Ping,
    /// Ping with a message to echo back.
    PingMsg(&'a [u8]),
    /// Quit command.
    Quit,
}

/// Parse result.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseResult<'a> {
    /// Successfully parsed command with bytes consumed.
    Complete(Command<'a>, usize),
    /// Need more data.
    Incomplete,
    /// Unknown command; the line (this many bytes) must be skipped.
    Error(usize),
}

/// Parse one ping protocol command from the front of the input buffer.
pub fn parse(input: &[u8]) -> ParseResult<'_> {
    let Some(line_end) = find_crlf(input) else {
        return ParseResult::Incomplete;
    };

    let line = &input[..line_end];
    let consumed = line_end + 2; // include \r\n

    // Parse command (case-insensitive)
    if line.eq_ignore_ascii_case(b"PING") {
        ParseResult::Complete(Command::Ping, consumed)
    } else if line.eq_ignore_ascii_case(b"QUIT") {
        ParseResult::Complete(Command::Quit, consumed)
    } else if line.len() > 5 && line[..5].eq_ignore_ascii_case(b"PING ") {
        ParseResult::Complete(Command::PingMsg(&line[5..]), consumed)
    } else {
        ParseResult::Error(consumed)
    }
}

pub fn response_pong(output: &mut BytesMut) {
    output.extend_from_slice(b"PONG\r\n");
}

pub fn response_pong_msg(msg: &[u8], output: &mut BytesMut) {
    output.reserve(5 + msg.len() + 2);
    output.extend_from_slice(b"PONG ");
    output.extend_from_slice(msg);
    output.extend_from_slice(b"\r\n");
}

pub fn response_ok(output: &mut BytesMut) {
    output.extend_from_slice(b"OK\r\n");
}

pub fn response_error(output: &mut BytesMut) {
    output.extend_from_slice(b"ERROR unknown command\r\n");
}

/// Find \r\n in buffer, returning the position of \r.
fn find_crlf(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\r\n")
}
