//! Line-oriented parser for the response header block of the image download.
//!
//! Only the status code and the two fields the writer needs are extracted;
//! every other header is skipped. The reader is left positioned at the first
//! byte of the body when the block ends with the blank line.

use std::io::{self, BufRead, Read};

/// The only content type accepted for an image body.
pub const OCTET_STREAM: &str = "application/octet-stream";

const STATUS_PREFIX: &str = "HTTP/1.1";
/// Longest header line accepted, terminator included
pub const MAX_LINE_LEN: u64 = 1024;
const CONTENT_LENGTH: &str = "Content-Length: ";
const CONTENT_TYPE: &str = "Content-Type: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResponseHeaders {
    /// Three-digit status code, `None` when the status line was unusable
    pub status: Option<u16>,
    /// Declared body length, 0 when absent or not numeric
    pub content_length: usize,
    /// `Content-Type` was exactly `application/octet-stream`
    pub content_type_valid: bool,
}

impl ResponseHeaders {
    pub fn status_ok(&self) -> bool {
        self.status == Some(200)
    }

    /// Non-zero length with the octet-stream content type.
    pub fn has_usable_content(&self) -> bool {
        self.content_length > 0 && self.content_type_valid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    StatusLine,
    Fields,
}

/// Consume the header block from `reader`.
///
/// Stops right after the blank line, or right after the status line when the
/// status is anything but 200. Fails when the stream errors or closes before
/// the block is complete, or when a line runs past [`MAX_LINE_LEN`].
pub fn parse_headers<R: BufRead + ?Sized>(reader: &mut R) -> io::Result<ResponseHeaders> {
    let mut headers = ResponseHeaders::default();
    let mut state = ParseState::StatusLine;
    let mut raw = Vec::with_capacity(128);

    loop {
        raw.clear();
        let n = (&mut *reader).take(MAX_LINE_LEN).read_until(b'\n', &mut raw)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before the end of the headers",
            ));
        }
        if n as u64 == MAX_LINE_LEN && raw.last() != Some(&b'\n') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("header line longer than {} bytes", MAX_LINE_LEN),
            ));
        }

        let line = String::from_utf8_lossy(&raw);
        let line = line.trim();

        if line.is_empty() {
            // Header/body boundary
            return Ok(headers);
        }

        match state {
            ParseState::StatusLine => {
                headers.status = parse_status_line(line);
                if !headers.status_ok() {
                    log::debug!("Got a non 200 status line from server: {:?}", line);
                    return Ok(headers);
                }
                state = ParseState::Fields;
            }
            ParseState::Fields => {
                if let Some(value) = header_value(line, CONTENT_LENGTH) {
                    headers.content_length = value.trim().parse().unwrap_or(0);
                    log::info!("Got {} bytes from server", headers.content_length);
                } else if let Some(value) = header_value(line, CONTENT_TYPE) {
                    log::info!("Got {} payload", value);
                    headers.content_type_valid = value == OCTET_STREAM;
                }
            }
        }
    }
}

fn parse_status_line(line: &str) -> Option<u16> {
    if !line.starts_with(STATUS_PREFIX) {
        return None;
    }

    let code = line.split_whitespace().nth(1)?;
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    code.parse().ok()
}

/// Case-insensitive match of a fixed `Name: ` prefix. Lines shorter than the
/// prefix never match.
fn header_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let prefix = line.as_bytes().get(..name.len())?;
    if prefix.eq_ignore_ascii_case(name.as_bytes()) {
        line.get(name.len()..)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor, Read};

    #[test]
    fn test_full_block_leaves_reader_at_body() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 1024\r\nContent-Type: application/octet-stream\r\n\r\n<body>";
        let mut reader = Cursor::new(&raw[..]);

        let headers = parse_headers(&mut reader).unwrap();
        assert!(headers.status_ok());
        assert_eq!(headers.content_length, 1024);
        assert!(headers.content_type_valid);

        let mut rest = String::new();
        reader.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "<body>");
    }

    #[test]
    fn test_lf_only_and_mixed_case_names() {
        let raw = b"HTTP/1.1 200 OK\ncontent-length: 12\nCONTENT-TYPE: application/octet-stream\n\nabc";
        let mut reader = BufReader::with_capacity(4, &raw[..]);

        let headers = parse_headers(&mut reader).unwrap();
        assert_eq!(headers.content_length, 12);
        assert!(headers.content_type_valid);

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"abc");
    }

    #[test]
    fn test_non_200_stops_scanning() {
        let raw = b"HTTP/1.1 404 Not Found\r\nContent-Length: 200\r\nContent-Type: application/octet-stream\r\n\r\n";
        let mut reader = Cursor::new(&raw[..]);

        let headers = parse_headers(&mut reader).unwrap();
        assert_eq!(headers.status, Some(404));
        assert!(!headers.status_ok());
        // Fields after the status line were not consumed
        assert_eq!(headers.content_length, 0);
        assert!(!headers.content_type_valid);
        assert_eq!(reader.position() as usize, "HTTP/1.1 404 Not Found\r\n".len());
    }

    #[test]
    fn test_200_elsewhere_in_line_is_not_ok() {
        let raw = b"HTTP/1.1 404 200 reasons\r\n\r\n";
        let headers = parse_headers(&mut Cursor::new(&raw[..])).unwrap();
        assert_eq!(headers.status, Some(404));
        assert!(!headers.status_ok());
    }

    #[test]
    fn test_unknown_status_line() {
        let raw = b"SIP/2.0 200 OK\r\nContent-Length: 10\r\n\r\n";
        let headers = parse_headers(&mut Cursor::new(&raw[..])).unwrap();
        assert_eq!(headers.status, None);
        assert!(!headers.status_ok());
    }

    #[test]
    fn test_http_1_0_status_line_is_not_ok() {
        let raw = b"HTTP/1.0 200 OK\r\nContent-Length: 3\r\nContent-Type: application/octet-stream\r\n\r\nabc";
        let headers = parse_headers(&mut Cursor::new(&raw[..])).unwrap();
        assert_eq!(headers.status, None);
        assert!(!headers.status_ok());
        assert!(!headers.has_usable_content());
    }

    #[test]
    fn test_endless_line_is_rejected() {
        // Never sends a newline
        let mut reader = BufReader::new(io::repeat(b'a'));
        let err = parse_headers(&mut reader).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_overlong_field_line_is_rejected() {
        let mut raw = b"HTTP/1.1 200 OK\r\nX-Padding: ".to_vec();
        raw.extend(std::iter::repeat(b'x').take(MAX_LINE_LEN as usize));
        raw.extend_from_slice(b"\r\n\r\n");
        let err = parse_headers(&mut Cursor::new(raw)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_line_at_the_limit_is_accepted() {
        let padding = MAX_LINE_LEN as usize - "X-Padding: \r\n".len();
        let raw = format!(
            "HTTP/1.1 200 OK\r\nX-Padding: {}\r\nContent-Length: 4\r\n\r\n",
            "x".repeat(padding)
        );
        let headers = parse_headers(&mut Cursor::new(raw.into_bytes())).unwrap();
        assert_eq!(headers.content_length, 4);
    }

    #[test]
    fn test_non_numeric_length_is_zero() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: lots\r\nContent-Type: application/octet-stream\r\n\r\n";
        let headers = parse_headers(&mut Cursor::new(&raw[..])).unwrap();
        assert_eq!(headers.content_length, 0);
        assert!(headers.content_type_valid);
        assert!(!headers.has_usable_content());
    }

    #[test]
    fn test_other_content_type_is_invalid() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nContent-Type: text/html; charset=utf-8\r\n\r\n";
        let headers = parse_headers(&mut Cursor::new(&raw[..])).unwrap();
        assert_eq!(headers.content_length, 5);
        assert!(!headers.content_type_valid);
        assert!(!headers.has_usable_content());
    }

    #[test]
    fn test_short_and_unrelated_lines_are_ignored() {
        let raw = b"HTTP/1.1 200 OK\r\nX\r\nContent\r\nServer: nginx\r\nContent-Lengthy: 9\r\nContent-Length: 3\r\nContent-Type: application/octet-stream\r\n\r\n";
        let headers = parse_headers(&mut Cursor::new(&raw[..])).unwrap();
        assert_eq!(headers.content_length, 3);
        assert!(headers.content_type_valid);
    }

    #[test]
    fn test_missing_separator_space_is_ignored() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length:77\r\n\r\n";
        let headers = parse_headers(&mut Cursor::new(&raw[..])).unwrap();
        assert_eq!(headers.content_length, 0);
    }

    #[test]
    fn test_whitespace_only_line_ends_block() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n   \r\nbody";
        let mut reader = Cursor::new(&raw[..]);
        let headers = parse_headers(&mut reader).unwrap();
        assert_eq!(headers.content_length, 4);

        let mut rest = String::new();
        reader.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "body");
    }

    #[test]
    fn test_eof_before_blank_line_fails() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n";
        let err = parse_headers(&mut Cursor::new(&raw[..])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let err = parse_headers(&mut Cursor::new(&b""[..])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_non_utf8_header_does_not_break_parsing() {
        let raw = b"HTTP/1.1 200 OK\r\nX-Name: \xff\xfe\r\nContent-Length: 2\r\n\r\n";
        let headers = parse_headers(&mut Cursor::new(&raw[..])).unwrap();
        assert_eq!(headers.content_length, 2);
    }
}
