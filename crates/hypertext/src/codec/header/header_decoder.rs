//! HTTP request head decoder.
//!
//! Parses the request line and header block into a [`RequestHead`] whose url, field names and
//! field values are zero-copy slices of the receive buffer.
//!
//! # Features
//!
//! - Header parsing using `httparse`
//! - Support for HTTP/1.0 and HTTP/1.1
//! - Built-in protection against oversized heads and too many fields
//! - Payload size, keep-alive and upgrade detection from the parsed fields
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum head size: 80KB
//!
//! # Implementation Details
//!
//! `httparse` hands back slices borrowed from the buffer. The decoder records the byte ranges
//! of those slices first, then splits the head off the buffer and re-slices the frozen head,
//! so no field is ever copied.

use bytes::{Bytes, BytesMut};
use http::{Method, Version};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{HeaderField, ParseError, PayloadSize, RequestHead, method_code};

/// Maximum number of headers allowed in a request
pub const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the request line plus header block
pub const MAX_HEADER_BYTES: usize = 80 * 1024;

/// Decoder for HTTP request heads implementing the [`Decoder`] trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderDecoder;

impl Decoder for HeaderDecoder {
    type Item = RequestHead;
    type Error = ParseError;

    /// Attempts to decode a request head from the provided bytes buffer.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(head))` if a complete head was parsed and split off `src`
    /// - `Ok(None)` if more data is needed
    /// - `Err(ParseError)` if parsing failed
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if:
    /// - The number of headers exceeds `MAX_HEADER_NUM`
    /// - The head size exceeds `MAX_HEADER_BYTES`
    /// - The method is unknown, or the version is not HTTP/1.x
    /// - Content-Length and Transfer-Encoding are both present or Content-Length is malformed
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut req = httparse::Request::new(&mut headers);

        let parsed_result = req.parse(src).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_header(e.to_string()),
        });

        let head_size = match parsed_result? {
            Status::Complete(head_size) => head_size,
            Status::Partial => {
                ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                return Ok(None);
            }
        };

        trace!(head_size, "parsed request head");
        ensure!(head_size <= MAX_HEADER_BYTES, ParseError::too_large_header(head_size, MAX_HEADER_BYTES));

        let version = match req.version {
            Some(0) => Version::HTTP_10,
            Some(1) => Version::HTTP_11,
            // Currently HTTP/2 and HTTP/3 not supported
            other => return Err(ParseError::InvalidVersion(other)),
        };

        let method = req.method.ok_or(ParseError::InvalidMethod)?;
        let method = Method::from_bytes(method.as_bytes()).map_err(|_e| ParseError::InvalidMethod)?;
        let code = method_code(&method).ok_or(ParseError::InvalidMethod)?;

        let path = req.path.ok_or(ParseError::InvalidUri)?;
        let url_range = range_within(src, path.as_bytes());

        let header_count = req.headers.len();
        let mut header_index = [HeaderIndex::EMPTY; MAX_HEADER_NUM];
        HeaderIndex::record(src, req.headers, &mut header_index);

        let head_bytes = src.split_to(head_size).freeze();
        let fields = header_index[..header_count]
            .iter()
            .map(|index| HeaderField {
                name: head_bytes.slice(index.name.0..index.name.1),
                value: head_bytes.slice(index.value.0..index.value.1),
            })
            .collect::<Vec<_>>();

        let semantics = FieldSemantics::scan(&fields);
        let upgrade = method == Method::CONNECT || (semantics.has_upgrade && semantics.connection_upgrade);
        let keep_alive = match version {
            Version::HTTP_10 => semantics.connection_keep_alive,
            _ => !semantics.connection_close,
        };
        let payload_size = if method == Method::CONNECT { PayloadSize::new_empty() } else { parse_payload(&fields)? };

        Ok(Some(RequestHead {
            method,
            method_code: code,
            version,
            url: head_bytes.slice(url_range.0..url_range.1),
            fields,
            payload_size,
            upgrade,
            keep_alive,
        }))
    }
}

/// Byte range of `part` inside `whole`; `part` must be a sub-slice of `whole`.
fn range_within(whole: &[u8], part: &[u8]) -> (usize, usize) {
    let start = part.as_ptr() as usize - whole.as_ptr() as usize;
    (start, start + part.len())
}

/// Stores the byte range positions of a header's name and value within the receive buffer.
#[derive(Clone, Copy)]
struct HeaderIndex {
    /// Start and end byte positions of the header name
    name: (usize, usize),
    /// Start and end byte positions of the header value
    value: (usize, usize),
}

impl HeaderIndex {
    const EMPTY: HeaderIndex = HeaderIndex { name: (0, 0), value: (0, 0) };

    fn record(bytes: &[u8], headers: &[httparse::Header<'_>], indices: &mut [HeaderIndex]) {
        for (header, indices) in headers.iter().zip(indices.iter_mut()) {
            indices.name = range_within(bytes, header.name.as_bytes());
            indices.value = range_within(bytes, header.value);
        }
    }
}

/// Connection-level facts gathered from the header fields.
#[derive(Debug, Default)]
struct FieldSemantics {
    has_upgrade: bool,
    connection_upgrade: bool,
    connection_close: bool,
    connection_keep_alive: bool,
}

impl FieldSemantics {
    fn scan(fields: &[HeaderField]) -> Self {
        let mut semantics = FieldSemantics::default();
        for field in fields {
            if field.name.eq_ignore_ascii_case(b"upgrade") {
                semantics.has_upgrade = true;
            } else if field.name.eq_ignore_ascii_case(b"connection") {
                for token in field.value.split(|b| *b == b',').map(<[u8]>::trim_ascii) {
                    if token.eq_ignore_ascii_case(b"upgrade") {
                        semantics.connection_upgrade = true;
                    } else if token.eq_ignore_ascii_case(b"close") {
                        semantics.connection_close = true;
                    } else if token.eq_ignore_ascii_case(b"keep-alive") {
                        semantics.connection_keep_alive = true;
                    }
                }
            }
        }
        semantics
    }
}

/// Determines how the body is framed, according to RFC 9112 section 6.
///
/// # Errors
///
/// Returns `ParseError` if:
/// - Both Content-Length and Transfer-Encoding headers are present
/// - Content-Length values are malformed or disagree with each other
/// - Transfer-Encoding is present but its last coding is not chunked
fn parse_payload(fields: &[HeaderField]) -> Result<PayloadSize, ParseError> {
    // refer: https://www.rfc-editor.org/rfc/rfc9112.html#name-transfer-encoding
    let te_value = find_field(fields, b"transfer-encoding");

    let mut content_length = None;
    for field in fields.iter().filter(|field| field.name.eq_ignore_ascii_case(b"content-length")) {
        let length = parse_content_length(&field.value)?;
        ensure!(
            content_length.is_none_or(|previous| previous == length),
            ParseError::invalid_content_length("multiple content-length headers disagree")
        );
        content_length = Some(length);
    }

    match (te_value, content_length) {
        (None, None) => Ok(PayloadSize::new_empty()),

        (Some(te_value), None) => {
            ensure!(is_chunked(te_value), ParseError::invalid_header("transfer-encoding does not end in chunked"));
            Ok(PayloadSize::new_chunked())
        }

        (None, Some(length)) => Ok(PayloadSize::new_length(length)),

        (Some(_), Some(_)) => Err(ParseError::invalid_content_length("transfer_encoding and content_length both present in headers")),
    }
}

fn find_field<'a>(fields: &'a [HeaderField], name: &[u8]) -> Option<&'a Bytes> {
    fields.iter().find(|field| field.name.eq_ignore_ascii_case(name)).map(|field| &field.value)
}

fn parse_content_length(value: &[u8]) -> Result<u64, ParseError> {
    let digits = value.trim_ascii();
    ensure!(
        !digits.is_empty() && digits.iter().all(u8::is_ascii_digit),
        ParseError::invalid_content_length(format!("value {} is not a decimal number", String::from_utf8_lossy(value)))
    );

    // ascii digits are valid utf8
    let cl_str = std::str::from_utf8(digits).map_err(|_e| ParseError::invalid_content_length("value can't to_str"))?;
    cl_str.parse::<u64>().map_err(|_e| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))
}

/// Checks if the Transfer-Encoding value ends with chunked.
///
/// According to RFC 9112, chunked must be the last encoding if present.
fn is_chunked(value: &[u8]) -> bool {
    const CHUNKED: &[u8] = b"chunked";
    value.rsplit(|b| *b == b',').next().is_some_and(|last| last.trim_ascii().eq_ignore_ascii_case(CHUNKED))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn crlf(str: &str) -> BytesMut {
        BytesMut::from(str.replace('\n', "\r\n").as_str())
    }

    fn field(head: &RequestHead, name: &str) -> Option<String> {
        head.fields()
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name.as_bytes()))
            .map(|field| String::from_utf8(field.value.to_vec()).unwrap())
    }

    #[test]
    fn check_is_chunked() {
        assert!(is_chunked(b"gzip, chunked"));
        assert!(is_chunked(b"Chunked"));
        assert!(!is_chunked(b"chunked, gzip"));
        assert!(!is_chunked(b"gzip"));
    }

    #[test]
    fn test_bytes_mut_lens() {
        let mut bytes = crlf(indoc! {r##"
        GET /index.html HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        123"##});

        let result = HeaderDecoder.decode(&mut bytes).unwrap();
        assert!(result.is_some());

        assert_eq!(bytes.len(), 3);
        assert_eq!(&bytes[..], &b"123"[..]);
    }

    #[test]
    fn from_curl() {
        let mut buf = crlf(indoc! {r##"
        GET /index.html HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        "##});

        let head = HeaderDecoder.decode(&mut buf).unwrap().unwrap();

        assert!(head.payload_size().is_empty());
        assert_eq!(head.method(), &Method::GET);
        assert_eq!(head.method_code(), 1);
        assert_eq!(head.version(), Version::HTTP_11);
        assert_eq!(head.version_numbers(), (1, 1));
        assert_eq!(head.url().as_ref(), b"/index.html");
        assert!(head.is_keep_alive());
        assert!(!head.is_upgrade());

        let names = head.fields().iter().map(|field| field.name.as_ref()).collect::<Vec<_>>();
        assert_eq!(names, vec![&b"Host"[..], b"User-Agent", b"Accept"]);
        assert_eq!(field(&head, "accept").as_deref(), Some("*/*"));
        assert_eq!(field(&head, "host").as_deref(), Some("127.0.0.1:8080"));
        assert_eq!(field(&head, "user-agent").as_deref(), Some("curl/7.79.1"));
    }

    #[test]
    fn from_edge() {
        let mut buf = crlf(indoc! {r##"
        GET /index/?a=1&b=2&a=3 HTTP/1.1
        Host: 127.0.0.1:8080
        Connection: keep-alive
        Cache-Control: max-age=0
        sec-ch-ua: "#Not_A Brand";v="99", "Microsoft Edge";v="109", "Chromium";v="109"
        sec-ch-ua-mobile: ?0
        sec-ch-ua-platform: "macOS"
        Upgrade-Insecure-Requests: 1
        User-Agent: Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0 Safari/537.36 Edg/109.0.1518.52
        Accept: text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.9
        Sec-Fetch-Site: none
        Sec-Fetch-Mode: navigate
        Sec-Fetch-User: ?1
        Sec-Fetch-Dest: document
        Accept-Encoding: gzip, deflate, br
        Accept-Language: zh-CN,zh;q=0.9,en-US;q=0.8,en;q=0.7

        "##});

        let head = HeaderDecoder.decode(&mut buf).unwrap().unwrap();

        assert_eq!(head.url().as_ref(), b"/index/?a=1&b=2&a=3");
        assert_eq!(head.fields().len(), 15);
        assert!(head.is_keep_alive());
        // Upgrade-Insecure-Requests is not an Upgrade header
        assert!(!head.is_upgrade());
        assert_eq!(
            field(&head, "sec-ch-ua").as_deref(),
            Some(r##""#Not_A Brand";v="99", "Microsoft Edge";v="109", "Chromium";v="109""##)
        );
        assert_eq!(field(&head, "Accept-Language").as_deref(), Some("zh-CN,zh;q=0.9,en-US;q=0.8,en;q=0.7"));
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_head_waits_for_more() {
        let mut buf = BytesMut::from("GET /x HTTP/1.1\r\nHost: h\r\n");
        assert!(HeaderDecoder.decode(&mut buf).unwrap().is_none());
        // nothing is consumed until the head is complete
        assert_eq!(buf.len(), 26);

        buf.extend_from_slice(b"\r\n");
        assert!(HeaderDecoder.decode(&mut buf).unwrap().is_some());
    }

    #[test]
    fn payload_sizes() {
        let mut buf = BytesMut::from("POST /a HTTP/1.1\r\nContent-Length: 12\r\n\r\n");
        assert_eq!(HeaderDecoder.decode(&mut buf).unwrap().unwrap().payload_size(), PayloadSize::Length(12));

        let mut buf = BytesMut::from("POST /a HTTP/1.1\r\nTransfer-Encoding: gzip, chunked\r\n\r\n");
        assert_eq!(HeaderDecoder.decode(&mut buf).unwrap().unwrap().payload_size(), PayloadSize::Chunked);

        // a body on GET is framed like any other
        let mut buf = BytesMut::from("GET /a HTTP/1.1\r\ncontent-length: 3\r\n\r\n");
        assert_eq!(HeaderDecoder.decode(&mut buf).unwrap().unwrap().payload_size(), PayloadSize::Length(3));

        let mut buf = BytesMut::from("POST /a HTTP/1.1\r\nContent-Length: 0\r\n\r\n");
        assert_eq!(HeaderDecoder.decode(&mut buf).unwrap().unwrap().payload_size(), PayloadSize::Empty);
    }

    #[test]
    fn conflicting_framing_is_rejected() {
        let mut buf = BytesMut::from("POST /a HTTP/1.1\r\nContent-Length: 3\r\nTransfer-Encoding: chunked\r\n\r\n");
        assert!(matches!(HeaderDecoder.decode(&mut buf), Err(ParseError::InvalidContentLength { .. })));

        let mut buf = BytesMut::from("POST /a HTTP/1.1\r\nContent-Length: 3\r\nContent-Length: 4\r\n\r\n");
        assert!(matches!(HeaderDecoder.decode(&mut buf), Err(ParseError::InvalidContentLength { .. })));

        let mut buf = BytesMut::from("POST /a HTTP/1.1\r\nContent-Length: abc\r\n\r\n");
        assert!(matches!(HeaderDecoder.decode(&mut buf), Err(ParseError::InvalidContentLength { .. })));
    }

    #[test]
    fn content_length_is_digits_only() {
        for value in ["+3", "-3", "", "3 3", "0x3", "99999999999999999999"] {
            let mut buf = BytesMut::from(format!("POST /a HTTP/1.1\r\nContent-Length: {value}\r\n\r\n").as_str());
            assert!(matches!(HeaderDecoder.decode(&mut buf), Err(ParseError::InvalidContentLength { .. })), "{value:?}");
        }

        let mut buf = BytesMut::from("POST /a HTTP/1.1\r\nContent-Length:  7 \r\n\r\n");
        assert_eq!(HeaderDecoder.decode(&mut buf).unwrap().unwrap().payload_size(), PayloadSize::Length(7));
    }

    #[test]
    fn transfer_encoding_must_end_in_chunked() {
        for value in ["gzip", "chunked, gzip", "identity"] {
            let mut buf = BytesMut::from(format!("POST /a HTTP/1.1\r\nTransfer-Encoding: {value}\r\n\r\nabc").as_str());
            assert!(matches!(HeaderDecoder.decode(&mut buf), Err(ParseError::InvalidHeader { .. })), "{value:?}");
        }
    }

    #[test]
    fn upgrade_detection() {
        let mut buf = crlf(indoc! {r##"
        GET /chat HTTP/1.1
        Host: example.com
        Upgrade: websocket
        Connection: keep-alive, Upgrade

        "##});
        assert!(HeaderDecoder.decode(&mut buf).unwrap().unwrap().is_upgrade());

        // Upgrade without the matching Connection token is not an upgrade
        let mut buf = BytesMut::from("GET /chat HTTP/1.1\r\nUpgrade: websocket\r\n\r\n");
        assert!(!HeaderDecoder.decode(&mut buf).unwrap().unwrap().is_upgrade());

        let mut buf = BytesMut::from("CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n");
        let head = HeaderDecoder.decode(&mut buf).unwrap().unwrap();
        assert!(head.is_upgrade());
        assert!(head.payload_size().is_empty());
    }

    #[test]
    fn keep_alive_rules() {
        let mut buf = BytesMut::from("GET / HTTP/1.1\r\nConnection: close\r\n\r\n");
        assert!(!HeaderDecoder.decode(&mut buf).unwrap().unwrap().is_keep_alive());

        let mut buf = BytesMut::from("GET / HTTP/1.0\r\n\r\n");
        let head = HeaderDecoder.decode(&mut buf).unwrap().unwrap();
        assert!(!head.is_keep_alive());
        assert_eq!(head.version_numbers(), (1, 0));

        let mut buf = BytesMut::from("GET / HTTP/1.0\r\nConnection: Keep-Alive\r\n\r\n");
        assert!(HeaderDecoder.decode(&mut buf).unwrap().unwrap().is_keep_alive());
    }

    #[test]
    fn unknown_method_is_rejected() {
        let mut buf = BytesMut::from("BREW /pot HTTP/1.1\r\n\r\n");
        assert!(matches!(HeaderDecoder.decode(&mut buf), Err(ParseError::InvalidMethod)));
    }

    #[test]
    fn malformed_head_is_rejected() {
        let mut buf = BytesMut::from("GET /x HTTP/1.1\r\nBad Header\r\n\r\n");
        assert!(matches!(HeaderDecoder.decode(&mut buf), Err(ParseError::InvalidHeader { .. })));
    }

    #[test]
    fn too_many_headers() {
        let mut request = String::from("GET / HTTP/1.1\r\n");
        for i in 0..=MAX_HEADER_NUM {
            request.push_str(&format!("X-Field-{i}: {i}\r\n"));
        }
        request.push_str("\r\n");

        let mut buf = BytesMut::from(request.as_str());
        assert!(matches!(HeaderDecoder.decode(&mut buf), Err(ParseError::TooManyHeaders { .. })));
    }

    #[test]
    fn oversized_partial_head() {
        let mut request = String::from("GET / HTTP/1.1\r\nX-Long: ");
        request.push_str(&"a".repeat(MAX_HEADER_BYTES));

        let mut buf = BytesMut::from(request.as_str());
        assert!(matches!(HeaderDecoder.decode(&mut buf), Err(ParseError::TooLargeHeader { .. })));
    }
}
