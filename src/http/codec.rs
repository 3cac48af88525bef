//! HTTP/1.1 wire codec for upstream sessions.
//!
//! Serialises request heads and parses responses over a raw TCP stream.
//! Response bodies are framed by `Content-Length`, chunked
//! transfer-encoding, or connection close; chunks accumulate into one
//! contiguous buffer. Bytes read past the current response stay in the
//! session buffer for the next response on the same connection.

use bytes::{Buf, Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::{HeaderMap, Method, StatusCode, Version};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use url::Url;

/// Upper bound on the response head (status line plus headers).
const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Upper bound on a chunk-size or trailer line.
const MAX_LINE_BYTES: usize = 8 * 1024;

/// Wire-level decode failure.
#[derive(Debug, Error)]
pub(crate) enum CodecError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed response: {0}")]
    Malformed(&'static str),

    #[error("response head exceeds {MAX_HEAD_BYTES} bytes")]
    HeadTooLarge,
}

/// A fully decoded response.
#[derive(Debug)]
pub(crate) struct DecodedResponse {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    /// The session must not be reused for another request.
    pub(crate) must_close: bool,
}

/// Serialise the request head into `buf`.
///
/// A `Host` header is derived from the URL unless the caller supplied
/// one. The body, if any, is written separately by the session.
pub(crate) fn encode_request(method: &Method, url: &Url, headers: &HeaderMap, buf: &mut BytesMut) {
    buf.extend_from_slice(method.as_str().as_bytes());
    buf.extend_from_slice(b" ");
    buf.extend_from_slice(url.path().as_bytes());
    if let Some(query) = url.query() {
        buf.extend_from_slice(b"?");
        buf.extend_from_slice(query.as_bytes());
    }
    buf.extend_from_slice(b" HTTP/1.1\r\n");
    if !headers.contains_key(HOST) {
        buf.extend_from_slice(b"Host: ");
        buf.extend_from_slice(url.host_str().unwrap_or_default().as_bytes());
        if let Some(port) = url.port() {
            buf.extend_from_slice(format!(":{port}").as_bytes());
        }
        buf.extend_from_slice(b"\r\n");
    }
    for (name, value) in headers {
        buf.extend_from_slice(name.as_str().as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf.extend_from_slice(b"\r\n");
}

/// Read and decode one response from the stream.
///
/// `buf` carries read-ahead between responses on a keep-alive session.
pub(crate) async fn read_response<S>(
    stream: &mut S,
    buf: &mut BytesMut,
) -> Result<DecodedResponse, CodecError>
where
    S: AsyncRead + Unpin,
{
    let head_end = loop {
        if let Some(pos) = find_head_end(buf) {
            break pos;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(CodecError::HeadTooLarge);
        }
        if stream.read_buf(buf).await? == 0 {
            return Err(CodecError::Malformed("connection closed before response head"));
        }
    };

    let head = buf.split_to(head_end + 4);
    let head = std::str::from_utf8(&head[..])
        .map_err(|_| CodecError::Malformed("response head is not valid utf-8"))?;
    let mut lines = head.split("\r\n");
    let status_line = lines
        .next()
        .ok_or(CodecError::Malformed("missing status line"))?;
    let (version, status) = parse_status_line(status_line)?;

    let mut headers = HeaderMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or(CodecError::Malformed("header line without separator"))?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| CodecError::Malformed("invalid header name"))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|_| CodecError::Malformed("invalid header value"))?;
        headers.append(name, value);
    }

    let http10 = version == Version::HTTP_10;
    let mut must_close = header_token(&headers, &CONNECTION, "close")
        || (http10 && !header_token(&headers, &CONNECTION, "keep-alive"));

    let body = if header_token(&headers, &TRANSFER_ENCODING, "chunked") {
        read_chunked_body(stream, buf).await?
    } else if let Some(length) = content_length(&headers)? {
        read_exact_body(stream, buf, length).await?
    } else if status_has_no_body(status) {
        Bytes::new()
    } else {
        // No framing: the body runs until the server closes.
        must_close = true;
        read_body_to_eof(stream, buf).await?
    };

    Ok(DecodedResponse {
        status,
        headers,
        body,
        must_close,
    })
}

fn find_head_end(buf: &BytesMut) -> Option<usize> {
    buf.windows(4).position(|window| window == b"\r\n\r\n")
}

fn parse_status_line(line: &str) -> Result<(Version, StatusCode), CodecError> {
    let mut parts = line.splitn(3, ' ');
    let version = match parts.next() {
        Some("HTTP/1.1") => Version::HTTP_11,
        Some("HTTP/1.0") => Version::HTTP_10,
        _ => return Err(CodecError::Malformed("unsupported http version")),
    };
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or(CodecError::Malformed("invalid status code"))?;
    Ok((version, status))
}

/// Does any instance of `name` carry `token` in its comma-separated list?
fn header_token(headers: &HeaderMap, name: &HeaderName, token: &str) -> bool {
    headers.get_all(name).iter().any(|value| {
        value
            .to_str()
            .map(|v| v.split(',').any(|part| part.trim().eq_ignore_ascii_case(token)))
            .unwrap_or(false)
    })
}

fn content_length(headers: &HeaderMap) -> Result<Option<usize>, CodecError> {
    match headers.get(CONTENT_LENGTH) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .map(Some)
            .ok_or(CodecError::Malformed("invalid content-length")),
    }
}

fn status_has_no_body(status: StatusCode) -> bool {
    status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

async fn read_exact_body<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    length: usize,
) -> Result<Bytes, CodecError>
where
    S: AsyncRead + Unpin,
{
    while buf.len() < length {
        if stream.read_buf(buf).await? == 0 {
            return Err(CodecError::Malformed("connection closed mid-body"));
        }
    }
    Ok(buf.split_to(length).freeze())
}

async fn read_body_to_eof<S>(stream: &mut S, buf: &mut BytesMut) -> Result<Bytes, CodecError>
where
    S: AsyncRead + Unpin,
{
    while stream.read_buf(buf).await? != 0 {}
    Ok(buf.split().freeze())
}

async fn read_chunked_body<S>(stream: &mut S, buf: &mut BytesMut) -> Result<Bytes, CodecError>
where
    S: AsyncRead + Unpin,
{
    let mut body = BytesMut::new();
    loop {
        let line = read_line(stream, buf).await?;
        let size = line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size, 16)
            .map_err(|_| CodecError::Malformed("invalid chunk size"))?;
        if size == 0 {
            break;
        }
        while buf.len() < size + 2 {
            if stream.read_buf(buf).await? == 0 {
                return Err(CodecError::Malformed("connection closed mid-chunk"));
            }
        }
        body.extend_from_slice(&buf.split_to(size)[..]);
        let crlf = buf.split_to(2);
        if &crlf[..] != b"\r\n" {
            return Err(CodecError::Malformed("missing chunk terminator"));
        }
    }
    // Discard trailers up to the final blank line.
    loop {
        if read_line(stream, buf).await?.is_empty() {
            break;
        }
    }
    Ok(body.freeze())
}

async fn read_line<S>(stream: &mut S, buf: &mut BytesMut) -> Result<String, CodecError>
where
    S: AsyncRead + Unpin,
{
    loop {
        if let Some(pos) = buf.windows(2).position(|window| window == b"\r\n") {
            let line = buf.split_to(pos);
            buf.advance(2);
            return std::str::from_utf8(&line[..])
                .map(str::to_string)
                .map_err(|_| CodecError::Malformed("line is not valid utf-8"));
        }
        if buf.len() > MAX_LINE_BYTES {
            return Err(CodecError::Malformed("line too long"));
        }
        if stream.read_buf(buf).await? == 0 {
            return Err(CodecError::Malformed("connection closed mid-line"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_request_head(url: &str) -> String {
        let url = Url::parse(url).unwrap();
        let mut buf = BytesMut::new();
        encode_request(&Method::GET, &url, &HeaderMap::new(), &mut buf);
        String::from_utf8(buf.to_vec()).unwrap()
    }

    async fn decode(raw: &[u8]) -> Result<DecodedResponse, CodecError> {
        let mut stream = raw;
        let mut buf = BytesMut::new();
        read_response(&mut stream, &mut buf).await
    }

    #[test]
    fn test_encode_request_line_and_host() {
        let head = get_request_head("http://tiles.example.com/v1/15/1/2?fmt=png");
        assert!(head.starts_with("GET /v1/15/1/2?fmt=png HTTP/1.1\r\n"));
        assert!(head.contains("Host: tiles.example.com\r\n"));
        assert!(head.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_encode_request_nonstandard_port() {
        let head = get_request_head("http://localhost:8080/tile");
        assert!(head.contains("Host: localhost:8080\r\n"));
    }

    #[test]
    fn test_encode_request_keeps_caller_headers() {
        let url = Url::parse("http://example.com/x").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("secret"));
        let mut buf = BytesMut::new();
        encode_request(&Method::GET, &url, &headers, &mut buf);
        let head = String::from_utf8(buf.to_vec()).unwrap();
        assert!(head.contains("x-api-key: secret\r\n"));
    }

    #[tokio::test]
    async fn test_decode_content_length_body() {
        let decoded = decode(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello")
            .await
            .unwrap();
        assert_eq!(decoded.status, StatusCode::OK);
        assert_eq!(decoded.body.as_ref(), b"hello");
        assert!(!decoded.must_close);
    }

    #[tokio::test]
    async fn test_decode_chunked_body() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
                    4\r\ntile\r\n3\r\n-01\r\n0\r\n\r\n";
        let decoded = decode(raw).await.unwrap();
        assert_eq!(decoded.body.as_ref(), b"tile-01");
        assert!(!decoded.must_close);
    }

    #[tokio::test]
    async fn test_decode_close_delimited_body() {
        let decoded = decode(b"HTTP/1.1 200 OK\r\n\r\nrest-of-stream")
            .await
            .unwrap();
        assert_eq!(decoded.body.as_ref(), b"rest-of-stream");
        assert!(decoded.must_close);
    }

    #[tokio::test]
    async fn test_decode_connection_close_header() {
        let decoded = decode(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        assert!(decoded.must_close);
    }

    #[tokio::test]
    async fn test_decode_http10_defaults_to_close() {
        let decoded = decode(b"HTTP/1.0 200 OK\r\nContent-Length: 2\r\n\r\nok")
            .await
            .unwrap();
        assert!(decoded.must_close);
    }

    #[tokio::test]
    async fn test_decode_no_content_has_empty_body() {
        let decoded = decode(b"HTTP/1.1 204 No Content\r\n\r\n").await.unwrap();
        assert_eq!(decoded.status, StatusCode::NO_CONTENT);
        assert!(decoded.body.is_empty());
        assert!(!decoded.must_close);
    }

    #[tokio::test]
    async fn test_decode_leaves_readahead_for_next_response() {
        let raw: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\nAHTTP/1.1 204 No Content\r\n\r\n";
        let mut stream = raw;
        let mut buf = BytesMut::new();
        let first = read_response(&mut stream, &mut buf).await.unwrap();
        assert_eq!(first.body.as_ref(), b"A");
        let second = read_response(&mut stream, &mut buf).await.unwrap();
        assert_eq!(second.status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_decode_rejects_garbage() {
        assert!(decode(b"NOT-HTTP\r\n\r\n").await.is_err());
        assert!(decode(b"HTTP/1.1 xyz\r\n\r\n").await.is_err());
        assert!(decode(b"HTTP/1.1 200 OK\r\nContent-Length: nope\r\n\r\n").await.is_err());
    }

    #[tokio::test]
    async fn test_decode_truncated_body_is_error() {
        assert!(decode(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort").await.is_err());
    }
}
