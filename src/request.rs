use std::io::{self, BufRead, Cursor, Read, Write};

use headers::HeaderMapExt;
use http::{Method, Request, Uri, Version};
use thiserror::Error;

use crate::body::Body;

/// Default upper bound for the request line plus headers.
pub const DEFAULT_MAX_HEAD_SIZE: usize = 1 << 20;

const INITIAL_HEADERS: usize = 64;
const MAX_HEADERS: usize = 16 * 1024;
const MAX_CHUNK_LINE: u64 = 64 * 1024;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("connection closed")]
    ConnectionClosed,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid request: {0}")]
    Invalid(#[from] httparse::Error),
    #[error("incomplete request")]
    IncompleteRequest,
    #[error("request head exceeds {0} bytes")]
    HeadTooLarge(usize),
    #[error("unsupported http version: {0}")]
    UnsupportedHttpVersion(u8),
    #[error("invalid Transfer-Encoding header")]
    InvalidTransferEncoding,
    #[error("invalid header")]
    InvalidHeader(#[from] headers::Error),
    #[error("malformed request head")]
    Malformed,
}

/// Request line and header block exactly as they were received, up to and
/// including the empty line that ends the head.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawHead(Vec<u8>);

impl RawHead {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Request target that could not be parsed as a [`Uri`]. Such requests carry
/// a placeholder `/` URI and keep the target as sent in this extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawTarget(String);

impl RawTarget {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The target without its query.
    pub fn path(&self) -> &str {
        self.0.split_once('?').map_or(self.0.as_str(), |(path, _)| path)
    }
}

pub(crate) fn parse_request(
    mut stream: impl BufRead + 'static,
    max_head_size: usize,
) -> Result<Request<Body>, ParseError> {
    let buf = read_head(&mut stream, max_head_size)?;

    let request = parse_head(&buf)?.extension(RawHead(buf));
    let headers = request.headers_ref().ok_or(ParseError::Malformed)?;

    let body = if let Some(encoding) = headers.typed_try_get::<headers::TransferEncoding>()? {
        if !encoding.is_chunked() {
            // https://datatracker.ietf.org/doc/html/rfc9112#section-6.3
            return Err(ParseError::InvalidTransferEncoding);
        }
        Body::from_reader(RawChunked::new(stream), None)
    } else if let Some(len) = headers.typed_try_get::<headers::ContentLength>()? {
        Body::from_reader(stream, len.0)
    } else {
        Body::empty()
    };

    request.body(body).map_err(|_| ParseError::Malformed)
}

fn read_head(stream: &mut impl BufRead, max_head_size: usize) -> Result<Vec<u8>, ParseError> {
    let mut buf = Vec::with_capacity(800);

    loop {
        let remaining = max_head_size.saturating_sub(buf.len()) as u64;
        if remaining == 0 {
            return Err(ParseError::HeadTooLarge(max_head_size));
        }

        if stream.by_ref().take(remaining).read_until(b'\n', &mut buf)? == 0 {
            break;
        }

        match buf.as_slice() {
            // Empty lines ahead of the request line are not part of the request
            b"\r\n" | b"\n" => buf.clear(),
            [.., b'\r', b'\n', b'\r', b'\n'] => break,
            [.., b'\n', b'\n'] => break,
            _ => continue,
        }
    }

    if buf.is_empty() {
        return Err(ParseError::ConnectionClosed);
    }

    Ok(buf)
}

fn parse_head(buf: &[u8]) -> Result<http::request::Builder, ParseError> {
    let mut capacity = INITIAL_HEADERS;

    loop {
        let mut headers = vec![httparse::EMPTY_HEADER; capacity];
        let mut req = httparse::Request::new(&mut headers);

        match req.parse(buf) {
            Ok(httparse::Status::Complete(_)) => {}
            Ok(httparse::Status::Partial) => return Err(ParseError::IncompleteRequest),
            Err(httparse::Error::TooManyHeaders) if capacity < MAX_HEADERS => {
                capacity *= 4;
                continue;
            }
            Err(err) => return Err(err.into()),
        }

        let method = req
            .method
            .map(|method| method.as_bytes())
            .ok_or(ParseError::IncompleteRequest)?;

        let path = req.path.ok_or(ParseError::IncompleteRequest)?;

        let version = match req.version.ok_or(ParseError::IncompleteRequest)? {
            0 => Version::HTTP_10,
            1 => Version::HTTP_11,
            version => return Err(ParseError::UnsupportedHttpVersion(version)),
        };

        let request = Request::builder()
            .method(Method::from_bytes(method).map_err(|_| ParseError::Malformed)?)
            .version(version);

        // Targets like `/a<b>` get past httparse but are not valid URIs
        let request = match Uri::try_from(path) {
            Ok(uri) => request.uri(uri),
            Err(_) => request
                .uri(Uri::from_static("/"))
                .extension(RawTarget(path.to_owned())),
        };

        return Ok(req
            .headers
            .iter()
            .fold(request, |req, header| req.header(header.name, header.value)));
    }
}

/// Writes a request to `out` the way it was received.
///
/// Requests read off a connection carry their [`RawHead`] and are reproduced
/// byte for byte. Requests built in memory get a head serialized from their
/// parts. The body is streamed, never collected.
pub fn write_request(req: Request<Body>, out: &mut impl Write) -> io::Result<()> {
    let (parts, body) = req.into_parts();

    if let Some(raw) = parts.extensions.get::<RawHead>() {
        out.write_all(raw.as_bytes())?;
    } else {
        let version = match parts.version {
            Version::HTTP_10 => "HTTP/1.0",
            Version::HTTP_11 => "HTTP/1.1",
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    "unsupported http version",
                ))
            }
        };

        let target = match parts.extensions.get::<RawTarget>() {
            Some(raw) => raw.as_str().to_owned(),
            None => parts.uri.to_string(),
        };

        out.write_all(format!("{} {target} {version}\r\n", parts.method).as_bytes())?;

        for (name, val) in parts.headers.iter() {
            out.write_all(&[format!("{name}: ").as_bytes(), val.as_bytes(), b"\r\n"].concat())?;
        }

        out.write_all(b"\r\n")?;
    }

    io::copy(&mut body.into_reader(), out)?;

    Ok(())
}

/// Reads a chunked body with its transfer framing intact: size lines, chunk
/// data, CRLFs, the last-chunk, trailers and the final empty line. Stops right
/// after the body, leaving the stream positioned at the next request.
pub(crate) struct RawChunked<R> {
    inner: R,
    state: ChunkState,
    pending: Cursor<Vec<u8>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChunkState {
    Size,
    Data(u64),
    DataEnd,
    Trailers,
    Done,
}

fn invalid_chunk() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "invalid chunked body")
}

fn is_empty_line(line: &[u8]) -> bool {
    line == b"\r\n" || line == b"\n"
}

impl<R: BufRead> RawChunked<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            state: ChunkState::Size,
            pending: Cursor::new(Vec::new()),
        }
    }

    fn line(&mut self) -> io::Result<Vec<u8>> {
        let mut line = Vec::new();
        let read = self
            .inner
            .by_ref()
            .take(MAX_CHUNK_LINE)
            .read_until(b'\n', &mut line)?;

        match read {
            0 => Err(io::ErrorKind::UnexpectedEof.into()),
            _ if line.ends_with(b"\n") => Ok(line),
            _ if line.len() as u64 == MAX_CHUNK_LINE => Err(invalid_chunk()),
            _ => Err(io::ErrorKind::UnexpectedEof.into()),
        }
    }
}

impl<R: BufRead> Read for RawChunked<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            let buffered = self.pending.read(buf)?;
            if buffered > 0 {
                return Ok(buffered);
            }

            match self.state {
                ChunkState::Size => {
                    let line = self.line()?;
                    self.state = match httparse::parse_chunk_size(&line) {
                        Ok(httparse::Status::Complete((_pos, 0))) => ChunkState::Trailers,
                        Ok(httparse::Status::Complete((_pos, size))) => ChunkState::Data(size),
                        _ => return Err(invalid_chunk()),
                    };
                    self.pending = Cursor::new(line);
                }
                ChunkState::Data(remaining) => {
                    let max = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
                    let read = self.inner.read(&mut buf[..max])?;
                    if read == 0 {
                        return Err(io::ErrorKind::UnexpectedEof.into());
                    }
                    self.state = match remaining - read as u64 {
                        0 => ChunkState::DataEnd,
                        left => ChunkState::Data(left),
                    };
                    return Ok(read);
                }
                ChunkState::DataEnd => {
                    let line = self.line()?;
                    if !is_empty_line(&line) {
                        return Err(invalid_chunk());
                    }
                    self.state = ChunkState::Size;
                    self.pending = Cursor::new(line);
                }
                ChunkState::Trailers => {
                    let line = self.line()?;
                    if is_empty_line(&line) {
                        self.state = ChunkState::Done;
                    }
                    self.pending = Cursor::new(line);
                }
                ChunkState::Done => return Ok(0),
            }
        }
    }
}
