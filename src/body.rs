use std::io::{self, Cursor, Read};

/// Request body as it came off the wire.
///
/// Chunked bodies keep their transfer framing: reading a chunked [`Body`]
/// yields the chunk size lines, the CRLFs and the trailers, not just the
/// decoded payload.
#[derive(Default)]
pub struct Body(Option<BodyInner>);

#[derive(Default)]
enum BodyInner {
    #[default]
    Empty,
    Buffered(Vec<u8>),
    Reader(Box<dyn Read>, Option<u64>),
}

impl Body {
    pub fn empty() -> Self {
        Body(Some(BodyInner::Empty))
    }

    pub fn from_reader<T: Into<Option<u64>>>(reader: impl Read + 'static, length: T) -> Self {
        Body(Some(BodyInner::Reader(Box::new(reader), length.into())))
    }

    /// Number of bytes the body will yield, when known up front.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> Option<u64> {
        match &self.0 {
            Some(BodyInner::Empty) => Some(0),
            Some(BodyInner::Buffered(bytes)) => Some(bytes.len() as u64),
            Some(BodyInner::Reader(_, len)) => *len,
            None => None,
        }
    }

    pub fn into_bytes(self) -> io::Result<Vec<u8>> {
        let capacity = self.len().unwrap_or(8 * 1024).min(64 * 1024) as usize;
        let mut buf = Vec::with_capacity(capacity);
        self.into_reader().read_to_end(&mut buf)?;
        Ok(buf)
    }

    pub fn into_reader(mut self) -> BodyReader {
        match self.0.take() {
            None | Some(BodyInner::Empty) => {
                BodyReader(BodyReaderInner::Buffered(Cursor::new(Vec::new())))
            }
            Some(BodyInner::Buffered(bytes)) => {
                BodyReader(BodyReaderInner::Buffered(Cursor::new(bytes)))
            }
            Some(BodyInner::Reader(stream, Some(len))) => {
                BodyReader(BodyReaderInner::Reader(Box::new(Exact::new(stream, len))))
            }
            Some(BodyInner::Reader(stream, None)) => BodyReader(BodyReaderInner::Reader(stream)),
        }
    }
}

impl Drop for Body {
    // The connection is only framed for the next request once this body has
    // been fully read off the stream.
    fn drop(&mut self) {
        #[allow(unused_must_use)]
        match self.0.take() {
            Some(BodyInner::Reader(stream, Some(len))) => {
                io::copy(&mut Exact::new(stream, len), &mut io::sink());
            }
            Some(BodyInner::Reader(mut stream, None)) => {
                io::copy(&mut stream, &mut io::sink());
            }
            _ => {}
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(body: Vec<u8>) -> Self {
        Body(Some(BodyInner::Buffered(body)))
    }
}

impl From<&str> for Body {
    fn from(body: &str) -> Self {
        body.as_bytes().to_vec().into()
    }
}

/// Yields exactly `remaining` bytes of `inner`. A stream that ends sooner
/// is an [`io::ErrorKind::UnexpectedEof`] error, not a shorter body.
struct Exact<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read> Exact<R> {
    fn new(inner: R, remaining: u64) -> Self {
        Self { inner, remaining }
    }
}

impl<R: Read> Read for Exact<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let max = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let read = self.inner.read(&mut buf[..max])?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("body ended {} bytes short", self.remaining),
            ));
        }

        self.remaining -= read as u64;
        Ok(read)
    }
}

pub struct BodyReader(BodyReaderInner);

enum BodyReaderInner {
    Buffered(Cursor<Vec<u8>>),
    Reader(Box<dyn Read>),
}

impl Read for BodyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.0 {
            BodyReaderInner::Buffered(ref mut cursor) => cursor.read(buf),
            BodyReaderInner::Reader(ref mut reader) => reader.read(buf),
        }
    }
}
