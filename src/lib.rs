#![doc = include_str!("../README.md")]

pub mod body;
pub mod bootstrap;
pub mod config;
mod connection;
pub mod counter;
pub mod dumper;
pub mod logging;
mod read_queue;
pub mod request;
mod response;
pub mod server;
pub mod sink;

use std::{
    error::Error,
    io::{self, BufReader, BufWriter, Read, Write},
    time::Duration,
};

pub use body::Body;
pub use bootstrap::{bootstrap, BootstrapError, DumpServer};
pub use config::Config;
pub use connection::Connection;
pub use counter::{Counter, Sequence};
pub use dumper::Dumper;
use headers::{HeaderMapExt, HeaderValue};
pub use http::{header, Method, Request, Response, StatusCode, Uri, Version};
use read_queue::ReadQueue;
use request::ParseError;
use response::Outcome;
pub use server::Server;
pub use sink::{DumpSink, FileSink};

type IncomingRequest = Request<Body>;

/// Upper bound of request bytes discarded before closing a connection.
const MAX_LINGER_BYTES: u64 = 256 * 1024;
const LINGER_TIMEOUT: Duration = Duration::from_millis(500);

/// Maps [`Request`]s to bodiless [`Response`]s.
///
/// The request body must be read (or dropped) before the response is
/// returned; the response is only written once `handle` returns.
///
/// ```no_run
/// # use std::convert::Infallible;
/// # use http_dump::{Body, Request, Response, Server, StatusCode};
/// fn app(req: Request<Body>) -> Result<Response<()>, Infallible> {
///     let mut res = Response::new(());
///     if req.method() != "POST" {
///         *res.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
///     }
///     Ok(res)
/// }
///
/// fn main() -> std::io::Result<()> {
///     Server::bind("0.0.0.0:4444")?.serve(app)
/// }
/// ```
pub trait App {
    type Error: Into<Box<dyn Error + Send + Sync>>;

    fn handle(&self, request: IncomingRequest) -> Result<Response<()>, Self::Error>;
}

impl<F, Err> App for F
where
    F: Fn(IncomingRequest) -> Result<Response<()>, Err>,
    F: Sync + Send,
    F: Clone,
    Err: Into<Box<dyn Error + Send + Sync>>,
{
    type Error = Err;

    fn handle(&self, request: IncomingRequest) -> Result<Response<()>, Self::Error> {
        self(request)
    }
}

pub(crate) fn serve<A: App>(conn: Connection, app: A, max_head_size: usize) -> io::Result<()> {
    let mut read_queue = ReadQueue::new(BufReader::new(conn.try_clone()?));

    let mut reader = read_queue.enqueue();
    let mut writer = BufWriter::new(conn);

    loop {
        let req = match request::parse_request(reader, max_head_size) {
            Ok(req) => req,
            Err(ParseError::ConnectionClosed) => break,
            Err(ParseError::Io(err)) => return Err(err),
            Err(err) => {
                let status = match err {
                    ParseError::HeadTooLarge(_) => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
                    ParseError::UnsupportedHttpVersion(_) => {
                        StatusCode::HTTP_VERSION_NOT_SUPPORTED
                    }
                    _ => StatusCode::BAD_REQUEST,
                };

                let mut res = response::status(Version::HTTP_11, status);
                response::close(&mut res);
                response::write_response(res, &mut writer)?;
                linger(&mut writer, &mut read_queue)?;

                return Err(io::Error::new(io::ErrorKind::InvalidData, err));
            }
        };

        reader = read_queue.enqueue();

        let version = req.version();
        let connection = req.headers().typed_get::<headers::Connection>();

        let asks_for_close = connection
            .as_ref()
            .filter(|conn| conn.contains("close"))
            .is_some();

        let asks_for_keep_alive = connection
            .as_ref()
            .filter(|conn| conn.contains("keep-alive"))
            .is_some();

        let demands_close = match version {
            Version::HTTP_10 => !asks_for_keep_alive,
            _ => asks_for_close,
        };

        let expects_continue = version == Version::HTTP_11
            && req
                .headers()
                .typed_get::<headers::Expect>()
                .filter(|expect| expect == &headers::Expect::CONTINUE)
                .is_some();

        if expects_continue {
            let res = response::status(version, StatusCode::CONTINUE);
            response::write_response(res, &mut writer)?;
            writer.flush()?;
        }

        let mut res = app
            .handle(req)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;

        *res.version_mut() = version;

        // A failed handler may have left the request body half read
        if demands_close || res.status().is_server_error() {
            response::close(&mut res);
        } else if version == Version::HTTP_10 {
            res.headers_mut()
                .insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        }

        match response::write_response(res, &mut writer)? {
            Outcome::KeepAlive => writer.flush()?,
            Outcome::Close => {
                drop(reader);
                linger(&mut writer, &mut read_queue)?;
                break;
            }
        }
    }

    Ok(())
}

/// Finishes the response and discards whatever the client is still sending
/// for a short while, so closing the socket does not reset the connection
/// before the client has read the response.
fn linger<R: Read + Send>(
    writer: &mut BufWriter<Connection>,
    read_queue: &mut ReadQueue<R>,
) -> io::Result<()> {
    writer.flush()?;

    let conn = writer.get_ref();
    conn.shutdown_write()?;
    conn.set_read_timeout(Some(LINGER_TIMEOUT))?;

    io::copy(
        &mut read_queue.enqueue().take(MAX_LINGER_BYTES),
        &mut io::sink(),
    )
    .ok();

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read, Write},
        net::{Shutdown, TcpListener, TcpStream},
        sync::{Arc, Mutex},
        thread,
        time::Duration,
    };

    use super::*;

    type Seen = Arc<Mutex<Vec<(String, Vec<u8>)>>>;

    /// Serves a single connection with an app that records every request and
    /// answers with `status`.
    fn exchange(status: StatusCode, input: &[u8]) -> (String, Seen) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let seen: Seen = Default::default();
        let recorder = seen.clone();
        let server = thread::spawn(move || {
            let (conn, _) = listener.accept().unwrap();
            let app = move |req: Request<Body>| -> Result<Response<()>, io::Error> {
                let line = format!("{} {}", req.method(), req.uri());
                let body = req.into_body().into_bytes()?;
                recorder.lock().unwrap().push((line, body));
                let mut res = Response::new(());
                *res.status_mut() = status;
                Ok(res)
            };
            serve(Connection::from(conn), app, 1024).ok();
        });

        let mut client = TcpStream::connect(addr).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        client.write_all(input).unwrap();
        client.shutdown(Shutdown::Write).unwrap();

        let mut output = String::new();
        client.read_to_string(&mut output).unwrap();
        server.join().unwrap();

        (output, seen)
    }

    fn statuses(output: &str) -> Vec<&str> {
        output
            .lines()
            .filter(|line| line.starts_with("HTTP/"))
            .collect()
    }

    #[test]
    fn serves_pipelined_requests_in_order() {
        let (output, seen) = exchange(
            StatusCode::OK,
            b"POST /a HTTP/1.1\r\nContent-Length: 3\r\n\r\nlolGET /b HTTP/1.1\r\n\r\n",
        );

        assert_eq!(statuses(&output), ["HTTP/1.1 200 OK", "HTTP/1.1 200 OK"]);
        assert_eq!(
            *seen.lock().unwrap(),
            [
                ("POST /a".to_string(), b"lol".to_vec()),
                ("GET /b".to_string(), Vec::new()),
            ]
        );
    }

    #[test]
    fn closes_http_10_connections_by_default() {
        let (output, seen) = exchange(
            StatusCode::OK,
            b"GET /a HTTP/1.0\r\n\r\nGET /b HTTP/1.0\r\n\r\n",
        );

        assert_eq!(statuses(&output), ["HTTP/1.0 200 OK"]);
        assert!(output.contains("connection: close\r\n"));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn keeps_http_10_connections_alive_on_request() {
        let (output, _) = exchange(
            StatusCode::OK,
            b"GET /a HTTP/1.0\r\nConnection: keep-alive\r\n\r\nGET /b HTTP/1.0\r\n\r\n",
        );

        assert_eq!(statuses(&output), ["HTTP/1.0 200 OK", "HTTP/1.0 200 OK"]);
        assert!(output.contains("connection: keep-alive\r\n"));
    }

    #[test]
    fn closes_after_server_errors() {
        let (output, seen) = exchange(
            StatusCode::INTERNAL_SERVER_ERROR,
            b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n",
        );

        assert_eq!(statuses(&output), ["HTTP/1.1 500 Internal Server Error"]);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn answers_expect_continue() {
        let (output, seen) = exchange(
            StatusCode::OK,
            b"PUT /up HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 2\r\n\r\nok",
        );

        assert_eq!(statuses(&output), ["HTTP/1.1 100 Continue", "HTTP/1.1 200 OK"]);
        assert_eq!(seen.lock().unwrap()[0].1, b"ok");
    }

    #[test]
    fn rejects_malformed_requests() {
        let (output, seen) = exchange(StatusCode::OK, b"LOL WUT\r\n\r\n");

        assert_eq!(statuses(&output), ["HTTP/1.1 400 Bad Request"]);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn rejects_oversized_heads() {
        let head = format!("GET / HTTP/1.1\r\nX-Big: {}\r\n\r\n", "a".repeat(2048));
        let (output, seen) = exchange(StatusCode::OK, head.as_bytes());

        assert_eq!(
            statuses(&output),
            ["HTTP/1.1 431 Request Header Fields Too Large"]
        );
        assert!(seen.lock().unwrap().is_empty());
    }
}
