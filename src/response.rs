use std::{
    io::{self, Write},
    time::SystemTime,
};

use headers::{HeaderMapExt, HeaderValue};
use http::{Response, StatusCode, Version};

/// Whether the connection can serve another request after a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    KeepAlive,
    Close,
}

pub(crate) fn status(version: Version, status: StatusCode) -> Response<()> {
    let mut res = Response::new(());
    *res.status_mut() = status;
    *res.version_mut() = version;
    res
}

/// Writes a bodiless response. `date` and `content-length: 0` are always
/// sent; a `connection: close` header set by the caller ends the connection.
pub(crate) fn write_response(
    mut res: Response<()>,
    stream: &mut impl Write,
) -> io::Result<Outcome> {
    let informational = res.status().is_informational();

    if !informational {
        res.headers_mut().typed_insert(headers::Date::from(SystemTime::now()));
        res.headers_mut().typed_insert(headers::ContentLength(0));
    }

    let closes = res
        .headers()
        .typed_get::<headers::Connection>()
        .filter(|conn| conn.contains("close"))
        .is_some();

    let (parts, ()) = res.into_parts();

    stream.write_all(format!("{:?} {}\r\n", parts.version, parts.status).as_bytes())?;

    for (name, val) in parts.headers.iter() {
        stream.write_all(format!("{name}: ").as_bytes())?;
        stream.write_all(val.as_bytes())?;
        stream.write_all(b"\r\n")?;
    }

    stream.write_all(b"\r\n")?;

    Ok(if closes { Outcome::Close } else { Outcome::KeepAlive })
}

pub(crate) fn close(res: &mut Response<()>) {
    res.headers_mut()
        .insert(http::header::CONNECTION, HeaderValue::from_static("close"));
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn written(res: Response<()>) -> (String, Outcome) {
        let mut output: Cursor<Vec<u8>> = Cursor::new(Vec::new());
        let outcome = write_response(res, &mut output).unwrap();
        (String::from_utf8(output.into_inner()).unwrap(), outcome)
    }

    #[test]
    fn writes_bodiless_responses() {
        let (output, outcome) = written(status(Version::HTTP_11, StatusCode::OK));

        assert!(output.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(output.contains("\r\ndate: "));
        assert!(output.contains("\r\ncontent-length: 0\r\n"));
        assert!(output.ends_with("\r\n\r\n"));
        assert_eq!(outcome, Outcome::KeepAlive);
    }

    #[test]
    fn writes_the_request_version() {
        let (output, _) = written(status(Version::HTTP_10, StatusCode::INTERNAL_SERVER_ERROR));

        assert!(output.starts_with("HTTP/1.0 500 Internal Server Error\r\n"));
    }

    #[test]
    fn close_header_ends_the_connection() {
        let mut res = status(Version::HTTP_11, StatusCode::BAD_REQUEST);
        close(&mut res);

        let (output, outcome) = written(res);

        assert!(output.contains("\r\nconnection: close\r\n"));
        assert_eq!(outcome, Outcome::Close);
    }

    #[test]
    fn informational_responses_are_bare() {
        let (output, outcome) = written(status(Version::HTTP_11, StatusCode::CONTINUE));

        assert_eq!(output, "HTTP/1.1 100 Continue\r\n\r\n");
        assert_eq!(outcome, Outcome::KeepAlive);
    }
}
