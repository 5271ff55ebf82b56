use std::{
    convert::Infallible,
    io::{self, BufWriter, Write},
    sync::Arc,
};

use http::{Request, Response, StatusCode};
use log::{error, info};
use thiserror::Error;

use crate::{
    counter::{Counter, Sequence},
    logging::REQUEST_TARGET,
    request::{write_request, RawTarget},
    sink::{DumpSink, FileSink},
    App, Body,
};

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("create dump file: {0}")]
    Create(#[source] io::Error),
    #[error("write dump: {0}")]
    Write(#[source] io::Error),
}

/// Writes every request it handles to its own dump, numbered in arrival
/// order, and answers with an empty `200 OK` (or `500` when the dump fails).
pub struct Dumper<C = Counter, S = FileSink> {
    counter: Arc<C>,
    sink: Arc<S>,
}

impl<C, S> Clone for Dumper<C, S> {
    fn clone(&self) -> Self {
        Self {
            counter: self.counter.clone(),
            sink: self.sink.clone(),
        }
    }
}

impl<S: DumpSink> Dumper<Counter, S> {
    pub fn new(sink: S) -> Self {
        Self::with_counter(Counter::new(), sink)
    }
}

impl<C: Sequence, S: DumpSink> Dumper<C, S> {
    pub fn with_counter(counter: C, sink: S) -> Self {
        Self {
            counter: Arc::new(counter),
            sink: Arc::new(sink),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Dumps one request under the next sequence number.
    pub fn dump(&self, req: Request<Body>) -> StatusCode {
        let sequence = self.counter.next();

        let path = match req.extensions().get::<RawTarget>() {
            Some(target) => target.path(),
            None => req.uri().path(),
        };
        info!(
            target: REQUEST_TARGET,
            "#{sequence:04}  {:<8} {path}",
            req.method().as_str()
        );

        match self.write(sequence, req) {
            Ok(()) => StatusCode::OK,
            Err(err) => {
                error!("#{sequence:04}  {err}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn write(&self, sequence: u64, req: Request<Body>) -> Result<(), DumpError> {
        let file = self.sink.create(sequence).map_err(DumpError::Create)?;

        let mut writer = BufWriter::new(file);
        write_request(req, &mut writer).map_err(DumpError::Write)?;
        writer.flush().map_err(DumpError::Write)
    }
}

impl<C: Sequence, S: DumpSink> App for Dumper<C, S> {
    type Error = Infallible;

    fn handle(&self, req: Request<Body>) -> Result<Response<()>, Self::Error> {
        let mut res = Response::new(());
        *res.status_mut() = self.dump(req);
        Ok(res)
    }
}
