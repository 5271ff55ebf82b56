use std::{
    io::{self, BufRead, Read},
    mem,
    sync::mpsc::{self, Receiver, Sender},
};

// Thanks to tiny-http to come up with this "trampoline" idea, solved the
// pipelining problem pretty well:
// https://github.com/tiny-http/tiny-http/blob/master/src/util/sequential.rs
//
// Each request gets a `QueuedReader`. A request body may hold on to its
// reader after the head has been parsed; the next request only gets the
// stream once that reader is dropped.
pub enum ReadQueue<R> {
    Head(R),
    Next(Receiver<R>),
}

pub struct QueuedReader<R>
where
    R: Read + Send,
{
    reader: Option<QueuedReaderInner<R>>,
    next: Sender<R>,
}

enum QueuedReaderInner<R> {
    Current(R),
    Waiting(Receiver<R>),
}

fn abandoned() -> io::Error {
    io::Error::new(
        io::ErrorKind::BrokenPipe,
        "previous request abandoned the connection",
    )
}

impl<R: Read + Send> ReadQueue<R> {
    pub fn new(reader: R) -> ReadQueue<R> {
        ReadQueue::Head(reader)
    }

    pub fn enqueue(&mut self) -> QueuedReader<R> {
        let (tx, rx) = mpsc::channel();

        match mem::replace(self, ReadQueue::Next(rx)) {
            ReadQueue::Head(reader) => QueuedReader {
                reader: Some(QueuedReaderInner::Current(reader)),
                next: tx,
            },
            ReadQueue::Next(previous) => QueuedReader {
                reader: Some(QueuedReaderInner::Waiting(previous)),
                next: tx,
            },
        }
    }
}

impl<R: Read + Send> QueuedReader<R> {
    fn current(&mut self) -> io::Result<&mut R> {
        if let Some(QueuedReaderInner::Waiting(ref rx)) = self.reader {
            let reader = rx.recv().map_err(|_| abandoned())?;
            self.reader = Some(QueuedReaderInner::Current(reader));
        }

        match self.reader {
            Some(QueuedReaderInner::Current(ref mut reader)) => Ok(reader),
            _ => Err(abandoned()),
        }
    }
}

impl<R: Read + Send> Read for QueuedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.current()?.read(buf)
    }
}

impl<R: BufRead + Send> BufRead for QueuedReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.current()?.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        if let Ok(reader) = self.current() {
            reader.consume(amt)
        }
    }
}

impl<R: Read + Send> Drop for QueuedReader<R> {
    #[allow(unused_must_use)]
    fn drop(&mut self) {
        match self.reader.take() {
            Some(QueuedReaderInner::Current(reader)) => {
                self.next.send(reader);
            }
            Some(QueuedReaderInner::Waiting(rx)) => {
                if let Ok(reader) = rx.recv() {
                    self.next.send(reader);
                }
            }
            None => {}
        }
    }
}
