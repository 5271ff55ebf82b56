use std::{
    io,
    net::{SocketAddr, TcpListener, ToSocketAddrs},
    thread,
    time::Duration,
};

use log::{debug, error};
use threadpool::ThreadPool;

use crate::{connection::Connection, request::DEFAULT_MAX_HEAD_SIZE, serve, App};

const MIN_ACCEPT_BACKOFF: Duration = Duration::from_millis(5);
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

pub struct Server {
    listener: TcpListener,
    thread_pool: ThreadPool,
    settings: Settings,
}

#[derive(Debug, Clone, Copy)]
struct Settings {
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    max_head_size: usize,
}

impl Server {
    /// Accepts connections until the listener fails, handling each one on
    /// the thread pool.
    pub fn serve<Handle>(self, app: Handle) -> io::Result<()>
    where
        Handle: App,
        Handle: Send + Clone + 'static,
    {
        let mut backoff: Option<Duration> = None;

        loop {
            let conn = match self.listener.accept() {
                Ok(accepted) => {
                    backoff = None;
                    Connection::from(accepted)
                }
                Err(err) if is_transient(&err) => {
                    let delay = next_backoff(backoff);
                    error!("accept error: {err}; retrying in {delay:?}");
                    thread::sleep(delay);
                    backoff = Some(delay);
                    continue;
                }
                Err(err) => return Err(err),
            };

            let Settings {
                read_timeout,
                write_timeout,
                max_head_size,
            } = self.settings;

            if let Err(err) = conn
                .set_read_timeout(read_timeout)
                .and_then(|_| conn.set_write_timeout(write_timeout))
            {
                debug!("dropping connection from {:?}: {err}", conn.peer_addr());
                continue;
            }

            let app = app.clone();
            self.thread_pool.execute(move || {
                let peer = conn.peer_addr();
                if let Err(err) = serve(conn, app, max_head_size) {
                    debug!("connection from {peer:?} ended: {err}");
                }
            });
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn builder() -> ServerBuilder {
        Default::default()
    }

    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Server> {
        Self::builder().try_bind(addr)
    }
}

fn next_backoff(previous: Option<Duration>) -> Duration {
    previous.map_or(MIN_ACCEPT_BACKOFF, |delay| (delay * 2).min(MAX_ACCEPT_BACKOFF))
}

fn is_transient(err: &io::Error) -> bool {
    // EMFILE and ENFILE: out of descriptors until some connection closes
    const EMFILE: i32 = 24;
    const ENFILE: i32 = 23;

    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) || matches!(err.raw_os_error(), Some(EMFILE | ENFILE))
}

pub struct ServerBuilder {
    max_threads: usize,
    settings: Settings,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self {
            max_threads: 512,
            settings: Settings {
                read_timeout: None,
                write_timeout: None,
                max_head_size: DEFAULT_MAX_HEAD_SIZE,
            },
        }
    }
}

impl ServerBuilder {
    pub fn max_threads(self, max_threads: usize) -> Self {
        Self {
            max_threads,
            ..self
        }
    }

    /// Upper bound for each read from a client socket.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.settings.read_timeout = Some(timeout);
        self
    }

    /// Upper bound for each write to a client socket.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.settings.write_timeout = Some(timeout);
        self
    }

    /// Largest accepted request head (request line plus headers), in bytes.
    pub fn max_head_size(mut self, max_head_size: usize) -> Self {
        self.settings.max_head_size = max_head_size;
        self
    }

    pub fn try_bind<A: ToSocketAddrs>(self, addr: A) -> io::Result<Server> {
        let listener = TcpListener::bind(addr)?;
        Ok(Server {
            listener,
            thread_pool: ThreadPool::new(self.max_threads),
            settings: self.settings,
        })
    }
}
