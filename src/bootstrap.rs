//! Startup: dump directory, dumper and listener.
//!
//! [`bootstrap`] covers everything that happens before the first request is
//! accepted and reports failures as [`BootstrapError`]s. Deciding to exit
//! the process is left to the caller.

use std::{
    fs::DirBuilder,
    io,
    net::SocketAddr,
    os::unix::fs::DirBuilderExt,
    path::{self, Path, PathBuf},
    time::Duration,
};

use log::info;
use thiserror::Error;

use crate::{config::Config, request::DEFAULT_MAX_HEAD_SIZE, Dumper, FileSink, Server};

pub const READ_TIMEOUT: Duration = Duration::from_secs(10);
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
pub const MAX_HEAD_SIZE: usize = DEFAULT_MAX_HEAD_SIZE;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("create dump directory {}: {source}", .dir.display())]
    CreateDir { dir: PathBuf, source: io::Error },
    #[error("resolve dump directory {}: {source}", .dir.display())]
    Resolve { dir: PathBuf, source: io::Error },
    #[error("listen on {addr}: {source}")]
    Bind { addr: String, source: io::Error },
    #[error("serve on {addr}: {source}")]
    Serve { addr: String, source: io::Error },
}

/// A bound server with its dumper, ready to accept requests.
pub struct DumpServer {
    server: Server,
    dumper: Dumper,
    addr: String,
}

/// Prepares the dump directory and binds the listener described by
/// `config`.
pub fn bootstrap(config: &Config) -> Result<DumpServer, BootstrapError> {
    let dir = prepare_dir(&config.dir)?;
    let dumper = Dumper::new(FileSink::new(dir, config.prefix.clone()));

    let addr = config.listen_address();
    let server = Server::builder()
        .read_timeout(READ_TIMEOUT)
        .write_timeout(WRITE_TIMEOUT)
        .max_head_size(MAX_HEAD_SIZE)
        .try_bind(&addr)
        .map_err(|source| BootstrapError::Bind {
            addr: addr.clone(),
            source,
        })?;

    Ok(DumpServer {
        server,
        dumper,
        addr,
    })
}

/// Creates `dir` with any missing parents and returns its absolute path.
pub fn prepare_dir(dir: &Path) -> Result<PathBuf, BootstrapError> {
    DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(dir)
        .map_err(|source| BootstrapError::CreateDir {
            dir: dir.to_path_buf(),
            source,
        })?;

    path::absolute(dir).map_err(|source| BootstrapError::Resolve {
        dir: dir.to_path_buf(),
        source,
    })
}

impl DumpServer {
    pub fn dumps_dir(&self) -> &Path {
        self.dumper.sink().dir()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.server.local_addr()
    }

    /// Serves requests until the listener fails.
    pub fn run(self) -> Result<(), BootstrapError> {
        let DumpServer {
            server,
            dumper,
            addr,
        } = self;

        info!("Dumps dir: {}", dumper.sink().dir().display());
        info!("Listening: {addr}");

        server
            .serve(dumper)
            .map_err(|source| BootstrapError::Serve { addr, source })
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, net::TcpListener, os::unix::fs::PermissionsExt};

    use super::*;

    fn config(dir: PathBuf) -> Config {
        Config {
            host: "127.0.0.1".into(),
            port: 0,
            dir,
            prefix: "req_".into(),
        }
    }

    #[test]
    fn creates_nested_dump_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("a/b/c");

        let resolved = prepare_dir(&dir).unwrap();

        assert_eq!(resolved, dir);
        let meta = fs::metadata(&dir).unwrap();
        assert!(meta.is_dir());
        assert_eq!(meta.permissions().mode() & 0o022, 0);
    }

    #[test]
    fn resolves_relative_directories() {
        let resolved = prepare_dir(Path::new(".")).unwrap();

        assert!(resolved.is_absolute());
    }

    #[test]
    fn fails_when_the_dump_directory_is_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("taken");
        fs::write(&file, "lol").unwrap();

        assert!(matches!(
            prepare_dir(&file.join("dumps")),
            Err(BootstrapError::CreateDir { .. })
        ));
    }

    #[test]
    fn binds_the_configured_address() {
        let tmp = tempfile::tempdir().unwrap();

        let server = bootstrap(&config(tmp.path().join("dumps"))).unwrap();

        assert!(server.local_addr().unwrap().ip().is_loopback());
        assert_eq!(server.dumps_dir(), tmp.path().join("dumps"));
    }

    #[test]
    fn fails_when_the_port_is_taken() {
        let tmp = tempfile::tempdir().unwrap();
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();

        let config = Config {
            port: taken.local_addr().unwrap().port(),
            ..config(tmp.path().to_path_buf())
        };

        let err = bootstrap(&config).err().unwrap();
        assert!(matches!(err, BootstrapError::Bind { .. }));
        assert!(err.to_string().starts_with("listen on 127.0.0.1:"));
    }
}
