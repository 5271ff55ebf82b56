#![allow(dead_code)]

use std::{
    io::{Read, Write},
    net::{Shutdown, SocketAddr, TcpStream},
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use http_dump::{bootstrap, Config};
use tempfile::TempDir;

pub struct TestServer {
    pub addr: SocketAddr,
    pub dir: PathBuf,
    _tmp: TempDir,
}

/// Boots a dump server on an ephemeral port, dumping into a fresh
/// temporary directory.
pub fn start(prefix: &str) -> TestServer {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config {
        host: "127.0.0.1".into(),
        port: 0,
        dir: tmp.path().join("dumps"),
        prefix: prefix.into(),
    };

    let server = bootstrap(&config).unwrap();
    let addr = server.local_addr().unwrap();
    let dir = server.dumps_dir().to_path_buf();
    thread::spawn(move || server.run());

    TestServer {
        addr,
        dir,
        _tmp: tmp,
    }
}

impl TestServer {
    pub fn dump(&self, name: &str) -> Vec<u8> {
        std::fs::read(self.dir.join(name)).unwrap()
    }

    pub fn dumps(&self) -> Vec<String> {
        let mut names = std::fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .map(|entry| entry.unwrap().file_name().into_string().unwrap())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

/// Sends raw bytes on a new connection and returns everything the server
/// answered until it closed the connection.
pub fn send(addr: SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream.write_all(raw).unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
}

/// Like [`send`], but also shuts down the write side once `raw` is sent, so
/// the server sees the end of the stream.
pub fn send_and_close(addr: SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream.write_all(raw).unwrap();
    stream.shutdown(Shutdown::Write).unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
}

pub fn status_line(response: &str) -> &str {
    response.lines().next().unwrap_or_default()
}

pub fn remove(dir: &Path) {
    std::fs::remove_dir_all(dir).unwrap();
}
