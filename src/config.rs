use std::{ffi::OsString, path::PathBuf};

use clap::Parser;

const LONG_FLAGS: [&str; 4] = ["host", "port", "dir", "prefix"];

/// Dumps every incoming HTTP request to a file.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "http-dump", version, about, long_about = None)]
pub struct Config {
    /// HTTP server's host
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// HTTP server's port
    #[arg(long, default_value_t = 80)]
    pub port: u16,

    /// HTTP requests dump directory
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Name prefix of request dumps
    #[arg(long, default_value = "request_")]
    pub prefix: String,
}

impl Config {
    /// Parses the process arguments, exiting with usage on error.
    pub fn from_args() -> Self {
        Self::parse_from(normalize_args(std::env::args_os()))
    }

    pub fn try_from_iter<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self::try_parse_from(normalize_args(args))
    }

    /// `host:port`, with IPv6 hosts in brackets.
    pub fn listen_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 80,
            dir: PathBuf::from("."),
            prefix: "request_".into(),
        }
    }
}

/// Accepts the single dash spelling of the long flags (`-port=8080`,
/// `-dir /tmp`) by rewriting them to `--port=8080`, `--dir /tmp`.
fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut passthrough = false;

    args.into_iter()
        .map(Into::into)
        .enumerate()
        .map(|(i, arg)| {
            if i == 0 || passthrough {
                return arg;
            }
            if arg == "--" {
                passthrough = true;
                return arg;
            }

            let rewritten = match arg.to_str().and_then(|arg| arg.strip_prefix('-')) {
                Some(flag) if !flag.starts_with('-') => {
                    let name = flag.split_once('=').map_or(flag, |(name, _)| name);
                    LONG_FLAGS.contains(&name).then(|| format!("--{flag}"))
                }
                _ => None,
            };

            rewritten.map(OsString::from).unwrap_or(arg)
        })
        .collect()
}
