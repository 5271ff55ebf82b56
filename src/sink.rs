use std::{
    fs::File,
    io::{self, Write},
    path::{Path, PathBuf},
};

/// Where request dumps are written to.
pub trait DumpSink: Send + Sync {
    type Writer: Write;

    /// Creates the destination for the dump with the given sequence number.
    fn create(&self, sequence: u64) -> io::Result<Self::Writer>;
}

/// Writes each dump to `<dir>/<prefix><sequence:04>.http`.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
    prefix: String,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, sequence: u64) -> PathBuf {
        self.dir.join(format!("{}{sequence:04}.http", self.prefix))
    }
}

impl DumpSink for FileSink {
    type Writer = File;

    fn create(&self, sequence: u64) -> io::Result<File> {
        File::create(self.path_for(sequence))
    }
}
