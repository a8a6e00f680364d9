//! Output destinations for output passes

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::PassError;

/// Where an output pass writes
#[derive(Debug, Default)]
pub enum OutputSink {
    #[default]
    Stdout,
    Stderr,
    File {
        path: PathBuf,
        writer: BufWriter<File>,
    },
    /// Collects output in memory
    Buffer(Vec<u8>),
}

impl OutputSink {
    /// Open `path` for writing, truncating it
    pub fn file(path: &Path) -> Result<Self, PassError> {
        let file = File::create(path)
            .map_err(|err| PassError::io(format!("cannot open {}", path.display()), err))?;
        tracing::debug!(path = %path.display(), "output sink switched to file");
        Ok(OutputSink::File {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    /// Bytes collected by a buffer sink
    pub fn buffered(&self) -> Option<&[u8]> {
        match self {
            OutputSink::Buffer(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            OutputSink::Stdout => "stdout".to_string(),
            OutputSink::Stderr => "stderr".to_string(),
            OutputSink::File { path, .. } => path.display().to_string(),
            OutputSink::Buffer(_) => "buffer".to_string(),
        }
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputSink::Stdout => io::stdout().write(buf),
            OutputSink::Stderr => io::stderr().write(buf),
            OutputSink::File { writer, .. } => writer.write(buf),
            OutputSink::Buffer(bytes) => bytes.write(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            OutputSink::Stdout => io::stdout().lock().write_all(buf),
            OutputSink::Stderr => io::stderr().lock().write_all(buf),
            OutputSink::File { writer, .. } => writer.write_all(buf),
            OutputSink::Buffer(bytes) => bytes.write_all(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputSink::Stdout => io::stdout().flush(),
            OutputSink::Stderr => io::stderr().flush(),
            OutputSink::File { writer, .. } => writer.flush(),
            OutputSink::Buffer(_) => Ok(()),
        }
    }
}
