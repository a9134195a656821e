//! Append-only log sink.
//!
//! stdout and stderr are read on their own threads and forwarded line by line
//! through a channel to a single writer thread, so both streams interleave in
//! arrival order without tearing lines. The writer redacts each line and
//! flushes it before taking the next one; a reader tailing the file sees
//! output as it happens. Closing sends an explicit end marker, so a pump still
//! blocked on a pipe held open elsewhere cannot keep the file open.

use crate::credentials::Redactor;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

enum Chunk {
    Line(Vec<u8>),
    Close,
}

/// Writer end of a log file.
pub struct LogSink {
    path: PathBuf,
    tx: Option<Sender<Chunk>>,
    writer: Option<JoinHandle<io::Result<u64>>>,
}

impl LogSink {
    /// Open `path` for appending, creating parent directories.
    pub fn open(path: impl AsRef<Path>, redactor: Redactor) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let (tx, rx) = mpsc::channel::<Chunk>();
        let writer = thread::spawn(move || write_lines(file, rx, redactor));

        Ok(Self {
            path,
            tx: Some(tx),
            writer: Some(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start a thread copying `reader` into the sink line by line.
    pub fn pump<R: Read + Send + 'static>(&self, reader: R) -> Option<JoinHandle<()>> {
        let tx = self.tx.clone()?;
        Some(thread::spawn(move || {
            let mut reader = BufReader::new(reader);
            loop {
                let mut line = Vec::new();
                match reader.read_until(b'\n', &mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.send(Chunk::Line(line)).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::debug!(error = %e, "output pump stopped");
                        break;
                    }
                }
            }
        }))
    }

    /// Write a harness-authored line.
    pub fn note(&self, message: &str) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Chunk::Line(format!("[agentrig] {}\n", message).into_bytes()));
        }
    }

    /// Flush and close the file. Returns the number of lines written.
    ///
    /// Lines a pump sends after this point are dropped.
    pub fn close(mut self) -> io::Result<u64> {
        self.finish()
    }

    fn finish(&mut self) -> io::Result<u64> {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Chunk::Close);
        }
        match self.writer.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| io::Error::other("log writer thread panicked"))?,
            None => Ok(0),
        }
    }
}

impl Drop for LogSink {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to close log");
        }
    }
}

fn write_lines(file: File, rx: mpsc::Receiver<Chunk>, redactor: Redactor) -> io::Result<u64> {
    let mut file = file;
    let mut count = 0u64;

    for chunk in rx {
        let mut line = match chunk {
            Chunk::Line(line) => line,
            Chunk::Close => break,
        };
        if line.last() != Some(&b'\n') {
            line.push(b'\n');
        }
        if redactor.is_empty() {
            file.write_all(&line)?;
        } else {
            let text = String::from_utf8_lossy(&line);
            file.write_all(redactor.redact(&text).as_bytes())?;
        }
        file.flush()?;
        count += 1;
    }

    file.sync_all()?;
    Ok(count)
}
