use crate::util::{create_with_backoff, open_with_backoff, replace_file_atomic_backoff};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Minimal NDJSON reader with buffering and line-ending trimming.
/// Uses robust open-with-backoff for Windows-friendliness.
pub struct NdjsonReader {
    rdr: BufReader<File>,
}

impl NdjsonReader {
    pub fn open(path: &Path, buf_bytes: usize) -> io::Result<Self> {
        let f = open_with_backoff(path, 16, 50)?;
        Ok(Self { rdr: BufReader::with_capacity(buf_bytes.max(8 * 1024), f) })
    }

    /// Read the next line into `buf`. Returns the number of bytes read (0 on EOF).
    /// Strips trailing `\r?\n`. Invalid UTF-8 is replaced rather than failing the stream,
    /// so one bad line cannot stop a pass.
    pub fn read_line(&mut self, buf: &mut String) -> io::Result<usize> {
        buf.clear();
        let mut raw = Vec::new();
        let n = self.rdr.read_until(b'\n', &mut raw)?;
        if n == 0 { return Ok(0); }
        if raw.ends_with(b"\n") {
            raw.pop();
            if raw.ends_with(b"\r") { raw.pop(); }
        }
        buf.push_str(&String::from_utf8_lossy(&raw));
        Ok(n)
    }
}

/// Minimal NDJSON writer with buffering and robust file creation.
pub struct NdjsonWriter {
    path: PathBuf,
    w: Option<BufWriter<File>>,
}

impl NdjsonWriter {
    pub fn create(path: &Path, buf_bytes: usize) -> io::Result<Self> {
        let f = create_with_backoff(path, 16, 50)?;
        Ok(Self { path: path.to_path_buf(), w: Some(BufWriter::with_capacity(buf_bytes.max(8 * 1024), f)) })
    }

    /// Write one already-serialized record followed by `\n`.
    #[inline]
    pub fn write_bytes_line(&mut self, bytes: &[u8]) -> io::Result<()> {
        if let Some(w) = &mut self.w {
            w.write_all(bytes)?;
            w.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Flushes and atomically promotes the temp file to `final_path`.
    /// Use when the writer was created on a temp location.
    pub fn finish_atomic(mut self, final_path: &Path) -> Result<()> {
        if let Some(mut w) = self.w.take() {
            w.flush().with_context(|| format!("flush {}", self.path.display()))?;
        }
        replace_file_atomic_backoff(&self.path, final_path)
    }
}
