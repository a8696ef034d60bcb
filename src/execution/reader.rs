//! Pipe reader threads.
//!
//! Each reader owns one child pipe and drains it on its own thread. Readers
//! check the session's cancellation flag between reads only; a reader stuck
//! in a read is released by the child's termination closing the pipe.

use std::fmt;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, trace, warn};

use super::session::POLL_INTERVAL;
use crate::encoding::StreamDecoder;

/// Buffer size for collect-mode reads.
const READ_BUFFER_SIZE: usize = 4096;

/// Callback invoked with each output line, terminator stripped.
pub type LineCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Wrap a closure as a [`LineCallback`].
pub fn line_callback<F>(f: F) -> LineCallback
where
    F: Fn(&str) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Which child pipe a reader drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a reader consumes its pipe.
#[derive(Clone)]
pub(crate) enum ReadMode {
    /// Split into lines, forward each to the callback as it arrives.
    Lines(LineCallback),
    /// Accumulate raw bytes, decoded once at the end.
    Collect,
}

/// Output captured by one reader so far.
#[derive(Debug, Default)]
struct Captured {
    lines: Vec<String>,
    bytes: Vec<u8>,
}

/// Handle to a running reader thread and its capture buffer.
pub(crate) struct StreamReader {
    kind: StreamKind,
    handle: Option<JoinHandle<()>>,
    captured: Arc<Mutex<Captured>>,
    decoder: StreamDecoder,
}

impl StreamReader {
    /// Start draining `pipe` on a new thread.
    pub(crate) fn spawn<R>(
        kind: StreamKind,
        pipe: R,
        mode: ReadMode,
        decoder: StreamDecoder,
        cancelled: Arc<AtomicBool>,
    ) -> std::io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let buffer = Arc::clone(&captured);

        let handle = thread::Builder::new()
            .name(format!("{}-reader", kind))
            .spawn(move || match mode {
                ReadMode::Lines(callback) => {
                    read_lines(kind, pipe, &decoder, &callback, &buffer, &cancelled)
                }
                ReadMode::Collect => read_all(kind, pipe, &buffer, &cancelled),
            })?;

        Ok(Self {
            kind,
            handle: Some(handle),
            captured,
            decoder,
        })
    }

    /// Wait for the reader to finish, giving up at `deadline`.
    ///
    /// Returns `true` if the thread finished. A reader still running at the
    /// deadline is left detached.
    pub(crate) fn join_until(&mut self, deadline: Instant) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };

        while !handle.is_finished() {
            if Instant::now() >= deadline {
                debug!(stream = %self.kind, "reader still busy after grace period, detaching");
                return false;
            }
            thread::sleep(POLL_INTERVAL);
        }

        if handle.join().is_err() {
            warn!(stream = %self.kind, "reader thread panicked");
        }
        true
    }

    /// Everything captured so far, in read order.
    pub(crate) fn snapshot(&self) -> String {
        let captured = self
            .captured
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut text = captured.lines.concat();
        if !captured.bytes.is_empty() {
            text.push_str(&self.decoder.decode(&captured.bytes));
        }
        text
    }
}

fn read_lines<R: Read>(
    kind: StreamKind,
    pipe: R,
    decoder: &StreamDecoder,
    callback: &LineCallback,
    buffer: &Mutex<Captured>,
    cancelled: &AtomicBool,
) {
    let mut reader = BufReader::new(pipe);
    let mut raw = Vec::new();

    loop {
        if cancelled.load(Ordering::Acquire) {
            debug!(stream = %kind, "reader observed cancellation");
            break;
        }

        raw.clear();
        match reader.read_until(b'\n', &mut raw) {
            Ok(0) => {
                trace!(stream = %kind, "EOF");
                break;
            }
            Ok(_) => {
                let line = decoder.decode(&raw);
                let stripped = strip_line_terminator(&line).to_string();
                buffer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .lines
                    .push(line);
                callback(&stripped);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(stream = %kind, error = %e, "read failed, stopping reader");
                break;
            }
        }
    }
}

fn read_all<R: Read>(kind: StreamKind, mut pipe: R, buffer: &Mutex<Captured>, cancelled: &AtomicBool) {
    let mut buf = [0u8; READ_BUFFER_SIZE];

    loop {
        if cancelled.load(Ordering::Acquire) {
            debug!(stream = %kind, "reader observed cancellation");
            break;
        }

        match pipe.read(&mut buf) {
            Ok(0) => {
                trace!(stream = %kind, "EOF");
                break;
            }
            Ok(n) => {
                trace!(stream = %kind, "read {} bytes", n);
                buffer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .bytes
                    .extend_from_slice(&buf[..n]);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(stream = %kind, error = %e, "read failed, stopping reader");
                break;
            }
        }
    }
}

/// Strip one trailing `\n` or `\r\n`.
pub(crate) fn strip_line_terminator(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .unwrap_or(line)
}
