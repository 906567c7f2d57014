//! Log capture for the dashboard
//!
//! While the alternate screen is active, tracing output is routed into a
//! bounded in-memory buffer and shown in the dashboard's log pane instead of
//! being written over the UI.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;

/// Lines kept before the oldest are dropped.
const DEFAULT_CAPACITY: usize = 500;

/// Shared, bounded list of recent log lines.
#[derive(Clone)]
pub struct LogBuffer {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        while lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// The newest `n` lines, oldest first. Does not consume them.
    pub fn tail(&self, n: usize) -> Vec<String> {
        let lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        let skip = lines.len().saturating_sub(n);
        lines.iter().skip(skip).cloned().collect()
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-event writer handed out to tracing-subscriber.
///
/// Collects bytes and pushes every complete line; a trailing partial line
/// is pushed when the writer is dropped.
pub struct LineWriter {
    target: LogBuffer,
    partial: Vec<u8>,
}

impl LineWriter {
    fn push_line(&mut self, bytes: &[u8]) {
        let line = String::from_utf8_lossy(bytes);
        let line = line.trim_end_matches(['\r', '\n']);
        if !line.is_empty() {
            self.target.push(line);
        }
    }
}

impl Write for LineWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.partial.extend_from_slice(buf);
        while let Some(end) = self.partial.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.partial.drain(..=end).collect();
            self.push_line(&line);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.partial.is_empty() {
            let rest = std::mem::take(&mut self.partial);
            self.push_line(&rest);
        }
        Ok(())
    }
}

impl Drop for LineWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LineWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LineWriter {
            target: self.clone(),
            partial: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_is_non_destructive() {
        let logs = LogBuffer::new();
        logs.push("one");
        logs.push("two");
        logs.push("three");

        assert_eq!(logs.tail(2), vec!["two", "three"]);
        assert_eq!(logs.tail(10), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let logs = LogBuffer::with_capacity(3);
        for i in 0..5 {
            logs.push(format!("line {}", i));
        }
        assert_eq!(logs.tail(usize::MAX), vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn test_writer_splits_lines_and_flushes_rest_on_drop() {
        let logs = LogBuffer::new();
        {
            let mut writer = logs.make_writer();
            writer.write_all(b"first\r\nsecond\npart").unwrap();
            assert_eq!(logs.tail(10), vec!["first", "second"]);
        }
        assert_eq!(logs.tail(10), vec!["first", "second", "part"]);
    }

    #[test]
    fn test_tracing_output_lands_in_buffer() {
        let logs = LogBuffer::new();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_target(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("Timer event posted");
        });

        let lines = logs.tail(1);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("INFO"));
        assert!(lines[0].ends_with("Timer event posted"));
    }
}
