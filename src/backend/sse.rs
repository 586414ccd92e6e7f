//! Incremental `text/event-stream` decoding
//!
//! Only the `data` field matters to the console: event names, ids and retry
//! hints are ignored. An event still being assembled when the connection
//! closes is discarded.

use super::BackendError;

/// Upper bound for one line, and for the data of one event
pub const MAX_EVENT_BYTES: usize = 1024 * 1024;

/// Turns byte chunks into complete event `data` payloads
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to hold no newline
    scanned: usize,
    data: String,
    has_data: bool,
    max_event_bytes: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            data: String::new(),
            has_data: false,
            max_event_bytes: MAX_EVENT_BYTES,
        }
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_event_bytes(mut self, max: usize) -> Self {
        self.max_event_bytes = max;
        self
    }

    /// Feed one chunk and collect every event it completes.
    ///
    /// Fails once a line or an event grows past the size limit.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, BackendError> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') {
            let end = self.scanned + offset;
            let mut line = &self.buffer[start..end];
            if let [rest @ .., b'\r'] = line {
                line = rest;
            }
            let line = String::from_utf8_lossy(line).into_owned();
            start = end + 1;
            self.scanned = start;
            if let Some(event) = self.process_line(&line)? {
                events.push(event);
            }
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();

        if self.buffer.len() > self.max_event_bytes {
            return Err(self.overflow("line"));
        }
        Ok(events)
    }

    fn process_line(&mut self, line: &str) -> Result<Option<String>, BackendError> {
        if line.is_empty() {
            if !self.has_data {
                return Ok(None);
            }
            self.has_data = false;
            let mut data = std::mem::take(&mut self.data);
            if data.ends_with('\n') {
                data.pop();
            }
            return Ok(Some(data));
        }

        if line.starts_with(':') {
            return Ok(None);
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        if field == "data" {
            if self.data.len() + value.len() + 1 > self.max_event_bytes {
                return Err(self.overflow("event"));
            }
            self.data.push_str(value);
            self.data.push('\n');
            self.has_data = true;
        }
        Ok(None)
    }

    fn overflow(&mut self, what: &str) -> BackendError {
        self.buffer.clear();
        self.scanned = 0;
        self.data.clear();
        self.has_data = false;
        BackendError::StreamError(format!("{what} exceeds {} bytes", self.max_event_bytes))
    }
}
