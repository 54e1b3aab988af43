//! Terminator-delimited command framing.
//!
//! Bytes arrive in arbitrary chunks. The framer accumulates them and yields one
//! trimmed line per terminator, keeping any trailing partial command for the
//! next read.

use tracing::warn;

/// Longest command accepted without a terminator before the buffer is dropped.
const MAX_PENDING: usize = 4096;

#[derive(Debug, Clone)]
pub struct LineFramer {
    terminator: Vec<u8>,
    pending: Vec<u8>,
}

impl LineFramer {
    pub fn new(terminator: &str) -> Self {
        Self {
            terminator: terminator.as_bytes().to_vec(),
            pending: Vec::new(),
        }
    }

    /// Append received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        if self.pending.len() > MAX_PENDING && self.find_terminator().is_none() {
            warn!(
                bytes = self.pending.len(),
                "discarding oversized command without terminator"
            );
            self.pending.clear();
        }
    }

    /// Take the next complete command, if one has arrived.
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.find_terminator()?;
        let rest = self.pending.split_off(end + self.terminator.len());
        let mut line = std::mem::replace(&mut self.pending, rest);
        line.truncate(end);
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }

    /// Bytes received after the last terminator.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    fn find_terminator(&self) -> Option<usize> {
        if self.terminator.is_empty() {
            return None;
        }
        self.pending
            .windows(self.terminator.len())
            .position(|window| window == self.terminator.as_slice())
    }
}
