//! Per-connection wiring (§4.D): the protocol-level `pool_core::Session`
//! plus the outbound channel and receive-buffer I/O owns.
//!
//! Grounded on the teacher's `StratumSession` (`mining/src/stratum.rs`),
//! which pairs a `Mutex<SessionState>` with an `mpsc::Sender<String>` for
//! writes so the reader loop never blocks on a slow client.

use pool_core::{AlgorithmId, Session};
use tokio::sync::mpsc;

/// One connected miner: protocol state plus the channel its writer task
/// drains (§5 "send is best-effort non-blocking").
pub struct SessionEntry {
    pub session: Session,
    pub outbound: mpsc::Sender<String>,
    /// Bytes received but not yet split into complete newline-delimited
    /// messages (§4.D "incomplete suffixes remain buffered").
    pub recv_buf: Vec<u8>,
}

impl SessionEntry {
    pub fn new(
        session_id: String,
        algorithm: AlgorithmId,
        pool_secondary_address: String,
        outbound: mpsc::Sender<String>,
    ) -> Self {
        SessionEntry {
            session: Session::new(session_id, algorithm, pool_secondary_address),
            outbound,
            recv_buf: Vec::new(),
        }
    }

    /// Best-effort send (§5): a full channel drops the line rather than
    /// blocking the caller.
    pub fn send_line(&self, line: String) {
        let _ = self.outbound.try_send(line);
    }

    /// Appends freshly-read bytes and drains every complete newline-delimited
    /// message, leaving any incomplete suffix buffered for next time.
    pub fn drain_messages(&mut self, chunk: &[u8]) -> Vec<String> {
        self.recv_buf.extend_from_slice(chunk);
        let mut messages = Vec::new();
        while let Some(pos) = self.recv_buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.recv_buf.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            if !line.is_empty() {
                if let Ok(text) = std::str::from_utf8(line) {
                    messages.push(text.trim_end_matches('\r').to_string());
                }
            }
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> SessionEntry {
        let (tx, _rx) = mpsc::channel(8);
        SessionEntry::new("sess".into(), AlgorithmId::Sha256d, "pool-default".into(), tx)
    }

    #[test]
    fn drains_complete_lines_and_buffers_suffix() {
        let mut e = entry();
        let msgs = e.drain_messages(b"{\"a\":1}\n{\"b\":2}\npartial");
        assert_eq!(msgs, vec!["{\"a\":1}".to_string(), "{\"b\":2}".to_string()]);
        assert_eq!(e.recv_buf, b"partial");
    }

    #[test]
    fn completes_buffered_suffix_on_next_chunk() {
        let mut e = entry();
        assert!(e.drain_messages(b"{\"a\":1").is_empty());
        let msgs = e.drain_messages(b"}\n");
        assert_eq!(msgs, vec!["{\"a\":1}".to_string()]);
    }
}
