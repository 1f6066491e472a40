//! Log channel streaming.
//!
//! `GET /v1/channels/{channel}/stream` answers with newline-delimited JSON;
//! every non-empty line is one raw `JobResponse` payload. The stream ends
//! when the executor closes the channel. Lines longer than 1 MiB are dropped.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use gradebox_core::{PubSub, Subscription, TransportError, TransportResult};
use reqwest::header::ACCEPT;
use reqwest::{Method, Response};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::client::{check, GatewayClient};
use crate::config::url_for;

const CHANNEL_CAPACITY: usize = 64;
const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Pub/sub over the gateway's streaming endpoint.
#[derive(Debug)]
pub struct HttpPubSub {
    client: Arc<GatewayClient>,
    open: Mutex<Vec<CancellationToken>>,
}

impl HttpPubSub {
    pub(crate) fn new(client: Arc<GatewayClient>) -> Self {
        Self {
            client,
            open: Mutex::new(Vec::new()),
        }
    }

    fn track(&self, stop: CancellationToken) {
        match self.open.lock() {
            Ok(mut open) => open.push(stop),
            Err(poisoned) => poisoned.into_inner().push(stop),
        }
    }
}

#[async_trait]
impl PubSub for HttpPubSub {
    #[instrument(skip(self))]
    async fn subscribe(&self, channel: &str) -> TransportResult<Subscription> {
        let failed = |reason: String| TransportError::Subscribe {
            channel: channel.to_string(),
            reason,
        };
        let url = url_for(&self.client.config.endpoint, &["v1", "channels", channel, "stream"])
            .map_err(|e| failed(e.to_string()))?;
        let response = self
            .client
            .request(Method::GET, url)
            .header(ACCEPT, "application/x-ndjson")
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;
        let response = check(response).await.map_err(|e| failed(e.to_string()))?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let stop = CancellationToken::new();
        self.track(stop.clone());
        tokio::spawn(forward_lines(
            channel.to_string(),
            response,
            tx,
            stop.clone(),
        ));
        Ok(Subscription::new(channel, rx, stop))
    }

    async fn close(&self) -> TransportResult<()> {
        let open = match self.open.lock() {
            Ok(mut open) => std::mem::take(&mut *open),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for stop in open {
            stop.cancel();
        }
        Ok(())
    }
}

async fn forward_lines(
    channel: String,
    response: Response,
    tx: mpsc::Sender<Vec<u8>>,
    stop: CancellationToken,
) {
    let mut body = response.bytes_stream();
    let mut lines = LineSplitter::new(MAX_LINE_BYTES);
    let mut forwarded: u64 = 0;

    loop {
        let chunk = tokio::select! {
            _ = stop.cancelled() => break,
            chunk = body.next() => chunk,
        };
        let ready = match chunk {
            Some(Ok(bytes)) => lines.push(&bytes),
            Some(Err(e)) => {
                warn!(channel = %channel, error = %e, "log stream interrupted");
                break;
            }
            None => {
                if let Some(line) = lines.finish() {
                    if tx.send(line).await.is_ok() {
                        forwarded += 1;
                    }
                }
                break;
            }
        };
        for line in ready {
            if tx.send(line).await.is_err() {
                return;
            }
            forwarded += 1;
        }
        if lines.dropped() > 0 {
            warn!(
                channel = %channel,
                limit = MAX_LINE_BYTES,
                dropped = lines.dropped(),
                "dropped oversized log lines"
            );
            lines.reset_dropped();
        }
    }
    debug!(channel = %channel, forwarded, "log stream closed");
}

/// Splits a byte stream on `\n`, dropping blank lines and lines longer
/// than `limit`.
#[derive(Debug)]
struct LineSplitter {
    limit: usize,
    pending: Vec<u8>,
    /// Set while the rest of an oversized line is being skipped.
    skipping: bool,
    dropped: usize,
}

impl LineSplitter {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            pending: Vec::new(),
            skipping: false,
            dropped: 0,
        }
    }

    fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut ready = Vec::new();
        let mut rest = bytes;
        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            rest = &tail[1..];
            if std::mem::take(&mut self.skipping) {
                continue;
            }
            if self.pending.len() + head.len() > self.limit {
                self.pending.clear();
                self.dropped += 1;
                continue;
            }
            self.pending.extend_from_slice(head);
            if let Some(line) = non_empty(std::mem::take(&mut self.pending)) {
                ready.push(line);
            }
        }
        if !self.skipping {
            if self.pending.len() + rest.len() > self.limit {
                self.pending.clear();
                self.skipping = true;
                self.dropped += 1;
            } else {
                self.pending.extend_from_slice(rest);
            }
        }
        ready
    }

    /// The unterminated tail, if any.
    fn finish(&mut self) -> Option<Vec<u8>> {
        if std::mem::take(&mut self.skipping) {
            return None;
        }
        non_empty(std::mem::take(&mut self.pending))
    }

    fn dropped(&self) -> usize {
        self.dropped
    }

    fn reset_dropped(&mut self) {
        self.dropped = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_dropped() {
        assert_eq!(non_empty(b"  \r\n".to_vec()), None);
        assert_eq!(non_empty(b"{\"a\":1}\r\n".to_vec()), Some(b"{\"a\":1}".to_vec()));
        assert_eq!(non_empty(b" x ".to_vec()), Some(b"x".to_vec()));
    }

    #[test]
    fn lines_span_chunks() {
        let mut lines = LineSplitter::new(64);
        assert!(lines.push(b"{\"a\"").is_empty());
        assert_eq!(lines.push(b":1}\n\n{\"b\""), vec![b"{\"a\":1}".to_vec()]);
        assert_eq!(lines.finish(), Some(b"{\"b\"".to_vec()));
    }

    #[test]
    fn oversized_lines_are_dropped() {
        let mut lines = LineSplitter::new(8);

        // overflow inside one chunk
        assert_eq!(lines.push(b"0123456789\nok\n"), vec![b"ok".to_vec()]);
        assert_eq!(lines.dropped(), 1);

        // overflow across chunks, without a newline for a while
        assert!(lines.push(b"01234").is_empty());
        assert!(lines.push(b"56789").is_empty());
        assert!(lines.push(b"abcdef").is_empty());
        assert_eq!(lines.push(b"ghi\nnext\n"), vec![b"next".to_vec()]);
        assert_eq!(lines.dropped(), 2);
        assert!(lines.pending.is_empty());

        // an unterminated oversized tail is not forwarded
        lines.push(b"0123456789");
        assert_eq!(lines.finish(), None);
    }
}
