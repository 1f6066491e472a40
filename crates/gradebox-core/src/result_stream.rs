//! Consumption of a session's log channel.
//!
//! Every subscription gets a pump task that forwards raw payloads into one
//! shared channel. A single collector task drains that channel: it decodes
//! each [`JobResponse`], echoes it to the console and feeds it to the
//! [`TelemetryExtractor`], which it owns exclusively. When every pump has
//! finished and the stream is sealed, the collector hands the accumulated
//! job over through a one-shot channel. That hand-over happens once per
//! stream, however many subscriptions fed it.

use gradebox_state::Job;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::{JobResponse, ResponseKind};
use crate::error::{ClientError, Result, TransportError};
use crate::extractor::TelemetryExtractor;
use crate::output::{LogRouting, OutputSink, Spinner};
use crate::transport::Subscription;

const FAN_IN_CAPACITY: usize = 256;

/// Where and how inbound log lines are echoed.
#[derive(Debug, Clone)]
pub struct EchoSettings {
    pub stdout: OutputSink,
    pub stderr: OutputSink,
    pub routing: LogRouting,
    /// Prefix lines with their creation timestamps.
    pub verbose: bool,
}

impl EchoSettings {
    fn sink_for(&self, kind: ResponseKind) -> &OutputSink {
        match (kind, self.routing) {
            (ResponseKind::Stdout, LogRouting::Split) => &self.stdout,
            _ => &self.stderr,
        }
    }

    fn echo(&self, response: &JobResponse, body: &str) {
        if body.is_empty() {
            return;
        }
        let sink = self.sink_for(response.kind);
        if self.verbose {
            sink.write_line(&format!("[ {} ] {}", response.created_at, body));
        } else {
            sink.write_line(body);
        }
    }
}

/// Handle on the background consumption of one session's log.
#[derive(Debug)]
pub struct ResultStream {
    fan_in: Option<mpsc::Sender<Vec<u8>>>,
    done: Option<oneshot::Receiver<Option<Job>>>,
    stops: Vec<CancellationToken>,
    pumps: Vec<JoinHandle<()>>,
    collector: JoinHandle<()>,
}

impl ResultStream {
    /// Spawn the collector. `spinner` is stopped on the first inbound message.
    pub fn start(job_id: impl Into<String>, echo: EchoSettings, spinner: Option<Spinner>) -> Self {
        let (fan_in, rx) = mpsc::channel(FAN_IN_CAPACITY);
        let (done_tx, done_rx) = oneshot::channel();
        let extractor = TelemetryExtractor::new(job_id);
        let collector = tokio::spawn(collect(rx, extractor, echo, spinner, done_tx));

        Self {
            fan_in: Some(fan_in),
            done: Some(done_rx),
            stops: Vec::new(),
            pumps: Vec::new(),
            collector,
        }
    }

    /// Start forwarding a subscription into the collector.
    pub fn attach(&mut self, subscription: Subscription) -> Result<()> {
        let Some(fan_in) = self.fan_in.clone() else {
            return Err(ClientError::FatalUsage(
                "cannot attach a subscription after waiting has begun".to_string(),
            ));
        };
        let (channel, messages, stop) = subscription.into_parts();
        self.stops.push(stop.clone());
        self.pumps
            .push(tokio::spawn(pump(channel, messages, stop, fan_in)));
        Ok(())
    }

    pub fn subscription_count(&self) -> usize {
        self.stops.len()
    }

    /// Block until the collector finishes or `cancel` fires.
    ///
    /// Returns the accumulated job, or `None` if no line ever matched.
    pub async fn wait(&mut self, cancel: &CancellationToken) -> Result<Option<Job>> {
        // Drop our own sender so the collector can observe the end of input.
        self.fan_in = None;

        let Some(done) = self.done.as_mut() else {
            return Err(ClientError::FatalUsage(
                "the result stream has already completed".to_string(),
            ));
        };

        let outcome = tokio::select! {
            res = done => res,
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
        };
        self.done = None;

        outcome.map_err(|_| {
            ClientError::from(TransportError::Closed(
                "log collector stopped before completing".to_string(),
            ))
        })
    }

    /// Stop every subscription. Safe to call repeatedly and after completion.
    pub fn stop_all(&mut self) {
        for stop in &self.stops {
            stop.cancel();
        }
        self.fan_in = None;
    }

    /// Whether the collector and every pump have exited.
    pub fn is_finished(&self) -> bool {
        self.collector.is_finished() && self.pumps.iter().all(JoinHandle::is_finished)
    }
}

async fn pump(
    channel: String,
    mut messages: mpsc::Receiver<Vec<u8>>,
    stop: CancellationToken,
    fan_in: mpsc::Sender<Vec<u8>>,
) {
    loop {
        let next = tokio::select! {
            _ = stop.cancelled() => break,
            msg = messages.recv() => msg,
        };
        let Some(raw) = next else {
            break;
        };
        if fan_in.send(raw).await.is_err() {
            warn!(channel = %channel, "log collector gone; dropping subscription");
            break;
        }
    }
    debug!(channel = %channel, "subscription drained");
}

async fn collect(
    mut rx: mpsc::Receiver<Vec<u8>>,
    mut extractor: TelemetryExtractor,
    echo: EchoSettings,
    mut spinner: Option<Spinner>,
    done: oneshot::Sender<Option<Job>>,
) {
    let mut received: u64 = 0;
    while let Some(raw) = rx.recv().await {
        if let Some(spinner) = spinner.take() {
            spinner.stop();
        }
        let response = match JobResponse::from_bytes(&raw) {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "failed to decode response message");
                continue;
            }
        };
        received += 1;

        let body = response.text();
        for line in body.lines() {
            extractor.parse_line(line);
        }
        echo.echo(&response, &body);
    }

    if let Some(spinner) = spinner.take() {
        spinner.stop();
    }
    debug!(received, "log stream closed");
    if done.send(extractor.into_job()).is_err() {
        debug!("completion receiver dropped before the stream closed");
    }
}
