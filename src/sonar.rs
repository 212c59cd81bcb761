//! Broker ping roundtrip
//!
//! The marker files prove that a worker's own event loop is ticking; they say
//! nothing about its broker connection. The sonar ping exercises the full
//! path: a control message travels to the worker through the broker and the
//! reply travels back, bounded by a hard timeout. It is the only check that
//! can detect a broker-side outage invisible to the event loop.

use crate::error::{Error, Result};
use redis::Commands;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use uuid::Uuid;

/// Channel prefix for worker control messages
const CONTROL_CHANNEL_PREFIX: &str = "vitals.control";
/// Key prefix for reply lists
const REPLY_KEY_PREFIX: &str = "vitals.reply";
/// Reply keys expire after this many seconds if nobody collects them
const REPLY_KEY_TTL_SECONDS: i64 = 60;
/// Slack added to the socket read timeout over the blocking-pop timeout
const READ_TIMEOUT_SLACK: Duration = Duration::from_secs(2);

/// Control channel name for a worker
pub fn control_channel(worker_name: &str) -> String {
    format!("{}.{}", CONTROL_CHANNEL_PREFIX, worker_name)
}

/// Control message sent to a worker
#[derive(Debug, Serialize, Deserialize)]
pub struct PingRequest {
    /// List key the worker pushes its reply onto
    pub reply_to: String,
}

/// Reply pushed by a worker
#[derive(Debug, Serialize, Deserialize)]
pub struct PingReply {
    /// Name of the replying worker
    pub worker: String,
}

/// Outcome of one ping roundtrip
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PingStatus {
    /// At least one reply arrived within the timeout
    Pong { worker: String },
    /// No reply arrived before the timeout expired
    NoReply,
    /// The broker itself could not be reached
    Unreachable(String),
}

/// A ping roundtrip implementation
///
/// The evaluator only needs "did anything answer in time"; keeping the
/// transport behind a trait lets the evaluator run without a broker.
pub trait Roundtrip {
    /// Name of the worker the ping is addressed to
    fn destination(&self) -> &str;

    /// Timeout after which the roundtrip gives up
    fn timeout(&self) -> Duration;

    /// Perform one roundtrip
    ///
    /// Errors are reserved for setup problems; broker connectivity failures
    /// are reported as [`PingStatus::Unreachable`].
    fn ping(&self) -> Result<PingStatus>;
}

/// Redis-backed ping roundtrip
pub struct RedisRoundtrip {
    client: redis::Client,
    worker_name: String,
    timeout: Duration,
}

impl RedisRoundtrip {
    /// Create a roundtrip for one destination worker
    ///
    /// The broker URL is validated here; connectivity is only exercised by
    /// [`Roundtrip::ping`].
    pub fn new(broker_url: &str, worker_name: &str, timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(broker_url).map_err(|e| Error::InvalidBrokerUrl {
            url: broker_url.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            client,
            worker_name: worker_name.to_string(),
            timeout,
        })
    }
}

impl Roundtrip for RedisRoundtrip {
    fn destination(&self) -> &str {
        &self.worker_name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn ping(&self) -> Result<PingStatus> {
        let mut conn = match self.client.get_connection_with_timeout(self.timeout) {
            Ok(conn) => conn,
            Err(e) => return Ok(PingStatus::Unreachable(e.to_string())),
        };
        // the socket must outlive the server-side blocking pop, or the client
        // would sever a healthy wait
        if let Err(e) = conn.set_read_timeout(Some(self.timeout + READ_TIMEOUT_SLACK)) {
            return Ok(PingStatus::Unreachable(e.to_string()));
        }

        let reply_to = format!("{}.{}", REPLY_KEY_PREFIX, Uuid::new_v4());
        let payload = serde_json::to_string(&PingRequest {
            reply_to: reply_to.clone(),
        })?;

        let published: std::result::Result<i64, redis::RedisError> =
            conn.publish(control_channel(&self.worker_name), &payload);
        if let Err(e) = published {
            return Ok(PingStatus::Unreachable(e.to_string()));
        }

        // a zero wait would block forever on the broker side
        let wait = self.timeout.as_secs_f64().max(0.001);
        let reply: Option<(String, String)> = match conn.blpop(&reply_to, wait) {
            Ok(reply) => reply,
            Err(e) => return Ok(PingStatus::Unreachable(e.to_string())),
        };

        match reply {
            Some((_key, body)) => {
                let worker = serde_json::from_str::<PingReply>(&body)
                    .map(|r| r.worker)
                    .unwrap_or_else(|_| self.worker_name.clone());
                Ok(PingStatus::Pong { worker })
            }
            None => Ok(PingStatus::NoReply),
        }
    }
}

/// Worker-side ping responder
///
/// Subscribes to the worker's control channel and answers each ping on its
/// reply key. Runs on a dedicated thread; the subscription read times out
/// periodically so the stop signal is observed promptly. On broker
/// connection loss it reconnects and resubscribes.
pub struct SonarResponder {
    stop_signal: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SonarResponder {
    /// Spawn the responder thread for one worker name
    pub fn spawn(broker_url: &str, worker_name: &str) -> Result<Self> {
        let client = redis::Client::open(broker_url).map_err(|e| Error::InvalidBrokerUrl {
            url: broker_url.to_string(),
            message: e.to_string(),
        })?;
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&stop_signal);
        let worker = worker_name.to_string();
        let handle = thread::Builder::new()
            .name("sonar-responder".to_string())
            .spawn(move || respond_loop(client, worker, stop))?;
        Ok(Self {
            stop_signal,
            handle: Some(handle),
        })
    }

    /// Stop signal for external control
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_signal)
    }

    /// Signal the responder to stop and wait for the thread to exit
    pub fn stop(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SonarResponder {
    fn drop(&mut self) {
        self.stop();
    }
}

fn respond_loop(client: redis::Client, worker_name: String, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::SeqCst) {
        if let Err(e) = serve(&client, &worker_name, &stop) {
            tracing::warn!(error = %e, "sonar responder lost broker connection, retrying");
            thread::sleep(Duration::from_secs(1));
        }
    }
    tracing::debug!(worker = %worker_name, "sonar responder stopped");
}

fn serve(client: &redis::Client, worker_name: &str, stop: &AtomicBool) -> Result<()> {
    let mut conn = client
        .get_connection()
        .map_err(|e| Error::BrokerConnection(e.to_string()))?;
    // subscribed connections cannot issue regular commands, replies go
    // through a second connection
    let mut reply_conn = client
        .get_connection()
        .map_err(|e| Error::BrokerConnection(e.to_string()))?;

    let mut pubsub = conn.as_pubsub();
    pubsub
        .subscribe(control_channel(worker_name))
        .map_err(|e| Error::BrokerConnection(e.to_string()))?;
    pubsub
        .set_read_timeout(Some(Duration::from_millis(500)))
        .map_err(|e| Error::BrokerConnection(e.to_string()))?;

    tracing::info!(worker = %worker_name, "sonar responder listening");

    while !stop.load(Ordering::SeqCst) {
        let message = match pubsub.get_message() {
            Ok(message) => message,
            Err(e) if e.is_timeout() => continue,
            Err(e) => return Err(Error::BrokerConnection(e.to_string())),
        };
        let payload: String = match message.get_payload() {
            Ok(payload) => payload,
            Err(_) => continue,
        };
        // foreign traffic on the channel is ignored
        let request: PingRequest = match serde_json::from_str(&payload) {
            Ok(request) => request,
            Err(_) => continue,
        };

        let reply = serde_json::to_string(&PingReply {
            worker: worker_name.to_string(),
        })?;
        let _: i64 = reply_conn
            .rpush(&request.reply_to, reply)
            .map_err(|e| Error::BrokerConnection(e.to_string()))?;
        let _: i64 = reply_conn
            .expire(&request.reply_to, REPLY_KEY_TTL_SECONDS)
            .map_err(|e| Error::BrokerConnection(e.to_string()))?;
        tracing::debug!(worker = %worker_name, reply_to = %request.reply_to, "answered ping");
    }

    Ok(())
}
