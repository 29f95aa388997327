//! Scripted bus endpoints.
//!
//! [`ScriptedTransport`] stands in for the source's bus: every exchange
//! is logged with its start and end time and answered from a per-address
//! script. [`ScriptedPort`] does the same for a follower.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::bus::{BusTransport, FollowerAddress, FollowerPort};
use crate::error::TransportError;

/// Scripted answer to one exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    /// Shift these bytes back (truncated or zero-padded to the frame)
    Frame(Vec<u8>),
    /// Fail the exchange
    Fault(TransportError),
}

/// One logged exchange
#[derive(Debug, Clone)]
pub struct ExchangeRecord {
    /// Addressed follower
    pub address: FollowerAddress,
    /// Bytes the source sent
    pub tx: Vec<u8>,
    /// When the exchange started
    pub started: Instant,
    /// When the exchange returned
    pub finished: Instant,
    /// Whether the exchange failed
    pub failed: bool,
}

/// Shared, cloneable view of the exchange log
#[derive(Debug, Clone, Default)]
pub struct ExchangeLog {
    inner: Arc<Mutex<Vec<ExchangeRecord>>>,
}

impl ExchangeLog {
    /// Snapshot of every exchange so far
    #[must_use]
    pub fn records(&self) -> Vec<ExchangeRecord> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Addresses in exchange order
    #[must_use]
    pub fn addresses(&self) -> Vec<FollowerAddress> {
        self.records().iter().map(|r| r.address).collect()
    }

    /// Number of exchanges so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no exchange has happened yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all records
    pub fn clear(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn push(&self, record: ExchangeRecord) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}

/// Source-side transport answering from scripts
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: HashMap<FollowerAddress, VecDeque<ScriptedReply>>,
    idle: HashMap<FollowerAddress, Vec<u8>>,
    not_ready: HashSet<FollowerAddress>,
    latency: Duration,
    log: ExchangeLog,
}

impl ScriptedTransport {
    /// Create a transport on which every address reads back zeros
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every exchange take `latency`
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Answer unscripted exchanges on `address` with `frame`
    pub fn present(&mut self, address: FollowerAddress, frame: impl Into<Vec<u8>>) {
        self.idle.insert(address, frame.into());
    }

    /// Make `address` read back zeros again
    pub fn absent(&mut self, address: FollowerAddress) {
        self.idle.remove(&address);
    }

    /// Queue an answer for the next unanswered exchange on `address`
    pub fn script(&mut self, address: FollowerAddress, reply: ScriptedReply) {
        self.scripts.entry(address).or_default().push_back(reply);
    }

    /// Queue a failure for the next unanswered exchange on `address`
    pub fn fail_next(&mut self, address: FollowerAddress, error: TransportError) {
        self.script(address, ScriptedReply::Fault(error));
    }

    /// Make the readiness check fail for `address`
    pub fn mark_not_ready(&mut self, address: FollowerAddress) {
        self.not_ready.insert(address);
    }

    /// Handle on the exchange log
    #[must_use]
    pub fn log(&self) -> ExchangeLog {
        self.log.clone()
    }
}

#[async_trait]
impl BusTransport for ScriptedTransport {
    async fn exchange(
        &mut self,
        address: FollowerAddress,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), TransportError> {
        if tx.len() != rx.len() {
            return Err(TransportError::LengthMismatch {
                tx: tx.len(),
                rx: rx.len(),
            });
        }
        let started = Instant::now();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let reply = self
            .scripts
            .get_mut(&address)
            .and_then(VecDeque::pop_front)
            .or_else(|| self.idle.get(&address).cloned().map(ScriptedReply::Frame))
            .unwrap_or_else(|| ScriptedReply::Frame(Vec::new()));

        let result = match reply {
            ScriptedReply::Frame(frame) => {
                fill_from(rx, &frame);
                Ok(())
            }
            ScriptedReply::Fault(e) => Err(e),
        };

        self.log.push(ExchangeRecord {
            address,
            tx: tx.to_vec(),
            started,
            finished: Instant::now(),
            failed: result.is_err(),
        });
        result
    }

    async fn ready(&mut self, address: FollowerAddress) -> Result<(), TransportError> {
        if self.not_ready.contains(&address) {
            Err(TransportError::NotReady)
        } else {
            Ok(())
        }
    }
}

/// Follower-side port fed from a queue of incoming frames
#[derive(Debug, Default)]
pub struct ScriptedPort {
    incoming: VecDeque<Result<Vec<u8>, TransportError>>,
    armed: Vec<Vec<u8>>,
}

impl ScriptedPort {
    /// Create a port with nothing queued
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame the source will send
    pub fn push_frame(&mut self, frame: impl Into<Vec<u8>>) {
        self.incoming.push_back(Ok(frame.into()));
    }

    /// Queue a failed exchange
    pub fn push_fault(&mut self, error: TransportError) {
        self.incoming.push_back(Err(error));
    }

    /// Every reply the follower armed, in order
    #[must_use]
    pub fn armed(&self) -> &[Vec<u8>] {
        &self.armed
    }

    /// Frames still queued
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.incoming.len()
    }
}

#[async_trait]
impl FollowerPort for ScriptedPort {
    async fn transceive(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), TransportError> {
        self.armed.push(tx.to_vec());
        match self.incoming.pop_front() {
            Some(Ok(frame)) => {
                fill_from(rx, &frame);
                Ok(())
            }
            Some(Err(e)) => Err(e),
            None => Err(TransportError::Disconnected { address: 0 }),
        }
    }
}

/// Copy `frame` into `buf`, truncating or zero-padding.
pub(crate) fn fill_from(buf: &mut [u8], frame: &[u8]) {
    let n = buf.len().min(frame.len());
    buf[..n].copy_from_slice(&frame[..n]);
    buf[n..].fill(0);
}
