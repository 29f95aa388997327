//! In-memory full-duplex bus.
//!
//! A [`SimulatedBus`] is the source end; each attached select line hands
//! out a [`SimulatedPort`] for the follower end. An exchange blocks until
//! the follower's port is waiting in `transceive`, then both sides swap
//! frames. A line with nothing attached reads back zeros, like an
//! undriven data line.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::bus_conditions::BusConditions;
use super::scripted::fill_from;
use crate::bus::{BusTransport, FollowerAddress, FollowerPort};
use crate::clock::{Clock, EdgeLatch};
use crate::error::TransportError;

/// Error code reported for injected faults (`-EIO`).
pub const INJECTED_FAULT_CODE: i32 = -5;

#[derive(Debug)]
struct Transfer {
    frame: Vec<u8>,
    fault: Option<TransportError>,
    reply: oneshot::Sender<Vec<u8>>,
}

struct Line {
    tx: mpsc::Sender<Transfer>,
    edge: Option<(Arc<EdgeLatch>, Arc<dyn Clock>)>,
    exchanges: u64,
    faults: BTreeSet<u64>,
}

/// Source end of an in-memory bus
pub struct SimulatedBus {
    lines: Vec<Option<Line>>,
    conditions: BusConditions,
}

impl SimulatedBus {
    /// Create a bus with `select_lines` empty lines
    #[must_use]
    pub fn new(select_lines: usize) -> Self {
        Self {
            lines: (0..select_lines).map(|_| None).collect(),
            conditions: BusConditions::perfect(),
        }
    }

    /// Apply latency, jitter and random faults to every exchange
    #[must_use]
    pub fn with_conditions(mut self, conditions: BusConditions) -> Self {
        self.conditions = conditions;
        self
    }

    /// Attach a follower to `address` and return its end of the line
    ///
    /// # Panics
    ///
    /// Panics if `address` is not a line on this bus.
    pub fn attach(&mut self, address: FollowerAddress) -> SimulatedPort {
        self.attach_line(address, None)
    }

    /// Attach a follower whose latch fires with its own clock when selected
    ///
    /// # Panics
    ///
    /// Panics if `address` is not a line on this bus.
    pub fn attach_with_latch(
        &mut self,
        address: FollowerAddress,
        latch: Arc<EdgeLatch>,
        clock: Arc<dyn Clock>,
    ) -> SimulatedPort {
        self.attach_line(address, Some((latch, clock)))
    }

    fn attach_line(
        &mut self,
        address: FollowerAddress,
        edge: Option<(Arc<EdgeLatch>, Arc<dyn Clock>)>,
    ) -> SimulatedPort {
        let (tx, rx) = mpsc::channel(1);
        self.lines[usize::from(address)] = Some(Line {
            tx,
            edge,
            exchanges: 0,
            faults: BTreeSet::new(),
        });
        SimulatedPort { address, rx }
    }

    /// Disconnect whatever is attached to `address`
    pub fn detach(&mut self, address: FollowerAddress) {
        if let Some(slot) = self.lines.get_mut(usize::from(address)) {
            *slot = None;
        }
    }

    /// Fail the `nth` upcoming exchange on `address` (1 = the next one)
    ///
    /// Both ends see the failure. Ignored if nothing is attached.
    pub fn fail_exchange(&mut self, address: FollowerAddress, nth: u64) {
        if let Some(Some(line)) = self.lines.get_mut(usize::from(address)) {
            line.faults.insert(line.exchanges + nth.max(1));
        }
    }

    /// Exchanges clocked on `address` since it was attached
    #[must_use]
    pub fn exchange_count(&self, address: FollowerAddress) -> u64 {
        self.lines
            .get(usize::from(address))
            .and_then(Option::as_ref)
            .map_or(0, |line| line.exchanges)
    }
}

impl std::fmt::Debug for SimulatedBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let attached: Vec<usize> = self
            .lines
            .iter()
            .enumerate()
            .filter_map(|(i, l)| l.as_ref().map(|_| i))
            .collect();
        f.debug_struct("SimulatedBus")
            .field("lines", &self.lines.len())
            .field("attached", &attached)
            .field("conditions", &self.conditions)
            .finish()
    }
}

#[async_trait]
impl BusTransport for SimulatedBus {
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
        let delay = self.conditions.get_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let random_fault = self.conditions.should_fault();

        let Some(slot) = self.lines.get_mut(usize::from(address)) else {
            return Err(TransportError::Disconnected { address });
        };
        let Some(line) = slot.as_mut() else {
            rx.fill(0);
            return Ok(());
        };

        line.exchanges += 1;
        let fault = (line.faults.remove(&line.exchanges) || random_fault).then_some(
            TransportError::Fault {
                code: INJECTED_FAULT_CODE,
            },
        );
        if let Some((latch, clock)) = &line.edge {
            latch.trigger(clock.now());
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let transfer = Transfer {
            frame: tx.to_vec(),
            fault: fault.clone(),
            reply: reply_tx,
        };
        if line.tx.send(transfer).await.is_err() {
            // Follower end dropped: the line floats.
            *slot = None;
            rx.fill(0);
            return Ok(());
        }

        match reply_rx.await {
            Ok(frame) => fill_from(rx, &frame),
            Err(_) => rx.fill(0),
        }
        fault.map_or(Ok(()), Err)
    }
}

/// Follower end of a simulated select line
#[derive(Debug)]
pub struct SimulatedPort {
    address: FollowerAddress,
    rx: mpsc::Receiver<Transfer>,
}

impl SimulatedPort {
    /// Select line this port answers on
    #[must_use]
    pub fn address(&self) -> FollowerAddress {
        self.address
    }
}

#[async_trait]
impl FollowerPort for SimulatedPort {
    async fn transceive(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), TransportError> {
        let Some(transfer) = self.rx.recv().await else {
            return Err(TransportError::Disconnected {
                address: self.address,
            });
        };
        let _ = transfer.reply.send(tx.to_vec());
        if let Some(fault) = transfer.fault {
            return Err(fault);
        }
        fill_from(rx, &transfer.frame);
        Ok(())
    }
}
