//! Bus transport boundary.
//!
//! The synchronization core never talks to hardware directly. The source
//! drives a [`BusTransport`]: one blocking, full-duplex exchange of a
//! fixed-size frame with an addressed follower, at most one in flight.
//! A follower waits on a [`FollowerPort`] for the source to clock the
//! next exchange, with its reply already placed in the transmit buffer.

use async_trait::async_trait;

use crate::error::TransportError;

/// Index of a follower's select line.
pub type FollowerAddress = u8;

/// Source-side transfer primitive.
#[async_trait]
pub trait BusTransport: Send {
    /// Exchange one frame with the follower at `address`.
    ///
    /// `tx` is shifted out while the follower's prepared reply is shifted
    /// into `rx`; both must have the same length.
    ///
    /// # Errors
    ///
    /// Returns a `TransportError` if the transfer fails at the bus layer.
    async fn exchange(
        &mut self,
        address: FollowerAddress,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), TransportError>;

    /// Check that the bus and the select line for `address` are usable.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::NotReady` if the line cannot be driven.
    async fn ready(&mut self, _address: FollowerAddress) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Follower-side transfer primitive.
#[async_trait]
pub trait FollowerPort: Send {
    /// Arm `tx` as the reply and block until the source clocks an exchange.
    ///
    /// On return `rx` holds what the source sent.
    ///
    /// # Errors
    ///
    /// Returns a `TransportError` if the transfer fails at the bus layer.
    async fn transceive(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: BusTransport + ?Sized> BusTransport for Box<T> {
    async fn exchange(
        &mut self,
        address: FollowerAddress,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), TransportError> {
        (**self).exchange(address, tx, rx).await
    }

    async fn ready(&mut self, address: FollowerAddress) -> Result<(), TransportError> {
        (**self).ready(address).await
    }
}

#[async_trait]
impl<P: FollowerPort + ?Sized> FollowerPort for Box<P> {
    async fn transceive(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), TransportError> {
        (**self).transceive(tx, rx).await
    }
}
