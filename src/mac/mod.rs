//! Medium Access Control (MAC) layer.
//!
//! [`Mac`] is the upper-layer interface; [`smart::OfdmMac`] is the
//! reservation-based multi-carrier implementation.

use crate::packet::Frame;
use crate::{Addr, Seq};

pub mod config;
pub use config::{AckMode, MacConfig};

pub mod error;
pub use error::{DropReason, MacError};

pub mod phy;
pub use phy::Phy;

pub mod stats;
pub use stats::MacStats;

pub mod smart;
pub use smart::OfdmMac;

/// MAC interface towards the upper layer.
///
/// The engine is polled: the owner calls [`Mac::tick`] whenever
/// simulated time has advanced, and collects received payloads with
/// [`Mac::deliver`].
pub trait Mac {
    type Error;

    /// Queue a payload for transmission to `dest`, returning the
    /// sequence number assigned to it
    fn submit(&mut self, dest: Addr, payload: &[u8]) -> Result<Seq, Self::Error>;

    /// Fetch the next received data frame, if any
    fn deliver(&mut self) -> Option<Frame>;

    /// Poll timers and advance the protocol state machine
    fn tick(&mut self);
}
