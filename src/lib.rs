//! Reservation-based multi-carrier MAC engine for underwater acoustic
//! network simulation.
//!
//! A per-node protocol engine that contends for the channel with
//! RTS/CTS, negotiates a sub-carrier/time-slot reservation for each
//! data exchange, and tracks overlapping receptions while deciding
//! whether to transmit, defer, or retry. The physical layer and the
//! discrete-event scheduler are external collaborators, reached
//! through the [`mac::Phy`] and [`timer::Clock`] traits.

#![no_std]

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod timer;

pub mod packet;

pub mod carrier;

pub mod table;

pub mod queue;

pub mod mac;

pub mod prelude;

/// Timestamps and durations are 64-bit microsecond ticks
pub type Ts = u64;

/// Node address at the MAC layer
pub type Addr = u16;

/// Destination address matching any node
pub const BROADCAST: Addr = 0xffff;

/// Packet sequence number, unique per source while in flight
pub type Seq = u32;

/// Upper bound on sub-carriers a node can track (carrier sets are
/// bit-packed in a 64-bit word)
pub const MAX_CARRIERS: usize = 64;

/// Upper bound on time-slots in the occupancy window
pub const MAX_SLOTS: usize = 64;
