//! Crate prelude, re-exporting the types a simulation harness needs.

pub use crate::{Addr, Seq, Ts, BROADCAST};

pub use crate::timer::{Clock, ProtocolTimer, TimerRole, TimerState};

pub use crate::packet::{Frame, FrameKind, MAX_PAYLOAD_LEN};

pub use crate::carrier::{carrier_share, match_carriers, CarrierSet, Priority};

pub use crate::table::OccupancyTable;

pub use crate::queue::PacketQueue;

pub use crate::mac::{AckMode, DropReason, Mac, MacConfig, MacError, MacStats, OfdmMac, Phy};

pub use crate::mac::smart::{MacState, Reason};

#[cfg(any(test, feature = "mocks"))]
pub use crate::mac::phy::mock::MockPhy;

#[cfg(any(test, feature = "mocks"))]
pub use crate::timer::mock::MockClock;
