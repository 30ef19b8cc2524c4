//! Physical layer interface
//!
//! The MAC drives a multi-carrier acoustic modem through this trait.
//! Transmission is asynchronous: `transmit` starts the frame on air
//! and the caller is told about completion through
//! [`crate::mac::smart::OfdmMac::tx_complete`].

use crate::carrier::CarrierSet;
use crate::packet::Frame;
use crate::Ts;

pub trait Phy {
    /// Time the frame occupies the channel, given its size and the
    /// carriers it is modulated onto
    fn tx_duration(&self, frame: &Frame) -> Ts;

    /// Start transmitting a frame
    fn transmit(&mut self, frame: Frame);

    /// Inform the modem whether the MAC considers the node busy
    /// transmitting, so it can gate its own receive path
    fn set_tx_busy(&mut self, busy: bool);

    /// Carriers the modem itself currently reports interference-free
    fn free_carriers(&self) -> CarrierSet;
}

#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    use std::vec::Vec;

    use super::Phy;
    use crate::carrier::CarrierSet;
    use crate::packet::Frame;
    use crate::Ts;

    /// Mock modem for driving the state machine in tests.
    ///
    /// Records every transmitted frame and reports a configurable
    /// free-carrier set and a fixed per-frame airtime.
    pub struct MockPhy {
        pub sent: Vec<Frame>,
        pub free: CarrierSet,
        pub tx_busy: bool,
        pub airtime: Ts,
    }

    impl MockPhy {
        pub fn new() -> Self {
            Self {
                sent: Vec::new(),
                free: CarrierSet::all(crate::MAX_CARRIERS),
                tx_busy: false,
                airtime: 1000,
            }
        }

        pub fn last_sent(&self) -> Option<&Frame> {
            self.sent.last()
        }
    }

    impl Phy for MockPhy {
        fn tx_duration(&self, _frame: &Frame) -> Ts {
            self.airtime
        }

        fn transmit(&mut self, frame: Frame) {
            self.sent.push(frame);
        }

        fn set_tx_busy(&mut self, busy: bool) {
            self.tx_busy = busy;
        }

        fn free_carriers(&self) -> CarrierSet {
            self.free
        }
    }
}
