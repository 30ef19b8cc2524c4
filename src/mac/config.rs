//! MAC configuration

use crate::carrier::Priority;
use crate::{Addr, Ts};

/// Whether DATA frames are individually acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Every DATA frame waits for an ACK and retries on timeout
    Ack,
    /// Fire and forget; DATA frames leave the queue on transmit
    NoAck,
}

/// MAC configuration
///
/// Defaults correspond to a 24-carrier band with 4 control carriers,
/// half-second slots and a 20-slot occupancy window.
#[derive(Debug, Clone, PartialEq)]
pub struct MacConfig {
    /// Address of this node
    pub address: Addr,

    /// Acknowledgement mode for DATA frames
    pub ack_mode: AckMode,

    /// DATA retransmission limit, 0 means retry forever
    pub max_tx_tries: u16,
    /// RTS attempt limit before the head frame is dropped
    pub max_rts_tries: u16,
    /// Exponential backoff exponent plateau
    pub max_backoff_counter: u16,
    /// Multiplier applied to every computed backoff
    pub backoff_tuner: f64,

    /// Initial ACK timeout; adapts to measured round-trips afterwards
    pub ack_timeout: Ts,
    /// Guard added to the ACK timeout when arming the wait-for-ACK timer
    pub wait_constant: Ts,
    /// Smoothing factor of the round-trip estimator, in [0, 1]
    pub alpha: f64,

    /// Outbound queue capacity
    pub buffer_capacity: usize,

    /// Total sub-carriers in the band
    pub carrier_count: usize,
    /// Leading carriers reserved for control traffic
    pub control_carrier_count: usize,
    /// Slot duration of the occupancy window
    pub slot_duration: Ts,
    /// Slots in the occupancy window
    pub slot_count: usize,
    /// Cap on carriers granted to one reservation
    pub max_carriers_per_reservation: usize,
    /// Cap on free carriers advertised in an RTS
    pub max_advertised_carriers: usize,
    /// DATA frames negotiated per handshake
    pub max_burst_size: u32,
    /// Ignore reservations and always transmit over the whole band
    pub full_band: bool,
    /// Per-carrier modulation rate in bits per second
    pub bitrate_per_carrier: f64,

    /// On-air control frame sizes in bytes
    pub rts_size: u16,
    pub cts_size: u16,
    pub ack_size: u16,
    /// On-air DATA frame size in bytes, header included
    pub data_size: u16,

    /// How long a CTS sender waits for the first DATA frame
    pub data_wait_timeout: Ts,
    /// Fixed floor of the randomized delay before answering an RTS
    pub cts_backoff_base: Ts,
    /// How long an overheard RTS stays answerable
    pub heard_rts_validity: Ts,
    /// Nudge delay after sending an ACK, to poll the queue again
    pub post_ack_backoff: Ts,
    /// Gap between consecutive DATA frames of a burst
    pub burst_gap: Ts,
    /// Extra reservation time for the ACK exchange in acknowledged mode
    pub ack_reservation_overhead: Ts,
    /// Deferral after overhearing an RTS addressed to someone else
    pub rts_overheard_backoff: Ts,

    /// Nodes sharing the band, used by the carrier-share policy
    pub node_count: usize,
    /// Traffic priority of this node, also feeding the carrier share
    pub priority: Priority,
}

impl Default for MacConfig {
    fn default() -> Self {
        Self {
            address: 0,
            ack_mode: AckMode::NoAck,
            max_tx_tries: 3,
            max_rts_tries: 5,
            max_backoff_counter: 4,
            backoff_tuner: 1.0,
            ack_timeout: 2_000_000,
            wait_constant: 100_000,
            alpha: 0.8,
            buffer_capacity: 16,
            carrier_count: 24,
            control_carrier_count: 4,
            slot_duration: 500_000,
            slot_count: 20,
            max_carriers_per_reservation: 5,
            max_advertised_carriers: 10,
            max_burst_size: 1,
            full_band: false,
            bitrate_per_carrier: 2000.0,
            rts_size: 16,
            cts_size: 16,
            ack_size: 16,
            data_size: 256,
            data_wait_timeout: 300_000,
            cts_backoff_base: 160_000,
            heard_rts_validity: 1_500_000,
            post_ack_backoff: 100,
            burst_gap: 200,
            ack_reservation_overhead: 70_000,
            rts_overheard_backoff: 80_000,
            node_count: 4,
            priority: Priority::High,
        }
    }
}

impl MacConfig {
    /// Carriers available for data reservations, after the control
    /// carriers are set aside.
    pub fn data_carriers(&self) -> usize {
        self.carrier_count.saturating_sub(self.control_carrier_count)
    }
}
