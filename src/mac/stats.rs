//! MAC statistics

use crate::Ts;

/// Counters kept by the protocol engine, read out by the simulation
/// harness at the end of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacStats {
    pub rts_tx: u32,
    pub cts_tx: u32,
    pub data_tx: u32,
    pub ack_tx: u32,

    pub rts_rx: u32,
    pub cts_rx: u32,
    pub data_rx: u32,
    pub ack_rx: u32,

    pub drop_buffer_full: u32,
    pub drop_max_rts: u32,
    pub drop_max_tx: u32,
    pub drop_wrong_state: u32,
    pub drop_wrong_receiver: u32,
    pub drop_phy_error: u32,

    /// Backoffs entered
    pub backoffs: u32,
    /// Total time spent backing off
    pub backoff_total: Ts,
}

impl MacStats {
    pub fn frames_sent(&self) -> u32 {
        self.rts_tx
            .saturating_add(self.cts_tx)
            .saturating_add(self.data_tx)
            .saturating_add(self.ack_tx)
    }

    pub fn frames_dropped(&self) -> u32 {
        self.drop_buffer_full
            .saturating_add(self.drop_max_rts)
            .saturating_add(self.drop_max_tx)
    }
}
