//! MAC error types

use crate::packet::Frame;

/// Errors returned to the caller of [`crate::mac::Mac::submit`]
#[derive(Debug, Clone, PartialEq)]
pub enum MacError {
    /// Outbound queue is full; the rejected frame is handed back so
    /// the caller can retry or account for the loss
    BufferFull(Frame),
    /// Payload exceeds the frame payload capacity
    PayloadTooLarge,
}

/// Why a queued frame was dropped by the protocol engine.
///
/// Logged and counted; the engine keeps running after every drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum DropReason {
    /// RTS attempt limit reached without a CTS
    #[strum(serialize = "MAX_RTS_TRIES")]
    MaxRtsTries,
    /// DATA retransmission limit reached without an ACK
    #[strum(serialize = "MAX_TX_TRIES")]
    MaxTxTries,
    /// Frame arrived damaged at the physical layer
    #[strum(serialize = "PHY_ERROR")]
    PhyError,
    /// Frame was addressed to another node
    #[strum(serialize = "WRONG_RECEIVER")]
    WrongReceiver,
    /// Frame kind not expected in the current state
    #[strum(serialize = "WRONG_STATE")]
    WrongState,
}
