//! MAC frame types.
//!
//! One [`Frame`] struct covers the four frame kinds; the control
//! fields that only some kinds use (carrier set, reservation length,
//! burst size) are zero/empty on the kinds that do not carry them.

use core::fmt;

use heapless::Vec;

use crate::carrier::CarrierSet;
use crate::{Addr, Seq, Ts};

/// Maximum payload carried by a DATA frame
pub const MAX_PAYLOAD_LEN: usize = 128;

/// Frame kind discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum FrameKind {
    #[strum(serialize = "RTS")]
    Rts,
    #[strum(serialize = "CTS")]
    Cts,
    #[strum(serialize = "DATA")]
    Data,
    #[strum(serialize = "ACK")]
    Ack,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub kind: FrameKind,
    pub src: Addr,
    pub dest: Addr,
    pub seq: Seq,
    /// On-air size in bytes, header included
    pub size: u16,
    /// RTS: carriers the sender sees free. CTS: carriers granted.
    /// DATA: carriers the frame is modulated onto.
    pub carriers: CarrierSet,
    /// RTS only: total bytes the sender wants to move this exchange
    pub bytes_to_send: u32,
    /// CTS only: duration the granted carriers stay reserved
    pub time_reserved: Ts,
    payload: Vec<u8, MAX_PAYLOAD_LEN>,
}

impl Frame {
    pub fn data(src: Addr, dest: Addr, seq: Seq, size: u16, payload: &[u8]) -> Self {
        let mut p = Vec::new();
        // Oversized payloads are truncated; submit() rejects them
        // before a frame is ever built, so this is test convenience.
        let _ = p.extend_from_slice(&payload[..payload.len().min(MAX_PAYLOAD_LEN)]);
        Self {
            kind: FrameKind::Data,
            src,
            dest,
            seq,
            size,
            carriers: CarrierSet::empty(),
            bytes_to_send: 0,
            time_reserved: 0,
            payload: p,
        }
    }

    pub fn rts(src: Addr, dest: Addr, seq: Seq, size: u16, free: CarrierSet, bytes_to_send: u32) -> Self {
        Self {
            kind: FrameKind::Rts,
            src,
            dest,
            seq,
            size,
            carriers: free,
            bytes_to_send,
            time_reserved: 0,
            payload: Vec::new(),
        }
    }

    pub fn cts(src: Addr, dest: Addr, seq: Seq, size: u16, granted: CarrierSet, time_reserved: Ts) -> Self {
        Self {
            kind: FrameKind::Cts,
            src,
            dest,
            seq,
            size,
            carriers: granted,
            bytes_to_send: 0,
            time_reserved,
            payload: Vec::new(),
        }
    }

    pub fn ack(src: Addr, dest: Addr, seq: Seq, size: u16) -> Self {
        Self {
            kind: FrameKind::Ack,
            src,
            dest,
            seq,
            size,
            carriers: CarrierSet::empty(),
            bytes_to_send: 0,
            time_reserved: 0,
            payload: Vec::new(),
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// True for an ACK that acknowledges sequence `seq` sent to us.
    pub fn is_ack_for(&self, seq: Seq, us: Addr) -> bool {
        self.kind == FrameKind::Ack && self.seq == seq && self.dest == us
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}->{} seq {} ({} B)",
            self.kind, self.src, self.dest, self.seq, self.size
        )
    }
}
