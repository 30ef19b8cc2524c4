//! Reservation-based multi-carrier MAC state machine.
//!
//! One [`OfdmMac`] instance runs per node. The owner (a discrete-event
//! simulation harness) drives it through four entry points:
//!
//! - [`Mac::submit`] queues a payload and, when the node is free,
//!   starts an RTS/CTS handshake for it
//! - [`OfdmMac::tx_complete`] reports the end of a transmission that
//!   the MAC started on its [`Phy`]
//! - [`OfdmMac::rx_start`] / [`OfdmMac::rx_end`] bracket incoming
//!   frames, overlapping receptions included
//! - [`Mac::tick`] polls the protocol timers against the clock
//!
//! All entry points run to completion on one thread; state is only
//! mutated inside them, which is the concurrency model.

use log::{debug, trace, warn};
use rand_core::RngCore;

use crate::carrier::{carrier_share, match_carriers, reservation_duration, CarrierSet};
use crate::mac::config::{AckMode, MacConfig};
use crate::mac::error::{DropReason, MacError};
use crate::mac::phy::Phy;
use crate::mac::stats::MacStats;
use crate::mac::Mac;
use crate::packet::{Frame, FrameKind, MAX_PAYLOAD_LEN};
use crate::queue::PacketQueue;
use crate::table::OccupancyTable;
use crate::timer::{Clock, ProtocolTimer, TimerRole};
use crate::{Addr, Seq, Ts};

/// Received frames buffered for the upper layer
const DELIVERY_DEPTH: usize = 16;

/// Protocol state
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum MacState {
    Idle,
    SendRts,
    WaitCts,
    CtrlBackoff,
    RxRts,
    RxCts,
    SendCts,
    WaitData,
    TxData,
    TxAck,
    WaitAck,
    Backoff,
    RxBackoff,
    RxData,
    RxAck,
    CheckAckExpired,
    CheckBackoffExpired,
    CheckCtsBackoffExpired,
}

/// Why the last state transition happened, kept for tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Reason {
    NotSet,
    DataPending,
    DataNoCarrier,
    DataCarrierAssigned,
    DataRx,
    DataTx,
    AckTx,
    AckRx,
    AckTimeout,
    MaxTxTries,
    MaxRtsTries,
    StartRx,
    NotForMe,
    WaitAckPending,
    PhyError,
    BackoffTimeout,
    BackoffPending,
    WaitCtsPending,
    CtsTx,
    CtsRx,
    RtsTx,
    RtsRx,
    CtsBackoffTimeout,
    WaitData,
    DataTimeout,
    PreviousRts,
}

pub struct OfdmMac<P: Phy, C: Clock, R: RngCore> {
    config: MacConfig,
    phy: P,
    clock: C,
    rng: R,

    state: MacState,
    prev_state: MacState,
    reason: Reason,

    queue: PacketQueue,
    delivered: heapless::Deque<Frame, DELIVERY_DEPTH>,
    table: OccupancyTable,

    slot_timer: ProtocolTimer,
    valid_timer: ProtocolTimer,
    ack_timer: ProtocolTimer,
    backoff_timer: ProtocolTimer,
    cts_timer: ProtocolTimer,
    rts_timer: ProtocolTimer,
    data_timer: ProtocolTimer,

    /// Receptions currently in progress at the modem
    current_rcvs: u8,

    /// Carriers granted by the last CTS we received
    assigned: CarrierSet,
    car_assigned: bool,
    /// The last RTS actually made it on air (false when it was held
    /// back for lack of free carriers)
    rts_valid: bool,

    curr_rts_tries: u16,
    curr_tx_rounds: u16,

    tx_seq: Seq,
    last_sent_seq: Option<Seq>,
    /// DATA sequence awaiting an ACK
    ack_pending: Option<Seq>,
    /// ACK we owe but could not send while receiving
    deferred_ack: Option<(Addr, Seq)>,
    /// RTS addressed to us that arrived while busy, answerable until
    /// its freshness window runs out
    heard_rts: Option<(Frame, Ts)>,

    current_dest: Addr,
    start_tx_time: Ts,
    /// Airtime of the last DATA frame, folded into the ACK wait
    last_tx_duration: Ts,
    /// Earliest instant the band is expected to have spare capacity,
    /// from overheard and granted reservations
    next_free_time: Ts,
    /// DATA frames still expected in the reservation we granted
    wait_pkts: u32,

    /// Round-trip statistics feeding the adaptive ACK timeout
    sum_rtt: f64,
    rtt_samples: u32,
    ack_timeout: Ts,

    stats: MacStats,
}

impl<P: Phy, C: Clock, R: RngCore> OfdmMac<P, C, R> {
    pub fn new(config: MacConfig, phy: P, clock: C, rng: R) -> Self {
        let now = clock.now();
        let mut slot_timer = ProtocolTimer::new(TimerRole::SlotAdvance);
        slot_timer.schedule(now, config.slot_duration);

        let table = OccupancyTable::new(config.data_carriers(), config.slot_count);
        let queue = PacketQueue::new(config.buffer_capacity);
        let ack_timeout = config.ack_timeout;

        Self {
            config,
            phy,
            clock,
            rng,
            state: MacState::Idle,
            prev_state: MacState::Idle,
            reason: Reason::NotSet,
            queue,
            delivered: heapless::Deque::new(),
            table,
            slot_timer,
            valid_timer: ProtocolTimer::new(TimerRole::ReservationValid),
            ack_timer: ProtocolTimer::new(TimerRole::Ack),
            backoff_timer: ProtocolTimer::new(TimerRole::Backoff),
            cts_timer: ProtocolTimer::new(TimerRole::CtsWait),
            rts_timer: ProtocolTimer::new(TimerRole::RtsRetry),
            data_timer: ProtocolTimer::new(TimerRole::DataWait),
            current_rcvs: 0,
            assigned: CarrierSet::empty(),
            car_assigned: false,
            rts_valid: false,
            curr_rts_tries: 0,
            curr_tx_rounds: 0,
            tx_seq: 0,
            last_sent_seq: None,
            ack_pending: None,
            deferred_ack: None,
            heard_rts: None,
            current_dest: 0,
            start_tx_time: 0,
            last_tx_duration: 0,
            next_free_time: 0,
            wait_pkts: 0,
            sum_rtt: 0.0,
            rtt_samples: 0,
            ack_timeout,
            stats: MacStats::default(),
        }
    }

    pub fn state(&self) -> MacState {
        self.state
    }

    pub fn previous_state(&self) -> MacState {
        self.prev_state
    }

    pub fn last_reason(&self) -> Reason {
        self.reason
    }

    pub fn stats(&self) -> &MacStats {
        &self.stats
    }

    pub fn phy(&self) -> &P {
        &self.phy
    }

    pub fn phy_mut(&mut self) -> &mut P {
        &mut self.phy
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn carriers_assigned(&self) -> CarrierSet {
        if self.car_assigned {
            self.assigned
        } else {
            CarrierSet::empty()
        }
    }

    pub fn occupancy(&self) -> &OccupancyTable {
        &self.table
    }

    /// Current ACK timeout, adapted from measured round trips
    pub fn ack_timeout(&self) -> Ts {
        self.ack_timeout
    }

    /// Exclude a carrier from all future reservations
    pub fn set_unusable(&mut self, carrier: usize) {
        self.table.mark_unusable(carrier);
    }

    pub fn clear_unusable(&mut self, carrier: usize) {
        self.table.clear_unusable(carrier);
    }

    fn now(&self) -> Ts {
        self.clock.now()
    }

    fn set_state(&mut self, state: MacState, reason: Reason) {
        trace!(
            "[{}] state {} -> {} ({})",
            self.config.address,
            self.state,
            state,
            reason
        );
        self.prev_state = self.state;
        self.state = state;
        self.reason = reason;
    }

    /// No reception in progress, safe to start a transmission
    fn free_now(&self) -> bool {
        self.current_rcvs == 0
    }

    /// How many free carriers this node may advertise or grant,
    /// bounded by its priority share of the data band.
    fn advertise_cap(&self) -> usize {
        let share = carrier_share(
            self.config.priority,
            self.config.data_carriers(),
            self.config.node_count,
        );
        self.config.max_advertised_carriers.min(share.max(1))
    }

    /// Uniform sample in [0, 1]
    fn uniform(&mut self) -> f64 {
        self.rng.next_u32() as f64 / u32::MAX as f64
    }

    // --- PHY notifications ------------------------------------------------

    /// The frame handed to [`Phy::transmit`] has left the transducer.
    pub fn tx_complete(&mut self) {
        self.phy.set_tx_busy(false);
        match self.state {
            MacState::SendRts => self.state_backoff_cts(),
            MacState::SendCts => self.state_wait_data(),
            MacState::TxData => match self.config.ack_mode {
                AckMode::Ack => self.state_wait_ack(),
                AckMode::NoAck => {
                    if self.car_assigned && self.valid_timer.is_active() && !self.queue.is_empty()
                    {
                        // Next frame of the burst after a short gap
                        self.state_backoff(Some(self.config.burst_gap));
                    } else {
                        self.state_idle();
                    }
                }
            },
            MacState::TxAck => {
                if self.wait_pkts > 0 {
                    self.state_wait_data();
                } else {
                    self.state_backoff(Some(self.config.post_ack_backoff));
                }
            }
            _ => {
                warn!(
                    "[{}] tx complete in unexpected state {}",
                    self.config.address, self.state
                );
                self.state_idle();
            }
        }
    }

    /// The modem started decoding an incoming frame.
    pub fn rx_start(&mut self) {
        self.current_rcvs = self.current_rcvs.saturating_add(1);
        if self.current_rcvs > 1 {
            return;
        }
        let now = self.now();
        match self.state {
            MacState::Backoff => {
                self.backoff_timer.freeze(now);
                self.set_state(MacState::RxBackoff, Reason::StartRx);
            }
            MacState::WaitAck => self.ack_timer.freeze(now),
            MacState::WaitCts => {
                self.cts_timer.freeze(now);
                self.set_state(MacState::CtrlBackoff, Reason::StartRx);
            }
            MacState::WaitData => self.data_timer.freeze(now),
            _ => {}
        }
    }

    /// The incoming frame finished; `success` is false when the
    /// physical layer reports it damaged.
    pub fn rx_end(&mut self, frame: Frame, success: bool) {
        self.current_rcvs = self.current_rcvs.saturating_sub(1);

        if !success {
            trace!(
                "[{}] {} discarded ({})",
                self.config.address,
                frame,
                DropReason::PhyError
            );
            self.stats.drop_phy_error = self.stats.drop_phy_error.saturating_add(1);
            self.reason = Reason::PhyError;
            self.resume_frozen();
            if self.state == MacState::Idle && self.free_now() {
                self.state_idle();
            }
            return;
        }

        if frame.dest == self.config.address || frame.dest == crate::BROADCAST {
            self.rx_for_me(frame);
        } else {
            self.rx_overheard(frame);
        }

        self.resume_frozen();

        // Last reception just ended with nothing else in flight: take
        // the idle decision again (held RTS, pending queue)
        if self.state == MacState::Idle && self.free_now() {
            self.state_idle();
        }
    }

    fn rx_for_me(&mut self, frame: Frame) {
        match frame.kind {
            FrameKind::Ack => {
                self.stats.ack_rx = self.stats.ack_rx.saturating_add(1);
                if self.state == MacState::WaitAck
                    && self.ack_pending.map_or(false, |s| frame.is_ack_for(s, self.config.address))
                {
                    self.state_rx_ack(&frame);
                } else {
                    self.stats.drop_wrong_state = self.stats.drop_wrong_state.saturating_add(1);
                }
            }
            FrameKind::Cts => {
                self.stats.cts_rx = self.stats.cts_rx.saturating_add(1);
                if matches!(self.state, MacState::CtrlBackoff | MacState::WaitCts)
                    && frame.src == self.current_dest
                {
                    self.state_rx_cts(&frame);
                } else {
                    // Too late to use the grant, but its reservation
                    // still occupies the band
                    let slots =
                        (frame.time_reserved / self.config.slot_duration) as usize + 1;
                    self.table.mark_busy(frame.carriers, slots);
                    self.next_free_time =
                        self.next_free_time.max(self.now() + frame.time_reserved);
                    self.stats.drop_wrong_state = self.stats.drop_wrong_state.saturating_add(1);
                }
            }
            FrameKind::Rts => {
                self.stats.rts_rx = self.stats.rts_rx.saturating_add(1);
                match self.state {
                    MacState::Idle | MacState::Backoff | MacState::RxBackoff
                        if self.free_now() =>
                    {
                        self.set_state(MacState::RxRts, Reason::RtsRx);
                        self.backoff_timer.stop();
                        self.state_send_cts(&frame);
                    }
                    _ => {
                        // Busy with another exchange: remember the
                        // request, answer later if still fresh
                        debug!(
                            "[{}] holding RTS from {} while in {}",
                            self.config.address, frame.src, self.state
                        );
                        self.heard_rts = Some((frame, self.now()));
                    }
                }
            }
            FrameKind::Data => {
                self.stats.data_rx = self.stats.data_rx.saturating_add(1);
                if matches!(self.state, MacState::WaitData | MacState::Idle) {
                    self.state_rx_data(frame);
                } else {
                    self.stats.drop_wrong_state = self.stats.drop_wrong_state.saturating_add(1);
                }
            }
        }
    }

    fn rx_overheard(&mut self, frame: Frame) {
        self.stats.drop_wrong_receiver = self.stats.drop_wrong_receiver.saturating_add(1);
        self.reason = Reason::NotForMe;
        let now = self.now();
        match frame.kind {
            FrameKind::Cts => {
                // Book the granted reservation so we do not advertise
                // or claim those carriers while it runs
                let slots = (frame.time_reserved / self.config.slot_duration) as usize + 1;
                self.table.mark_busy(frame.carriers, slots);
                self.next_free_time = self.next_free_time.max(now + frame.time_reserved);
            }
            FrameKind::Rts => {
                // A handshake is starting nearby: stay off the channel
                // long enough for its CTS to come back
                if matches!(self.state, MacState::Idle | MacState::Backoff) {
                    self.state_backoff(Some(self.config.rts_overheard_backoff));
                }
            }
            _ => {}
        }
    }

    /// Resume whatever timer was frozen for the reception that just
    /// ended, once no reception remains in progress.
    fn resume_frozen(&mut self) {
        if self.current_rcvs > 0 {
            return;
        }
        let now = self.now();

        if self.backoff_timer.is_frozen() {
            self.set_state(MacState::CheckBackoffExpired, Reason::BackoffPending);
            self.backoff_timer.unfreeze(now);
            self.set_state(MacState::Backoff, Reason::BackoffPending);
        }
        if self.ack_timer.is_frozen() {
            self.set_state(MacState::CheckAckExpired, Reason::WaitAckPending);
            self.ack_timer.unfreeze(now);
            self.set_state(MacState::WaitAck, Reason::WaitAckPending);
        }
        if self.cts_timer.is_frozen() {
            self.set_state(MacState::CheckCtsBackoffExpired, Reason::WaitCtsPending);
            self.cts_timer.unfreeze(now);
            self.set_state(MacState::WaitCts, Reason::WaitCtsPending);
        }
        if self.data_timer.is_frozen() {
            self.data_timer.unfreeze(now);
        }

        if let Some((dest, seq)) = self.deferred_ack.take() {
            self.tx_ack(dest, seq);
        }
    }

    // --- requester side ---------------------------------------------------

    fn state_idle(&mut self) {
        self.set_state(MacState::Idle, Reason::NotSet);
        let now = self.now();

        if let Some((frame, heard_at)) = self.heard_rts.take() {
            if now.saturating_sub(heard_at) <= self.config.heard_rts_validity && self.free_now() {
                self.set_state(MacState::RxRts, Reason::PreviousRts);
                self.state_send_cts(&frame);
                return;
            }
            debug!("[{}] held RTS from {} went stale", self.config.address, frame.src);
        }

        if !self.queue.is_empty() && self.free_now() {
            if self.car_assigned && self.valid_timer.is_active() {
                self.state_tx_data();
            } else {
                self.state_send_rts();
            }
        }
    }

    fn state_send_rts(&mut self) {
        if self.queue.is_empty() {
            self.state_idle();
            return;
        }
        if self.curr_rts_tries >= self.config.max_rts_tries {
            // Handshake never completed: drop the head frame
            if let Some(dropped) = self.queue.dequeue_head() {
                debug!(
                    "[{}] seq {} dropped ({})",
                    self.config.address,
                    dropped.seq,
                    DropReason::MaxRtsTries
                );
            }
            self.stats.drop_max_rts = self.stats.drop_max_rts.saturating_add(1);
            self.reset_assignment();
            self.curr_rts_tries = 0;
            self.curr_tx_rounds = 0;
            self.last_sent_seq = None;
            self.set_state(MacState::Idle, Reason::MaxRtsTries);
            self.state_idle();
            return;
        }
        self.set_state(MacState::SendRts, Reason::DataPending);
        self.tx_rts();
    }

    fn tx_rts(&mut self) {
        let now = self.now();
        let free = self
            .table
            .pick_free(self.advertise_cap())
            .intersection(self.phy.free_carriers());

        if free.is_empty() {
            // No capacity right now: hold the RTS until the band is
            // expected to clear, scaled up by how often we have tried
            self.rts_valid = false;
            self.reason = Reason::DataNoCarrier;
            let amp = if self.curr_rts_tries > 1 {
                (self.curr_rts_tries / 2).max(1) as Ts
            } else {
                1
            };
            let base = self
                .next_free_time
                .saturating_sub(now)
                .max(self.config.slot_duration / 10);
            self.rts_timer.schedule(now, base * amp);
            debug!(
                "[{}] no free carriers, RTS held for {} us",
                self.config.address,
                base * amp
            );
            return;
        }

        let (dest, seq) = match self.queue.peek_head() {
            Some(head) => (head.dest, head.seq),
            None => return self.state_idle(),
        };
        let burst = self
            .queue
            .iter()
            .filter(|f| f.dest == dest)
            .count()
            .min(self.config.max_burst_size as usize)
            .max(1) as u32;
        let bytes = burst * self.config.data_size as u32;

        let rts = Frame::rts(self.config.address, dest, seq, self.config.rts_size, free, bytes);
        self.current_dest = dest;
        self.rts_valid = true;
        self.curr_rts_tries += 1;
        self.stats.rts_tx = self.stats.rts_tx.saturating_add(1);
        self.reason = Reason::RtsTx;
        debug!("[{}] {} advertising {}", self.config.address, rts, free);
        self.phy.set_tx_busy(true);
        self.phy.transmit(rts);
    }

    /// Wait for the CTS answering our RTS, for a randomized window
    /// that shrinks as retries accumulate.
    fn state_backoff_cts(&mut self) {
        let now = self.now();
        let tries = self.curr_rts_tries.max(1) as f64;
        let window =
            (self.uniform() / (1.6 * tries) * 1_000_000.0) as Ts + self.config.cts_backoff_base;
        self.cts_timer.schedule(now, window);
        self.set_state(MacState::WaitCts, Reason::WaitCtsPending);
    }

    fn state_rx_cts(&mut self, cts: &Frame) {
        self.set_state(MacState::RxCts, Reason::CtsRx);
        let now = self.now();
        self.cts_timer.stop();
        self.rts_timer.stop();
        self.curr_rts_tries = 0;

        if cts.carriers.is_empty() {
            // Responder had nothing to grant
            self.state_idle();
            return;
        }

        let slots = (cts.time_reserved / self.config.slot_duration) as usize + 1;
        self.table.mark_busy(cts.carriers, slots);
        self.valid_timer.schedule(now, cts.time_reserved);
        self.assigned = cts.carriers;
        self.car_assigned = true;
        debug!(
            "[{}] granted {} for {} us",
            self.config.address, cts.carriers, cts.time_reserved
        );

        if self.free_now() && !self.queue.is_empty() {
            self.set_state(MacState::Idle, Reason::DataCarrierAssigned);
            self.state_tx_data();
        } else {
            self.state_idle();
        }
    }

    fn state_tx_data(&mut self) {
        let head = match self.queue.peek_head() {
            Some(h) => h.clone(),
            None => return self.state_idle(),
        };

        let retransmission = self.last_sent_seq == Some(head.seq) && self.curr_tx_rounds > 0;
        if retransmission
            && self.config.max_tx_tries > 0
            && self.curr_tx_rounds >= self.config.max_tx_tries
        {
            debug!(
                "[{}] seq {} dropped ({})",
                self.config.address,
                head.seq,
                DropReason::MaxTxTries
            );
            self.queue.erase_by_seq(head.seq);
            self.stats.drop_max_tx = self.stats.drop_max_tx.saturating_add(1);
            self.curr_tx_rounds = 0;
            self.last_sent_seq = None;
            self.ack_pending = None;
            self.backoff_timer.reset_counter();
            self.reset_assignment();
            self.set_state(MacState::Idle, Reason::MaxTxTries);
            self.state_idle();
            return;
        }

        self.set_state(MacState::TxData, Reason::DataTx);
        self.tx_data(head);
    }

    fn tx_data(&mut self, mut frame: Frame) {
        frame.carriers = if self.config.full_band {
            CarrierSet::all(self.config.data_carriers())
        } else {
            self.assigned
        };
        frame.size = self.config.data_size;

        self.start_tx_time = self.now();
        self.last_tx_duration = self.phy.tx_duration(&frame);
        self.last_sent_seq = Some(frame.seq);
        self.curr_tx_rounds += 1;
        self.curr_rts_tries = 0;
        self.stats.data_tx = self.stats.data_tx.saturating_add(1);

        if self.config.ack_mode == AckMode::NoAck {
            // Fire and forget: the frame is spent on transmit
            self.queue.erase_by_seq(frame.seq);
            self.curr_tx_rounds = 0;
            self.last_sent_seq = None;
        }

        debug!("[{}] {} on {}", self.config.address, frame, frame.carriers);
        self.phy.set_tx_busy(true);
        self.phy.transmit(frame);
    }

    fn state_wait_ack(&mut self) {
        let now = self.now();
        self.ack_pending = self.last_sent_seq;
        let window = self.ack_timeout + self.last_tx_duration + 2 * self.config.wait_constant;
        self.ack_timer.schedule(now, window);
        self.set_state(MacState::WaitAck, Reason::WaitAckPending);
    }

    fn state_rx_ack(&mut self, ack: &Frame) {
        self.set_state(MacState::RxAck, Reason::AckRx);
        let now = self.now();
        self.ack_timer.stop();
        self.queue.erase_by_seq(ack.seq);
        self.ack_pending = None;
        self.last_sent_seq = None;
        self.curr_tx_rounds = 0;
        self.backoff_timer.reset_counter();
        self.update_ack_timeout(now.saturating_sub(self.start_tx_time));

        // Short pause, then either the next burst frame or idle
        self.state_backoff(Some(self.config.post_ack_backoff));
    }

    fn update_ack_timeout(&mut self, rtt: Ts) {
        self.sum_rtt += rtt as f64;
        self.rtt_samples = self.rtt_samples.saturating_add(1);
        let mean = self.sum_rtt / self.rtt_samples as f64;
        // Smooth towards the running mean instead of jumping to it
        let alpha = self.config.alpha;
        let next = alpha * self.ack_timeout as f64 + (1.0 - alpha) * mean;
        self.ack_timeout = (next as Ts).max(1);
        trace!(
            "[{}] ack timeout adapted to {} us over {} samples",
            self.config.address,
            self.ack_timeout,
            self.rtt_samples
        );
    }

    // --- responder side ---------------------------------------------------

    fn state_send_cts(&mut self, rts: &Frame) {
        let now = self.now();
        let mine = self
            .table
            .pick_free(self.advertise_cap())
            .intersection(self.phy.free_carriers());
        let matched = match_carriers(mine, rts.carriers, self.config.max_carriers_per_reservation);

        if matched.is_empty() {
            debug!(
                "[{}] no carriers to grant {}, staying idle",
                self.config.address, rts.src
            );
            self.set_state(MacState::Idle, Reason::DataNoCarrier);
            return;
        }

        let ack_overhead = match self.config.ack_mode {
            AckMode::Ack => self.config.ack_reservation_overhead,
            AckMode::NoAck => 0,
        };
        let reserved = reservation_duration(
            rts.bytes_to_send,
            matched.len(),
            self.config.bitrate_per_carrier,
            ack_overhead,
        );
        let slots = (reserved / self.config.slot_duration) as usize + 1;
        self.table.mark_busy(matched, slots);
        self.next_free_time = self.next_free_time.max(now + reserved);
        self.wait_pkts =
            (rts.bytes_to_send / self.config.data_size.max(1) as u32).max(1);
        self.current_dest = rts.src;

        // The request we are answering is no longer pending
        let answered = matches!(&self.heard_rts, Some((held, _)) if held.src == rts.src);
        if answered {
            self.heard_rts = None;
        }

        let cts = Frame::cts(
            self.config.address,
            rts.src,
            rts.seq,
            self.config.cts_size,
            matched,
            reserved,
        );
        self.stats.cts_tx = self.stats.cts_tx.saturating_add(1);
        self.set_state(MacState::SendCts, Reason::CtsTx);
        debug!("[{}] {} granting {}", self.config.address, cts, matched);
        self.phy.set_tx_busy(true);
        self.phy.transmit(cts);
    }

    fn state_wait_data(&mut self) {
        let now = self.now();
        self.data_timer.schedule(now, self.config.data_wait_timeout);
        self.set_state(MacState::WaitData, Reason::WaitData);
    }

    fn state_rx_data(&mut self, frame: Frame) {
        self.set_state(MacState::RxData, Reason::DataRx);
        self.data_timer.stop();
        self.wait_pkts = self.wait_pkts.saturating_sub(1);

        let src = frame.src;
        let seq = frame.seq;
        if self.delivered.push_back(frame).is_err() {
            // Upper layer is not draining; oldest frame gives way
            self.delivered.pop_front();
            warn!("[{}] delivery buffer overrun", self.config.address);
        }

        match self.config.ack_mode {
            AckMode::Ack => {
                if self.free_now() {
                    self.tx_ack(src, seq);
                } else {
                    self.deferred_ack = Some((src, seq));
                }
            }
            AckMode::NoAck => {
                if self.wait_pkts > 0 {
                    self.state_wait_data();
                } else {
                    self.state_idle();
                }
            }
        }
    }

    fn tx_ack(&mut self, dest: Addr, seq: Seq) {
        let ack = Frame::ack(self.config.address, dest, seq, self.config.ack_size);
        self.stats.ack_tx = self.stats.ack_tx.saturating_add(1);
        self.set_state(MacState::TxAck, Reason::AckTx);
        self.phy.set_tx_busy(true);
        self.phy.transmit(ack);
    }

    // --- backoff ----------------------------------------------------------

    fn state_backoff(&mut self, duration: Option<Ts>) {
        let now = self.now();
        let d = match duration {
            Some(d) if d > 0 => d,
            _ => self.backoff_duration(),
        };
        self.stats.backoffs = self.stats.backoffs.saturating_add(1);
        self.stats.backoff_total = self.stats.backoff_total.saturating_add(d);
        self.backoff_timer.schedule(now, d);
        self.set_state(MacState::Backoff, Reason::BackoffPending);
    }

    /// Randomized exponential backoff with a bounded exponent
    fn backoff_duration(&mut self) -> Ts {
        let exp = self.backoff_timer.counter().min(self.config.max_backoff_counter);
        let factor = (1u64 << exp) as f64;
        let d = self.config.backoff_tuner * self.uniform() * 2.0 * self.ack_timeout as f64 * factor;
        (d as Ts).max(1)
    }

    /// Release the carriers granted to us once their validity runs out
    /// or the exchange finishes early.
    fn reset_assignment(&mut self) {
        if self.car_assigned {
            self.table.release(self.assigned);
        }
        self.car_assigned = false;
        self.assigned = CarrierSet::empty();
        self.rts_valid = false;
        self.valid_timer.stop();
    }

    // --- timer dispatch ---------------------------------------------------

    fn poll_timers(&mut self) {
        let now = self.now();

        if self.slot_timer.take_expired(now) {
            self.table.advance_slot();
            self.slot_timer.schedule(now, self.config.slot_duration);
        }

        if self.valid_timer.take_expired(now) {
            trace!("[{}] reservation expired", self.config.address);
            self.reset_assignment();
        }

        if self.ack_timer.take_expired(now) {
            if self.state == MacState::WaitAck {
                debug!(
                    "[{}] ack timeout for seq {:?}",
                    self.config.address, self.ack_pending
                );
                self.backoff_timer.incr_counter();
                self.set_state(MacState::WaitAck, Reason::AckTimeout);
                self.state_backoff(None);
            }
        }

        if self.backoff_timer.take_expired(now) {
            if self.state == MacState::Backoff {
                self.set_state(MacState::Backoff, Reason::BackoffTimeout);
                self.state_idle();
            }
        }

        if self.cts_timer.take_expired(now) {
            if matches!(self.state, MacState::CtrlBackoff | MacState::WaitCts) {
                debug!("[{}] no CTS, retrying RTS", self.config.address);
                self.set_state(MacState::SendRts, Reason::CtsBackoffTimeout);
                self.state_send_rts();
            }
        }

        if self.rts_timer.take_expired(now) {
            if self.state == MacState::SendRts && !self.rts_valid {
                if self.free_now() {
                    self.tx_rts();
                } else {
                    // Reception in progress: keep holding the RTS
                    self.rts_timer.schedule(now, self.config.slot_duration / 10);
                }
            }
        }

        if self.data_timer.take_expired(now) {
            if self.state == MacState::WaitData {
                debug!("[{}] data never arrived", self.config.address);
                self.wait_pkts = 0;
                self.set_state(MacState::WaitData, Reason::DataTimeout);
                self.state_idle();
            }
        }
    }
}

impl<P: Phy, C: Clock, R: RngCore> Mac for OfdmMac<P, C, R> {
    type Error = MacError;

    fn submit(&mut self, dest: Addr, payload: &[u8]) -> Result<Seq, MacError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(MacError::PayloadTooLarge);
        }
        let seq = self.tx_seq;
        self.tx_seq = self.tx_seq.wrapping_add(1);
        let frame = Frame::data(self.config.address, dest, seq, self.config.data_size, payload);

        if let Err(frame) = self.queue.enqueue(frame) {
            self.stats.drop_buffer_full = self.stats.drop_buffer_full.saturating_add(1);
            return Err(MacError::BufferFull(frame));
        }

        if self.state == MacState::Idle && self.free_now() {
            // Reuses a still-valid reservation before contending again
            self.state_idle();
        }
        Ok(seq)
    }

    fn deliver(&mut self) -> Option<Frame> {
        self.delivered.pop_front()
    }

    fn tick(&mut self) {
        self.poll_timers();
    }
}
