//! Carrier-by-time-slot occupancy table.
//!
//! A rolling grid of busy flags over the data carriers. The current
//! column advances once per slot duration, driven by the state
//! machine's slot-advance timer; reservations negotiated in the
//! handshake (ours and overheard ones) are booked ahead of the current
//! column. All methods take `&mut self` and complete as one logical
//! step, which is the whole atomicity contract under the cooperative
//! single-threaded execution model.

use log::trace;

use crate::carrier::CarrierSet;
use crate::{MAX_CARRIERS, MAX_SLOTS};

#[derive(Clone)]
pub struct OccupancyTable {
    grid: [[bool; MAX_SLOTS]; MAX_CARRIERS],
    carriers: usize,
    slots: usize,
    current: usize,
    unusable: CarrierSet,
}

impl OccupancyTable {
    pub fn new(carriers: usize, slots: usize) -> Self {
        debug_assert!(carriers <= MAX_CARRIERS && slots <= MAX_SLOTS);
        Self {
            grid: [[false; MAX_SLOTS]; MAX_CARRIERS],
            carriers: carriers.min(MAX_CARRIERS),
            slots: slots.min(MAX_SLOTS).max(1),
            current: 0,
            unusable: CarrierSet::empty(),
        }
    }

    /// Book each carrier in `set` for `slot_count` consecutive slots
    /// starting at the current column (modulo the window width).
    pub fn mark_busy(&mut self, set: CarrierSet, slot_count: usize) {
        let span = slot_count.min(self.slots);
        for carrier in set.iter() {
            if carrier >= self.carriers {
                continue;
            }
            for offset in 0..span {
                self.grid[carrier][(self.current + offset) % self.slots] = true;
            }
        }
        trace!("occupancy: booked {} for {} slots", set, span);
    }

    /// Free every cell booked for the carriers in `set`, in all slots.
    ///
    /// Used when a reservation is cancelled before it runs out, so the
    /// cells do not leak until the window rotates past them.
    pub fn release(&mut self, set: CarrierSet) {
        for carrier in set.iter() {
            if carrier >= self.carriers || self.unusable.contains(carrier) {
                continue;
            }
            for slot in 0..self.slots {
                self.grid[carrier][slot] = false;
            }
        }
    }

    /// Carriers free at the current slot, lowest indices first, up to
    /// `max_yield` of them.
    ///
    /// An empty result means "no capacity now": callers retry after a
    /// randomized backoff, it is never an error.
    pub fn pick_free(&self, max_yield: usize) -> CarrierSet {
        let mut free = CarrierSet::empty();
        let mut found = 0;
        for carrier in 0..self.carriers {
            if found >= max_yield {
                break;
            }
            if !self.grid[carrier][self.current] {
                free.insert(carrier);
                found += 1;
            }
        }
        free
    }

    /// Rotate the window: clear the column being recycled, re-mark the
    /// permanently unusable carriers, and advance the current index.
    pub fn advance_slot(&mut self) {
        for carrier in 0..self.carriers {
            self.grid[carrier][self.current] = false;
        }
        for carrier in self.unusable.iter() {
            if carrier < self.carriers {
                self.grid[carrier][self.current] = true;
            }
        }
        self.current = (self.current + 1) % self.slots;
    }

    /// Permanently exclude a carrier (interference-damaged band).
    pub fn mark_unusable(&mut self, carrier: usize) {
        if carrier >= self.carriers {
            return;
        }
        self.unusable.insert(carrier);
        for slot in 0..self.slots {
            self.grid[carrier][slot] = true;
        }
    }

    /// Return a previously excluded carrier to service.
    pub fn clear_unusable(&mut self, carrier: usize) {
        if !self.unusable.contains(carrier) {
            return;
        }
        self.unusable.remove(carrier);
        for slot in 0..self.slots {
            self.grid[carrier][slot] = false;
        }
    }

    pub fn unusable(&self) -> CarrierSet {
        self.unusable
    }

    pub fn current_slot(&self) -> usize {
        self.current
    }

    pub fn slot_count(&self) -> usize {
        self.slots
    }

    pub fn carrier_count(&self) -> usize {
        self.carriers
    }

    /// Busy flag of a cell `offset` slots ahead of the current column.
    pub fn is_busy(&self, carrier: usize, offset: usize) -> bool {
        self.grid[carrier][(self.current + offset) % self.slots]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn set(carriers: &[usize]) -> CarrierSet {
        carriers.iter().copied().collect()
    }

    #[test]
    fn no_double_booking_within_reservation() {
        let mut table = OccupancyTable::new(8, 10);

        table.mark_busy(set(&[1, 3]), 4);

        // Booked carriers are withheld until the window rotates past
        // the reservation; the others stay available.
        for _ in 0..4 {
            let free = table.pick_free(8);
            assert!(!free.contains(1));
            assert!(!free.contains(3));
            assert!(free.contains(0));
            table.advance_slot();
        }

        // Past the reservation both carriers are free again.
        let free = table.pick_free(8);
        assert!(free.contains(1));
        assert!(free.contains(3));
    }

    #[test]
    fn pick_free_honours_max_yield() {
        let table = OccupancyTable::new(8, 4);
        let free = table.pick_free(3);
        assert_eq!(free.len(), 3);
        // Lowest indices first
        let order: std::vec::Vec<usize> = free.iter().collect();
        assert_eq!(order, [0, 1, 2]);
    }

    #[test]
    fn full_table_yields_empty_set() {
        let mut table = OccupancyTable::new(4, 4);
        table.mark_busy(CarrierSet::all(4), 4);
        assert!(table.pick_free(4).is_empty());
    }

    #[test]
    fn booking_wraps_around_the_window() {
        let mut table = OccupancyTable::new(2, 4);

        // Move the current column near the end, then book across the
        // wrap point.
        table.advance_slot();
        table.advance_slot();
        table.advance_slot();
        assert_eq!(table.current_slot(), 3);

        table.mark_busy(set(&[0]), 3);
        assert!(table.is_busy(0, 0));
        assert!(table.is_busy(0, 1));
        assert!(table.is_busy(0, 2));
    }

    #[test]
    fn unusable_carriers_survive_rotation() {
        let mut table = OccupancyTable::new(4, 3);
        table.mark_unusable(2);

        for _ in 0..7 {
            assert!(!table.pick_free(4).contains(2));
            table.advance_slot();
        }

        table.clear_unusable(2);
        assert!(table.pick_free(4).contains(2));
    }

    #[test]
    fn release_frees_booked_cells() {
        let mut table = OccupancyTable::new(4, 8);
        table.mark_busy(set(&[0, 1]), 8);
        assert!(table.pick_free(4).is_empty() == false);
        assert!(!table.pick_free(4).contains(0));

        table.release(set(&[0, 1]));
        let free = table.pick_free(4);
        assert!(free.contains(0));
        assert!(free.contains(1));
    }

    #[test]
    fn release_keeps_unusable_carriers_busy() {
        let mut table = OccupancyTable::new(4, 4);
        table.mark_unusable(1);
        table.release(set(&[1]));
        assert!(!table.pick_free(4).contains(1));
    }

    #[test]
    fn out_of_range_carriers_are_ignored() {
        let mut table = OccupancyTable::new(4, 4);
        table.mark_busy(set(&[9]), 2);
        assert_eq!(table.pick_free(8).len(), 4);
    }
}
