//! # Transmission slicing
//!
//! Sends one unit for the selected user: the abeyant fragment if there is
//! one, otherwise the head of the user's queue. A unit whose transmission
//! would run past the end of the slot is cut at the last whole byte that
//! fits; the prefix goes out now and the remainder waits in abeyance with
//! the original packet's head-of-line timestamp.
//!
//! Every byte of a sliced unit is dispatched exactly once and in order:
//! prefixes leave in slot order and a user's queue is not touched until its
//! fragment is gone.

use tracing::{debug, warn};

use crate::net::interface::{LinkLayer, PacketUnit, UserId, UserQueues};
use crate::scheduler::abeyance::Abeyant;
use crate::scheduler::slot::SlotClock;
use crate::scheduler::users::UserTable;

/// Result of one [`TransmissionSlicer::send_one`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SendOutcome {
    /// Nobody was selected this tick.
    NoUser,
    /// The selected user's link has zero bandwidth.
    LinkDown,
    /// The selected user has neither a fragment nor a queued packet.
    Empty,
    /// A whole unit went out; the link is busy for `tx_time` seconds.
    Sent { tx_time: f64, bytes: usize },
    /// The unit did not fit; `sent_bytes` went out (possibly zero) and
    /// `remaining_bytes` are now in abeyance.
    Sliced {
        sent_bytes: usize,
        remaining_bytes: usize,
    },
}

impl SendOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendOutcome::NoUser => "no_user",
            SendOutcome::LinkDown => "link_down",
            SendOutcome::Empty => "empty",
            SendOutcome::Sent { .. } => "sent",
            SendOutcome::Sliced { .. } => "sliced",
        }
    }
}

pub struct TransmissionSlicer;

impl TransmissionSlicer {
    /// Sends at most one unit for `selected` at time `now`.
    ///
    /// # Panics
    ///
    /// Panics if a split does not conserve bytes or a completed unit's
    /// delay is not strictly positive; both mean the collaborators handed
    /// the scheduler inconsistent data.
    pub fn send_one<P, Q, L>(
        users: &mut UserTable<P>,
        slot: &SlotClock,
        queues: &mut Q,
        links: &mut L,
        selected: Option<UserId>,
        now: f64,
    ) -> SendOutcome
    where
        P: PacketUnit,
        Q: UserQueues<Unit = P>,
        L: LinkLayer<Unit = P>,
    {
        let Some(user) = selected else {
            return SendOutcome::NoUser;
        };
        if !users.contains(user) {
            warn!(user, "selected user out of range");
            return SendOutcome::NoUser;
        }

        let bandwidth = links.bandwidth(user);
        if bandwidth == 0.0 {
            debug!(user, now, "link down");
            return SendOutcome::LinkDown;
        }

        let (unit, hol_arrival) = match users.take_abeyant(user) {
            Some(fragment) => (fragment.unit, fragment.hol_arrival),
            None => {
                let hol_arrival = queues.head_of_line_arrival(user);
                match queues.dequeue(user) {
                    Some(unit) => (unit, hol_arrival),
                    None => return SendOutcome::Empty,
                }
            }
        };
        if let Some(rec) = users.get_mut(user) {
            rec.hol_ts = hol_arrival;
        }

        let size = unit.byte_size();
        let tx_time = links.transmission_time(user, &unit);

        if slot.overruns(now, tx_time) {
            let available_bits = slot.remaining(now) * bandwidth;
            let prefix_bytes = ((available_bits / 8.0).floor() as usize).min(size.saturating_sub(1));

            let (sent_bytes, remainder) = if prefix_bytes == 0 {
                (0, unit)
            } else {
                let (prefix, remainder) = unit.split(prefix_bytes);
                assert_eq!(
                    prefix.byte_size(),
                    prefix_bytes,
                    "split produced a prefix of the wrong size"
                );
                assert_eq!(
                    prefix.byte_size() + remainder.byte_size(),
                    size,
                    "split did not conserve bytes"
                );
                links.deliver(user, prefix);
                (prefix_bytes, remainder)
            };

            let remaining_bytes = remainder.byte_size();
            users.set_abeyant(
                user,
                Some(Abeyant {
                    unit: remainder,
                    hol_arrival,
                }),
            );
            if let Some(rec) = users.get_mut(user) {
                rec.counters.slices += 1;
                rec.counters.bytes_dispatched += sent_bytes as u64;
            }
            debug!(user, now, sent_bytes, remaining_bytes, "sliced at slot boundary");
            return SendOutcome::Sliced {
                sent_bytes,
                remaining_bytes,
            };
        }

        links.deliver(user, unit);
        let delay = now + tx_time - hol_arrival;
        assert!(
            delay > 0.0,
            "non-positive delay {delay} for user {user} (now {now}, hol {hol_arrival})"
        );
        if let Some(rec) = users.get_mut(user) {
            rec.abeyant = None;
            rec.delay.update(now, delay);
            rec.counters.units_sent += 1;
            rec.counters.bytes_dispatched += size as u64;
        }
        debug!(user, now, bytes = size, tx_time, delay, "sent");
        SendOutcome::Sent {
            tx_time,
            bytes: size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::test_util::{Chunk, MockLinks, MockQueues};
    use proptest::prelude::*;

    fn slot_at(start: f64, duration: f64) -> SlotClock {
        let mut slot = SlotClock::new(duration);
        slot.advance(start);
        slot
    }

    #[test]
    fn no_user_is_a_no_op() {
        let mut users: UserTable<Chunk> = UserTable::new(1, 1.0);
        let mut queues = MockQueues::new(1);
        queues.push(0, Chunk::new(1, 100), 0.0);
        let mut links = MockLinks::new(&[8000.0]);
        let out = TransmissionSlicer::send_one(
            &mut users,
            &slot_at(0.0, 1.0),
            &mut queues,
            &mut links,
            None,
            0.5,
        );
        assert_eq!(out, SendOutcome::NoUser);
        assert_eq!(queues.len(0), 1);
        assert!(links.delivered(0).is_empty());
    }

    #[test]
    fn link_down_dequeues_nothing() {
        let mut users: UserTable<Chunk> = UserTable::new(1, 1.0);
        let mut queues = MockQueues::new(1);
        queues.push(0, Chunk::new(1, 100), 0.0);
        let mut links = MockLinks::new(&[0.0]);
        let out = TransmissionSlicer::send_one(
            &mut users,
            &slot_at(0.0, 1.0),
            &mut queues,
            &mut links,
            Some(0),
            0.5,
        );
        assert_eq!(out, SendOutcome::LinkDown);
        assert_eq!(queues.len(0), 1);
        assert_eq!(users.get(0).unwrap().counters().units_sent, 0);
    }

    #[test]
    fn empty_queue_reports_empty() {
        let mut users: UserTable<Chunk> = UserTable::new(1, 1.0);
        let mut queues = MockQueues::new(1);
        let mut links = MockLinks::new(&[8000.0]);
        let out = TransmissionSlicer::send_one(
            &mut users,
            &slot_at(0.0, 1.0),
            &mut queues,
            &mut links,
            Some(0),
            0.5,
        );
        assert_eq!(out, SendOutcome::Empty);
    }

    #[test]
    fn whole_packet_fits_and_records_delay() {
        let mut users: UserTable<Chunk> = UserTable::new(1, 1.0);
        let mut queues = MockQueues::new(1);
        queues.push(0, Chunk::new(1, 100), 0.25);
        // 100 bytes at 8000 bps = 0.1 s
        let mut links = MockLinks::new(&[8000.0]);
        let out = TransmissionSlicer::send_one(
            &mut users,
            &slot_at(0.0, 1.0),
            &mut queues,
            &mut links,
            Some(0),
            0.5,
        );
        match out {
            SendOutcome::Sent { tx_time, bytes } => {
                assert!((tx_time - 0.1).abs() < 1e-12);
                assert_eq!(bytes, 100);
            }
            other => panic!("unexpected {other:?}"),
        }
        let rec = users.get(0).unwrap();
        assert_eq!(rec.delay_samples(), 1);
        // 0.5 + 0.1 - 0.25
        assert!((rec.delay_estimate() - 0.35).abs() < 1e-12);
        assert!((rec.head_of_line_timestamp() - 0.25).abs() < f64::EPSILON);
        assert_eq!(links.delivered(0).len(), 1);
    }

    #[test]
    fn overrun_by_half_slices_half() {
        let mut users: UserTable<Chunk> = UserTable::new(1, 1.0);
        let mut queues = MockQueues::new(1);
        queues.push(0, Chunk::new(9, 1000), 0.0);
        // 1000 bytes at 8000 bps = 1.0 s; only 0.5 s of slot remain.
        let mut links = MockLinks::new(&[8000.0]);
        let slot = slot_at(0.0, 1.0);
        let out =
            TransmissionSlicer::send_one(&mut users, &slot, &mut queues, &mut links, Some(0), 0.5);
        assert_eq!(
            out,
            SendOutcome::Sliced {
                sent_bytes: 500,
                remaining_bytes: 500
            }
        );
        let prefix = &links.delivered(0)[0];
        assert_eq!((prefix.offset, prefix.len), (0, 500));

        let fragment = users.abeyant(0).unwrap();
        assert_eq!(fragment.unit.offset, 500);
        assert_eq!(fragment.byte_size(), 500);
        // Original arrival, not the slice time.
        assert!((fragment.hol_arrival - 0.0).abs() < f64::EPSILON);
        // No delay sample for a slice.
        assert_eq!(users.get(0).unwrap().delay_samples(), 0);
        assert_eq!(users.get(0).unwrap().counters().slices, 1);
    }

    #[test]
    fn fragment_is_served_before_queue_and_cleared_when_done() {
        let mut users: UserTable<Chunk> = UserTable::new(1, 1.0);
        let mut queues = MockQueues::new(1);
        queues.push(0, Chunk::new(1, 1000), 0.1);
        queues.push(0, Chunk::new(2, 10), 0.2);
        let mut links = MockLinks::new(&[8000.0]);

        let out = TransmissionSlicer::send_one(
            &mut users,
            &slot_at(0.0, 1.0),
            &mut queues,
            &mut links,
            Some(0),
            0.5,
        );
        assert!(matches!(out, SendOutcome::Sliced { .. }));

        // Next slot: the 500-byte remainder takes 0.5 s and fits.
        let out = TransmissionSlicer::send_one(
            &mut users,
            &slot_at(1.0, 1.0),
            &mut queues,
            &mut links,
            Some(0),
            1.0,
        );
        assert!(matches!(out, SendOutcome::Sent { bytes: 500, .. }));
        assert!(users.abeyant(0).is_none());
        assert_eq!(queues.len(0), 1, "queue untouched while fragment existed");

        let rec = users.get(0).unwrap();
        // delay measured from the original arrival: 1.0 + 0.5 - 0.1
        assert!((rec.delay_estimate() - 1.4).abs() < 1e-12);

        let delivered = links.delivered(0);
        assert_eq!(delivered.len(), 2);
        assert_eq!((delivered[1].id, delivered[1].offset), (1, 500));
    }

    #[test]
    fn sub_byte_remaining_time_keeps_whole_unit_in_abeyance() {
        let mut users: UserTable<Chunk> = UserTable::new(1, 1.0);
        let mut queues = MockQueues::new(1);
        queues.push(0, Chunk::new(1, 100), 0.0);
        let mut links = MockLinks::new(&[8000.0]);
        // 0.0005 s left = 4 bits
        let out = TransmissionSlicer::send_one(
            &mut users,
            &slot_at(0.0, 1.0),
            &mut queues,
            &mut links,
            Some(0),
            0.9995,
        );
        assert_eq!(
            out,
            SendOutcome::Sliced {
                sent_bytes: 0,
                remaining_bytes: 100
            }
        );
        assert!(links.delivered(0).is_empty());
        assert_eq!(users.abeyant_bytes(0), 100);
    }

    #[test]
    #[should_panic(expected = "non-positive delay")]
    fn future_arrival_timestamp_is_a_defect() {
        let mut users: UserTable<Chunk> = UserTable::new(1, 1.0);
        let mut queues = MockQueues::new(1);
        queues.push(0, Chunk::new(1, 8), 5.0);
        let mut links = MockLinks::new(&[8000.0]);
        TransmissionSlicer::send_one(
            &mut users,
            &slot_at(0.0, 1.0),
            &mut queues,
            &mut links,
            Some(0),
            0.0,
        );
    }

    proptest! {
        /// Repeated slicing reproduces the original byte range exactly once,
        /// in order, whatever the packet size, bandwidth and slot length.
        #[test]
        fn slicing_is_byte_exact(
            size in 1usize..20_000,
            bandwidth in 1e5f64..1e7,
            slot_len in 0.001f64..0.05,
        ) {
            let mut users: UserTable<Chunk> = UserTable::new(1, 1.0);
            let mut queues = MockQueues::new(1);
            queues.push(0, Chunk::new(42, size), 0.0);
            let mut links = MockLinks::new(&[bandwidth]);

            let mut slot = SlotClock::new(slot_len);
            let mut now = 0.0;
            let mut done = false;
            for _ in 0..100_000 {
                slot.advance(now);
                // Start a hair after the slot boundary, as a host would.
                let start = now + slot_len * 1e-3;
                match TransmissionSlicer::send_one(
                    &mut users, &slot, &mut queues, &mut links, Some(0), start,
                ) {
                    SendOutcome::Sent { .. } => {
                        done = true;
                        break;
                    }
                    SendOutcome::Sliced { sent_bytes, remaining_bytes } => {
                        prop_assert!(remaining_bytes > 0);
                        prop_assert!(users.abeyant_bytes(0) == remaining_bytes);
                        prop_assert!(sent_bytes < size);
                    }
                    other => prop_assert!(false, "unexpected {:?}", other),
                }
                now = slot.end();
            }
            prop_assert!(done);

            let mut expected_offset = 0;
            for chunk in links.delivered(0) {
                prop_assert_eq!(chunk.id, 42);
                prop_assert_eq!(chunk.offset, expected_offset);
                expected_offset += chunk.len;
            }
            prop_assert_eq!(expected_offset, size);
            prop_assert!(users.abeyant(0).is_none());
        }
    }
}
