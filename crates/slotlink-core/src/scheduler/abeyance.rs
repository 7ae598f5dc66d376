//! Carried-over packet remainders.
//!
//! A user holds at most one abeyant fragment: the part of a unit that did
//! not fit before a slot boundary. While it exists the user's queue is not
//! dequeued; the fragment is served first and cleared only once it is sent
//! without being sliced again.

use crate::net::interface::{PacketUnit, UserId};
use crate::scheduler::users::UserTable;

/// A fragment waiting for the next transmission opportunity.
#[derive(Debug, Clone)]
pub struct Abeyant<P> {
    pub unit: P,
    /// Arrival time of the packet this fragment was cut from.
    pub hol_arrival: f64,
}

impl<P: PacketUnit> Abeyant<P> {
    pub fn byte_size(&self) -> usize {
        self.unit.byte_size()
    }
}

impl<P: PacketUnit> UserTable<P> {
    pub fn abeyant(&self, user: UserId) -> Option<&Abeyant<P>> {
        self.get(user).and_then(|r| r.abeyant.as_ref())
    }

    /// Bytes held in abeyance for `user`, `0` if none.
    pub fn abeyant_bytes(&self, user: UserId) -> usize {
        self.abeyant(user).map_or(0, Abeyant::byte_size)
    }

    /// Replaces the user's fragment. Out-of-range users are ignored.
    pub fn set_abeyant(&mut self, user: UserId, fragment: Option<Abeyant<P>>) {
        if let Some(rec) = self.get_mut(user) {
            rec.abeyant = fragment;
        }
    }

    pub(crate) fn take_abeyant(&mut self, user: UserId) -> Option<Abeyant<P>> {
        self.get_mut(user).and_then(|r| r.abeyant.take())
    }

    /// Users holding a non-empty fragment, in ascending id order.
    pub fn abeyant_users(&self) -> impl Iterator<Item = UserId> + '_ {
        self.iter()
            .filter(|(_, r)| r.abeyant.as_ref().is_some_and(|a| a.byte_size() > 0))
            .map(|(id, _)| id)
    }
}
