use slotmap::{SlotMap, new_key_type};
use std::collections::HashMap;

use crate::domain::cluster::node_bitmap::NodeBitmap;
use crate::domain::reservation::reservation::Reservation;
use crate::domain::utils::id::ReservationName;
use crate::error::{Error, Result};

new_key_type! {
    pub struct ReservationKey;
}

/// Ordered collection of reservations, keyed by name.
///
/// Not internally synchronized, callers hold the controller lock.
#[derive(Debug, Default)]
pub struct ReservationStore {
    /// Reservation Storage.
    slots: SlotMap<ReservationKey, Reservation>,

    /// Index lookup ReservationKey using the reservation name.
    name_index: HashMap<ReservationName, ReservationKey>,

    /// Insertion order, used for iteration, show and save.
    order: Vec<ReservationKey>,
}

impl ReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Appends a reservation. Names are unique across the store.
    pub fn insert(&mut self, reservation: Reservation) -> Result<ReservationKey> {
        if self.name_index.contains_key(&reservation.name) {
            return Err(Error::ReservationInvalid(format!("duplicate reservation name {}", reservation.name)));
        }
        let name = reservation.name.clone();
        let key = self.slots.insert(reservation);
        self.name_index.insert(name, key);
        self.order.push(key);
        Ok(key)
    }

    pub fn get(&self, key: ReservationKey) -> Option<&Reservation> {
        self.slots.get(key)
    }

    pub fn get_mut(&mut self, key: ReservationKey) -> Option<&mut Reservation> {
        self.slots.get_mut(key)
    }

    pub fn key_for_name(&self, name: &str) -> Option<ReservationKey> {
        self.name_index.get(name).copied()
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Reservation> {
        self.key_for_name(name).and_then(|key| self.slots.get(key))
    }

    pub fn get_by_name_mut(&mut self, name: &str) -> Option<&mut Reservation> {
        let key = self.key_for_name(name)?;
        self.slots.get_mut(key)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.name_index.contains_key(name)
    }

    pub fn remove(&mut self, key: ReservationKey) -> Option<Reservation> {
        let reservation = self.slots.remove(key)?;
        self.name_index.remove(&reservation.name);
        self.order.retain(|k| *k != key);
        Some(reservation)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.name_index.clear();
        self.order.clear();
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<ReservationKey> {
        self.order.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reservation> {
        self.order.iter().filter_map(|key| self.slots.get(*key))
    }

    /// Slot order, not insertion order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Reservation> {
        self.slots.values_mut()
    }

    /// First reservation other than `skip` whose window intersects `[start, end)`
    /// and which shares a node with `node_bitmap`.
    pub fn find_overlap(&self, start_time: i64, end_time: i64, node_bitmap: &NodeBitmap, skip: Option<ReservationKey>) -> Option<&Reservation> {
        self.order
            .iter()
            .filter(|key| Some(**key) != skip)
            .filter_map(|key| self.slots.get(*key))
            .find(|resv| resv.overlaps(start_time, end_time, node_bitmap))
    }

    /// Union of the nodes of all reservations whose window intersects `[start, end)`.
    pub fn reserved_nodes(&self, start_time: i64, end_time: i64, universe: usize) -> NodeBitmap {
        let mut reserved = NodeBitmap::new(universe);
        for resv in self.iter().filter(|resv| resv.window_intersects(start_time, end_time)) {
            if let Some(bitmap) = &resv.node_bitmap {
                reserved.or(bitmap);
            }
        }
        reserved
    }
}
