use std::collections::BTreeSet;

use chrono::NaiveDate;
use uuid::Uuid;

use gobus_core::error::ReservationError;
use gobus_core::store::ReservationStore;

/// Read-only availability snapshot for a (bus, date) pair, for callers
/// outside the reservation path. The orchestrator never uses this; it reads
/// through its own session so the snapshot and the write share a
/// transactional context.
pub async fn snapshot(
    store: &dyn ReservationStore,
    bus_id: Uuid,
    travel_date: NaiveDate,
) -> Result<BTreeSet<u32>, ReservationError> {
    store
        .held_seats(bus_id, travel_date)
        .await
        .map_err(|err| ReservationError::server(err.to_string()))
}

/// Intersection of requested seats with the held set, ascending.
pub fn clashes(requested: &BTreeSet<u32>, held: &BTreeSet<u32>) -> Vec<u32> {
    requested.intersection(held).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clashes_are_the_intersection() {
        let requested: BTreeSet<u32> = [6, 7].into_iter().collect();
        let held: BTreeSet<u32> = [5, 6].into_iter().collect();
        assert_eq!(clashes(&requested, &held), vec![6]);
    }

    #[test]
    fn disjoint_sets_have_no_clashes() {
        let requested: BTreeSet<u32> = [7, 8].into_iter().collect();
        let held: BTreeSet<u32> = [5, 6].into_iter().collect();
        assert!(clashes(&requested, &held).is_empty());
    }
}
