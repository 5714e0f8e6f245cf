use crate::model::{Bus, Route};

/// Pluggable per-booking rate calculation. Implementations must be pure so
/// the orchestrator can recompute the price inside a retried transaction.
pub trait RatePolicy: Send + Sync {
    fn price_cents(&self, bus: &Bus, route: &Route, seat_count: u32) -> i64;
}

/// Flat per-seat rate, the default policy. Distance- or demand-based
/// policies can be swapped in without touching the orchestrator.
pub struct FlatRate {
    pub per_seat_cents: i64,
}

impl Default for FlatRate {
    fn default() -> Self {
        Self {
            per_seat_cents: 1000,
        }
    }
}

impl RatePolicy for FlatRate {
    fn price_cents(&self, _bus: &Bus, _route: &Route, seat_count: u32) -> i64 {
        self.per_seat_cents * i64::from(seat_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn fixture() -> (Bus, Route) {
        let now = Utc::now();
        let bus = Bus {
            id: Uuid::new_v4(),
            name: "Coastal Express".to_string(),
            fleet_number: "CE-01".to_string(),
            capacity: 40,
            image_url: None,
            description: String::new(),
            created_at: now,
            updated_at: now,
        };
        let route = Route {
            id: Uuid::new_v4(),
            name: "Harbor to Summit".to_string(),
            start_location: "Harbor".to_string(),
            end_location: "Summit".to_string(),
            distance_km: 120.0,
            bus_id: bus.id,
            map_url: None,
            created_at: now,
            updated_at: now,
        };
        (bus, route)
    }

    #[test]
    fn flat_rate_scales_with_seat_count() {
        let (bus, route) = fixture();
        let rate = FlatRate {
            per_seat_cents: 1250,
        };
        assert_eq!(rate.price_cents(&bus, &route, 3), 3750);
        assert_eq!(rate.price_cents(&bus, &route, 1), 1250);
    }
}
