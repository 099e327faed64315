use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::location::{Coordinates, StoreLocation};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two coordinates, in kilometers.
pub fn distance_km(a: Coordinates, b: Coordinates) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Closest store to `point` with its distance in kilometers. Stable argmin:
/// ties keep the earliest entry in the list, so the same list and point
/// always resolve to the same store.
pub fn nearest_store(stores: &[StoreLocation], point: Coordinates) -> Option<(&StoreLocation, f64)> {
    let mut best: Option<(&StoreLocation, f64)> = None;
    for store in stores {
        let d = distance_km(store.coordinates(), point);
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((store, d)),
        }
    }
    best
}

/// Delivery-fee bracket for a customer-to-store distance. Upper bounds are
/// inclusive: exactly 0.5 km is still `Doorstep`, exactly 20 km is still
/// `Far`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryTier {
    /// Within 0.5 km: free delivery.
    Doorstep,
    /// Within 5 km: low fixed fee.
    Near,
    /// Within 20 km: higher fixed fee.
    Far,
    /// Beyond 20 km: pickup only.
    OutOfRange,
}

impl DeliveryTier {
    pub fn for_distance_km(distance: f64) -> Self {
        if distance <= 0.5 {
            Self::Doorstep
        } else if distance <= 5.0 {
            Self::Near
        } else if distance <= 20.0 {
            Self::Far
        } else {
            Self::OutOfRange
        }
    }

    pub fn delivery_offered(&self) -> bool {
        !matches!(self, Self::OutOfRange)
    }

    /// Delivery fee in major currency units, `None` when delivery is free
    /// or not offered at all.
    pub fn fee(&self, fees: &FeeSchedule) -> Option<Decimal> {
        match self {
            Self::Doorstep | Self::OutOfRange => None,
            Self::Near => Some(fees.near),
            Self::Far => Some(fees.far),
        }
    }
}

/// Fixed fees for the two paid tiers, in major currency units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeeSchedule {
    pub near: Decimal,
    pub far: Decimal,
}
