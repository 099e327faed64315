use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreId(pub String);

/// Handle to a persisted customer-address entry in the store directory.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressRef(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// One fulfillment location from the external directory. `courier_id` is
/// the chat id the courier is reachable at.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreLocation {
    pub id: StoreId,
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
    pub courier_id: Option<String>,
}

impl StoreLocation {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates { latitude: self.latitude, longitude: self.longitude }
    }
}
