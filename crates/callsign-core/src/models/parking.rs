//! Valet parking slot model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One numbered slot of a parking lot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ParkingSlot {
    pub id: i64,
    pub tenant_id: i64,
    pub domain: String,
    pub lot_name: String,
    pub slot_number: i32,
    pub is_occupied: bool,
    pub parked_uuid: Option<String>,
    pub parked_caller_id: Option<String>,
    pub parked_caller_name: Option<String>,
    pub parked_by: Option<String>,
    pub parked_at: Option<DateTime<Utc>>,
}

impl ParkingSlot {
    /// BLF user for the slot, e.g. `park+*5705`
    pub fn blf_user(slot_number: i32) -> String {
        format!("park+*57{:02}", slot_number)
    }
}
