//! Call flow (day/night toggle) model

use serde::{Deserialize, Serialize};

/// A multi-state routing switch, toggled by a feature code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CallFlow {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub extension: Option<String>,
    /// Feature code that toggles this flow, e.g. `*30`
    pub feature_code: Option<String>,
    /// Index of the active destination; 0 is the day state
    pub current_state: i32,
    /// Number of configured destinations (at least two)
    pub state_count: i32,
    pub enabled: bool,
}

impl CallFlow {
    /// State index after one toggle, wrapping to 0
    pub fn next_state(&self) -> i32 {
        let states = self.state_count.max(2);
        (self.current_state + 1).rem_euclid(states)
    }

    /// Lamp is lit for any state other than the first
    pub fn is_alternate(&self) -> bool {
        self.current_state > 0
    }
}
