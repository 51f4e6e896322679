//! Callsign Database Layer
//!
//! PostgreSQL implementations of the repository traits from `callsign-core`:
//!
//! - Connection pool management with sqlx
//! - Feature code candidates, ordered for first-match evaluation
//! - Extension flags, presence rows and voicemail boxes
//! - Queues, conferences, call flows, parking slots and page groups

pub mod pool;
pub mod repositories;

pub use pool::create_pool;
pub use repositories::*;

pub use callsign_core::{AppError, AppResult};
pub use sqlx::PgPool;
