//! Database id generation.

use uuid::Uuid;

/// Generate a fresh id for a database row.
pub fn db_id() -> Uuid {
    Uuid::new_v4()
}
