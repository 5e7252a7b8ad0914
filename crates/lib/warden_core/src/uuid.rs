//! Credential record IDs.
//!
//! IDs are UUIDv7 generated app-side so records sort by creation time in
//! every repository backend.

use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}

/// Parse a record ID, returning `None` for anything that is not a UUID.
pub fn parse_id(id: &str) -> Option<Uuid> {
    Uuid::parse_str(id).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuidv7_has_sortable_version() {
        assert_eq!(uuidv7().get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn later_ids_sort_after_earlier_ones() {
        let a = uuidv7();
        let b = uuidv7();
        assert!(b >= a);
    }

    #[test]
    fn parse_rejects_garbage() {
        let id = uuidv7();
        assert_eq!(parse_id(&id.to_string()), Some(id));
        assert_eq!(parse_id("not-a-uuid"), None);
    }
}
