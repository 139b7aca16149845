//! Column families used by the `RocksDB` backend.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Credit accounts, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Credit reservations, keyed by `reservation_id` (ULID).
    pub const RESERVATIONS: &str = "reservations";

    /// Artifact rows, keyed by `artifact_id`.
    pub const ARTIFACTS: &str = "artifacts";

    /// Like edges, keyed by `user_id || 0x00 || artifact_id`.
    pub const LIKES: &str = "likes";

    /// Index: like edges by artifact, keyed by `artifact_id || user_id`.
    /// Value is empty (index only).
    pub const LIKES_BY_ARTIFACT: &str = "likes_by_artifact";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::RESERVATIONS,
        cf::ARTIFACTS,
        cf::LIKES,
        cf::LIKES_BY_ARTIFACT,
    ]
}
