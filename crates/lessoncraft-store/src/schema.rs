//! Database schema definitions and column families.
//!
//! This module defines the column families used by the embedded document
//! store. Lessons carry the index set from the original document-database
//! contract: unique `id` (the primary key), plus `title`, `created_at`,
//! and `tags` secondary indexes.

/// Column family names for the document store.
pub mod cf {
    /// Primary lesson documents, keyed by `lesson_id`.
    pub const LESSONS: &str = "lessons";

    /// Index: lessons by title, keyed by `title || 0x00 || lesson_id`.
    pub const LESSONS_BY_TITLE: &str = "lessons_by_title";

    /// Index: lessons by creation time, keyed by
    /// `created_at_be || lesson_id`.
    pub const LESSONS_BY_CREATED: &str = "lessons_by_created";

    /// Index: lessons by tag, keyed by `tag || 0x00 || lesson_id`.
    pub const LESSONS_BY_TAG: &str = "lessons_by_tag";

    /// Primary session records, keyed by `session_id`.
    pub const SESSIONS: &str = "sessions";

    /// Index: sessions by playground, keyed by
    /// `playground_id || 0x00 || session_id`.
    pub const SESSIONS_BY_PLAYGROUND: &str = "sessions_by_playground";

    /// Primary instance records, keyed by container name.
    pub const INSTANCES: &str = "instances";

    /// Index: instances by session, keyed by `session_id || name`.
    pub const INSTANCES_BY_SESSION: &str = "instances_by_session";

    /// Playground records, keyed by playground ID.
    pub const PLAYGROUNDS: &str = "playgrounds";

    /// Index: playground ID by domain.
    pub const PLAYGROUNDS_BY_DOMAIN: &str = "playgrounds_by_domain";

    /// User records, keyed by user ID.
    pub const USERS: &str = "users";

    /// One-shot login requests, keyed by nonce.
    pub const LOGIN_REQUESTS: &str = "login_requests";

    /// Windows pool slots, keyed by slot ID.
    pub const WINDOWS_POOL: &str = "windows_pool";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::LESSONS,
        cf::LESSONS_BY_TITLE,
        cf::LESSONS_BY_CREATED,
        cf::LESSONS_BY_TAG,
        cf::SESSIONS,
        cf::SESSIONS_BY_PLAYGROUND,
        cf::INSTANCES,
        cf::INSTANCES_BY_SESSION,
        cf::PLAYGROUNDS,
        cf::PLAYGROUNDS_BY_DOMAIN,
        cf::USERS,
        cf::LOGIN_REQUESTS,
        cf::WINDOWS_POOL,
    ]
}
