//! Persistence layer for LessonCraft.
//!
//! Storage is the authoritative home of playgrounds, sessions, instances,
//! users, login requests, the Windows lease pool, and lessons. Two traits
//! define the contract:
//!
//! - [`Store`]: sessions, instances, playgrounds, users, login requests,
//!   Windows leases
//! - [`LessonStore`]: lesson CRUD with pagination, search, versioning, and
//!   tag/category mutations
//!
//! Two backends ship: [`MemoryStore`] (deterministic, for tests and
//! single-node development) and [`DocStore`] (embedded document store with
//! secondary indexes, every operation wrapped in retry + circuit breaker
//! with a bounded deadline). [`CachedLessonStore`] optionally decorates any
//! `LessonStore` with a TTL cache.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cache;
pub mod docdb;
pub mod error;
pub mod keys;
pub mod memory;
pub mod query;
pub mod schema;
pub mod types;
pub mod versioning;

pub use cache::{CachedLessonStore, TtlCache};
pub use docdb::DocStore;
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use query::{LessonFilter, ListOptions, ListResult, SearchOptions, SortOrder};
pub use types::{
    ClusterRole, Instance, LessonContext, LoginRequest, Playground, Session, TlsMaterial, User,
    WindowsLease,
};

use async_trait::async_trait;
use lessoncraft_core::{LessonId, PlaygroundId, SessionId, UserId};
use lessoncraft_lesson::{Lesson, VersionInfo};

/// Storage operations for the session fabric.
///
/// All calls may suspend and complete within a bounded deadline; `NotFound`
/// is an error, absent optional lookups return `Ok(None)`.
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Session Operations
    // =========================================================================

    /// Insert or update a session record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn session_put(&self, session: &Session) -> Result<()>;

    /// Get a session by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn session_get(&self, session_id: &SessionId) -> Result<Option<Session>>;

    /// Delete a session by ID.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the session doesn't exist.
    async fn session_delete(&self, session_id: &SessionId) -> Result<()>;

    /// Count all sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn session_count(&self) -> Result<u64>;

    /// List all sessions for a playground.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn sessions_by_playground(&self, playground_id: &PlaygroundId)
        -> Result<Vec<Session>>;

    /// List every session. Used by the background sweeper.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn sessions_all(&self) -> Result<Vec<Session>>;

    // =========================================================================
    // Instance Operations
    // =========================================================================

    /// Insert or update an instance record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn instance_put(&self, instance: &Instance) -> Result<()>;

    /// Get an instance by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn instance_get(&self, name: &str) -> Result<Option<Instance>>;

    /// Delete an instance by name.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the instance doesn't exist.
    async fn instance_delete(&self, name: &str) -> Result<()>;

    /// Count all instances.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn instance_count(&self) -> Result<u64>;

    /// List all instances within a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn instances_by_session(&self, session_id: &SessionId) -> Result<Vec<Instance>>;

    // =========================================================================
    // Playground Operations
    // =========================================================================

    /// Insert or update a playground.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn playground_put(&self, playground: &Playground) -> Result<()>;

    /// Get a playground by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn playground_get(&self, id: &PlaygroundId) -> Result<Option<Playground>>;

    /// Find a playground by its unique domain.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn playground_by_domain(&self, domain: &str) -> Result<Option<Playground>>;

    /// List all playgrounds.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn playgrounds_all(&self) -> Result<Vec<Playground>>;

    // =========================================================================
    // User and Login Operations
    // =========================================================================

    /// Insert or update a user record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn user_put(&self, user: &User) -> Result<()>;

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn user_get(&self, user_id: &UserId) -> Result<Option<User>>;

    /// Store a login request.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn login_request_put(&self, request: &LoginRequest) -> Result<()>;

    /// Consume a login request: returns and removes it in one step, so a
    /// request can be used at most once.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn login_request_consume(&self, id: &str) -> Result<Option<LoginRequest>>;

    // =========================================================================
    // Windows Pool Operations
    // =========================================================================

    /// Add a slot to the Windows pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn windows_pool_add(&self, lease: &WindowsLease) -> Result<()>;

    /// Acquire a free slot for a session. Returns `None` when the pool is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn windows_pool_acquire(&self, session_id: &SessionId)
        -> Result<Option<WindowsLease>>;

    /// Release a slot back to the pool.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the slot doesn't exist.
    async fn windows_pool_release(&self, lease_id: &str) -> Result<()>;
}

/// Storage operations for lessons.
#[async_trait]
pub trait LessonStore: Send + Sync {
    /// List lessons with pagination.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_lessons(&self, opts: ListOptions) -> Result<ListResult>;

    /// List every lesson without pagination. Use with care on large sets.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_all_lessons(&self) -> Result<Vec<Lesson>>;

    /// Get a lesson by ID.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the lesson doesn't exist.
    async fn get_lesson(&self, id: &LessonId) -> Result<Lesson>;

    /// Get a lesson at a specific version.
    ///
    /// Previous versions are approximate reconstructions: the current
    /// document with `version`/`updated_at` overwritten and history
    /// truncated (full snapshots are not stored).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the lesson or version doesn't
    /// exist.
    async fn get_lesson_version(&self, id: &LessonId, version: u32) -> Result<Lesson>;

    /// List all versions of a lesson, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the lesson doesn't exist.
    async fn list_lesson_versions(&self, id: &LessonId) -> Result<Vec<VersionInfo>>;

    /// Create a lesson: assigns a fresh ID and timestamps, sets
    /// `version = 1` with empty history. Returns the stored document.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn create_lesson(&self, lesson: Lesson) -> Result<Lesson>;

    /// Update a lesson: pushes the prior `(version, updated_at, summary)`
    /// onto the history and increments the version. Returns the stored
    /// document.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the lesson doesn't exist.
    async fn update_lesson(
        &self,
        id: &LessonId,
        lesson: Lesson,
        change_summary: &str,
    ) -> Result<Lesson>;

    /// Delete a lesson.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the lesson doesn't exist.
    async fn delete_lesson(&self, id: &LessonId) -> Result<()>;

    /// Search lessons.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn search_lessons(&self, opts: SearchOptions) -> Result<ListResult>;

    /// All distinct categories in use.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_categories(&self) -> Result<Vec<String>>;

    /// All distinct tags in use.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_tags(&self) -> Result<Vec<String>>;

    /// Add a tag to a lesson (idempotent).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the lesson doesn't exist.
    async fn add_tag(&self, id: &LessonId, tag: &str) -> Result<()>;

    /// Remove a tag from a lesson (idempotent).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the lesson doesn't exist.
    async fn remove_tag(&self, id: &LessonId, tag: &str) -> Result<()>;

    /// Set a lesson's category.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the lesson doesn't exist.
    async fn set_category(&self, id: &LessonId, category: &str) -> Result<()>;

    /// List lessons in a category, paginated.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_lessons_by_category(
        &self,
        category: &str,
        opts: ListOptions,
    ) -> Result<ListResult>;

    /// List lessons carrying a tag, paginated.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_lessons_by_tag(&self, tag: &str, opts: ListOptions) -> Result<ListResult>;
}
