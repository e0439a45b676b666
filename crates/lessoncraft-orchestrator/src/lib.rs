//! Session orchestration for LessonCraft.
//!
//! The orchestrator owns session lifecycle end to end: admission under the
//! load cap, TTL-bounded sessions, instance creation through the
//! provisioner backends with compensating teardown, client attachment with
//! the minimum-viewport rule, stack deploys streaming builder output on
//! the event bus, and the user login flow.
//!
//! Independent sessions execute in parallel; mutations against any single
//! session are serialized by a session-scoped lock. The [`SessionFabric`]
//! trait is the seam the gateway layer programs against.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod clients;
pub mod config;
pub mod error;
pub mod load;
pub mod service;
pub mod types;

pub use clients::ClientRegistry;
pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, Result};
pub use load::{FixedLoad, LoadMonitor, ProcLoad};
pub use service::FabricService;
pub use types::{Client, SessionConfig, SessionSetupConf, SetupInstance, UserProfile, ViewPort};

use async_trait::async_trait;
use bytes::Bytes;
use lessoncraft_core::{ClientId, PlaygroundId, SessionId, UserId};
use lessoncraft_provision::{InstanceConfig, Terminal};
use lessoncraft_store::{Instance, LoginRequest, Playground, Session, User};

/// The orchestration operations exposed to the handler layer.
#[async_trait]
pub trait SessionFabric: Send + Sync {
    // =========================================================================
    // Session Operations
    // =========================================================================

    /// Create a session, enforcing playground policy and load admission.
    ///
    /// When a stack is supplied it is deployed asynchronously; builder
    /// output streams on the bus until the session becomes ready.
    ///
    /// # Errors
    ///
    /// Returns `SystemOverloaded` when the load cap rejects admission, or
    /// `PlaygroundNotFound` for an unknown playground.
    async fn session_new(&self, config: SessionConfig) -> Result<Session>;

    /// Get a session by ID.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` if absent.
    async fn session_get(&self, session_id: &SessionId) -> Result<Session>;

    /// Close a session: destroy every instance, delete the session, emit
    /// the end event. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if an instance teardown fails for a reason other
    /// than the container already being gone; the session is then left in
    /// storage marked for retry.
    async fn session_close(&self, session_id: &SessionId) -> Result<()>;

    /// Create the instances described by a setup manifest.
    ///
    /// # Errors
    ///
    /// Returns the first provisioning error encountered.
    async fn session_setup(&self, session_id: &SessionId, conf: SessionSetupConf)
        -> Result<()>;

    /// Deploy the session's stack now (normally done by `session_new`).
    ///
    /// # Errors
    ///
    /// Returns an error if the session has no stack or the deploy fails.
    async fn session_deploy_stack(&self, session_id: &SessionId) -> Result<()>;

    /// The component-wise minimum viewport over the session's clients.
    async fn session_smallest_viewport(&self, session_id: &SessionId) -> Option<ViewPort>;

    // =========================================================================
    // Instance Operations
    // =========================================================================

    /// Create an instance in a session.
    ///
    /// # Errors
    ///
    /// Returns an error if provisioning or persistence fails; a
    /// half-created container is deleted before the error surfaces.
    async fn instance_new(
        &self,
        session_id: &SessionId,
        config: InstanceConfig,
    ) -> Result<Instance>;

    /// Get an instance by name, scoped to a session.
    ///
    /// # Errors
    ///
    /// Returns `InstanceNotFound` if absent or owned by another session.
    async fn instance_get(&self, session_id: &SessionId, name: &str) -> Result<Instance>;

    /// All instances in a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    async fn instance_find_by_session(&self, session_id: &SessionId) -> Result<Vec<Instance>>;

    /// Destroy an instance.
    ///
    /// # Errors
    ///
    /// Returns an error if teardown fails (an already-gone container is
    /// not an error).
    async fn instance_delete(&self, session_id: &SessionId, name: &str) -> Result<()>;

    /// Execute a command in an instance, returning the exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if the exec cannot run.
    async fn instance_exec(
        &self,
        session_id: &SessionId,
        name: &str,
        cmd: &[String],
    ) -> Result<i64>;

    /// Attach a bidirectional terminal stream to an instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the attach fails.
    async fn instance_terminal(&self, session_id: &SessionId, name: &str) -> Result<Terminal>;

    /// Resize an instance terminal.
    ///
    /// # Errors
    ///
    /// Returns an error if the resize fails.
    async fn instance_resize(
        &self,
        session_id: &SessionId,
        name: &str,
        rows: u32,
        cols: u32,
    ) -> Result<()>;

    /// Stream a file from a URL into an instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the download or copy fails.
    async fn instance_upload_from_url(
        &self,
        session_id: &SessionId,
        name: &str,
        file_name: &str,
        dest: &str,
        url: &str,
    ) -> Result<()>;

    /// Upload data into an instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the copy fails.
    async fn instance_upload(
        &self,
        session_id: &SessionId,
        name: &str,
        file_name: &str,
        dest: &str,
        data: Bytes,
    ) -> Result<()>;

    /// Read a file from an instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    async fn instance_file(
        &self,
        session_id: &SessionId,
        name: &str,
        path: &str,
    ) -> Result<Vec<u8>>;

    /// Render the instance's home directory as a JSON tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    async fn instance_fs_tree(
        &self,
        session_id: &SessionId,
        name: &str,
    ) -> Result<serde_json::Value>;

    // =========================================================================
    // Client Operations
    // =========================================================================

    /// Attach a browser client to a session.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` for an unknown session.
    async fn client_new(&self, session_id: &SessionId) -> Result<Client>;

    /// Record a client's viewport and recompute the session minimum.
    ///
    /// # Errors
    ///
    /// Returns `ClientNotFound` for an unknown client.
    async fn client_resize_viewport(
        &self,
        client_id: &ClientId,
        cols: u32,
        rows: u32,
    ) -> Result<()>;

    /// Detach a client. The session itself stays alive; TTL governs its
    /// end.
    async fn client_close(&self, client_id: &ClientId);

    /// Number of attached clients across all sessions.
    async fn client_count(&self) -> usize;

    // =========================================================================
    // User Operations
    // =========================================================================

    /// Start a login: creates the one-shot request nonce.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails.
    async fn user_new_login_request(&self, provider: &str) -> Result<LoginRequest>;

    /// Complete a login: consumes the request (exactly once) and upserts
    /// the user built from the request's provider and the given profile.
    ///
    /// # Errors
    ///
    /// Returns `LoginRequestNotFound` if the nonce is unknown or already
    /// used.
    async fn user_login(&self, request_id: &str, profile: UserProfile) -> Result<User>;

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` if absent.
    async fn user_get(&self, user_id: &UserId) -> Result<User>;

    // =========================================================================
    // Playground Operations
    // =========================================================================

    /// Create or update a playground.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails.
    async fn playground_new(&self, playground: Playground) -> Result<Playground>;

    /// Get a playground by ID.
    ///
    /// # Errors
    ///
    /// Returns `PlaygroundNotFound` if absent.
    async fn playground_get(&self, id: &PlaygroundId) -> Result<Playground>;

    /// Find a playground by its domain.
    ///
    /// # Errors
    ///
    /// Returns `PlaygroundNotFound` if absent.
    async fn playground_find_by_domain(&self, domain: &str) -> Result<Playground>;

    /// List all playgrounds.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    async fn playground_list(&self) -> Result<Vec<Playground>>;
}
