//! Client attachment tracking and the minimum-viewport rule.
//!
//! Every terminal dimension a session reports is the component-wise
//! minimum over its attached clients, so every viewer sees a readable
//! frame. The minimum is recomputed atomically with any client-set
//! mutation; the registry's lock is read-mostly.

use std::collections::HashMap;

use lessoncraft_core::{ClientId, SessionId};
use parking_lot::RwLock;

use crate::types::{Client, ViewPort};

#[derive(Default)]
struct Tables {
    by_client: HashMap<ClientId, Client>,
    by_session: HashMap<SessionId, Vec<ClientId>>,
}

/// In-memory registry of attached clients.
#[derive(Default)]
pub struct ClientRegistry {
    tables: RwLock<Tables>,
}

impl ClientRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new client to a session.
    pub fn attach(&self, session_id: SessionId) -> Client {
        let client = Client {
            id: ClientId::generate(),
            session_id,
            viewport: None,
        };

        let mut tables = self.tables.write();
        tables.by_client.insert(client.id, client.clone());
        tables
            .by_session
            .entry(session_id)
            .or_default()
            .push(client.id);
        client
    }

    /// Record a client's viewport. Returns the session and its new
    /// minimum viewport, computed under the same lock as the mutation.
    #[must_use]
    pub fn resize(
        &self,
        client_id: &ClientId,
        viewport: ViewPort,
    ) -> Option<(SessionId, ViewPort)> {
        let mut tables = self.tables.write();
        let session_id = {
            let client = tables.by_client.get_mut(client_id)?;
            client.viewport = Some(viewport);
            client.session_id
        };
        let minimum = Self::minimum_locked(&tables, &session_id)?;
        Some((session_id, minimum))
    }

    /// Detach a client. Returns the session and its recomputed minimum
    /// viewport (`None` minimum when no sized clients remain).
    pub fn detach(&self, client_id: &ClientId) -> Option<(SessionId, Option<ViewPort>)> {
        let mut tables = self.tables.write();
        let client = tables.by_client.remove(client_id)?;
        if let Some(ids) = tables.by_session.get_mut(&client.session_id) {
            ids.retain(|id| id != client_id);
            if ids.is_empty() {
                tables.by_session.remove(&client.session_id);
            }
        }
        let minimum = Self::minimum_locked(&tables, &client.session_id);
        Some((client.session_id, minimum))
    }

    /// Drop every client of a session (on close).
    pub fn detach_session(&self, session_id: &SessionId) {
        let mut tables = self.tables.write();
        if let Some(ids) = tables.by_session.remove(session_id) {
            for id in ids {
                tables.by_client.remove(&id);
            }
        }
    }

    /// The component-wise minimum viewport over a session's clients.
    #[must_use]
    pub fn smallest_viewport(&self, session_id: &SessionId) -> Option<ViewPort> {
        Self::minimum_locked(&self.tables.read(), session_id)
    }

    /// Total attached clients.
    #[must_use]
    pub fn count(&self) -> usize {
        self.tables.read().by_client.len()
    }

    fn minimum_locked(tables: &Tables, session_id: &SessionId) -> Option<ViewPort> {
        tables
            .by_session
            .get(session_id)?
            .iter()
            .filter_map(|id| tables.by_client.get(id).and_then(|c| c.viewport))
            .reduce(ViewPort::min)
    }
}
