//! In-memory storage backend.
//!
//! Maps guarded by reader/writer locks with deterministic filter
//! evaluation. Used by tests and single-node development; shares the
//! query, sort, and versioning helpers with the document backend so both
//! observe identical contracts.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use lessoncraft_core::{LessonId, PlaygroundId, SessionId, UserId};
use lessoncraft_lesson::{Lesson, VersionInfo};
use parking_lot::RwLock;

use crate::error::{Result, StoreError};
use crate::query::{ListOptions, ListResult, SearchOptions, SortOrder};
use crate::types::{Instance, LoginRequest, Playground, Session, User, WindowsLease};
use crate::{versioning, LessonStore, Store};

/// Deterministic in-memory implementation of [`Store`] and [`LessonStore`].
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
    instances: RwLock<BTreeMap<String, Instance>>,
    playgrounds: RwLock<BTreeMap<String, Playground>>,
    users: RwLock<HashMap<String, User>>,
    login_requests: RwLock<HashMap<String, LoginRequest>>,
    windows_pool: RwLock<BTreeMap<String, WindowsLease>>,
    lessons: RwLock<HashMap<LessonId, Lesson>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn all_lessons_sorted(&self, sort: &[(String, SortOrder)]) -> Vec<Lesson> {
        let mut lessons: Vec<_> = self.lessons.read().values().cloned().collect();
        crate::query::sort_lessons(&mut lessons, sort);
        lessons
    }

    fn mutate_lesson<F>(&self, id: &LessonId, f: F) -> Result<()>
    where
        F: FnOnce(&mut Lesson),
    {
        let mut lessons = self.lessons.write();
        let lesson = lessons.get_mut(id).ok_or(StoreError::NotFound)?;
        f(lesson);
        lesson.updated_at = chrono::Utc::now();
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn session_put(&self, session: &Session) -> Result<()> {
        self.sessions.write().insert(session.id, session.clone());
        Ok(())
    }

    async fn session_get(&self, session_id: &SessionId) -> Result<Option<Session>> {
        Ok(self.sessions.read().get(session_id).cloned())
    }

    async fn session_delete(&self, session_id: &SessionId) -> Result<()> {
        self.sessions
            .write()
            .remove(session_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn session_count(&self) -> Result<u64> {
        Ok(self.sessions.read().len() as u64)
    }

    async fn sessions_by_playground(
        &self,
        playground_id: &PlaygroundId,
    ) -> Result<Vec<Session>> {
        let mut sessions: Vec<_> = self
            .sessions
            .read()
            .values()
            .filter(|s| &s.playground_id == playground_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(sessions)
    }

    async fn sessions_all(&self) -> Result<Vec<Session>> {
        let mut sessions: Vec<_> = self.sessions.read().values().cloned().collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(sessions)
    }

    async fn instance_put(&self, instance: &Instance) -> Result<()> {
        self.instances
            .write()
            .insert(instance.name.clone(), instance.clone());
        Ok(())
    }

    async fn instance_get(&self, name: &str) -> Result<Option<Instance>> {
        Ok(self.instances.read().get(name).cloned())
    }

    async fn instance_delete(&self, name: &str) -> Result<()> {
        self.instances
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn instance_count(&self) -> Result<u64> {
        Ok(self.instances.read().len() as u64)
    }

    async fn instances_by_session(&self, session_id: &SessionId) -> Result<Vec<Instance>> {
        Ok(self
            .instances
            .read()
            .values()
            .filter(|i| &i.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn playground_put(&self, playground: &Playground) -> Result<()> {
        self.playgrounds
            .write()
            .insert(playground.id.to_string(), playground.clone());
        Ok(())
    }

    async fn playground_get(&self, id: &PlaygroundId) -> Result<Option<Playground>> {
        Ok(self.playgrounds.read().get(id.as_str()).cloned())
    }

    async fn playground_by_domain(&self, domain: &str) -> Result<Option<Playground>> {
        Ok(self
            .playgrounds
            .read()
            .values()
            .find(|p| p.domain == domain)
            .cloned())
    }

    async fn playgrounds_all(&self) -> Result<Vec<Playground>> {
        Ok(self.playgrounds.read().values().cloned().collect())
    }

    async fn user_put(&self, user: &User) -> Result<()> {
        self.users
            .write()
            .insert(user.id.to_string(), user.clone());
        Ok(())
    }

    async fn user_get(&self, user_id: &UserId) -> Result<Option<User>> {
        Ok(self.users.read().get(user_id.as_str()).cloned())
    }

    async fn login_request_put(&self, request: &LoginRequest) -> Result<()> {
        self.login_requests
            .write()
            .insert(request.id.clone(), request.clone());
        Ok(())
    }

    async fn login_request_consume(&self, id: &str) -> Result<Option<LoginRequest>> {
        Ok(self.login_requests.write().remove(id))
    }

    async fn windows_pool_add(&self, lease: &WindowsLease) -> Result<()> {
        self.windows_pool
            .write()
            .insert(lease.id.clone(), lease.clone());
        Ok(())
    }

    async fn windows_pool_acquire(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<WindowsLease>> {
        let mut pool = self.windows_pool.write();
        let free = pool
            .values_mut()
            .find(|lease| lease.session_id.is_none());
        Ok(free.map(|lease| {
            lease.session_id = Some(*session_id);
            lease.clone()
        }))
    }

    async fn windows_pool_release(&self, lease_id: &str) -> Result<()> {
        let mut pool = self.windows_pool.write();
        let lease = pool.get_mut(lease_id).ok_or(StoreError::NotFound)?;
        lease.session_id = None;
        Ok(())
    }
}

#[async_trait]
impl LessonStore for MemoryStore {
    async fn list_lessons(&self, opts: ListOptions) -> Result<ListResult> {
        let opts = opts.normalized();
        let lessons: Vec<_> = self
            .all_lessons_sorted(&opts.sort)
            .into_iter()
            .filter(|l| opts.filter.matches(l))
            .collect();
        Ok(crate::query::paginate(lessons, opts.page, opts.page_size))
    }

    async fn list_all_lessons(&self) -> Result<Vec<Lesson>> {
        Ok(self.all_lessons_sorted(&[("created_at".to_string(), SortOrder::Desc)]))
    }

    async fn get_lesson(&self, id: &LessonId) -> Result<Lesson> {
        self.lessons
            .read()
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_lesson_version(&self, id: &LessonId, version: u32) -> Result<Lesson> {
        let current = self.get_lesson(id).await?;
        versioning::reconstruct_version(&current, version).ok_or(StoreError::NotFound)
    }

    async fn list_lesson_versions(&self, id: &LessonId) -> Result<Vec<VersionInfo>> {
        let current = self.get_lesson(id).await?;
        Ok(versioning::version_list(&current))
    }

    async fn create_lesson(&self, lesson: Lesson) -> Result<Lesson> {
        let lesson = versioning::prepare_create(lesson);
        self.lessons.write().insert(lesson.id, lesson.clone());
        Ok(lesson)
    }

    async fn update_lesson(
        &self,
        id: &LessonId,
        lesson: Lesson,
        change_summary: &str,
    ) -> Result<Lesson> {
        let mut lessons = self.lessons.write();
        let current = lessons.get(id).ok_or(StoreError::NotFound)?;
        let updated = versioning::prepare_update(current, lesson, change_summary);
        lessons.insert(*id, updated.clone());
        Ok(updated)
    }

    async fn delete_lesson(&self, id: &LessonId) -> Result<()> {
        self.lessons
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn search_lessons(&self, opts: SearchOptions) -> Result<ListResult> {
        let page = opts.page.max(1);
        let page_size = if opts.page_size == 0 { 20 } else { opts.page_size };
        let sort = if opts.sort.is_empty() {
            vec![("title".to_string(), SortOrder::Asc)]
        } else {
            opts.sort.clone()
        };

        let lessons: Vec<_> = self
            .all_lessons_sorted(&sort)
            .into_iter()
            .filter(|l| opts.matches(l))
            .collect();
        Ok(crate::query::paginate(lessons, page, page_size))
    }

    async fn list_categories(&self) -> Result<Vec<String>> {
        let mut categories: Vec<_> = self
            .lessons
            .read()
            .values()
            .map(|l| l.category.clone())
            .filter(|c| !c.is_empty())
            .collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    async fn list_tags(&self) -> Result<Vec<String>> {
        let mut tags: Vec<_> = self
            .lessons
            .read()
            .values()
            .flat_map(|l| l.tags.iter().cloned())
            .collect();
        tags.sort();
        tags.dedup();
        Ok(tags)
    }

    async fn add_tag(&self, id: &LessonId, tag: &str) -> Result<()> {
        self.mutate_lesson(id, |lesson| {
            if !lesson.tags.iter().any(|t| t == tag) {
                lesson.tags.push(tag.to_string());
            }
        })
    }

    async fn remove_tag(&self, id: &LessonId, tag: &str) -> Result<()> {
        self.mutate_lesson(id, |lesson| {
            lesson.tags.retain(|t| t != tag);
        })
    }

    async fn set_category(&self, id: &LessonId, category: &str) -> Result<()> {
        self.mutate_lesson(id, |lesson| {
            lesson.category = category.to_string();
        })
    }

    async fn list_lessons_by_category(
        &self,
        category: &str,
        opts: ListOptions,
    ) -> Result<ListResult> {
        let mut opts = opts;
        opts.filter.category = Some(category.to_string());
        self.list_lessons(opts).await
    }

    async fn list_lessons_by_tag(&self, tag: &str, opts: ListOptions) -> Result<ListResult> {
        let mut opts = opts;
        opts.filter.tag = Some(tag.to_string());
        self.list_lessons(opts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::LessonFilter;
    use lessoncraft_lesson::LessonStep;

    fn lesson(title: &str) -> Lesson {
        let mut l = Lesson::new(title, format!("{title} description"));
        let mut step = LessonStep::new("step-a");
        step.content = "content".to_string();
        step.commands = vec!["echo hi".to_string()];
        l.steps.push(step);
        l
    }

    #[tokio::test]
    async fn create_then_update_versions() {
        let store = MemoryStore::new();

        // S2: create yields version 1 with empty history.
        let created = store.create_lesson(lesson("T")).await.unwrap();
        assert_eq!(created.version, 1);
        assert!(created.version_history.is_empty());
        let prev_updated_at = created.updated_at;

        // Update with a retitle.
        let mut edit = created.clone();
        edit.title = "T2".to_string();
        let updated = store
            .update_lesson(&created.id, edit, "retitle")
            .await
            .unwrap();

        assert_eq!(updated.version, 2);
        assert_eq!(updated.title, "T2");
        assert_eq!(updated.version_history.len(), 1);
        let record = &updated.version_history[0];
        assert_eq!(record.version, 1);
        assert_eq!(record.timestamp, prev_updated_at);
        assert_eq!(record.change_summary, "retitle");
    }

    #[tokio::test]
    async fn version_monotonicity_over_many_updates() {
        let store = MemoryStore::new();
        let mut current = store.create_lesson(lesson("T")).await.unwrap();

        for n in 2..=8u32 {
            let edit = current.clone();
            current = store
                .update_lesson(&current.id, edit, &format!("edit {n}"))
                .await
                .unwrap();
            assert_eq!(current.version, n);
            assert_eq!(current.version_history.len() as u32, n - 1);
        }

        let versions = store.list_lesson_versions(&current.id).await.unwrap();
        assert_eq!(versions[0].version, 8);
        assert_eq!(versions.last().unwrap().version, 1);
    }

    #[tokio::test]
    async fn pagination_s3() {
        let store = MemoryStore::new();
        for n in 0..25 {
            store
                .create_lesson(lesson(&format!("L{n:02}")))
                .await
                .unwrap();
        }

        let page1 = store
            .list_lessons(ListOptions {
                page: 1,
                page_size: 10,
                sort: vec![("title".to_string(), SortOrder::Asc)],
                filter: LessonFilter::default(),
            })
            .await
            .unwrap();
        assert_eq!(page1.items.len(), 10);
        assert_eq!(page1.total_items, 25);
        assert_eq!(page1.total_pages, 3);

        let page3 = store
            .list_lessons(ListOptions {
                page: 3,
                page_size: 10,
                sort: vec![("title".to_string(), SortOrder::Asc)],
                filter: LessonFilter::default(),
            })
            .await
            .unwrap();
        assert_eq!(page3.items.len(), 5);
    }

    #[tokio::test]
    async fn search_defaults_to_title_ascending() {
        let store = MemoryStore::new();
        for title in ["Charlie", "Alpha", "Bravo"] {
            store.create_lesson(lesson(title)).await.unwrap();
        }

        let result = store
            .search_lessons(SearchOptions::default())
            .await
            .unwrap();
        let titles: Vec<_> = result.items.iter().map(|l| l.title.as_str()).collect();
        assert_eq!(titles, vec!["Alpha", "Bravo", "Charlie"]);
    }

    #[tokio::test]
    async fn tags_and_categories() {
        let store = MemoryStore::new();
        let l = store.create_lesson(lesson("T")).await.unwrap();

        store.add_tag(&l.id, "docker").await.unwrap();
        store.add_tag(&l.id, "docker").await.unwrap();
        store.add_tag(&l.id, "swarm").await.unwrap();
        store.set_category(&l.id, "Orchestration").await.unwrap();

        let got = store.get_lesson(&l.id).await.unwrap();
        assert_eq!(got.tags, vec!["docker".to_string(), "swarm".to_string()]);
        assert_eq!(got.category, "Orchestration");

        assert_eq!(store.list_tags().await.unwrap().len(), 2);
        assert_eq!(
            store.list_categories().await.unwrap(),
            vec!["Orchestration".to_string()]
        );

        store.remove_tag(&l.id, "docker").await.unwrap();
        let got = store.get_lesson(&l.id).await.unwrap();
        assert_eq!(got.tags, vec!["swarm".to_string()]);

        let by_tag = store
            .list_lessons_by_tag("swarm", ListOptions::default())
            .await
            .unwrap();
        assert_eq!(by_tag.total_items, 1);
    }

    #[tokio::test]
    async fn login_request_is_one_shot() {
        let store = MemoryStore::new();
        let request = LoginRequest {
            id: "nonce-1".to_string(),
            provider: "github".to_string(),
            created_at: chrono::Utc::now(),
        };

        store.login_request_put(&request).await.unwrap();
        assert!(store
            .login_request_consume("nonce-1")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .login_request_consume("nonce-1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn windows_pool_acquire_release() {
        let store = MemoryStore::new();
        store
            .windows_pool_add(&WindowsLease {
                id: "win-1".to_string(),
                ip: "10.1.0.5".to_string(),
                session_id: None,
            })
            .await
            .unwrap();

        let session = SessionId::generate();
        let lease = store.windows_pool_acquire(&session).await.unwrap().unwrap();
        assert_eq!(lease.id, "win-1");

        // Pool exhausted.
        assert!(store
            .windows_pool_acquire(&SessionId::generate())
            .await
            .unwrap()
            .is_none());

        store.windows_pool_release("win-1").await.unwrap();
        assert!(store
            .windows_pool_acquire(&session)
            .await
            .unwrap()
            .is_some());
    }
}
