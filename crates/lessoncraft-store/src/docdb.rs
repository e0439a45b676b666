//! Embedded document store backend.
//!
//! Documents are CBOR-encoded values in column families, with secondary
//! index families maintained batch-atomically alongside every write. Each
//! operation runs through retry + circuit breaker with a bounded deadline;
//! when the breaker is open, operations fail fast with
//! [`StoreError::CircuitOpen`] so callers can degrade.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lessoncraft_core::{LessonId, PlaygroundId, SessionId, UserId};
use lessoncraft_lesson::{Lesson, VersionInfo};
use lessoncraft_resilience::{BreakerError, BreakerOptions, CircuitBreaker, Guard, RetryPolicy};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};
use tracing::info;

use crate::error::{Result, StoreError};
use crate::keys;
use crate::query::{ListOptions, ListResult, SearchOptions, SortOrder};
use crate::schema::{all_column_families, cf};
use crate::types::{Instance, LoginRequest, Playground, Session, User, WindowsLease};
use crate::{versioning, LessonStore, Store};

/// Deadline for point reads and writes.
const OP_TIMEOUT: Duration = Duration::from_secs(10);
/// Deadline for scans and searches.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Document-store implementation of [`Store`] and [`LessonStore`].
pub struct DocStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    guard: Guard,
}

impl DocStore {
    /// Open or create the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let breaker = Arc::new(CircuitBreaker::new(BreakerOptions {
            name: "docdb".to_string(),
            on_state_change: Some(Arc::new(|name, from, to| {
                info!(breaker = name, %from, %to, "document store breaker state changed");
            })),
            ..BreakerOptions::default()
        }));

        Ok(Self {
            db: Arc::new(db),
            guard: Guard::new(breaker, RetryPolicy::default()),
        })
    }

    /// The breaker guarding this store, for health snapshots.
    #[must_use]
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        self.guard.breaker()
    }

    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Run a closure through retry-inside-breaker with a bounded deadline.
    ///
    /// Closures return `Ok(None)`-style values for absent records so the
    /// breaker only observes genuine database failures.
    async fn run<T, F>(&self, operation: &str, deadline: Duration, f: F) -> Result<T>
    where
        T: Send,
        F: Fn() -> Result<T> + Send + Sync,
    {
        let result = self
            .guard
            .execute(operation, || async {
                tokio::time::timeout(deadline, std::future::ready(f()))
                    .await
                    .map_err(|_| {
                        StoreError::Timeout(format!(
                            "{operation} exceeded {}s",
                            deadline.as_secs()
                        ))
                    })?
            })
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(BreakerError::Open) => Err(StoreError::CircuitOpen),
            Err(BreakerError::Inner(e)) => Err(e),
        }
    }

    fn get_raw<T: serde::de::DeserializeOwned>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn scan_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<Box<[u8]>>> {
        let cf = self.cf(cf_name)?;
        let mut matched = Vec::new();
        let iter = self.db.iterator_cf(
            &cf,
            IteratorMode::From(prefix, rocksdb::Direction::Forward),
        );

        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            matched.push(key);
        }

        Ok(matched)
    }

    fn scan_all<T: serde::de::DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            values.push(Self::deserialize(&value)?);
        }
        Ok(values)
    }

    fn count_cf(&self, cf_name: &str) -> Result<u64> {
        let cf = self.cf(cf_name)?;
        let mut count = 0u64;
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            item.map_err(|e| StoreError::Database(e.to_string()))?;
            count += 1;
        }
        Ok(count)
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Write a lesson and maintain its title/created/tag indexes, removing
    /// stale entries for `old` when present.
    fn put_lesson_indexed(&self, lesson: &Lesson, old: Option<&Lesson>) -> Result<()> {
        let cf_lessons = self.cf(cf::LESSONS)?;
        let cf_title = self.cf(cf::LESSONS_BY_TITLE)?;
        let cf_created = self.cf(cf::LESSONS_BY_CREATED)?;
        let cf_tag = self.cf(cf::LESSONS_BY_TAG)?;

        let mut batch = WriteBatch::default();

        if let Some(old) = old {
            batch.delete_cf(&cf_title, keys::lesson_title_key(&old.title, &old.id));
            batch.delete_cf(
                &cf_created,
                keys::lesson_created_key(old.created_at, &old.id),
            );
            for tag in &old.tags {
                batch.delete_cf(&cf_tag, keys::lesson_tag_key(tag, &old.id));
            }
        }

        batch.put_cf(
            &cf_lessons,
            keys::lesson_key(&lesson.id),
            Self::serialize(lesson)?,
        );
        batch.put_cf(&cf_title, keys::lesson_title_key(&lesson.title, &lesson.id), []);
        batch.put_cf(
            &cf_created,
            keys::lesson_created_key(lesson.created_at, &lesson.id),
            [],
        );
        for tag in &lesson.tags {
            batch.put_cf(&cf_tag, keys::lesson_tag_key(tag, &lesson.id), []);
        }

        self.write(batch)
    }

    fn get_lesson_raw(&self, id: &LessonId) -> Result<Option<Lesson>> {
        self.get_raw(cf::LESSONS, &keys::lesson_key(id))
    }

    fn lessons_matching<F>(&self, predicate: F) -> Result<Vec<Lesson>>
    where
        F: Fn(&Lesson) -> bool,
    {
        Ok(self
            .scan_all::<Lesson>(cf::LESSONS)?
            .into_iter()
            .filter(|l| predicate(l))
            .collect())
    }

    fn mutate_lesson<F>(&self, id: &LessonId, f: F) -> Result<Option<()>>
    where
        F: FnOnce(&mut Lesson),
    {
        let Some(old) = self.get_lesson_raw(id)? else {
            return Ok(None);
        };
        let mut lesson = old.clone();
        f(&mut lesson);
        lesson.updated_at = chrono::Utc::now();
        self.put_lesson_indexed(&lesson, Some(&old))?;
        Ok(Some(()))
    }
}

#[async_trait]
impl Store for DocStore {
    async fn session_put(&self, session: &Session) -> Result<()> {
        self.run("SessionPut", OP_TIMEOUT, || {
            let cf_sessions = self.cf(cf::SESSIONS)?;
            let cf_index = self.cf(cf::SESSIONS_BY_PLAYGROUND)?;

            let mut batch = WriteBatch::default();
            batch.put_cf(
                &cf_sessions,
                keys::session_key(&session.id),
                Self::serialize(session)?,
            );
            batch.put_cf(
                &cf_index,
                keys::playground_session_key(&session.playground_id, &session.id),
                [],
            );
            self.write(batch)
        })
        .await
    }

    async fn session_get(&self, session_id: &SessionId) -> Result<Option<Session>> {
        self.run("SessionGet", OP_TIMEOUT, || {
            self.get_raw(cf::SESSIONS, &keys::session_key(session_id))
        })
        .await
    }

    async fn session_delete(&self, session_id: &SessionId) -> Result<()> {
        self.run("SessionDelete", OP_TIMEOUT, || {
            let Some(session) = self.get_raw::<Session>(cf::SESSIONS, &keys::session_key(session_id))?
            else {
                return Ok(false);
            };

            let cf_sessions = self.cf(cf::SESSIONS)?;
            let cf_index = self.cf(cf::SESSIONS_BY_PLAYGROUND)?;

            let mut batch = WriteBatch::default();
            batch.delete_cf(&cf_sessions, keys::session_key(session_id));
            batch.delete_cf(
                &cf_index,
                keys::playground_session_key(&session.playground_id, session_id),
            );
            self.write(batch)?;
            Ok(true)
        })
        .await?
        .then_some(())
        .ok_or(StoreError::NotFound)
    }

    async fn session_count(&self) -> Result<u64> {
        self.run("SessionCount", OP_TIMEOUT, || self.count_cf(cf::SESSIONS))
            .await
    }

    async fn sessions_by_playground(
        &self,
        playground_id: &PlaygroundId,
    ) -> Result<Vec<Session>> {
        self.run("SessionsByPlayground", SEARCH_TIMEOUT, || {
            let prefix = keys::playground_prefix(playground_id);
            let mut sessions = Vec::new();
            for key in self.scan_prefix(cf::SESSIONS_BY_PLAYGROUND, &prefix)? {
                let session_id = keys::extract_session_id(&key);
                if let Some(session) =
                    self.get_raw::<Session>(cf::SESSIONS, &keys::session_key(&session_id))?
                {
                    sessions.push(session);
                }
            }
            sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(sessions)
        })
        .await
    }

    async fn sessions_all(&self) -> Result<Vec<Session>> {
        self.run("SessionsAll", SEARCH_TIMEOUT, || {
            let mut sessions = self.scan_all::<Session>(cf::SESSIONS)?;
            sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(sessions)
        })
        .await
    }

    async fn instance_put(&self, instance: &Instance) -> Result<()> {
        self.run("InstancePut", OP_TIMEOUT, || {
            let cf_instances = self.cf(cf::INSTANCES)?;
            let cf_index = self.cf(cf::INSTANCES_BY_SESSION)?;

            let mut batch = WriteBatch::default();
            batch.put_cf(
                &cf_instances,
                instance.name.as_bytes(),
                Self::serialize(instance)?,
            );
            batch.put_cf(
                &cf_index,
                keys::session_instance_key(&instance.session_id, &instance.name),
                [],
            );
            self.write(batch)
        })
        .await
    }

    async fn instance_get(&self, name: &str) -> Result<Option<Instance>> {
        self.run("InstanceGet", OP_TIMEOUT, || {
            self.get_raw(cf::INSTANCES, name.as_bytes())
        })
        .await
    }

    async fn instance_delete(&self, name: &str) -> Result<()> {
        self.run("InstanceDelete", OP_TIMEOUT, || {
            let Some(instance) = self.get_raw::<Instance>(cf::INSTANCES, name.as_bytes())? else {
                return Ok(false);
            };

            let cf_instances = self.cf(cf::INSTANCES)?;
            let cf_index = self.cf(cf::INSTANCES_BY_SESSION)?;

            let mut batch = WriteBatch::default();
            batch.delete_cf(&cf_instances, name.as_bytes());
            batch.delete_cf(
                &cf_index,
                keys::session_instance_key(&instance.session_id, name),
            );
            self.write(batch)?;
            Ok(true)
        })
        .await?
        .then_some(())
        .ok_or(StoreError::NotFound)
    }

    async fn instance_count(&self) -> Result<u64> {
        self.run("InstanceCount", OP_TIMEOUT, || self.count_cf(cf::INSTANCES))
            .await
    }

    async fn instances_by_session(&self, session_id: &SessionId) -> Result<Vec<Instance>> {
        self.run("InstancesBySession", SEARCH_TIMEOUT, || {
            let prefix = keys::session_prefix(session_id);
            let mut instances = Vec::new();
            for key in self.scan_prefix(cf::INSTANCES_BY_SESSION, &prefix)? {
                let name = keys::extract_instance_name(&key);
                if let Some(instance) = self.get_raw::<Instance>(cf::INSTANCES, name.as_bytes())? {
                    instances.push(instance);
                }
            }
            Ok(instances)
        })
        .await
    }

    async fn playground_put(&self, playground: &Playground) -> Result<()> {
        self.run("PlaygroundPut", OP_TIMEOUT, || {
            let cf_playgrounds = self.cf(cf::PLAYGROUNDS)?;
            let cf_domains = self.cf(cf::PLAYGROUNDS_BY_DOMAIN)?;

            let old: Option<Playground> =
                self.get_raw(cf::PLAYGROUNDS, playground.id.as_str().as_bytes())?;

            let mut batch = WriteBatch::default();
            if let Some(old) = old {
                if old.domain != playground.domain {
                    batch.delete_cf(&cf_domains, old.domain.as_bytes());
                }
            }
            batch.put_cf(
                &cf_playgrounds,
                playground.id.as_str().as_bytes(),
                Self::serialize(playground)?,
            );
            batch.put_cf(
                &cf_domains,
                playground.domain.as_bytes(),
                playground.id.as_str().as_bytes(),
            );
            self.write(batch)
        })
        .await
    }

    async fn playground_get(&self, id: &PlaygroundId) -> Result<Option<Playground>> {
        self.run("PlaygroundGet", OP_TIMEOUT, || {
            self.get_raw(cf::PLAYGROUNDS, id.as_str().as_bytes())
        })
        .await
    }

    async fn playground_by_domain(&self, domain: &str) -> Result<Option<Playground>> {
        self.run("PlaygroundByDomain", OP_TIMEOUT, || {
            let cf_domains = self.cf(cf::PLAYGROUNDS_BY_DOMAIN)?;
            let Some(id_bytes) = self
                .db
                .get_cf(&cf_domains, domain.as_bytes())
                .map_err(|e| StoreError::Database(e.to_string()))?
            else {
                return Ok(None);
            };
            self.get_raw(cf::PLAYGROUNDS, &id_bytes)
        })
        .await
    }

    async fn playgrounds_all(&self) -> Result<Vec<Playground>> {
        self.run("PlaygroundsAll", SEARCH_TIMEOUT, || {
            self.scan_all(cf::PLAYGROUNDS)
        })
        .await
    }

    async fn user_put(&self, user: &User) -> Result<()> {
        self.run("UserPut", OP_TIMEOUT, || {
            let cf_users = self.cf(cf::USERS)?;
            self.db
                .put_cf(&cf_users, user.id.as_str().as_bytes(), Self::serialize(user)?)
                .map_err(|e| StoreError::Database(e.to_string()))
        })
        .await
    }

    async fn user_get(&self, user_id: &UserId) -> Result<Option<User>> {
        self.run("UserGet", OP_TIMEOUT, || {
            self.get_raw(cf::USERS, user_id.as_str().as_bytes())
        })
        .await
    }

    async fn login_request_put(&self, request: &LoginRequest) -> Result<()> {
        self.run("LoginRequestPut", OP_TIMEOUT, || {
            let cf_requests = self.cf(cf::LOGIN_REQUESTS)?;
            self.db
                .put_cf(&cf_requests, request.id.as_bytes(), Self::serialize(request)?)
                .map_err(|e| StoreError::Database(e.to_string()))
        })
        .await
    }

    async fn login_request_consume(&self, id: &str) -> Result<Option<LoginRequest>> {
        self.run("LoginRequestConsume", OP_TIMEOUT, || {
            let cf_requests = self.cf(cf::LOGIN_REQUESTS)?;
            let Some(request) = self.get_raw::<LoginRequest>(cf::LOGIN_REQUESTS, id.as_bytes())?
            else {
                return Ok(None);
            };
            self.db
                .delete_cf(&cf_requests, id.as_bytes())
                .map_err(|e| StoreError::Database(e.to_string()))?;
            Ok(Some(request))
        })
        .await
    }

    async fn windows_pool_add(&self, lease: &WindowsLease) -> Result<()> {
        self.run("WindowsPoolAdd", OP_TIMEOUT, || {
            let cf_pool = self.cf(cf::WINDOWS_POOL)?;
            self.db
                .put_cf(&cf_pool, lease.id.as_bytes(), Self::serialize(lease)?)
                .map_err(|e| StoreError::Database(e.to_string()))
        })
        .await
    }

    async fn windows_pool_acquire(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<WindowsLease>> {
        let session_id = *session_id;
        self.run("WindowsPoolAcquire", OP_TIMEOUT, move || {
            let free = self
                .scan_all::<WindowsLease>(cf::WINDOWS_POOL)?
                .into_iter()
                .find(|lease| lease.session_id.is_none());
            let Some(mut lease) = free else {
                return Ok(None);
            };

            lease.session_id = Some(session_id);
            let cf_pool = self.cf(cf::WINDOWS_POOL)?;
            self.db
                .put_cf(&cf_pool, lease.id.as_bytes(), Self::serialize(&lease)?)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            Ok(Some(lease))
        })
        .await
    }

    async fn windows_pool_release(&self, lease_id: &str) -> Result<()> {
        self.run("WindowsPoolRelease", OP_TIMEOUT, || {
            let Some(mut lease) =
                self.get_raw::<WindowsLease>(cf::WINDOWS_POOL, lease_id.as_bytes())?
            else {
                return Ok(false);
            };
            lease.session_id = None;
            let cf_pool = self.cf(cf::WINDOWS_POOL)?;
            self.db
                .put_cf(&cf_pool, lease_id.as_bytes(), Self::serialize(&lease)?)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            Ok(true)
        })
        .await?
        .then_some(())
        .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl LessonStore for DocStore {
    async fn list_lessons(&self, opts: ListOptions) -> Result<ListResult> {
        let opts = opts.normalized();
        self.run("ListLessons", SEARCH_TIMEOUT, || {
            let mut lessons = self.lessons_matching(|l| opts.filter.matches(l))?;
            crate::query::sort_lessons(&mut lessons, &opts.sort);
            Ok(crate::query::paginate(lessons, opts.page, opts.page_size))
        })
        .await
    }

    async fn list_all_lessons(&self) -> Result<Vec<Lesson>> {
        self.run("ListAllLessons", SEARCH_TIMEOUT, || {
            // Newest first, straight off the created-at index.
            let cf_created = self.cf(cf::LESSONS_BY_CREATED)?;
            let mut lessons = Vec::new();
            for item in self.db.iterator_cf(&cf_created, IteratorMode::End) {
                let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
                let id = keys::extract_lesson_id(&key);
                if let Some(lesson) = self.get_lesson_raw(&id)? {
                    lessons.push(lesson);
                }
            }
            Ok(lessons)
        })
        .await
    }

    async fn get_lesson(&self, id: &LessonId) -> Result<Lesson> {
        self.run("GetLesson", OP_TIMEOUT, || self.get_lesson_raw(id))
            .await?
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
        self.run("CreateLesson", OP_TIMEOUT, || {
            self.put_lesson_indexed(&lesson, None)
        })
        .await?;
        Ok(lesson)
    }

    async fn update_lesson(
        &self,
        id: &LessonId,
        lesson: Lesson,
        change_summary: &str,
    ) -> Result<Lesson> {
        self.run("UpdateLesson", OP_TIMEOUT, || {
            let Some(current) = self.get_lesson_raw(id)? else {
                return Ok(None);
            };
            let updated = versioning::prepare_update(&current, lesson.clone(), change_summary);
            self.put_lesson_indexed(&updated, Some(&current))?;
            Ok(Some(updated))
        })
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn delete_lesson(&self, id: &LessonId) -> Result<()> {
        self.run("DeleteLesson", OP_TIMEOUT, || {
            let Some(lesson) = self.get_lesson_raw(id)? else {
                return Ok(false);
            };

            let cf_lessons = self.cf(cf::LESSONS)?;
            let cf_title = self.cf(cf::LESSONS_BY_TITLE)?;
            let cf_created = self.cf(cf::LESSONS_BY_CREATED)?;
            let cf_tag = self.cf(cf::LESSONS_BY_TAG)?;

            let mut batch = WriteBatch::default();
            batch.delete_cf(&cf_lessons, keys::lesson_key(id));
            batch.delete_cf(&cf_title, keys::lesson_title_key(&lesson.title, id));
            batch.delete_cf(&cf_created, keys::lesson_created_key(lesson.created_at, id));
            for tag in &lesson.tags {
                batch.delete_cf(&cf_tag, keys::lesson_tag_key(tag, id));
            }
            self.write(batch)?;
            Ok(true)
        })
        .await?
        .then_some(())
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

        self.run("SearchLessons", SEARCH_TIMEOUT, || {
            let mut lessons = self.lessons_matching(|l| opts.matches(l))?;
            crate::query::sort_lessons(&mut lessons, &sort);
            Ok(crate::query::paginate(lessons, page, page_size))
        })
        .await
    }

    async fn list_categories(&self) -> Result<Vec<String>> {
        self.run("ListCategories", SEARCH_TIMEOUT, || {
            let mut categories: Vec<_> = self
                .scan_all::<Lesson>(cf::LESSONS)?
                .into_iter()
                .map(|l| l.category)
                .filter(|c| !c.is_empty())
                .collect();
            categories.sort();
            categories.dedup();
            Ok(categories)
        })
        .await
    }

    async fn list_tags(&self) -> Result<Vec<String>> {
        self.run("ListTags", SEARCH_TIMEOUT, || {
            let cf_tag = self.cf(cf::LESSONS_BY_TAG)?;
            let mut tags = Vec::new();
            for item in self.db.iterator_cf(&cf_tag, IteratorMode::Start) {
                let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
                // Key layout: tag || 0x00 || lesson_id.
                if let Some(end) = key.iter().position(|b| *b == 0) {
                    tags.push(String::from_utf8_lossy(&key[..end]).to_string());
                }
            }
            tags.dedup();
            Ok(tags)
        })
        .await
    }

    async fn add_tag(&self, id: &LessonId, tag: &str) -> Result<()> {
        self.run("AddTag", OP_TIMEOUT, || {
            self.mutate_lesson(id, |lesson| {
                if !lesson.tags.iter().any(|t| t == tag) {
                    lesson.tags.push(tag.to_string());
                }
            })
        })
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn remove_tag(&self, id: &LessonId, tag: &str) -> Result<()> {
        self.run("RemoveTag", OP_TIMEOUT, || {
            self.mutate_lesson(id, |lesson| {
                lesson.tags.retain(|t| t != tag);
            })
        })
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn set_category(&self, id: &LessonId, category: &str) -> Result<()> {
        self.run("SetCategory", OP_TIMEOUT, || {
            self.mutate_lesson(id, |lesson| {
                lesson.category = category.to_string();
            })
        })
        .await?
        .ok_or(StoreError::NotFound)
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
        let opts = opts.normalized();
        self.run("ListLessonsByTag", SEARCH_TIMEOUT, || {
            let prefix = keys::lesson_tag_prefix(tag);
            let mut lessons = Vec::new();
            for key in self.scan_prefix(cf::LESSONS_BY_TAG, &prefix)? {
                let id = keys::extract_lesson_id(&key);
                if let Some(lesson) = self.get_lesson_raw(&id)? {
                    if opts.filter.matches(&lesson) {
                        lessons.push(lesson);
                    }
                }
            }
            crate::query::sort_lessons(&mut lessons, &opts.sort);
            Ok(crate::query::paginate(lessons, opts.page, opts.page_size))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::LessonFilter;
    use lessoncraft_lesson::LessonStep;
    use tempfile::TempDir;

    fn create_test_store() -> (DocStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = DocStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn test_session(playground: &str) -> Session {
        let now = chrono::Utc::now();
        Session {
            id: SessionId::generate(),
            playground_id: PlaygroundId::new(playground),
            host: "node-1".to_string(),
            created_at: now,
            expires_at: now + chrono::Duration::hours(4),
            stack: None,
            stack_name: None,
            image_name: None,
            ready: false,
            teardown_error: None,
        }
    }

    fn test_instance(session_id: SessionId, name: &str, hostname: &str) -> Instance {
        Instance {
            name: name.to_string(),
            session_id,
            hostname: hostname.to_string(),
            image: "lessoncraft/dind".to_string(),
            ip: "10.0.0.2".to_string(),
            routable_ip: "10.0.0.2".to_string(),
            proxy_host: "ip10-0-0-2-abc".to_string(),
            session_host: "node-1".to_string(),
            tls: None,
            lesson_ctx: None,
            windows_id: None,
            kind: String::new(),
            ports: Vec::new(),
            cluster_role: None,
            max_processes: None,
            max_memory_mb: None,
            storage_size: None,
        }
    }

    fn test_lesson(title: &str) -> Lesson {
        let mut l = Lesson::new(title, format!("{title} description"));
        let mut step = LessonStep::new("step-a");
        step.content = "content".to_string();
        step.commands = vec!["echo hi".to_string()];
        l.steps.push(step);
        l
    }

    #[tokio::test]
    async fn session_crud() {
        let (store, _dir) = create_test_store();
        let session = test_session("default");

        store.session_put(&session).await.unwrap();
        let got = store.session_get(&session.id).await.unwrap().unwrap();
        assert_eq!(got.playground_id, session.playground_id);
        assert_eq!(store.session_count().await.unwrap(), 1);

        store.session_delete(&session.id).await.unwrap();
        assert!(store.session_get(&session.id).await.unwrap().is_none());
        assert!(matches!(
            store.session_delete(&session.id).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn sessions_by_playground_index() {
        let (store, _dir) = create_test_store();

        for _ in 0..3 {
            store.session_put(&test_session("alpha")).await.unwrap();
        }
        store.session_put(&test_session("beta")).await.unwrap();

        let alpha = store
            .sessions_by_playground(&PlaygroundId::new("alpha"))
            .await
            .unwrap();
        assert_eq!(alpha.len(), 3);

        let beta = store
            .sessions_by_playground(&PlaygroundId::new("beta"))
            .await
            .unwrap();
        assert_eq!(beta.len(), 1);
    }

    #[tokio::test]
    async fn instance_crud_and_session_index() {
        let (store, _dir) = create_test_store();
        let session = test_session("default");
        store.session_put(&session).await.unwrap();

        let i1 = test_instance(session.id, "abc_x1", "node1");
        let i2 = test_instance(session.id, "abc_x2", "node2");
        store.instance_put(&i1).await.unwrap();
        store.instance_put(&i2).await.unwrap();

        let instances = store.instances_by_session(&session.id).await.unwrap();
        assert_eq!(instances.len(), 2);
        assert_eq!(store.instance_count().await.unwrap(), 2);

        store.instance_delete("abc_x1").await.unwrap();
        let instances = store.instances_by_session(&session.id).await.unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].hostname, "node2");
    }

    #[tokio::test]
    async fn playground_domain_lookup() {
        let (store, _dir) = create_test_store();
        let playground = Playground::new(PlaygroundId::new("default"), "play.example.com");
        store.playground_put(&playground).await.unwrap();

        let got = store
            .playground_by_domain("play.example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.id, playground.id);

        assert!(store
            .playground_by_domain("missing.example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn login_request_one_shot() {
        let (store, _dir) = create_test_store();
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
    async fn lesson_create_update_version() {
        let (store, _dir) = create_test_store();

        let created = store.create_lesson(test_lesson("T")).await.unwrap();
        assert_eq!(created.version, 1);
        assert!(created.version_history.is_empty());

        let mut edit = created.clone();
        edit.title = "T2".to_string();
        let updated = store
            .update_lesson(&created.id, edit, "retitle")
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.version_history.len(), 1);
        assert_eq!(updated.version_history[0].change_summary, "retitle");

        // Reconstruct version 1.
        let v1 = store.get_lesson_version(&created.id, 1).await.unwrap();
        assert_eq!(v1.version, 1);
        assert!(v1.version_history.is_empty());

        let versions = store.list_lesson_versions(&created.id).await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version, 2);
    }

    #[tokio::test]
    async fn lesson_pagination() {
        let (store, _dir) = create_test_store();
        for n in 0..25 {
            store
                .create_lesson(test_lesson(&format!("L{n:02}")))
                .await
                .unwrap();
        }

        let page = store
            .list_lessons(ListOptions {
                page: 1,
                page_size: 10,
                sort: vec![("title".to_string(), SortOrder::Asc)],
                filter: LessonFilter::default(),
            })
            .await
            .unwrap();
        assert_eq!(page.items.len(), 10);
        assert_eq!(page.total_items, 25);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items[0].title, "L00");
    }

    #[tokio::test]
    async fn tag_index_survives_update() {
        let (store, _dir) = create_test_store();
        let lesson = store.create_lesson(test_lesson("T")).await.unwrap();

        store.add_tag(&lesson.id, "docker").await.unwrap();
        let by_tag = store
            .list_lessons_by_tag("docker", ListOptions::default())
            .await
            .unwrap();
        assert_eq!(by_tag.total_items, 1);

        store.remove_tag(&lesson.id, "docker").await.unwrap();
        let by_tag = store
            .list_lessons_by_tag("docker", ListOptions::default())
            .await
            .unwrap();
        assert_eq!(by_tag.total_items, 0);

        assert!(store.list_tags().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_indexes() {
        let (store, _dir) = create_test_store();
        let mut lesson = test_lesson("T");
        lesson.tags = vec!["docker".to_string()];
        let lesson = store.create_lesson(lesson).await.unwrap();

        store.delete_lesson(&lesson.id).await.unwrap();
        assert!(matches!(
            store.get_lesson(&lesson.id).await,
            Err(StoreError::NotFound)
        ));
        assert!(store.list_tags().await.unwrap().is_empty());
        assert!(store.list_all_lessons().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_all_newest_first() {
        let (store, _dir) = create_test_store();
        for title in ["first", "second", "third"] {
            store.create_lesson(test_lesson(title)).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let all = store.list_all_lessons().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].title, "third");
        assert_eq!(all[2].title, "first");
    }

    #[tokio::test]
    async fn search_filters_and_sorts() {
        let (store, _dir) = create_test_store();
        let mut a = test_lesson("Alpha Swarm");
        a.category = "Docker".to_string();
        let mut b = test_lesson("Beta Swarm");
        b.category = "Kubernetes".to_string();
        let mut c = test_lesson("Gamma");
        c.category = "Docker".to_string();
        for l in [a, b, c] {
            store.create_lesson(l).await.unwrap();
        }

        let result = store
            .search_lessons(SearchOptions {
                query: "swarm".to_string(),
                categories: vec!["Docker".to_string()],
                ..SearchOptions::default()
            })
            .await
            .unwrap();
        assert_eq!(result.total_items, 1);
        assert_eq!(result.items[0].title, "Alpha Swarm");
    }

    #[tokio::test]
    async fn windows_pool_lifecycle() {
        let (store, _dir) = create_test_store();
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
        assert_eq!(lease.session_id, Some(session));

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
