//! TTL cache decorator for lesson reads.
//!
//! `CachedLessonStore` composes any [`LessonStore`] with a TTL cache on the
//! hot read paths (`get_lesson`, `list_lessons`, `list_all_lessons`).
//! Mutations invalidate the affected keys; a background cleaner removes
//! expired entries on a 5-minute cadence.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lessoncraft_core::LessonId;
use lessoncraft_lesson::{Lesson, VersionInfo};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::query::{ListOptions, ListResult, SearchOptions};
use crate::LessonStore;

/// Cadence of the background expiry sweep.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone)]
enum CachedValue {
    Lesson(Lesson),
    Lessons(Vec<Lesson>),
    List(ListResult),
}

struct CacheItem {
    value: CachedValue,
    expires_at: Instant,
}

/// A string-keyed TTL cache.
#[derive(Default)]
pub struct TtlCache {
    items: RwLock<HashMap<String, CacheItem>>,
}

impl TtlCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, key: &str) -> Option<CachedValue> {
        let items = self.items.read();
        let item = items.get(key)?;
        if item.expires_at <= Instant::now() {
            return None;
        }
        Some(item.value.clone())
    }

    fn set(&self, key: String, value: CachedValue, ttl: Duration) {
        self.items.write().insert(
            key,
            CacheItem {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    fn delete(&self, key: &str) {
        self.items.write().remove(key);
    }

    fn delete_prefix(&self, prefix: &str) {
        self.items.write().retain(|key, _| !key.starts_with(prefix));
    }

    /// Drop expired entries.
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        let mut items = self.items.write();
        let before = items.len();
        items.retain(|_, item| item.expires_at > now);
        let removed = before - items.len();
        if removed > 0 {
            debug!(removed, "cache cleanup removed expired entries");
        }
    }

    /// Number of live (possibly expired, not yet swept) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

/// A [`LessonStore`] decorator adding TTL caching to the hot read paths.
pub struct CachedLessonStore<S> {
    inner: Arc<S>,
    cache: Arc<TtlCache>,
    ttl: Duration,
}

impl<S: LessonStore> CachedLessonStore<S> {
    /// Wrap a store with the given entry TTL.
    #[must_use]
    pub fn new(inner: Arc<S>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Arc::new(TtlCache::new()),
            ttl,
        }
    }

    /// The shared cache, for the cleaner task and tests.
    #[must_use]
    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    /// Spawn the background cleaner that sweeps expired entries every
    /// [`CLEANUP_INTERVAL`].
    pub fn spawn_cleaner(&self) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(&self.cache);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                cache.cleanup_expired();
            }
        })
    }

    fn lesson_key(id: &LessonId) -> String {
        format!("lesson:{id}")
    }

    fn list_key(opts: &ListOptions) -> String {
        format!("lessons:list:page:{}:size:{}", opts.page, opts.page_size)
    }

    fn invalidate(&self, id: Option<&LessonId>) {
        if let Some(id) = id {
            self.cache.delete(&Self::lesson_key(id));
        }
        self.cache.delete("lessons:all");
        self.cache.delete_prefix("lessons:list:");
    }
}

#[async_trait]
impl<S: LessonStore> LessonStore for CachedLessonStore<S> {
    async fn list_lessons(&self, opts: ListOptions) -> Result<ListResult> {
        let opts = opts.normalized();
        let key = Self::list_key(&opts);
        if let Some(CachedValue::List(result)) = self.cache.get(&key) {
            return Ok(result);
        }

        let result = self.inner.list_lessons(opts).await?;
        self.cache
            .set(key, CachedValue::List(result.clone()), self.ttl);
        Ok(result)
    }

    async fn list_all_lessons(&self) -> Result<Vec<Lesson>> {
        if let Some(CachedValue::Lessons(lessons)) = self.cache.get("lessons:all") {
            return Ok(lessons);
        }

        let lessons = self.inner.list_all_lessons().await?;
        self.cache.set(
            "lessons:all".to_string(),
            CachedValue::Lessons(lessons.clone()),
            self.ttl,
        );
        Ok(lessons)
    }

    async fn get_lesson(&self, id: &LessonId) -> Result<Lesson> {
        let key = Self::lesson_key(id);
        if let Some(CachedValue::Lesson(lesson)) = self.cache.get(&key) {
            return Ok(lesson);
        }

        let lesson = self.inner.get_lesson(id).await?;
        self.cache
            .set(key, CachedValue::Lesson(lesson.clone()), self.ttl);
        Ok(lesson)
    }

    async fn get_lesson_version(&self, id: &LessonId, version: u32) -> Result<Lesson> {
        self.inner.get_lesson_version(id, version).await
    }

    async fn list_lesson_versions(&self, id: &LessonId) -> Result<Vec<VersionInfo>> {
        self.inner.list_lesson_versions(id).await
    }

    async fn create_lesson(&self, lesson: Lesson) -> Result<Lesson> {
        let created = self.inner.create_lesson(lesson).await?;
        self.invalidate(None);
        Ok(created)
    }

    async fn update_lesson(
        &self,
        id: &LessonId,
        lesson: Lesson,
        change_summary: &str,
    ) -> Result<Lesson> {
        let updated = self.inner.update_lesson(id, lesson, change_summary).await?;
        self.invalidate(Some(id));
        Ok(updated)
    }

    async fn delete_lesson(&self, id: &LessonId) -> Result<()> {
        self.inner.delete_lesson(id).await?;
        self.invalidate(Some(id));
        Ok(())
    }

    async fn search_lessons(&self, opts: SearchOptions) -> Result<ListResult> {
        self.inner.search_lessons(opts).await
    }

    async fn list_categories(&self) -> Result<Vec<String>> {
        self.inner.list_categories().await
    }

    async fn list_tags(&self) -> Result<Vec<String>> {
        self.inner.list_tags().await
    }

    async fn add_tag(&self, id: &LessonId, tag: &str) -> Result<()> {
        self.inner.add_tag(id, tag).await?;
        self.invalidate(Some(id));
        Ok(())
    }

    async fn remove_tag(&self, id: &LessonId, tag: &str) -> Result<()> {
        self.inner.remove_tag(id, tag).await?;
        self.invalidate(Some(id));
        Ok(())
    }

    async fn set_category(&self, id: &LessonId, category: &str) -> Result<()> {
        self.inner.set_category(id, category).await?;
        self.invalidate(Some(id));
        Ok(())
    }

    async fn list_lessons_by_category(
        &self,
        category: &str,
        opts: ListOptions,
    ) -> Result<ListResult> {
        self.inner.list_lessons_by_category(category, opts).await
    }

    async fn list_lessons_by_tag(&self, tag: &str, opts: ListOptions) -> Result<ListResult> {
        self.inner.list_lessons_by_tag(tag, opts).await
    }
}
