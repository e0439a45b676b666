//! Pagination, filtering, sorting, and search over lessons.
//!
//! Both backends evaluate the same deterministic predicates and sort
//! comparators, so pagination integrity holds regardless of backend.

use lessoncraft_lesson::Lesson;
use serde::{Deserialize, Serialize};

/// Sort direction for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// Typed filter applied to list operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonFilter {
    /// Keep lessons in this category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Keep lessons carrying this tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Keep lessons at this difficulty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
}

impl LessonFilter {
    /// Whether the lesson passes the filter.
    #[must_use]
    pub fn matches(&self, lesson: &Lesson) -> bool {
        if let Some(category) = &self.category {
            if &lesson.category != category {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !lesson.tags.iter().any(|t| t == tag) {
                return false;
            }
        }
        if let Some(difficulty) = &self.difficulty {
            if &lesson.difficulty != difficulty {
                return false;
            }
        }
        true
    }
}

/// Options for listing lessons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    /// Page number, 1-based.
    pub page: u64,
    /// Items per page.
    pub page_size: u64,
    /// Sort fields in priority order. Supported fields: `title`,
    /// `created_at`, `updated_at`, `difficulty`, `estimated_time`.
    pub sort: Vec<(String, SortOrder)>,
    /// Filter applied before pagination.
    pub filter: LessonFilter,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            sort: vec![("created_at".to_string(), SortOrder::Desc)],
            filter: LessonFilter::default(),
        }
    }
}

impl ListOptions {
    /// Clamp out-of-range page and size values to the contract minimums.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.page < 1 {
            self.page = 1;
        }
        if self.page_size < 1 {
            self.page_size = 20;
        }
        self
    }
}

/// Options for searching lessons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Term matched case-insensitively against title and description (and
    /// step content when `include_content` is set).
    #[serde(default)]
    pub query: String,
    /// OR: lesson must be in at least one of these categories.
    #[serde(default)]
    pub categories: Vec<String>,
    /// OR: lesson must carry at least one of these tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// AND: lesson must carry all of these tags.
    #[serde(default)]
    pub required_tags: Vec<String>,
    /// Exact difficulty match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    /// Minimum estimated completion time in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_estimated_time: Option<u32>,
    /// Maximum estimated completion time in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_estimated_time: Option<u32>,
    /// Also search step content.
    #[serde(default)]
    pub include_content: bool,
    /// Page number, 1-based. Zero is normalized to 1.
    #[serde(default)]
    pub page: u64,
    /// Items per page. Zero is normalized to 20.
    #[serde(default)]
    pub page_size: u64,
    /// Sort fields; defaults to title ascending.
    #[serde(default)]
    pub sort: Vec<(String, SortOrder)>,
}

impl SearchOptions {
    /// Whether the lesson matches every search criterion.
    #[must_use]
    pub fn matches(&self, lesson: &Lesson) -> bool {
        if !self.query.is_empty() {
            let query = self.query.to_lowercase();
            let mut hit = lesson.title.to_lowercase().contains(&query)
                || lesson.description.to_lowercase().contains(&query);
            if !hit && self.include_content {
                hit = lesson
                    .steps
                    .iter()
                    .any(|s| s.content.to_lowercase().contains(&query));
            }
            if !hit {
                return false;
            }
        }

        if !self.categories.is_empty() && !self.categories.contains(&lesson.category) {
            return false;
        }

        if !self.tags.is_empty() && !lesson.tags.iter().any(|t| self.tags.contains(t)) {
            return false;
        }

        if !self
            .required_tags
            .iter()
            .all(|required| lesson.tags.iter().any(|t| t == required))
        {
            return false;
        }

        if let Some(difficulty) = &self.difficulty {
            if &lesson.difficulty != difficulty {
                return false;
            }
        }

        if let Some(min) = self.min_estimated_time {
            if lesson.estimated_time_minutes < min {
                return false;
            }
        }
        if let Some(max) = self.max_estimated_time {
            if lesson.estimated_time_minutes > max {
                return false;
            }
        }

        true
    }
}

/// The result of a paginated list or search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResult {
    /// Items for the current page.
    pub items: Vec<Lesson>,
    /// Total matching items across all pages.
    pub total_items: u64,
    /// `ceil(total_items / page_size)`.
    pub total_pages: u64,
    /// Current page number.
    pub page: u64,
    /// Items per page.
    pub page_size: u64,
}

/// Sort lessons by the given fields, with the lesson ID as a final
/// tiebreaker so ordering is total and pagination is stable.
pub fn sort_lessons(lessons: &mut [Lesson], sort: &[(String, SortOrder)]) {
    lessons.sort_by(|a, b| {
        for (field, order) in sort {
            let ordering = match field.as_str() {
                "title" => a.title.cmp(&b.title),
                "created_at" => a.created_at.cmp(&b.created_at),
                "updated_at" => a.updated_at.cmp(&b.updated_at),
                "difficulty" => a.difficulty.cmp(&b.difficulty),
                "estimated_time" => a.estimated_time_minutes.cmp(&b.estimated_time_minutes),
                _ => std::cmp::Ordering::Equal,
            };
            let ordering = match order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            };
            if ordering != std::cmp::Ordering::Equal {
                return ordering;
            }
        }
        a.id.to_string().cmp(&b.id.to_string())
    });
}

/// Slice a fully sorted, filtered result set into one page.
///
/// Out-of-range pages return empty items with correct totals.
#[must_use]
pub fn paginate(lessons: Vec<Lesson>, page: u64, page_size: u64) -> ListResult {
    let total_items = lessons.len() as u64;
    let total_pages = total_items.div_ceil(page_size);

    let skip = usize::try_from((page - 1).saturating_mul(page_size)).unwrap_or(usize::MAX);
    let take = usize::try_from(page_size).unwrap_or(usize::MAX);
    let items = lessons.into_iter().skip(skip).take(take).collect();

    ListResult {
        items,
        total_items,
        total_pages,
        page,
        page_size,
    }
}
