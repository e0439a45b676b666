//! Lesson version bookkeeping shared by both backends.

use chrono::Utc;
use lessoncraft_core::LessonId;
use lessoncraft_lesson::{Lesson, VersionInfo};

/// Prepare a lesson for insertion: fresh ID, timestamps, version 1, empty
/// history.
#[must_use]
pub fn prepare_create(mut lesson: Lesson) -> Lesson {
    let now = Utc::now();
    lesson.id = LessonId::generate();
    lesson.created_at = now;
    lesson.updated_at = now;
    lesson.version = 1;
    lesson.version_history = Vec::new();
    lesson
}

/// Prepare an update: push the current `(version, updated_at, summary)`
/// onto the history, bump the version, refresh `updated_at`. Identity and
/// creation time are carried from the current record.
#[must_use]
pub fn prepare_update(current: &Lesson, mut update: Lesson, change_summary: &str) -> Lesson {
    let mut history = current.version_history.clone();
    history.push(VersionInfo {
        version: current.version,
        timestamp: current.updated_at,
        change_summary: change_summary.to_string(),
    });

    update.id = current.id;
    update.created_at = current.created_at;
    update.updated_at = Utc::now();
    update.version = current.version + 1;
    update.version_history = history;
    update
}

/// Reconstruct the lesson at a previous version.
///
/// Full snapshots are not stored, so the reconstruction is approximate: the
/// current document with `version` and `updated_at` overwritten from the
/// history record and the history truncated to earlier entries.
#[must_use]
pub fn reconstruct_version(current: &Lesson, version: u32) -> Option<Lesson> {
    if version == current.version {
        return Some(current.clone());
    }
    if version == 0 || version > current.version {
        return None;
    }

    let record = current
        .version_history
        .iter()
        .rev()
        .find(|v| v.version == version)?;

    let mut reconstructed = current.clone();
    reconstructed.version = version;
    reconstructed.updated_at = record.timestamp;
    reconstructed.version_history = current
        .version_history
        .iter()
        .filter(|v| v.version < version)
        .cloned()
        .collect();

    Some(reconstructed)
}

/// All versions of a lesson, current first, descending by number.
#[must_use]
pub fn version_list(current: &Lesson) -> Vec<VersionInfo> {
    let mut versions = Vec::with_capacity(current.version_history.len() + 1);
    versions.push(VersionInfo {
        version: current.version,
        timestamp: current.updated_at,
        change_summary: "Current version".to_string(),
    });
    versions.extend(current.version_history.iter().cloned());
    versions.sort_by(|a, b| b.version.cmp(&a.version));
    versions
}

#[cfg(test)]
mod tests {
    use super::*;
    use lessoncraft_lesson::LessonStep;

    fn base_lesson() -> Lesson {
        let mut lesson = Lesson::new("T", "D");
        let mut step = LessonStep::new("step-a");
        step.content = "content".to_string();
        lesson.steps.push(step);
        lesson
    }

    #[test]
    fn create_initializes_versioning() {
        let lesson = prepare_create(base_lesson());
        assert_eq!(lesson.version, 1);
        assert!(lesson.version_history.is_empty());
        assert_eq!(lesson.created_at, lesson.updated_at);
    }

    #[test]
    fn update_appends_exactly_one_record() {
        let v1 = prepare_create(base_lesson());

        let mut edit = v1.clone();
        edit.title = "T2".to_string();
        let v2 = prepare_update(&v1, edit, "retitle");

        assert_eq!(v2.version, 2);
        assert_eq!(v2.id, v1.id);
        assert_eq!(v2.created_at, v1.created_at);
        assert_eq!(v2.version_history.len(), 1);
        assert_eq!(v2.version_history[0].version, 1);
        assert_eq!(v2.version_history[0].timestamp, v1.updated_at);
        assert_eq!(v2.version_history[0].change_summary, "retitle");
    }

    #[test]
    fn history_length_is_version_minus_one() {
        let mut lesson = prepare_create(base_lesson());
        for n in 2..=5 {
            let edit = lesson.clone();
            lesson = prepare_update(&lesson, edit, &format!("edit {n}"));
            assert_eq!(lesson.version, n);
            assert_eq!(lesson.version_history.len() as u32, lesson.version - 1);
        }
    }

    #[test]
    fn reconstruct_current_version_is_identity() {
        let lesson = prepare_create(base_lesson());
        let got = reconstruct_version(&lesson, 1).unwrap();
        assert_eq!(got.version, 1);
        assert_eq!(got.title, lesson.title);
    }

    #[test]
    fn reconstruct_previous_truncates_history() {
        let v1 = prepare_create(base_lesson());
        let v2 = prepare_update(&v1, v1.clone(), "one");
        let v3 = prepare_update(&v2, v2.clone(), "two");

        let got = reconstruct_version(&v3, 2).unwrap();
        assert_eq!(got.version, 2);
        assert_eq!(got.updated_at, v3.version_history[1].timestamp);
        assert_eq!(got.version_history.len(), 1);
        assert_eq!(got.version_history[0].version, 1);
    }

    #[test]
    fn reconstruct_out_of_range_is_none() {
        let lesson = prepare_create(base_lesson());
        assert!(reconstruct_version(&lesson, 0).is_none());
        assert!(reconstruct_version(&lesson, 2).is_none());
    }

    #[test]
    fn version_list_descending() {
        let v1 = prepare_create(base_lesson());
        let v2 = prepare_update(&v1, v1.clone(), "one");
        let v3 = prepare_update(&v2, v2.clone(), "two");

        let versions = version_list(&v3);
        let numbers: Vec<_> = versions.iter().map(|v| v.version).collect();
        assert_eq!(numbers, vec![3, 2, 1]);
        assert_eq!(versions[0].change_summary, "Current version");
    }
}
