//! Key encoding utilities for the document store.
//!
//! All index keys are designed for efficient prefix scans. Variable-length
//! string components are terminated with a `0x00` separator (none of the
//! indexed strings may contain NUL).

use chrono::{DateTime, Utc};
use lessoncraft_core::{LessonId, PlaygroundId, SessionId};

/// Encode a lesson key (the UUID bytes).
#[must_use]
pub fn lesson_key(id: &LessonId) -> Vec<u8> {
    id.as_uuid().as_bytes().to_vec()
}

/// Encode a title index key: `title || 0x00 || lesson_id`.
#[must_use]
pub fn lesson_title_key(title: &str, id: &LessonId) -> Vec<u8> {
    let mut key = Vec::with_capacity(title.len() + 17);
    key.extend_from_slice(title.as_bytes());
    key.push(0);
    key.extend_from_slice(id.as_uuid().as_bytes());
    key
}

/// Encode a created-at index key: `timestamp_be || lesson_id`.
///
/// The big-endian nanosecond timestamp makes lexicographic order equal
/// chronological order.
#[must_use]
pub fn lesson_created_key(created_at: DateTime<Utc>, id: &LessonId) -> Vec<u8> {
    let nanos = created_at.timestamp_nanos_opt().unwrap_or(0);
    let mut key = Vec::with_capacity(24);
    // Offset by i64::MIN so pre-epoch timestamps still sort correctly as
    // unsigned bytes.
    key.extend_from_slice(&(nanos as i128 - i128::from(i64::MIN)).to_be_bytes()[8..16]);
    key.extend_from_slice(id.as_uuid().as_bytes());
    key
}

/// Encode a tag index key: `tag || 0x00 || lesson_id`.
#[must_use]
pub fn lesson_tag_key(tag: &str, id: &LessonId) -> Vec<u8> {
    let mut key = Vec::with_capacity(tag.len() + 17);
    key.extend_from_slice(tag.as_bytes());
    key.push(0);
    key.extend_from_slice(id.as_uuid().as_bytes());
    key
}

/// Encode a tag prefix for scanning all lessons with a tag.
#[must_use]
pub fn lesson_tag_prefix(tag: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(tag.len() + 1);
    key.extend_from_slice(tag.as_bytes());
    key.push(0);
    key
}

/// Extract the lesson ID from the trailing 16 bytes of an index key.
///
/// # Panics
///
/// Panics if the key is shorter than 16 bytes.
#[must_use]
pub fn extract_lesson_id(key: &[u8]) -> LessonId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[key.len() - 16..]);
    LessonId::from_uuid(uuid::Uuid::from_bytes(bytes))
}

/// Encode a session key (the UUID bytes).
#[must_use]
pub fn session_key(id: &SessionId) -> Vec<u8> {
    id.as_uuid().as_bytes().to_vec()
}

/// Encode a playground-session index key:
/// `playground_id || 0x00 || session_id`.
#[must_use]
pub fn playground_session_key(playground_id: &PlaygroundId, session_id: &SessionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(playground_id.as_str().len() + 17);
    key.extend_from_slice(playground_id.as_str().as_bytes());
    key.push(0);
    key.extend_from_slice(session_id.as_uuid().as_bytes());
    key
}

/// Encode a playground prefix for scanning its sessions.
#[must_use]
pub fn playground_prefix(playground_id: &PlaygroundId) -> Vec<u8> {
    let mut key = Vec::with_capacity(playground_id.as_str().len() + 1);
    key.extend_from_slice(playground_id.as_str().as_bytes());
    key.push(0);
    key
}

/// Extract the session ID from the trailing 16 bytes of an index key.
///
/// # Panics
///
/// Panics if the key is shorter than 16 bytes.
#[must_use]
pub fn extract_session_id(key: &[u8]) -> SessionId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[key.len() - 16..]);
    SessionId::from_uuid(uuid::Uuid::from_bytes(bytes))
}

/// Encode a session-instance index key: `session_id || name`.
#[must_use]
pub fn session_instance_key(session_id: &SessionId, name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + name.len());
    key.extend_from_slice(session_id.as_uuid().as_bytes());
    key.extend_from_slice(name.as_bytes());
    key
}

/// Encode a session prefix for scanning its instances.
#[must_use]
pub fn session_prefix(session_id: &SessionId) -> Vec<u8> {
    session_id.as_uuid().as_bytes().to_vec()
}

/// Extract the instance name from a session-instance index key.
#[must_use]
pub fn extract_instance_name(key: &[u8]) -> String {
    String::from_utf8_lossy(&key[16..]).to_string()
}
