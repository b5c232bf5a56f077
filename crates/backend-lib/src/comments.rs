// ============================
// crates/backend-lib/src/comments.rs
// ============================
//! Server-owned comment threads.
//!
//! Each course or blog thread is an append-ordered log addressed by stable
//! comment ids, either supplied by the poster or assigned here. Clients never
//! ship their own copy of the thread: edits and deletes act on this log, so two
//! concurrent editors cannot overwrite each other's snapshot.
use std::collections::{HashMap, HashSet};

use camwatch_common::{Comment, CommentDraft, CommentId, ThreadKind, ThreadRef};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;

/// Key of one thread: the same id may exist as a course and as a blog
pub type ThreadKey = (ThreadKind, camwatch_common::ExternalId);

/// Why a post was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostError {
    UnknownParent(CommentId),
    DuplicateId(CommentId),
    /// The thread already holds `CommentId::MAX`; no id is left to assign
    IdSpaceExhausted,
}

/// Fields the server writes itself; client copies never reach `extra`
const RESERVED_FIELDS: [&str; 6] = [
    "commenttable_id",
    "parent_id",
    "comment",
    "user",
    "commenttable_type",
    "created_at",
];

#[derive(Debug, Default)]
struct Thread {
    max_id: CommentId,
    // insertion order; a reply is always inserted after its parent
    comments: Vec<Comment>,
}

impl Thread {
    fn newest_first(&self) -> Vec<Comment> {
        self.comments.iter().rev().cloned().collect()
    }

    fn contains(&self, id: CommentId) -> bool {
        self.comments.iter().any(|c| c.commenttable_id == id)
    }
}

/// All comment threads of the process
#[derive(Debug, Default)]
pub struct CommentLog {
    threads: Mutex<HashMap<ThreadKey, Thread>>,
}

fn key(thread: &ThreadRef) -> ThreadKey {
    (thread.kind(), thread.id().clone())
}

impl CommentLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a comment and return it with the thread snapshot (newest first).
    ///
    /// A caller-supplied id is kept as long as it is unused in the thread;
    /// otherwise the next id above every id seen so far is assigned.
    pub fn post(&self, draft: CommentDraft, user: Value) -> Result<(Comment, Vec<Comment>), PostError> {
        let mut threads = self.threads.lock();
        let thread = threads.entry(key(&draft.thread)).or_default();

        if let Some(parent) = draft.parent_id {
            if !thread.contains(parent) {
                return Err(PostError::UnknownParent(parent));
            }
        }

        let id = match draft.commenttable_id {
            Some(id) if thread.contains(id) => return Err(PostError::DuplicateId(id)),
            Some(id) => id,
            None => thread.max_id.checked_add(1).ok_or(PostError::IdSpaceExhausted)?,
        };
        thread.max_id = thread.max_id.max(id);

        let mut extra = draft.extra;
        extra.retain(|k, _| !RESERVED_FIELDS.contains(&k.as_str()));

        let comment = Comment {
            commenttable_id: id,
            parent_id: draft.parent_id,
            comment: draft.comment,
            user,
            commenttable_type: draft.commenttable_type,
            created_at: Utc::now().timestamp_millis(),
            extra,
        };
        thread.comments.push(comment.clone());

        Ok((comment, thread.newest_first()))
    }

    /// Replace the text of comment `id`. `None` when the comment does not exist.
    pub fn update(&self, thread: &ThreadRef, id: CommentId, text: String) -> Option<Vec<Comment>> {
        let mut threads = self.threads.lock();
        let thread = threads.get_mut(&key(thread))?;
        let comment = thread.comments.iter_mut().find(|c| c.commenttable_id == id)?;
        comment.comment = text;
        Some(thread.newest_first())
    }

    /// Remove comment `id` together with every reply below it.
    /// `None` when the comment does not exist.
    pub fn delete(&self, thread: &ThreadRef, id: CommentId) -> Option<Vec<Comment>> {
        let mut threads = self.threads.lock();
        let thread = threads.get_mut(&key(thread))?;
        if !thread.contains(id) {
            return None;
        }

        // replies are inserted after their parents, so one forward pass collects the subtree
        let mut doomed = HashSet::from([id]);
        for c in &thread.comments {
            if c.parent_id.is_some_and(|p| doomed.contains(&p)) {
                doomed.insert(c.commenttable_id);
            }
        }
        thread.comments.retain(|c| !doomed.contains(&c.commenttable_id));

        Some(thread.newest_first())
    }

    /// Copy of one thread, newest first; empty for unknown threads
    pub fn snapshot(&self, thread: &ThreadRef) -> Vec<Comment> {
        self.threads
            .lock()
            .get(&key(thread))
            .map(Thread::newest_first)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camwatch_common::ExternalId;
    use serde_json::{json, Map};

    fn course(id: &str) -> ThreadRef {
        ThreadRef::Course(ExternalId::from(id))
    }

    fn draft(thread: ThreadRef, parent: Option<CommentId>, text: &str) -> CommentDraft {
        CommentDraft {
            thread,
            commenttable_id: None,
            commenttable_type: json!("course"),
            parent_id: parent,
            comment: text.to_string(),
            extra: Map::new(),
        }
    }

    fn texts(comments: &[Comment]) -> Vec<&str> {
        comments.iter().map(|c| c.comment.as_str()).collect()
    }

    #[test]
    fn test_post_assigns_increasing_ids_and_returns_newest_first() {
        let log = CommentLog::new();
        let (first, _) = log.post(draft(course("c1"), None, "one"), json!("ann")).unwrap();
        let (second, snapshot) = log.post(draft(course("c1"), None, "two"), json!("bob")).unwrap();

        assert_eq!(first.commenttable_id, 1);
        assert_eq!(second.commenttable_id, 2);
        assert_eq!(second.user, json!("bob"));
        assert_eq!(texts(&snapshot), vec!["two", "one"]);
    }

    #[test]
    fn test_threads_are_isolated_by_kind_and_id() {
        let log = CommentLog::new();
        log.post(draft(course("5"), None, "course five"), Value::Null).unwrap();
        log.post(draft(ThreadRef::Blog(ExternalId::from("5")), None, "blog five"), Value::Null)
            .unwrap();

        assert_eq!(texts(&log.snapshot(&course("5"))), vec!["course five"]);
        assert_eq!(
            texts(&log.snapshot(&ThreadRef::Blog(ExternalId::from("5")))),
            vec!["blog five"]
        );
        assert!(log.snapshot(&course("6")).is_empty());
    }

    #[test]
    fn test_reply_to_unknown_parent_is_refused() {
        let log = CommentLog::new();
        let res = log.post(draft(course("c1"), Some(9), "orphan"), Value::Null);
        assert_eq!(res.unwrap_err(), PostError::UnknownParent(9));
        assert!(log.snapshot(&course("c1")).is_empty());
    }

    #[test]
    fn test_update_changes_only_target() {
        let log = CommentLog::new();
        log.post(draft(course("c1"), None, "one"), Value::Null).unwrap();
        log.post(draft(course("c1"), None, "two"), Value::Null).unwrap();

        let snapshot = log.update(&course("c1"), 1, "uno".to_string()).unwrap();
        assert_eq!(texts(&snapshot), vec!["two", "uno"]);
        assert!(log.update(&course("c1"), 42, "nope".to_string()).is_none());
        assert!(log.update(&course("other"), 1, "nope".to_string()).is_none());
    }

    #[test]
    fn test_delete_removes_whole_subtree() {
        let log = CommentLog::new();
        log.post(draft(course("c1"), None, "root"), Value::Null).unwrap(); // 1
        log.post(draft(course("c1"), Some(1), "reply"), Value::Null).unwrap(); // 2
        log.post(draft(course("c1"), Some(2), "nested"), Value::Null).unwrap(); // 3
        log.post(draft(course("c1"), None, "other"), Value::Null).unwrap(); // 4

        let snapshot = log.delete(&course("c1"), 1).unwrap();
        assert_eq!(texts(&snapshot), vec!["other"]);
        assert!(log.delete(&course("c1"), 1).is_none());
    }

    #[test]
    fn test_caller_supplied_ids_are_kept_and_unique() {
        let log = CommentLog::new();
        let mut with_id = draft(course("c1"), None, "from db");
        with_id.commenttable_id = Some(500);
        let (stored, _) = log.post(with_id.clone(), Value::Null).unwrap();
        assert_eq!(stored.commenttable_id, 500);

        assert_eq!(
            log.post(with_id, Value::Null).unwrap_err(),
            PostError::DuplicateId(500)
        );

        // assigned ids continue above the highest one seen
        let (next, _) = log.post(draft(course("c1"), Some(500), "reply"), Value::Null).unwrap();
        assert_eq!(next.commenttable_id, 501);
        assert_eq!(next.parent_id, Some(500));
    }

    #[test]
    fn test_assignment_stops_at_the_top_of_the_id_space() {
        let log = CommentLog::new();
        let mut top = draft(course("c1"), None, "last");
        top.commenttable_id = Some(CommentId::MAX);
        log.post(top, Value::Null).unwrap();

        let res = log.post(draft(course("c1"), None, "one more"), Value::Null);
        assert_eq!(res.unwrap_err(), PostError::IdSpaceExhausted);
        assert_eq!(log.snapshot(&course("c1")).len(), 1);
    }

    #[test]
    fn test_client_copies_of_server_fields_are_dropped() {
        let log = CommentLog::new();
        let mut d = draft(course("c1"), None, "hi");
        d.extra.insert("created_at".to_string(), json!("2024-01-01"));
        d.extra.insert("user".to_string(), json!("u"));
        d.extra.insert("avatar".to_string(), json!("a.png"));

        let (comment, _) = log.post(d, json!("srv")).unwrap();
        assert_eq!(comment.extra.len(), 1);
        assert_eq!(comment.extra["avatar"], json!("a.png"));

        // serializes without duplicate keys, so it decodes back
        let encoded = serde_json::to_string(&comment).unwrap();
        let decoded: Comment = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.user, json!("srv"));
        assert_eq!(decoded, comment);
    }

    #[test]
    fn test_ids_are_not_reused_after_delete() {
        let log = CommentLog::new();
        log.post(draft(course("c1"), None, "a"), Value::Null).unwrap();
        log.delete(&course("c1"), 1).unwrap();
        let (next, _) = log.post(draft(course("c1"), None, "b"), Value::Null).unwrap();
        assert_eq!(next.commenttable_id, 2);
    }
}
