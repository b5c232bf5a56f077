// ================
// common/src/lib.rs
// ================
//! Wire types shared by the relay server and its clients.
//!
//! Every WebSocket text frame is a JSON object of the form
//! `{"event": "<name>", "data": <payload>}`. The event names are the ones the
//! browser front-end already speaks (`add-new-user`, `send-comment`, ...).

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Comment identifier, unique within one thread
pub type CommentId = u64;

/// Application-level identifier (user, course or blog).
///
/// Front-ends send these either as strings or as bare numbers; both decode to
/// the same textual form so `42` and `"42"` address the same room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ExternalId(pub String);

impl ExternalId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExternalId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ExternalId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Serialize for ExternalId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ExternalId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl Visitor<'_> for IdVisitor {
            type Value = ExternalId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string or integer identifier")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ExternalId, E> {
                Ok(ExternalId(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<ExternalId, E> {
                Ok(ExternalId(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<ExternalId, E> {
                Ok(ExternalId(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<ExternalId, E> {
                Ok(ExternalId(v.to_string()))
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}

/// Which family of comment thread a payload belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadKind {
    Course,
    Blog,
}

impl ThreadKind {
    /// Name of the JSON field carrying the thread id (`course_id` / `blog_id`)
    pub fn id_field(self) -> &'static str {
        match self {
            ThreadKind::Course => "course_id",
            ThreadKind::Blog => "blog_id",
        }
    }
}

impl fmt::Display for ThreadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadKind::Course => f.write_str("course"),
            ThreadKind::Blog => f.write_str("blog"),
        }
    }
}

/// Thread reference as it appears on the wire: either `"course_id": ..` or
/// `"blog_id": ..`, flattened into the surrounding payload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub enum ThreadRef {
    #[serde(rename = "course_id")]
    Course(ExternalId),
    #[serde(rename = "blog_id")]
    Blog(ExternalId),
}

impl ThreadRef {
    pub fn new(kind: ThreadKind, id: ExternalId) -> Self {
        match kind {
            ThreadKind::Course => ThreadRef::Course(id),
            ThreadKind::Blog => ThreadRef::Blog(id),
        }
    }

    pub fn kind(&self) -> ThreadKind {
        match self {
            ThreadRef::Course(_) => ThreadKind::Course,
            ThreadRef::Blog(_) => ThreadKind::Blog,
        }
    }

    pub fn id(&self) -> &ExternalId {
        match self {
            ThreadRef::Course(id) | ThreadRef::Blog(id) => id,
        }
    }
}

/// Messages sent from client to server
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Announce the application user behind this connection
    #[serde(rename = "add-new-user")]
    AddNewUser(ExternalId),
    /// Direct message for one user, relayed verbatim
    #[serde(rename = "send-message")]
    SendMessage(DirectMessage),
    /// Express interest in a course or blog comment room
    #[serde(rename = "add-new-comment")]
    AddNewComment(ExternalId),
    #[serde(rename = "send-comment")]
    SendComment(NewComment),
    #[serde(rename = "delete-comment")]
    DeleteComment(DeleteComment),
    #[serde(rename = "update-comment")]
    UpdateComment(UpdateComment),
    #[serde(rename = "send-commentBlog")]
    SendCommentBlog(NewComment),
    #[serde(rename = "delete-commentBlog")]
    DeleteCommentBlog(DeleteComment),
    #[serde(rename = "update-commentBlog")]
    UpdateCommentBlog(UpdateComment),
}

impl ClientEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::AddNewUser(_) => "add-new-user",
            ClientEvent::SendMessage(_) => "send-message",
            ClientEvent::AddNewComment(_) => "add-new-comment",
            ClientEvent::SendComment(_) => "send-comment",
            ClientEvent::DeleteComment(_) => "delete-comment",
            ClientEvent::UpdateComment(_) => "update-comment",
            ClientEvent::SendCommentBlog(_) => "send-commentBlog",
            ClientEvent::DeleteCommentBlog(_) => "delete-commentBlog",
            ClientEvent::UpdateCommentBlog(_) => "update-commentBlog",
        }
    }
}

/// Chat message addressed to a single user
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DirectMessage {
    #[serde(rename = "receiverId")]
    pub receiver_id: ExternalId,
    /// Everything else the sender attached (text, sender id, timestamps ...)
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

/// A comment as submitted by a client (`datas` on the wire)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CommentDraft {
    #[serde(flatten)]
    pub thread: ThreadRef,
    /// Id already assigned by the caller's own store; the server picks one when absent
    #[serde(default)]
    pub commenttable_id: Option<CommentId>,
    #[serde(default)]
    pub commenttable_type: Value,
    #[serde(default, alias = "parentID")]
    pub parent_id: Option<CommentId>,
    #[serde(default)]
    pub comment: String,
    /// Any extra presentation fields, stored and echoed untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of `send-comment` / `send-commentBlog`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NewComment {
    pub datas: CommentDraft,
    #[serde(default)]
    pub user: Value,
}

/// Payload of `delete-comment` / `delete-commentBlog`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeleteComment {
    #[serde(flatten)]
    pub thread: ThreadRef,
    pub commenttable_id: CommentId,
    #[serde(rename = "parentID", default)]
    pub parent_id: Value,
    #[serde(rename = "type", default)]
    pub kind: Value,
}

/// Payload of `update-comment` / `update-commentBlog`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UpdateComment {
    #[serde(flatten)]
    pub thread: ThreadRef,
    pub commenttable_id: CommentId,
    pub comment: String,
    #[serde(rename = "type", default)]
    pub kind: Value,
}

/// A comment held in the server-side thread log
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Comment {
    pub commenttable_id: CommentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CommentId>,
    pub comment: String,
    #[serde(default)]
    pub user: Value,
    #[serde(default)]
    pub commenttable_type: Value,
    /// Milliseconds since the Unix epoch
    pub created_at: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of the presence roster
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    #[serde(rename = "userID")]
    pub user_id: ExternalId,
}

/// Fan-out of a freshly posted comment
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CommentPosted {
    #[serde(flatten)]
    pub thread: ThreadRef,
    pub datas: Comment,
    pub commenttable_type: Value,
    /// Whole thread, newest first
    #[serde(rename = "receivedComments")]
    pub received_comments: Vec<Comment>,
}

/// Fan-out after a comment (and its replies) was removed
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CommentsPruned {
    #[serde(flatten)]
    pub thread: ThreadRef,
    #[serde(rename = "parentID")]
    pub parent_id: Value,
    #[serde(rename = "type")]
    pub kind: Value,
    #[serde(rename = "newComments")]
    pub new_comments: Vec<Comment>,
}

/// Fan-out after a comment text was edited
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CommentsEdited {
    #[serde(flatten)]
    pub thread: ThreadRef,
    #[serde(rename = "type")]
    pub kind: Value,
    pub comments: Vec<Comment>,
}

/// Messages sent from server to client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Full presence roster, in registration order
    #[serde(rename = "get-users")]
    GetUsers(Vec<RosterEntry>),
    #[serde(rename = "receive-message")]
    ReceiveMessage(DirectMessage),
    #[serde(rename = "receive-comment")]
    ReceiveComment(CommentPosted),
    #[serde(rename = "respond-delete-comment")]
    RespondDeleteComment(CommentsPruned),
    #[serde(rename = "update-respond-comment")]
    UpdateRespondComment(CommentsEdited),
    #[serde(rename = "receive-commentBlog")]
    ReceiveCommentBlog(CommentPosted),
    #[serde(rename = "respond-delete-commentBlog")]
    RespondDeleteCommentBlog(CommentsPruned),
    #[serde(rename = "update-respond-commentBlog")]
    UpdateRespondCommentBlog(CommentsEdited),
    /// Rejection of a frame sent by this connection
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ServerEvent {
    pub fn comment_posted(payload: CommentPosted) -> Self {
        match payload.thread.kind() {
            ThreadKind::Course => ServerEvent::ReceiveComment(payload),
            ThreadKind::Blog => ServerEvent::ReceiveCommentBlog(payload),
        }
    }

    pub fn comments_pruned(payload: CommentsPruned) -> Self {
        match payload.thread.kind() {
            ThreadKind::Course => ServerEvent::RespondDeleteComment(payload),
            ThreadKind::Blog => ServerEvent::RespondDeleteCommentBlog(payload),
        }
    }

    pub fn comments_edited(payload: CommentsEdited) -> Self {
        match payload.thread.kind() {
            ThreadKind::Course => ServerEvent::UpdateRespondComment(payload),
            ThreadKind::Blog => ServerEvent::UpdateRespondCommentBlog(payload),
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_and_string_ids_decode_alike() {
        let a: ClientEvent =
            serde_json::from_value(json!({"event": "add-new-comment", "data": 42})).unwrap();
        let b: ClientEvent =
            serde_json::from_value(json!({"event": "add-new-comment", "data": "42"})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_direct_message_keeps_extra_fields() {
        let raw = json!({
            "event": "send-message",
            "data": {"receiverId": "u1", "text": "hi", "senderId": "u2"}
        });
        let event: ClientEvent = serde_json::from_value(raw).unwrap();
        let ClientEvent::SendMessage(msg) = event else {
            panic!("wrong variant");
        };
        assert_eq!(msg.receiver_id.as_str(), "u1");
        assert_eq!(msg.body["text"], "hi");

        let relayed = serde_json::to_value(ServerEvent::ReceiveMessage(msg)).unwrap();
        assert_eq!(relayed["event"], "receive-message");
        assert_eq!(relayed["data"], json!({"receiverId": "u1", "text": "hi", "senderId": "u2"}));
    }

    #[test]
    fn test_comment_draft_splits_thread_and_extra() {
        let raw = json!({
            "event": "send-commentBlog",
            "data": {
                "datas": {"blog_id": 7, "commenttable_type": "blog", "comment": "nice", "avatar": "a.png"},
                "user": {"name": "ann"},
                "comments": []
            }
        });
        let event: ClientEvent = serde_json::from_value(raw).unwrap();
        let ClientEvent::SendCommentBlog(new) = event else {
            panic!("wrong variant");
        };
        assert_eq!(new.datas.thread, ThreadRef::Blog(ExternalId::from("7")));
        assert_eq!(new.datas.comment, "nice");
        assert_eq!(new.datas.extra.get("avatar"), Some(&json!("a.png")));
        assert!(!new.datas.extra.contains_key("blog_id"));
    }

    #[test]
    fn test_pruned_event_uses_thread_field_name() {
        let event = ServerEvent::comments_pruned(CommentsPruned {
            thread: ThreadRef::Course(ExternalId::from("c1")),
            parent_id: Value::Null,
            kind: json!("lesson"),
            new_comments: vec![],
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "respond-delete-comment");
        assert_eq!(value["data"]["course_id"], "c1");
        assert_eq!(value["data"]["type"], "lesson");
        assert!(value["data"]["newComments"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let res = serde_json::from_value::<ClientEvent>(json!({"event": "nope", "data": 1}));
        assert!(res.is_err());
    }
}
