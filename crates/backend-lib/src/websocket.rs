// ==================
// crates/backend-lib/src/websocket.rs
// ==================
//! WebSocket Handler Module
//!
//! One `RelayHandler` lives per connection. It turns transport callbacks
//! (connect, text frame, disconnect) into registry and comment-log operations:
//! - `add-new-user` / `add-new-comment` register presence and room interest,
//! - `send-message` is routed to exactly one user,
//! - comment events mutate the server-side thread and fan the new state out.
//!
//! Malformed or invalid frames never reach the registry; the sender gets an
//! `error` event instead.
use std::sync::Arc;

use camwatch_common::{
    ClientEvent, CommentPosted, CommentsEdited, CommentsPruned, DeleteComment, NewComment,
    ExternalId, ServerEvent, UpdateComment,
};
use metrics::counter;
use tracing::{debug, info};

use crate::comments::PostError;
use crate::config::BroadcastScope;
use crate::metrics::WS_REJECTED_FRAME;
use crate::registry::{ConnId, DeliveryOutcome, Outbound, Registration};
use crate::validation;
use crate::AppState;

/// Per-connection event handler
pub struct RelayHandler {
    state: Arc<AppState>,
    conn_id: ConnId,
}

impl RelayHandler {
    pub fn new(state: Arc<AppState>, conn_id: ConnId) -> Self {
        Self { state, conn_id }
    }

    pub fn conn_id(&self) -> ConnId {
        self.conn_id
    }

    /// Make this connection reachable for deliveries
    pub fn on_connect(&self, outbound: Outbound) {
        self.state.registry.attach(self.conn_id, outbound);
    }

    /// Drop every registration of this connection. Also runs on drop.
    pub fn on_disconnect(&self) {
        self.state.registry.remove_client(self.conn_id);
    }

    /// Decode, validate and dispatch one text frame
    pub fn on_text(&self, text: &str) {
        let event = match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => event,
            Err(e) => {
                self.reject("MALFORMED_MESSAGE", e.to_string());
                return;
            },
        };

        if let Err(e) = validation::validate_client_event(&event) {
            self.reject(e.code(), e.to_string());
            return;
        }

        self.handle_event(event);
    }

    /// Dispatch an already validated event
    pub fn handle_event(&self, event: ClientEvent) {
        let registry = &self.state.registry;
        match event {
            ClientEvent::AddNewUser(user_id) => {
                let outcome = registry.register_client(user_id.clone(), self.conn_id);
                if outcome == Registration::Registered {
                    info!(conn = %self.conn_id, user = %user_id, "user connected");
                }
            },
            ClientEvent::SendMessage(msg) => {
                let target = msg.receiver_id.clone();
                let outcome = registry.route_direct(&target, &ServerEvent::ReceiveMessage(msg));
                if outcome == DeliveryOutcome::Undeliverable {
                    debug!(conn = %self.conn_id, user = %target, "direct message dropped");
                }
            },
            ClientEvent::AddNewComment(room) => {
                registry.register_room_interest(room, self.conn_id);
            },
            ClientEvent::SendComment(new) | ClientEvent::SendCommentBlog(new) => {
                self.post_comment(new);
            },
            ClientEvent::DeleteComment(del) | ClientEvent::DeleteCommentBlog(del) => {
                self.delete_comment(del);
            },
            ClientEvent::UpdateComment(upd) | ClientEvent::UpdateCommentBlog(upd) => {
                self.update_comment(upd);
            },
        }
    }

    fn post_comment(&self, new: NewComment) {
        let thread = new.datas.thread.clone();
        let room = thread.id().clone();
        if !self.accepts(&room) {
            return;
        }

        let assigned_here = new.datas.commenttable_id.is_none();
        let commenttable_type = new.datas.commenttable_type.clone();
        match self.state.comments.post(new.datas, new.user) {
            Ok((comment, snapshot)) => {
                let event = ServerEvent::comment_posted(CommentPosted {
                    thread,
                    datas: comment,
                    commenttable_type,
                    received_comments: snapshot,
                });
                self.fan_out(&room, &event);
                // the poster only learns a server-picked id from the echo
                if assigned_here {
                    self.state.registry.deliver_to(self.conn_id, &event);
                }
            },
            Err(PostError::UnknownParent(id)) => {
                self.reject("UNKNOWN_COMMENT", format!("Parent comment {id} does not exist"));
            },
            Err(PostError::DuplicateId(id)) => {
                self.reject("DUPLICATE_COMMENT", format!("Comment {id} already exists"));
            },
            Err(PostError::IdSpaceExhausted) => {
                self.reject("ID_SPACE_EXHAUSTED", "No comment id left in this thread".to_string());
            },
        }
    }

    fn delete_comment(&self, del: DeleteComment) {
        let room = del.thread.id().clone();
        if !self.accepts(&room) {
            return;
        }

        match self.state.comments.delete(&del.thread, del.commenttable_id) {
            Some(new_comments) => {
                let event = ServerEvent::comments_pruned(CommentsPruned {
                    thread: del.thread,
                    parent_id: del.parent_id,
                    kind: del.kind,
                    new_comments,
                });
                self.fan_out(&room, &event);
            },
            None => self.unknown_comment(del.commenttable_id),
        }
    }

    fn update_comment(&self, upd: UpdateComment) {
        let room = upd.thread.id().clone();
        if !self.accepts(&room) {
            return;
        }

        match self
            .state
            .comments
            .update(&upd.thread, upd.commenttable_id, upd.comment)
        {
            Some(comments) => {
                let event = ServerEvent::comments_edited(CommentsEdited {
                    thread: upd.thread,
                    kind: upd.kind,
                    comments,
                });
                self.fan_out(&room, &event);
            },
            None => self.unknown_comment(upd.commenttable_id),
        }
    }

    /// Comment traffic is relayed only while somebody has joined the room
    fn accepts(&self, room: &ExternalId) -> bool {
        let active = self.state.registry.is_room_active(room);
        if !active {
            debug!(conn = %self.conn_id, %room, "comment for inactive room ignored");
        }
        active
    }

    fn fan_out(&self, room: &ExternalId, event: &ServerEvent) -> usize {
        let registry = &self.state.registry;
        let delivered = match self.state.settings.relay.broadcast_scope {
            BroadcastScope::Room => registry.route_room_except_sender(room, self.conn_id, event),
            BroadcastScope::All => registry.route_broadcast_except_sender(self.conn_id, event),
        };
        debug!(conn = %self.conn_id, %room, delivered, "comment fan-out");
        delivered
    }

    fn unknown_comment(&self, id: u64) {
        self.reject("UNKNOWN_COMMENT", format!("Comment {id} does not exist"));
    }

    fn reject(&self, code: &str, message: String) {
        counter!(WS_REJECTED_FRAME).increment(1);
        debug!(conn = %self.conn_id, code, "rejecting client frame: {message}");
        self.state
            .registry
            .deliver_to(self.conn_id, &ServerEvent::error(code, message));
    }
}

impl Drop for RelayHandler {
    // the connection task may unwind; presence must not outlive it
    fn drop(&mut self) {
        self.on_disconnect();
    }
}
