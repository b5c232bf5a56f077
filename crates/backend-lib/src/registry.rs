// ============================
// crates/backend-lib/src/registry.rs
// ============================
//! Presence and room registry.
//!
//! Tracks three tables behind a single lock:
//! - attached connections and their outbound queues,
//! - the presence roster (`userID` -> connection, first registration wins),
//! - room interest (`roomID` -> set of connections).
//!
//! Every operation takes the lock once, so concurrent registrations and
//! disconnects from different sockets are linearized. Delivery never awaits:
//! frames are pushed with `try_send` onto bounded per-connection queues and a
//! full or closed queue only costs that one recipient its copy.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use camwatch_common::{ExternalId, RosterEntry, ServerEvent};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::metrics::{RELAY_DELIVERED, RELAY_DROPPED, RELAY_ROSTER_SIZE};

/// Opaque transport-level handle, one per WebSocket
pub type ConnId = Uuid;

/// One encoded server event, shared by every recipient of a fan-out
pub type Frame = Arc<str>;

/// Sending half of a connection's outbound queue
pub type Outbound = mpsc::Sender<Frame>;

/// Result of a targeted delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Target not connected, or its queue is full or closed; the frame is dropped
    Undeliverable,
}

/// Result of a registration attempt. None of these is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Registered,
    /// An entry already exists and was left untouched
    Duplicate,
    /// The connection is not attached (already removed); nothing was recorded
    Detached,
}

#[derive(Debug)]
struct ClientEntry {
    user_id: ExternalId,
    conn: ConnId,
}

#[derive(Default)]
struct Tables {
    connections: HashMap<ConnId, Outbound>,
    // registration order is the roster order
    clients: Vec<ClientEntry>,
    rooms: HashMap<ExternalId, HashSet<ConnId>>,
}

impl Tables {
    fn roster(&self) -> Vec<ExternalId> {
        self.clients.iter().map(|c| c.user_id.clone()).collect()
    }

    fn broadcast_roster(&self) {
        let roster = ServerEvent::GetUsers(
            self.clients
                .iter()
                .map(|c| RosterEntry {
                    user_id: c.user_id.clone(),
                })
                .collect(),
        );
        gauge!(RELAY_ROSTER_SIZE).set(self.clients.len() as f64);

        if let Some(frame) = encode(&roster) {
            for (conn, outbound) in &self.connections {
                push(*conn, outbound, &frame);
            }
        }
    }
}

/// Shared presence and room bookkeeping for every live connection
#[derive(Default)]
pub struct PresenceRegistry {
    tables: Mutex<Tables>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a freshly accepted connection so it can receive frames.
    pub fn attach(&self, conn: ConnId, outbound: Outbound) {
        self.tables.lock().connections.insert(conn, outbound);
        debug!(%conn, "connection attached");
    }

    /// Record `user_id` as served by `conn` unless the user is already present.
    ///
    /// Every call that reaches an attached connection re-announces the roster
    /// to all connections, duplicates included.
    pub fn register_client(&self, user_id: ExternalId, conn: ConnId) -> Registration {
        let mut tables = self.tables.lock();
        if !tables.connections.contains_key(&conn) {
            return Registration::Detached;
        }

        let outcome = if tables.clients.iter().any(|c| c.user_id == user_id) {
            debug!(%conn, user = %user_id, "user already present, keeping first connection");
            Registration::Duplicate
        } else {
            debug!(%conn, user = %user_id, "user registered");
            tables.clients.push(ClientEntry { user_id, conn });
            Registration::Registered
        };

        tables.broadcast_roster();
        outcome
    }

    /// Mark `conn` as interested in `room`. No roster broadcast.
    pub fn register_room_interest(&self, room: ExternalId, conn: ConnId) -> Registration {
        let mut tables = self.tables.lock();
        if !tables.connections.contains_key(&conn) {
            return Registration::Detached;
        }

        if tables.rooms.entry(room).or_default().insert(conn) {
            Registration::Registered
        } else {
            Registration::Duplicate
        }
    }

    /// Drop every row keyed by `conn`. Safe to call any number of times.
    ///
    /// Returns whether the connection was still attached; only then is the
    /// new roster announced.
    pub fn remove_client(&self, conn: ConnId) -> bool {
        let mut tables = self.tables.lock();
        let attached = tables.connections.remove(&conn).is_some();

        tables.clients.retain(|c| c.conn != conn);
        tables.rooms.retain(|_, members| {
            members.remove(&conn);
            !members.is_empty()
        });

        if attached {
            debug!(%conn, "connection removed");
            tables.broadcast_roster();
        }
        attached
    }

    /// Deliver to the connection currently registered for `target`.
    pub fn route_direct(&self, target: &ExternalId, event: &ServerEvent) -> DeliveryOutcome {
        let Some(frame) = encode(event) else {
            return DeliveryOutcome::Undeliverable;
        };

        let tables = self.tables.lock();
        let outbound = tables
            .clients
            .iter()
            .find(|c| &c.user_id == target)
            .and_then(|c| tables.connections.get(&c.conn).map(|tx| (c.conn, tx)));

        match outbound {
            Some((conn, tx)) if push(conn, tx, &frame) => DeliveryOutcome::Delivered,
            Some(_) => DeliveryOutcome::Undeliverable,
            None => {
                debug!(user = %target, "direct target not connected, dropping");
                DeliveryOutcome::Undeliverable
            },
        }
    }

    /// Deliver to one connection regardless of registration state.
    pub fn deliver_to(&self, conn: ConnId, event: &ServerEvent) -> DeliveryOutcome {
        let Some(frame) = encode(event) else {
            return DeliveryOutcome::Undeliverable;
        };

        let tables = self.tables.lock();
        match tables.connections.get(&conn) {
            Some(tx) if push(conn, tx, &frame) => DeliveryOutcome::Delivered,
            _ => DeliveryOutcome::Undeliverable,
        }
    }

    /// Deliver to every attached connection except `sender`.
    /// Returns the number of connections that accepted the frame.
    pub fn route_broadcast_except_sender(&self, sender: ConnId, event: &ServerEvent) -> usize {
        let Some(frame) = encode(event) else {
            return 0;
        };

        let tables = self.tables.lock();
        tables
            .connections
            .iter()
            .filter(|(conn, _)| **conn != sender)
            .filter(|(conn, tx)| push(**conn, tx, &frame))
            .count()
    }

    /// Deliver to the members of `room` except `sender`.
    /// Returns the number of connections that accepted the frame.
    pub fn route_room_except_sender(
        &self,
        room: &ExternalId,
        sender: ConnId,
        event: &ServerEvent,
    ) -> usize {
        let Some(frame) = encode(event) else {
            return 0;
        };

        let tables = self.tables.lock();
        let Some(members) = tables.rooms.get(room) else {
            return 0;
        };
        members
            .iter()
            .filter(|conn| **conn != sender)
            .filter_map(|conn| tables.connections.get(conn).map(|tx| (*conn, tx)))
            .filter(|(conn, tx)| push(*conn, tx, &frame))
            .count()
    }

    /// Whether any live connection has joined `room`
    pub fn is_room_active(&self, room: &ExternalId) -> bool {
        self.tables.lock().rooms.contains_key(room)
    }

    /// Registered user IDs in registration order
    pub fn full_roster(&self) -> Vec<ExternalId> {
        self.tables.lock().roster()
    }

    pub fn connection_count(&self) -> usize {
        self.tables.lock().connections.len()
    }
}

fn encode(event: &ServerEvent) -> Option<Frame> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            warn!("failed to encode server event: {e}");
            None
        },
    }
}

fn push(conn: ConnId, outbound: &Outbound, frame: &Frame) -> bool {
    match outbound.try_send(Arc::clone(frame)) {
        Ok(()) => {
            counter!(RELAY_DELIVERED).increment(1);
            true
        },
        Err(TrySendError::Full(_)) => {
            warn!(%conn, "outbound queue full, dropping frame");
            counter!(RELAY_DROPPED).increment(1);
            false
        },
        Err(TrySendError::Closed(_)) => {
            debug!(%conn, "outbound queue closed, dropping frame");
            counter!(RELAY_DROPPED).increment(1);
            false
        },
    }
}
