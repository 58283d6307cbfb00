//! Room hub.
//!
//! A room is the shared routing authority for every session on one listening
//! endpoint.
//!
//! ## Responsibilities
//!
//! - Membership: track joined participants by [`SessionId`]
//! - History: keep a bounded FIFO of the most recently delivered frames
//! - Routing: hand each delivered frame to its recipients' outbound queues
//!
//! ## Design
//!
//! - One mutex guards membership and history together, so a frame's history
//!   position and its enqueue order agree for every recipient
//! - Enqueueing never blocks, so the lock is never held across an await
//! - Members are `Arc<dyn Participant>`: the room shares each session's
//!   lifetime but does not own its transport

use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use parley_proto::Frame;

use crate::{Environment, RoomError, SessionError, SessionId};

/// Default number of frames retained in a room's history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Ids drawn by [`Room::vacant_id`] before giving up.
pub const MAX_ID_ATTEMPTS: usize = 16;

/// Something the room can deliver frames to.
pub trait Participant: Send + Sync {
    /// Stable id of this participant.
    fn id(&self) -> &SessionId;

    /// Append a frame to this participant's outbound queue.
    ///
    /// Must not block. Returns [`SessionError::Closed`] once the participant
    /// has shut down; the room then drops it from the membership.
    fn enqueue_outbound(&self, frame: Frame) -> Result<(), SessionError>;
}

/// How a room routes delivered frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryPolicy {
    /// Send each frame only to the member named by its `Recipient:` tag.
    /// Frames without a tag, or naming nobody present, are dropped.
    #[default]
    Addressed,

    /// Send each frame to every member.
    Broadcast {
        /// Whether the sender receives its own frame
        include_sender: bool,
    },
}

/// Room configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomConfig {
    /// Routing policy
    pub delivery: DeliveryPolicy,
    /// Replay the history to each new member when it joins
    pub replay_history: bool,
    /// Maximum number of frames kept in the history
    pub history_capacity: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            delivery: DeliveryPolicy::default(),
            replay_history: false,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// Outcome of [`Room::deliver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Frame was enqueued to this many members.
    Broadcast {
        /// Number of members that accepted the frame
        recipients: usize,
    },

    /// Frame was enqueued to its tagged recipient.
    Addressed {
        /// The member that received the frame
        recipient: SessionId,
    },

    /// Addressed frame matched no member and was dropped.
    RoutingMiss,
}

struct RoomState {
    members: HashMap<SessionId, Arc<dyn Participant>>,
    history: VecDeque<Frame>,
}

/// Shared membership and history for one endpoint.
pub struct Room {
    config: RoomConfig,
    state: Mutex<RoomState>,
}

impl Room {
    /// Create an empty room.
    pub fn new(config: RoomConfig) -> Self {
        let history = VecDeque::with_capacity(config.history_capacity.min(1024));
        Self { config, state: Mutex::new(RoomState { members: HashMap::new(), history }) }
    }

    /// Room configuration.
    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    // Every mutation leaves the state consistent before it can panic, so a
    // poisoned lock is still safe to use.
    fn state(&self) -> MutexGuard<'_, RoomState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a participant to the room.
    ///
    /// With `replay_history` enabled the current history is enqueued to the
    /// newcomer before it becomes visible to `deliver`, so replayed frames
    /// always precede live ones.
    ///
    /// # Errors
    ///
    /// - `RoomError::IdInUse` if a member already has this id
    /// - `RoomError::ParticipantClosed` if the participant closed during
    ///   replay
    pub fn join(&self, participant: Arc<dyn Participant>) -> Result<(), RoomError> {
        let mut state = self.state();
        let id = participant.id().clone();

        if state.members.contains_key(&id) {
            return Err(RoomError::IdInUse(id));
        }

        if self.config.replay_history {
            for frame in &state.history {
                if participant.enqueue_outbound(frame.clone()).is_err() {
                    return Err(RoomError::ParticipantClosed(id));
                }
            }
        }

        state.members.insert(id.clone(), participant);
        tracing::info!(session_id = %id, members = state.members.len(), "joined room");

        Ok(())
    }

    /// Remove a participant from the room.
    ///
    /// Idempotent. Only removes the entry if it is this very participant, so
    /// a stale session can never evict a newer one that reused its id.
    /// Returns whether anything was removed.
    pub fn leave(&self, participant: &dyn Participant) -> bool {
        let mut state = self.state();
        let id = participant.id();

        let is_member = state.members.get(id).is_some_and(|member| {
            std::ptr::addr_eq(Arc::as_ptr(member), std::ptr::from_ref(participant))
        });
        if !is_member {
            return false;
        }

        state.members.remove(id);
        tracing::info!(session_id = %id, members = state.members.len(), "left room");
        true
    }

    /// Record a frame in the history and route it to its recipients.
    ///
    /// Members whose queue refuses the frame are dropped from the room.
    pub fn deliver(&self, sender: &SessionId, frame: Frame) -> Delivery {
        let mut state = self.state();
        state.record(frame.clone(), self.config.history_capacity);

        let mut gone = Vec::new();
        let delivery = match self.config.delivery {
            DeliveryPolicy::Broadcast { include_sender } => {
                let mut recipients = 0;
                for (id, member) in &state.members {
                    if !include_sender && id == sender {
                        continue;
                    }
                    if member.enqueue_outbound(frame.clone()).is_ok() {
                        recipients += 1;
                    } else {
                        gone.push(id.clone());
                    }
                }
                Delivery::Broadcast { recipients }
            },
            DeliveryPolicy::Addressed => {
                let target = frame
                    .recipient()
                    .and_then(|tag| std::str::from_utf8(tag).ok())
                    .and_then(|tag| state.members.get_key_value(tag));

                match target {
                    Some((id, member)) => {
                        if member.enqueue_outbound(frame.clone()).is_ok() {
                            Delivery::Addressed { recipient: id.clone() }
                        } else {
                            gone.push(id.clone());
                            Delivery::RoutingMiss
                        }
                    },
                    None => Delivery::RoutingMiss,
                }
            },
        };

        for id in gone {
            state.members.remove(&id);
            tracing::debug!(session_id = %id, "dropped closed member");
        }

        tracing::trace!(%sender, len = frame.body_len(), ?delivery, "delivered frame");
        delivery
    }

    /// Draw an id from `env` that no current member uses.
    ///
    /// Returns `None` if every attempt collided, which only happens with a
    /// broken RNG or an absurdly full room. A concurrent join can still take
    /// the id before the caller does; `join` catches that with `IdInUse`.
    pub fn vacant_id(&self, env: &impl Environment) -> Option<SessionId> {
        (0..MAX_ID_ATTEMPTS).map(|_| env.generate_id()).find(|id| !self.contains(id.as_str()))
    }

    /// Check whether a member with this id is present.
    pub fn contains(&self, id: &str) -> bool {
        self.state().members.contains_key(id)
    }

    /// Ids of all current members, sorted.
    pub fn member_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.state().members.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of current members.
    pub fn member_count(&self) -> usize {
        self.state().members.len()
    }

    /// Snapshot of the history, oldest first.
    pub fn history(&self) -> Vec<Frame> {
        self.state().history.iter().cloned().collect()
    }

    /// Number of frames in the history.
    pub fn history_len(&self) -> usize {
        self.state().history.len()
    }
}

impl RoomState {
    fn record(&mut self, frame: Frame, capacity: usize) {
        self.history.push_back(frame);
        while self.history.len() > capacity {
            self.history.pop_front();
        }
    }
}

impl Default for Room {
    fn default() -> Self {
        Self::new(RoomConfig::default())
    }
}

impl fmt::Debug for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Room")
            .field("config", &self.config)
            .field("member_count", &state.members.len())
            .field("history_len", &state.history.len())
            .finish()
    }
}
