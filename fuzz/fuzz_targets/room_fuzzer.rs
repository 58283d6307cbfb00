//! Fuzz target for [`Room`] membership and routing
//!
//! # Strategy
//!
//! - Event sequences: joins, leaves, closes and deliveries in any order
//! - Id collisions: a small id space so duplicate joins are common
//! - Addressing: bodies tagged with present, absent and truncated recipients
//!
//! # Invariants
//!
//! - History never exceeds its capacity and keeps the newest frames
//! - A duplicate join NEVER replaces the existing member
//! - A stale participant NEVER evicts a newer one with the same id
//! - Closed participants are dropped on their first failed delivery
//! - Addressed frames reach only the tagged member

#![no_main]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parley_core::{
    Delivery, DeliveryPolicy, Participant, Room, RoomConfig, SessionError, SessionId, ID_ALPHABET,
};
use parley_proto::Frame;

struct Member {
    id: SessionId,
    closed: AtomicBool,
    received: Mutex<Vec<Frame>>,
}

impl Participant for Member {
    fn id(&self) -> &SessionId {
        &self.id
    }

    fn enqueue_outbound(&self, frame: Frame) -> Result<(), SessionError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SessionError::Closed);
        }
        self.received.lock().expect("mutex poisoned").push(frame);
        Ok(())
    }
}

#[derive(Debug, Arbitrary)]
enum RoomEvent {
    Join { slot: u8 },
    Leave { slot: u8 },
    Close { slot: u8 },
    Send { from: u8, to: Option<u8>, text: String },
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    broadcast: bool,
    include_sender: bool,
    history_capacity: u8,
    events: Vec<RoomEvent>,
}

fn slot_id(slot: u8) -> SessionId {
    let c = char::from(ID_ALPHABET[usize::from(slot % 4)]);
    let text: String = std::iter::repeat(c).take(5).collect();
    SessionId::parse(&text).expect("alphabet id")
}

fuzz_target!(|input: FuzzInput| {
    let delivery = if input.broadcast {
        DeliveryPolicy::Broadcast { include_sender: input.include_sender }
    } else {
        DeliveryPolicy::Addressed
    };
    let capacity = usize::from(input.history_capacity);
    let room = Room::new(RoomConfig { delivery, history_capacity: capacity, ..RoomConfig::default() });

    // Every member ever created, so stale handles can be replayed.
    let mut created: Vec<Arc<Member>> = Vec::new();
    let mut live: HashMap<SessionId, Arc<Member>> = HashMap::new();
    let mut delivered = 0usize;

    for event in input.events {
        match event {
            RoomEvent::Join { slot } => {
                let member = Arc::new(Member {
                    id: slot_id(slot),
                    closed: AtomicBool::new(false),
                    received: Mutex::new(Vec::new()),
                });
                let joined = room.join(Arc::clone(&member) as Arc<dyn Participant>).is_ok();
                assert_eq!(joined, !live.contains_key(&member.id), "join must refuse duplicates only");
                if joined {
                    live.insert(member.id.clone(), Arc::clone(&member));
                }
                created.push(member);
            },
            RoomEvent::Leave { slot } => {
                let Some(member) = created.get(usize::from(slot) % created.len().max(1)).cloned() else {
                    continue;
                };
                let is_live = live.get(&member.id).is_some_and(|m| Arc::ptr_eq(m, &member));
                assert_eq!(room.leave(member.as_ref()), is_live, "leave must match identity");
                if is_live {
                    live.remove(&member.id);
                }
            },
            RoomEvent::Close { slot } => {
                if let Some(member) = created.get(usize::from(slot) % created.len().max(1)) {
                    member.closed.store(true, Ordering::Release);
                }
            },
            RoomEvent::Send { from, to, text } => {
                let sender = slot_id(from);
                let body = match to {
                    Some(to) => format!("Recipient:{}{text}", slot_id(to)),
                    None => text,
                };
                let Ok(frame) = Frame::from_text(&body) else {
                    continue;
                };

                let result = room.deliver(&sender, frame.clone());
                delivered += 1;

                if let Delivery::Addressed { recipient } = &result {
                    assert_eq!(frame.recipient(), Some(recipient.as_bytes()));
                    let member = live.get(recipient).expect("recipient was live");
                    assert_eq!(member.received.lock().expect("mutex poisoned").last(), Some(&frame));
                }

                live.retain(|id, member| {
                    let kept = room.contains(id.as_str());
                    assert!(kept || member.closed.load(Ordering::Acquire), "only closed members are dropped");
                    kept
                });
            },
        }

        assert!(room.history_len() <= capacity);
        assert_eq!(room.member_count(), live.len());
    }

    assert_eq!(room.history_len(), delivered.min(capacity));
});
