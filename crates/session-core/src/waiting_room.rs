//! Host-side view of the waiting list.
//!
//! Seeded once from `list_pending`, then kept current by applying admission
//! events as they arrive. Applying the same event twice has no effect.

use crate::bus::AdmissionEvent;
use crate::models::{ParticipantRecord, ParticipantStatus};
use chrono::{DateTime, Utc};
use common::types::UserId;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
pub struct WaitingRoom {
    by_arrival: BTreeMap<(DateTime<Utc>, UserId), ParticipantRecord>,
    arrival_of: HashMap<UserId, DateTime<Utc>>,
}

impl WaitingRoom {
    #[must_use]
    pub fn new(initial: Vec<ParticipantRecord>) -> Self {
        let mut room = Self::default();
        for record in initial {
            room.insert(record);
        }
        room
    }

    /// Apply one admission event. Returns whether the view changed.
    pub fn apply(&mut self, event: &AdmissionEvent) -> bool {
        match event {
            AdmissionEvent::Requested { record } | AdmissionEvent::Resolved { record } => {
                if record.status == ParticipantStatus::Pending {
                    self.insert(record.clone())
                } else {
                    self.remove(&record.user_id)
                }
            }
            AdmissionEvent::Removed { user_id, .. } => self.remove(user_id),
        }
    }

    /// Pending participants, oldest first.
    #[must_use]
    pub fn pending(&self) -> Vec<&ParticipantRecord> {
        self.by_arrival.values().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_arrival.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_arrival.is_empty()
    }

    fn insert(&mut self, record: ParticipantRecord) -> bool {
        if self.arrival_of.contains_key(&record.user_id) {
            return false;
        }
        self.arrival_of
            .insert(record.user_id.clone(), record.created_at);
        self.by_arrival
            .insert((record.created_at, record.user_id.clone()), record);
        true
    }

    fn remove(&mut self, user: &UserId) -> bool {
        match self.arrival_of.remove(user) {
            Some(at) => self.by_arrival.remove(&(at, user.clone())).is_some(),
            None => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::types::SessionId;

    fn record(user: &str, offset_secs: i64, status: ParticipantStatus) -> ParticipantRecord {
        ParticipantRecord {
            session_id: SessionId::from("s"),
            user_id: UserId::from(user),
            status,
            created_at: DateTime::<Utc>::from_timestamp(1_700_000_000 + offset_secs, 0).unwrap(),
        }
    }

    fn names(room: &WaitingRoom) -> Vec<String> {
        room.pending()
            .iter()
            .map(|r| r.user_id.to_string())
            .collect()
    }

    #[test]
    fn test_initial_load_is_ordered_by_arrival() {
        let room = WaitingRoom::new(vec![
            record("late", 30, ParticipantStatus::Pending),
            record("early", 10, ParticipantStatus::Pending),
        ]);
        assert_eq!(names(&room), vec!["early", "late"]);
    }

    #[test]
    fn test_incremental_updates() {
        let mut room = WaitingRoom::new(vec![record("a", 1, ParticipantStatus::Pending)]);

        assert!(room.apply(&AdmissionEvent::Requested {
            record: record("b", 2, ParticipantStatus::Pending)
        }));
        assert_eq!(names(&room), vec!["a", "b"]);

        assert!(room.apply(&AdmissionEvent::Resolved {
            record: record("a", 1, ParticipantStatus::Approved)
        }));
        assert_eq!(names(&room), vec!["b"]);

        assert!(room.apply(&AdmissionEvent::Removed {
            session_id: SessionId::from("s"),
            user_id: UserId::from("b"),
        }));
        assert!(room.is_empty());
    }

    #[test]
    fn test_duplicate_events_are_ignored() {
        let mut room = WaitingRoom::default();
        let event = AdmissionEvent::Requested {
            record: record("a", 1, ParticipantStatus::Pending),
        };

        assert!(room.apply(&event));
        assert!(!room.apply(&event));
        assert_eq!(room.len(), 1);

        let resolved = AdmissionEvent::Resolved {
            record: record("a", 1, ParticipantStatus::Denied),
        };
        assert!(room.apply(&resolved));
        assert!(!room.apply(&resolved));
        assert!(room.is_empty());
    }
}
