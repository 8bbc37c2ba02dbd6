//! Domain events and the broadcast EventBus
//!
//! Every committed state change is published here after the database write
//! succeeds. Subscribers never influence the outcome of the operation that
//! emitted the event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::db::SeatPosition;

/// SeatGate event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExamEvent {
    /// Room registered
    RoomCreated {
        room_id: String,
        room_number: String,
        timestamp: DateTime<Utc>,
    },

    /// Room removed; its members were unassigned first
    RoomDeleted {
        room_id: String,
        room_number: String,
        /// Number of students that lost their seat
        unassigned: u64,
        timestamp: DateTime<Utc>,
    },

    /// Student placed into a seat by the allocator
    SeatAssigned {
        student_id: String,
        room_id: String,
        seat: SeatPosition,
        timestamp: DateTime<Utc>,
    },

    /// Bulk import finished
    StudentsImported {
        imported: u64,
        rejected: u64,
        timestamp: DateTime<Utc>,
    },

    /// Student admitted at room entry
    StudentVerified {
        student_id: String,
        room_id: String,
        verified_by: String,
        timestamp: DateTime<Utc>,
    },

    /// Verification scan refused
    VerificationDenied {
        student_id: Option<String>,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Verification state cleared by an admin
    VerificationReset {
        student_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl ExamEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            ExamEvent::RoomCreated { .. } => "RoomCreated",
            ExamEvent::RoomDeleted { .. } => "RoomDeleted",
            ExamEvent::SeatAssigned { .. } => "SeatAssigned",
            ExamEvent::StudentsImported { .. } => "StudentsImported",
            ExamEvent::StudentVerified { .. } => "StudentVerified",
            ExamEvent::VerificationDenied { .. } => "VerificationDenied",
            ExamEvent::VerificationReset { .. } => "VerificationReset",
        }
    }
}

/// Central event distribution bus
///
/// Thin wrapper over `tokio::sync::broadcast`; cloning shares the channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ExamEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before lagging receivers
    ///   start dropping the oldest ones
    ///
    /// # Examples
    ///
    /// ```
    /// use seatgate_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.subscriber_count(), 0);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ExamEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ExamEvent,
    ) -> Result<usize, broadcast::error::SendError<ExamEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ExamEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_emitted_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        let event = ExamEvent::VerificationReset {
            student_id: "s1".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(bus.emit(event.clone()).unwrap(), 1);

        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(10);
        let event = ExamEvent::StudentsImported {
            imported: 1,
            rejected: 0,
            timestamp: Utc::now(),
        };

        assert!(bus.emit(event.clone()).is_err());
        bus.emit_lossy(event);
    }

    #[test]
    fn test_bus_debug_shows_capacity() {
        let bus = EventBus::new(32);
        assert!(format!("{:?}", bus).contains("capacity: 32"));
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = ExamEvent::SeatAssigned {
            student_id: "s1".to_string(),
            room_id: "r1".to_string(),
            seat: SeatPosition::new(1, 2),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "SeatAssigned");
        assert_eq!(json["seat"]["column"], 2);
        assert_eq!(event.event_type(), "SeatAssigned");
    }
}
