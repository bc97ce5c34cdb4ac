// libs/appointment-cell/src/services/events.rs
use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::models::{AppointmentStatus, ImpactRecord};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SchedulingEvent {
    AppointmentBooked {
        appointment_id: Uuid,
        staff_id: Uuid,
        date: NaiveDate,
    },
    AppointmentStatusChanged {
        appointment_id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    AppointmentRescheduled {
        previous_id: Uuid,
        replacement_id: Uuid,
    },
    SeriesExpanded {
        series_id: Uuid,
        created: usize,
        skipped: usize,
    },
    TimeOffApproved {
        time_off_id: Uuid,
        staff_id: Uuid,
        affected_appointments: Vec<ImpactRecord>,
    },
}

/// Optional sink for scheduling events. Publishing never blocks the request
/// path: a full or closed channel drops the event with a warning.
#[derive(Debug, Clone, Default)]
pub struct EventPublisher {
    sender: Option<mpsc::Sender<SchedulingEvent>>,
}

impl EventPublisher {
    pub fn new(sender: mpsc::Sender<SchedulingEvent>) -> Self {
        Self { sender: Some(sender) }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn publish(&self, event: SchedulingEvent) {
        if let Some(sender) = &self.sender {
            if let Err(e) = sender.try_send(event) {
                warn!("Dropping scheduling event: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_delivers_and_disabled_is_noop() {
        let (tx, mut rx) = mpsc::channel(4);
        let publisher = EventPublisher::new(tx);
        let event = SchedulingEvent::AppointmentRescheduled {
            previous_id: Uuid::new_v4(),
            replacement_id: Uuid::new_v4(),
        };

        publisher.publish(event.clone());
        assert_eq!(rx.recv().await, Some(event.clone()));

        EventPublisher::disabled().publish(event);
    }

    #[test]
    fn test_event_wire_tag() {
        let json = serde_json::to_value(SchedulingEvent::SeriesExpanded {
            series_id: Uuid::nil(),
            created: 3,
            skipped: 1,
        })
        .unwrap();
        assert_eq!(json["event"], "series_expanded");
        assert_eq!(json["created"], 3);
    }
}
