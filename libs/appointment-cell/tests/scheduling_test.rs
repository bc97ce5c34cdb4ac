use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use appointment_cell::handlers::SchedulingState;
use appointment_cell::models::*;
use appointment_cell::services::calendar::{CalendarStore, InMemoryCalendarStore};
use appointment_cell::services::clock::FixedClock;
use appointment_cell::services::events::{EventPublisher, SchedulingEvent};
use shared_models::auth::User;
use shared_utils::test_utils::{TestConfig, TestUser};

struct Fixture {
    state: SchedulingState,
    store: Arc<InMemoryCalendarStore>,
    clock: Arc<FixedClock>,
    staff: StaffMember,
    weekday_staff: StaffMember,
    user: User,
    events: mpsc::Receiver<SchedulingEvent>,
}

fn d(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, month, day).unwrap()
}

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn fixture() -> Fixture {
    let workplace_id = Uuid::new_v4();
    let staff = StaffMember {
        id: Uuid::new_v4(),
        workplace_id,
        display_name: "Aisha Rahman".to_string(),
        is_active: true,
        working_hours: None,
    };
    let weekday_staff = StaffMember {
        id: Uuid::new_v4(),
        workplace_id,
        display_name: "Ben Tan".to_string(),
        is_active: true,
        working_hours: Some(WorkingHours::new(t(9, 0), t(17, 0)).with_days(vec![1, 2, 3, 4, 5])),
    };

    let store = Arc::new(InMemoryCalendarStore::with_staff(vec![staff.clone(), weekday_staff.clone()]));
    // Saturday morning, two days before the Monday most scenarios use.
    let clock = Arc::new(FixedClock::at(Utc.with_ymd_and_hms(2025, 11, 1, 8, 0, 0).unwrap()));
    let (tx, rx) = mpsc::channel(64);

    let state = SchedulingState::new(
        TestConfig::default().to_arc(),
        store.clone(),
        clock.clone(),
        EventPublisher::new(tx),
    );

    let mut user = TestUser::pharmacist("pharm@example.com").to_user();
    user.workplace_id = Some(workplace_id);

    Fixture {
        state,
        store,
        clock,
        staff,
        weekday_staff,
        user,
        events: rx,
    }
}

fn booking(staff_id: Uuid, date: NaiveDate, time: NaiveTime, duration: u32) -> BookAppointmentRequest {
    BookAppointmentRequest {
        workplace_id: None,
        patient_id: Uuid::new_v4(),
        staff_id,
        date,
        time,
        duration_minutes: Some(duration),
        appointment_type: AppointmentType::ChronicDiseaseReview,
        timezone: None,
        notes: Some("  bring current medication list ".to_string()),
        recurrence: None,
        max_occurrences: None,
    }
}

fn slot_query(staff_id: Uuid, date: NaiveDate, duration: u32, include_unavailable: bool) -> SlotQuery {
    SlotQuery {
        date,
        staff_id: Some(staff_id),
        duration: Some(duration),
        appointment_type: None,
        include_unavailable: Some(include_unavailable),
    }
}

// ==============================================================================
// BOOKING AND SLOTS
// ==============================================================================

#[tokio::test]
async fn test_booking_blocks_overlapping_candidate() {
    let fx = fixture();
    let booked = fx
        .state
        .booking
        .create(booking(fx.staff.id, d(11, 3), t(10, 0), 30), &fx.user)
        .await
        .unwrap();

    assert_eq!(booked.status, AppointmentStatus::Scheduled);
    assert_eq!(booked.version, 1);
    assert_eq!(booked.workplace_id, fx.staff.workplace_id);
    assert_eq!(booked.notes.as_deref(), Some("bring current medication list"));
    assert_eq!(booked.timezone, "+00:00");

    let validation = fx
        .state
        .slots
        .validate_slot(&ValidateSlotQuery {
            staff_id: fx.staff.id,
            date: d(11, 3),
            time: t(10, 15),
            duration: Some(15),
            appointment_type: None,
        })
        .await
        .unwrap();
    assert!(!validation.available);
    assert_eq!(validation.reason, Some(ConflictReason::OverlapsExistingAppointment));
    assert_eq!(validation.message.as_deref(), Some("overlaps existing appointment"));
    let alternatives: Vec<NaiveTime> = validation.alternatives.iter().map(|s| s.time).collect();
    assert_eq!(alternatives, vec![t(8, 0), t(8, 30), t(9, 0)]);

    let rejected = fx
        .state
        .booking
        .create(booking(fx.staff.id, d(11, 3), t(10, 15), 15), &fx.user)
        .await;
    assert_matches!(
        rejected,
        Err(AppointmentError::Rejected(ConflictReason::OverlapsExistingAppointment))
    );
}

#[tokio::test]
async fn test_slot_listing_with_and_without_unavailable() {
    let fx = fixture();
    fx.state
        .booking
        .create(booking(fx.staff.id, d(11, 3), t(10, 0), 30), &fx.user)
        .await
        .unwrap();

    let all = fx
        .state
        .slots
        .available_slots(&slot_query(fx.staff.id, d(11, 3), 30, true))
        .await
        .unwrap();
    assert_eq!(all.slots.len(), 20);
    assert_eq!(all.summary.total_slots, 20);
    assert_eq!(all.summary.available_slots, 19);
    assert!((all.summary.utilization_rate - 0.05).abs() < 1e-9);

    let ten = all.slots.iter().find(|s| s.time == t(10, 0)).unwrap();
    assert!(!ten.available);
    assert_eq!(ten.conflict_reason, Some(ConflictReason::OverlapsExistingAppointment));
    let half_past = all.slots.iter().find(|s| s.time == t(10, 30)).unwrap();
    assert!(half_past.available);
    assert_eq!(half_past.end_time, t(11, 0));

    let open = fx
        .state
        .slots
        .available_slots(&slot_query(fx.staff.id, d(11, 3), 30, false))
        .await
        .unwrap();
    assert_eq!(open.slots.len(), 19);
    assert!(open.slots.iter().all(|s| s.available));
    assert!(open.slots.iter().all(|s| s.time != t(10, 0)));
    // Summary is computed before unavailable slots are dropped.
    assert_eq!(open.summary.total_slots, 20);
}

#[tokio::test]
async fn test_all_staff_listing_is_sorted_with_breakdown() {
    let fx = fixture();
    let listing = fx
        .state
        .slots
        .available_slots(&SlotQuery {
            date: d(11, 3),
            staff_id: None,
            duration: None,
            appointment_type: Some(AppointmentType::MtmSession),
            include_unavailable: None,
        })
        .await
        .unwrap();

    assert_eq!(listing.duration_minutes, 45);
    assert_eq!(listing.per_staff_breakdown.len(), 2);
    assert!(listing
        .slots
        .windows(2)
        .all(|w| (w[0].time, &w[0].staff_name) <= (w[1].time, &w[1].staff_name)));
    // Ben works 09:00-17:00, so his first slot is at nine.
    let ben_first = listing.slots.iter().find(|s| s.staff_id == fx.weekday_staff.id).unwrap();
    assert_eq!(ben_first.time, t(9, 0));
}

#[tokio::test]
async fn test_unknown_inactive_and_day_off_staff_yield_empty_listing() {
    let fx = fixture();

    let unknown = fx
        .state
        .slots
        .available_slots(&slot_query(Uuid::new_v4(), d(11, 3), 30, true))
        .await
        .unwrap();
    assert!(unknown.slots.is_empty());
    assert_eq!(unknown.summary.utilization_rate, 0.0);

    let mut retired = fx.staff.clone();
    retired.id = Uuid::new_v4();
    retired.is_active = false;
    fx.store.upsert_staff(retired.clone());
    let inactive = fx
        .state
        .slots
        .available_slots(&slot_query(retired.id, d(11, 3), 30, true))
        .await
        .unwrap();
    assert!(inactive.slots.is_empty());

    // Sunday is outside Ben's working days.
    let sunday = fx
        .state
        .slots
        .available_slots(&slot_query(fx.weekday_staff.id, d(11, 2), 30, true))
        .await
        .unwrap();
    assert!(sunday.slots.is_empty());
    assert_eq!(sunday.summary.total_slots, 0);
}

#[tokio::test]
async fn test_past_dates_are_rejected() {
    let fx = fixture();
    let result = fx
        .state
        .booking
        .create(booking(fx.staff.id, d(10, 31), t(10, 0), 30), &fx.user)
        .await;
    assert_matches!(result, Err(AppointmentError::Rejected(ConflictReason::InThePast)));

    let unknown_staff = fx
        .state
        .booking
        .create(booking(Uuid::new_v4(), d(11, 3), t(10, 0), 30), &fx.user)
        .await;
    assert_matches!(unknown_staff, Err(AppointmentError::StaffNotFound(_)));
}

#[tokio::test]
async fn test_slots_fall_into_the_past_as_the_clock_moves() {
    let fx = fixture();
    let nine = ValidateSlotQuery {
        staff_id: fx.staff.id,
        date: d(11, 1),
        time: t(9, 0),
        duration: Some(30),
        appointment_type: None,
    };
    assert!(fx.state.slots.validate_slot(&nine).await.unwrap().available);

    fx.clock.advance(Duration::hours(2));

    let late = fx.state.slots.validate_slot(&nine).await.unwrap();
    assert!(!late.available);
    assert_eq!(late.reason, Some(ConflictReason::InThePast));

    let next = fx
        .state
        .slots
        .next_available_slot(&NextAvailableQuery {
            staff_id: fx.staff.id,
            duration: Some(30),
            appointment_type: None,
            days_ahead: None,
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!((next.date, next.time), (d(11, 1), t(10, 0)));
}

#[tokio::test]
async fn test_next_available_slot_respects_working_days() {
    let fx = fixture();

    let today = fx
        .state
        .slots
        .next_available_slot(&NextAvailableQuery {
            staff_id: fx.staff.id,
            duration: Some(30),
            appointment_type: None,
            days_ahead: None,
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!((today.date, today.time), (d(11, 1), t(8, 0)));

    let weekday = fx
        .state
        .slots
        .next_available_slot(&NextAvailableQuery {
            staff_id: fx.weekday_staff.id,
            duration: Some(30),
            appointment_type: None,
            days_ahead: Some(7),
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!((weekday.date, weekday.time), (d(11, 3), t(9, 0)));
    assert_eq!(weekday.staff_name, "Ben Tan");

    // A weekend-only horizon finds nothing for Ben.
    let none = fx
        .state
        .slots
        .next_available_slot(&NextAvailableQuery {
            staff_id: fx.weekday_staff.id,
            duration: Some(30),
            appointment_type: None,
            days_ahead: Some(2),
        })
        .await
        .unwrap();
    assert!(none.is_none());

    let missing = fx
        .state
        .slots
        .next_available_slot(&NextAvailableQuery {
            staff_id: Uuid::new_v4(),
            duration: None,
            appointment_type: None,
            days_ahead: None,
        })
        .await;
    assert_matches!(missing, Err(AppointmentError::StaffNotFound(_)));
}

// ==============================================================================
// RECURRENCE
// ==============================================================================

#[tokio::test]
async fn test_weekly_series_records_skips_in_date_order() {
    let fx = fixture();
    // Someone else already holds Wednesday 10:00.
    fx.state
        .booking
        .create(booking(fx.staff.id, d(11, 5), t(10, 0), 30), &fx.user)
        .await
        .unwrap();

    let mut request = booking(fx.staff.id, d(11, 3), t(10, 0), 30);
    request.recurrence = Some(RecurrencePattern {
        frequency: RecurrenceFrequency::Weekly,
        interval: 1,
        end_date: None,
        days_of_week: Some(vec![1, 3]),
    });
    request.max_occurrences = Some(4);

    let result = fx.state.booking.create_series(request, &fx.user).await.unwrap();

    let dates: Vec<NaiveDate> = result.occurrences.iter().map(|o| o.date).collect();
    assert_eq!(dates, vec![d(11, 3), d(11, 5), d(11, 10), d(11, 12)]);
    assert_eq!(result.created_count, 3);
    assert_eq!(result.skipped_count, 1);

    let skipped = &result.occurrences[1];
    assert_eq!(skipped.status, OccurrenceStatus::Skipped);
    assert_eq!(skipped.reason.as_deref(), Some("overlaps existing appointment"));
    assert!(skipped.appointment_id.is_none());

    let stored = fx.store.series_occurrences(result.series_id).await.unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|apt| apt.recurrence_origin_date == Some(apt.date)));
}

#[tokio::test]
async fn test_series_rejects_invalid_patterns() {
    let fx = fixture();
    let mut request = booking(fx.staff.id, d(11, 3), t(10, 0), 30);
    request.recurrence = Some(RecurrencePattern {
        frequency: RecurrenceFrequency::Monthly,
        interval: 1,
        end_date: None,
        days_of_week: Some(vec![1]),
    });
    assert_matches!(
        fx.state.booking.create_series(request.clone(), &fx.user).await,
        Err(AppointmentError::Validation(_))
    );

    request.recurrence = Some(RecurrencePattern {
        frequency: RecurrenceFrequency::Weekly,
        interval: 1,
        end_date: Some(d(10, 1)),
        days_of_week: None,
    });
    assert_matches!(
        fx.state.booking.create_series(request, &fx.user).await,
        Err(AppointmentError::Validation(_))
    );
}

#[tokio::test]
async fn test_rescheduled_occurrence_survives_regeneration() {
    let fx = fixture();
    let weekly = RecurrencePattern {
        frequency: RecurrenceFrequency::Weekly,
        interval: 1,
        end_date: None,
        days_of_week: None,
    };
    let mut request = booking(fx.staff.id, d(11, 3), t(10, 0), 30);
    request.recurrence = Some(weekly.clone());
    request.max_occurrences = Some(4);
    let series = fx.state.booking.create_series(request, &fx.user).await.unwrap();
    assert_eq!(series.created_count, 4);

    let second = series.occurrences[1].appointment_id.unwrap();
    let moved = fx
        .state
        .booking
        .reschedule(
            second,
            RescheduleAppointmentRequest {
                date: d(11, 11),
                time: t(14, 0),
                duration_minutes: None,
                staff_id: None,
                reason: Some("patient requested Tuesday".to_string()),
            },
            &fx.user,
        )
        .await
        .unwrap();
    assert!(moved.replacement.is_recurring_exception);
    assert_eq!(moved.replacement.series_id, Some(series.series_id));
    assert_eq!(moved.replacement.recurrence_origin_date, Some(d(11, 10)));

    let regenerated = fx
        .state
        .booking
        .regenerate_series(
            series.series_id,
            UpdateSeriesPatternRequest {
                recurrence: weekly,
                max_occurrences: Some(4),
            },
            &fx.user,
        )
        .await
        .unwrap();

    let statuses: Vec<(NaiveDate, OccurrenceStatus)> =
        regenerated.occurrences.iter().map(|o| (o.date, o.status)).collect();
    assert_eq!(
        statuses,
        vec![
            (d(11, 3), OccurrenceStatus::Created),
            (d(11, 10), OccurrenceStatus::Skipped),
            (d(11, 17), OccurrenceStatus::Created),
            (d(11, 24), OccurrenceStatus::Created),
        ]
    );
    assert_eq!(
        regenerated.occurrences[1].reason.as_deref(),
        Some("occurrence modified individually")
    );

    // Three regenerated occurrences plus the rescheduled pair.
    let stored = fx.store.series_occurrences(series.series_id).await.unwrap();
    assert_eq!(stored.len(), 5);
    assert!(stored.iter().any(|apt| apt.id == moved.replacement.id));
}

#[tokio::test]
async fn test_regenerating_unknown_series_is_not_found() {
    let fx = fixture();
    let result = fx
        .state
        .booking
        .regenerate_series(
            Uuid::new_v4(),
            UpdateSeriesPatternRequest {
                recurrence: RecurrencePattern {
                    frequency: RecurrenceFrequency::Daily,
                    interval: 1,
                    end_date: None,
                    days_of_week: None,
                },
                max_occurrences: None,
            },
            &fx.user,
        )
        .await;
    assert_matches!(result, Err(AppointmentError::SeriesNotFound(_)));
}

// ==============================================================================
// LIFECYCLE
// ==============================================================================

#[tokio::test]
async fn test_full_lifecycle_to_completed() {
    let fx = fixture();
    let booked = fx
        .state
        .booking
        .create(booking(fx.staff.id, d(11, 3), t(11, 0), 30), &fx.user)
        .await
        .unwrap();

    let status = |status| UpdateStatusRequest {
        status,
        outcome: None,
        reason: None,
    };

    let confirmed = fx
        .state
        .booking
        .update_status(booked.id, status(AppointmentStatus::Confirmed))
        .await
        .unwrap();
    assert_eq!(confirmed.version, 2);

    fx.state
        .booking
        .update_status(booked.id, status(AppointmentStatus::InProgress))
        .await
        .unwrap();

    assert_matches!(
        fx.state
            .booking
            .update_status(booked.id, status(AppointmentStatus::Completed))
            .await,
        Err(AppointmentError::OutcomeRequired)
    );

    let completed = fx
        .state
        .booking
        .update_status(
            booked.id,
            UpdateStatusRequest {
                status: AppointmentStatus::Completed,
                outcome: Some(AppointmentOutcome {
                    status: OutcomeStatus::PartiallySuccessful,
                    notes: "Adherence improved, BP still elevated".to_string(),
                    next_actions: vec!["recheck in 4 weeks".to_string()],
                    visit_created: true,
                }),
                reason: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(completed.status, AppointmentStatus::Completed);
    assert_eq!(completed.version, 4);

    // Completed appointments free the slot.
    assert!(fx
        .state
        .booking
        .create(booking(fx.staff.id, d(11, 3), t(11, 0), 30), &fx.user)
        .await
        .is_ok());

    assert_matches!(
        fx.state
            .booking
            .update_status(booked.id, status(AppointmentStatus::Cancelled))
            .await,
        Err(AppointmentError::InvalidTransition { .. })
    );
}

#[tokio::test]
async fn test_reschedule_links_records_and_blocks_patch() {
    let fx = fixture();
    let booked = fx
        .state
        .booking
        .create(booking(fx.staff.id, d(11, 3), t(10, 0), 30), &fx.user)
        .await
        .unwrap();

    // Overlaps only the appointment being moved.
    let result = fx
        .state
        .booking
        .reschedule(
            booked.id,
            RescheduleAppointmentRequest {
                date: d(11, 3),
                time: t(10, 15),
                duration_minutes: None,
                staff_id: None,
                reason: None,
            },
            &fx.user,
        )
        .await
        .unwrap();

    assert_eq!(result.previous.status, AppointmentStatus::Rescheduled);
    assert_eq!(result.previous.rescheduled_to, Some(result.replacement.id));
    assert_eq!(result.replacement.rescheduled_from, Some(booked.id));
    assert_eq!(result.replacement.time, t(10, 15));
    assert!(!result.replacement.is_recurring_exception);

    assert_matches!(
        fx.state
            .booking
            .update_status(
                result.replacement.id,
                UpdateStatusRequest {
                    status: AppointmentStatus::Rescheduled,
                    outcome: None,
                    reason: None,
                },
            )
            .await,
        Err(AppointmentError::InvalidTransition { .. })
    );

    assert_matches!(
        fx.state
            .booking
            .reschedule(
                booked.id,
                RescheduleAppointmentRequest {
                    date: d(11, 4),
                    time: t(9, 0),
                    duration_minutes: None,
                    staff_id: None,
                    reason: None,
                },
                &fx.user,
            )
            .await,
        Err(AppointmentError::InvalidTransition {
            from: AppointmentStatus::Rescheduled,
            to: AppointmentStatus::Rescheduled
        })
    );
}

#[tokio::test]
async fn test_soft_delete_hides_record_and_frees_slot() {
    let fx = fixture();
    let booked = fx
        .state
        .booking
        .create(booking(fx.staff.id, d(11, 3), t(10, 0), 30), &fx.user)
        .await
        .unwrap();

    fx.state.booking.soft_delete(booked.id).await.unwrap();

    assert_matches!(fx.state.booking.get(booked.id).await, Err(AppointmentError::NotFound(_)));
    assert!(fx
        .state
        .booking
        .list_for_staff(fx.staff.id, d(11, 3))
        .await
        .unwrap()
        .is_empty());
    assert!(fx
        .state
        .booking
        .create(booking(fx.staff.id, d(11, 3), t(10, 0), 30), &fx.user)
        .await
        .is_ok());
}

// ==============================================================================
// TIME-OFF
// ==============================================================================

#[tokio::test]
async fn test_time_off_impact_approval_and_idempotence() {
    let mut fx = fixture();
    let inside = fx
        .state
        .booking
        .create(booking(fx.staff.id, d(11, 3), t(10, 0), 30), &fx.user)
        .await
        .unwrap();
    fx.state
        .booking
        .create(booking(fx.staff.id, d(11, 7), t(10, 0), 30), &fx.user)
        .await
        .unwrap();
    let cancelled = fx
        .state
        .booking
        .create(booking(fx.staff.id, d(11, 4), t(9, 0), 30), &fx.user)
        .await
        .unwrap();
    fx.state
        .booking
        .update_status(
            cancelled.id,
            UpdateStatusRequest {
                status: AppointmentStatus::Cancelled,
                outcome: None,
                reason: Some("patient unwell".to_string()),
            },
        )
        .await
        .unwrap();

    let submitted = fx
        .state
        .time_off
        .submit(
            TimeOffSubmission {
                staff_id: fx.staff.id,
                start_date: d(11, 3),
                end_date: d(11, 5),
                reason: "Attending pharmacy conference".to_string(),
                time_off_type: TimeOffType::Other,
            },
            Some(fx.user.id.clone()),
        )
        .await
        .unwrap();
    assert_eq!(submitted.time_off.status, TimeOffStatus::Pending);
    assert_eq!(submitted.time_off.affected_appointment_ids, vec![inside.id]);

    // Pending time-off does not block the calendar yet.
    let before = fx
        .state
        .slots
        .available_slots(&slot_query(fx.staff.id, d(11, 4), 30, false))
        .await
        .unwrap();
    assert_eq!(before.slots.len(), 20);

    let approved = fx.state.time_off.approve(submitted.time_off.id).await.unwrap();
    assert_eq!(approved.time_off.status, TimeOffStatus::Approved);
    assert!(approved.time_off.decided_at.is_some());
    assert_eq!(approved.affected_appointments.len(), 1);
    assert_eq!(approved.affected_appointments[0].appointment_id, inside.id);
    assert_eq!(approved.affected_appointments[0].time, t(10, 0));

    let mut saw_approval = false;
    while let Ok(event) = fx.events.try_recv() {
        if let SchedulingEvent::TimeOffApproved { time_off_id, affected_appointments, .. } = event {
            assert_eq!(time_off_id, submitted.time_off.id);
            assert_eq!(affected_appointments.len(), 1);
            saw_approval = true;
        }
    }
    assert!(saw_approval);

    let first = fx.state.time_off.refresh_impact(submitted.time_off.id).await.unwrap();
    let second = fx.state.time_off.refresh_impact(submitted.time_off.id).await.unwrap();
    assert_eq!(first.affected_appointments, second.affected_appointments);
    assert_eq!(first.time_off.updated_at, second.time_off.updated_at);

    let blocked = fx
        .state
        .slots
        .available_slots(&slot_query(fx.staff.id, d(11, 4), 30, true))
        .await
        .unwrap();
    assert!(blocked
        .slots
        .iter()
        .all(|s| !s.available && s.conflict_reason == Some(ConflictReason::StaffOnTimeOff)));

    assert_matches!(
        fx.state
            .booking
            .create(booking(fx.staff.id, d(11, 4), t(15, 0), 30), &fx.user)
            .await,
        Err(AppointmentError::Rejected(ConflictReason::StaffOnTimeOff))
    );

    assert_matches!(
        fx.state.time_off.approve(submitted.time_off.id).await,
        Err(AppointmentError::Validation(_))
    );
}

#[tokio::test]
async fn test_time_off_submission_validation() {
    let fx = fixture();
    let submission = |start, end, reason: &str| TimeOffSubmission {
        staff_id: fx.staff.id,
        start_date: start,
        end_date: end,
        reason: reason.to_string(),
        time_off_type: TimeOffType::Vacation,
    };

    assert_matches!(
        fx.state.time_off.submit(submission(d(11, 5), d(11, 3), "Family holiday abroad"), None).await,
        Err(AppointmentError::Validation(_))
    );
    assert_matches!(
        fx.state.time_off.submit(submission(d(11, 3), d(11, 5), "   short   "), None).await,
        Err(AppointmentError::Validation(_))
    );

    let first = fx
        .state
        .time_off
        .submit(submission(d(11, 10), d(11, 14), "Family holiday abroad"), None)
        .await
        .unwrap();
    assert!(first.affected_appointments.is_empty());

    assert_matches!(
        fx.state.time_off.submit(submission(d(11, 14), d(11, 16), "Extending the holiday"), None).await,
        Err(AppointmentError::Validation(_))
    );

    let rejected = fx.state.time_off.reject(first.time_off.id).await.unwrap();
    assert_eq!(rejected.status, TimeOffStatus::Rejected);

    // A rejected request no longer reserves its range.
    assert!(fx
        .state
        .time_off
        .submit(submission(d(11, 14), d(11, 16), "Extending the holiday"), None)
        .await
        .is_ok());

    assert_matches!(
        fx.state.time_off.approve(Uuid::new_v4()).await,
        Err(AppointmentError::TimeOffNotFound(_))
    );
}
