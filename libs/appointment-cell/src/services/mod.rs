pub mod booking;
pub mod calendar;
pub mod clock;
pub mod conflict;
pub mod events;
pub mod lifecycle;
pub mod recurrence;
pub mod slots;
pub mod supabase_store;
pub mod time_off;
