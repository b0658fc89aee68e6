use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("tutorchat.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("tutorchat.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("tutorchat.client.request_duration_seconds");

pub(crate) static STREAM_EVENTS: Counter = Counter::new("tutorchat.stream.events");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("tutorchat.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("tutorchat.stream.bytes");
pub(crate) static STREAM_FIRST_DELTA: Moments =
    Moments::new("tutorchat.stream.first_delta_seconds");

pub(crate) static SESSIONS_CREATED: Counter = Counter::new("tutorchat.sessions.created");
pub(crate) static SESSION_CREATION_ERRORS: Counter =
    Counter::new("tutorchat.sessions.creation_errors");

pub(crate) static TURNS_STARTED: Counter = Counter::new("tutorchat.turns.started");
pub(crate) static TURNS_COMPLETED: Counter = Counter::new("tutorchat.turns.completed");
pub(crate) static TURNS_CANCELLED: Counter = Counter::new("tutorchat.turns.cancelled");
pub(crate) static TURNS_FAILED: Counter = Counter::new("tutorchat.turns.failed");
pub(crate) static TURN_DELTAS: Counter = Counter::new("tutorchat.turns.deltas");
pub(crate) static TURN_DURATION: Moments = Moments::new("tutorchat.turns.duration_seconds");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_EVENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_moments(&STREAM_FIRST_DELTA);

    collector.register_counter(&SESSIONS_CREATED);
    collector.register_counter(&SESSION_CREATION_ERRORS);

    collector.register_counter(&TURNS_STARTED);
    collector.register_counter(&TURNS_COMPLETED);
    collector.register_counter(&TURNS_CANCELLED);
    collector.register_counter(&TURNS_FAILED);
    collector.register_counter(&TURN_DELTAS);
    collector.register_moments(&TURN_DURATION);
}
