use crate::inbox::MetadataMessage;

/// An event injected into the live manifest.
///
/// Events are created once per processed inbox entry and never change
/// afterwards. The `id` of the N-th event is always N.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentEvent {
    pub id: u64,
    pub presentation_time: i64,
    pub duration: u64,
    pub text: String,
}

/// Attributes of the injected `EventStream` and the duration policy of its events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventStreamConfig {
    pub scheme_id_uri: String,
    pub value: String,
    pub timescale: u64,
    /// Duration assigned to every event, in timescale units.
    pub event_duration: u64,
}

impl Default for EventStreamConfig {
    fn default() -> Self {
        Self {
            scheme_id_uri: "urn:metadata".to_string(),
            value: "metadata".to_string(),
            timescale: 1,
            event_duration: 1,
        }
    }
}

impl EventStreamConfig {
    pub fn with_scheme_id_uri(mut self, scheme_id_uri: impl Into<String>) -> Self {
        self.scheme_id_uri = scheme_id_uri.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_timescale(mut self, timescale: u64) -> Self {
        self.timescale = timescale;
        self
    }

    pub fn with_event_duration(mut self, event_duration: u64) -> Self {
        self.event_duration = event_duration;
        self
    }
}

/// The growing, id-ordered log of persistent events.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<PersistentEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the event that `message` would become if appended now.
    ///
    /// The log itself is left untouched until [EventLog::commit] is called.
    pub fn prepare(&self, message: &MetadataMessage, duration: u64) -> PersistentEvent {
        PersistentEvent {
            id: self.events.len() as u64,
            presentation_time: message.presentation_time,
            duration,
            text: message.text.clone(),
        }
    }

    /// Append an event built by [EventLog::prepare].
    pub(crate) fn commit(&mut self, event: PersistentEvent) {
        debug_assert_eq!(event.id, self.events.len() as u64);
        self.events.push(event);
    }

    pub fn events(&self) -> &[PersistentEvent] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PersistentEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
