use crate::{
    event::{EventLog, EventStreamConfig, PersistentEvent},
    inbox::MetadataMessage,
    mpd::{check_manifest, inject_event_stream, NotReadyReason},
};

/// A live manifest ready to be written.
#[derive(Debug)]
pub struct LiveManifest {
    pub document: Vec<u8>,
    /// The event appended to the log while building this manifest, if any.
    pub added: Option<PersistentEvent>,
}

/// Merges the persistent event log into base manifests.
///
/// Every build renders the whole log again, so a manifest replaced by the
/// transcoder between two cycles never loses events.
#[derive(Debug, Default)]
pub struct EventLogBuilder {
    log: EventLog,
    config: EventStreamConfig,
}

impl EventLogBuilder {
    pub fn new(config: EventStreamConfig) -> Self {
        Self {
            log: EventLog::new(),
            config,
        }
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn into_log(self) -> EventLog {
        self.log
    }

    /// Build the next live manifest from `base`.
    ///
    /// When `next` is given it becomes a new persistent event, but only if the
    /// manifest could be built: a base manifest that is not ready leaves the
    /// log untouched so the same message is retried on the next cycle.
    pub fn build(
        &mut self,
        base: &[u8],
        next: Option<&MetadataMessage>,
    ) -> Result<LiveManifest, NotReadyReason> {
        let base = check_manifest(base)?;

        let pending = next.map(|message| self.log.prepare(message, self.config.event_duration));
        let document = inject_event_stream(base, self.log.iter().chain(pending.as_ref()), &self.config)
            .map_err(|e| NotReadyReason::Unparseable(e.to_string()))?
            .ok_or(NotReadyReason::NoPeriod)?;

        if let Some(event) = &pending {
            tracing::info!(
                id = event.id,
                presentation_time = event.presentation_time,
                "Added event: {}",
                event.text
            );
            self.log.commit(event.clone());
        }

        Ok(LiveManifest {
            document,
            added: pending,
        })
    }
}
