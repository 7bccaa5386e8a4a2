use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use crate::{
    builder::EventLogBuilder,
    error::DashMetaResult,
    event::{EventLog, EventStreamConfig, PersistentEvent},
    fs::write_atomic,
    inbox::MetadataInbox,
    mpd::NotReadyReason,
    supervisor::StreamLiveness,
    watcher::BaseManifestWatcher,
};

pub const BASE_MANIFEST_NAME: &str = "manifest.mpd";
pub const LIVE_MANIFEST_NAME: &str = "live-manifest.mpd";

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Manifest written by the transcoder.
    pub base_manifest: PathBuf,
    /// Manifest served to clients.
    pub live_manifest: PathBuf,
    /// Pause between two publish cycles.
    pub poll_interval: Duration,
    /// Pause between two checks while waiting for the first manifest.
    pub wait_interval: Duration,
    pub event_stream: EventStreamConfig,
}

impl PublisherConfig {
    /// Default layout inside a transcoder output directory.
    pub fn new(dash_dir: impl AsRef<Path>) -> Self {
        let dash_dir = dash_dir.as_ref();
        Self {
            base_manifest: dash_dir.join(BASE_MANIFEST_NAME),
            live_manifest: dash_dir.join(LIVE_MANIFEST_NAME),
            poll_interval: Duration::from_millis(200),
            wait_interval: Duration::from_millis(100),
            event_stream: EventStreamConfig::default(),
        }
    }

    pub fn with_base_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_manifest = path.into();
        self
    }

    pub fn with_live_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.live_manifest = path.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_wait_interval(mut self, interval: Duration) -> Self {
        self.wait_interval = interval;
        self
    }

    pub fn with_event_stream(mut self, event_stream: EventStreamConfig) -> Self {
        self.event_stream = event_stream;
        self
    }
}

/// Result of a single publish cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing was written, the previous live manifest is left as is.
    NotReady(NotReadyReason),
    /// The live manifest was rewritten without new events.
    NoOp,
    /// One inbox entry became a persistent event and the live manifest was rewritten.
    Advanced(PersistentEvent),
}

/// ┌──────────────┐   submit   ┌─────────────────┐
/// │   Producer   ├────────────►  MetadataInbox  │
/// └──────────────┘            └────────┬────────┘
///                                      │ get(cursor)
/// ┌──────────────┐   read     ┌────────▼────────┐   write   ┌──────────────────┐
/// │ manifest.mpd ├────────────►    Publisher    ├───────────► live-manifest.mpd│
/// └──────────────┘            └─────────────────┘           └──────────────────┘
///
/// The publisher owns the event log and the inbox cursor. Each cycle consumes
/// at most one inbox entry, so event ids follow arrival order.
pub struct LiveManifestPublisher<L> {
    base_manifest: PathBuf,
    live_manifest: PathBuf,
    poll_interval: Duration,
    wait_interval: Duration,

    inbox: Arc<MetadataInbox>,
    builder: EventLogBuilder,
    cursor: usize,

    liveness: L,
}

impl<L> LiveManifestPublisher<L>
where
    L: StreamLiveness,
{
    pub fn new(config: PublisherConfig, inbox: Arc<MetadataInbox>, liveness: L) -> Self {
        Self {
            base_manifest: config.base_manifest,
            live_manifest: config.live_manifest,
            poll_interval: config.poll_interval,
            wait_interval: config.wait_interval,
            inbox,
            builder: EventLogBuilder::new(config.event_stream),
            cursor: 0,
            liveness,
        }
    }

    /// Number of inbox entries already turned into events.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn events(&self) -> &[PersistentEvent] {
        self.builder.log().events()
    }

    /// Run one publish cycle.
    ///
    /// The cursor moves as soon as an event joins the log. If the live manifest
    /// can not be written afterwards the error is returned, and the next cycle
    /// writes the event again as part of the full log.
    pub async fn cycle(&mut self) -> DashMetaResult<CycleOutcome> {
        let base = match tokio::fs::read(&self.base_manifest).await {
            Ok(base) => base,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CycleOutcome::NotReady(NotReadyReason::Missing))
            }
            Err(e) => return Err(e.into()),
        };

        let next = self.inbox.get(self.cursor);
        let manifest = match self.builder.build(&base, next.as_ref()) {
            Ok(manifest) => manifest,
            Err(reason) => return Ok(CycleOutcome::NotReady(reason)),
        };

        let outcome = match manifest.added {
            Some(event) => {
                self.cursor += 1;
                CycleOutcome::Advanced(event)
            }
            None => CycleOutcome::NoOp,
        };

        write_atomic(&self.live_manifest, manifest.document).await?;
        Ok(outcome)
    }

    async fn publish(&mut self) {
        match self.cycle().await {
            Ok(CycleOutcome::NotReady(reason @ NotReadyReason::Unparseable(_))) => {
                tracing::warn!("Skipped live manifest update: {reason}")
            }
            Ok(CycleOutcome::NotReady(reason)) => {
                tracing::debug!("Skipped live manifest update: {reason}")
            }
            Ok(_) => {}
            Err(e) => tracing::error!(
                "Failed to update {}: {e}",
                self.live_manifest.display()
            ),
        }
    }

    /// Publish until the stream ends, then run one last cycle for pending metadata.
    ///
    /// Returns the final event log.
    pub async fn run(mut self) -> EventLog {
        let watcher = BaseManifestWatcher::new(&self.base_manifest);
        if !watcher.wait_ready(self.wait_interval, &self.liveness).await {
            tracing::warn!("Stream ended before the first manifest was written.");
            return self.builder.into_log();
        }
        tracing::info!("First manifest ready, clients can now connect.");

        loop {
            self.publish().await;
            tokio::time::sleep(self.poll_interval).await;

            if !self.liveness.is_alive() {
                break;
            }
        }

        tracing::info!("Stream ended, flushing pending metadata.");
        self.publish().await;

        tracing::info!(
            events = self.builder.log().len(),
            pending = self.inbox.len().saturating_sub(self.cursor),
            "Live manifest publisher stopped."
        );
        self.builder.into_log()
    }
}
