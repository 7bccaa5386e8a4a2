pub mod builder;
pub mod error;
pub mod event;
pub mod fs;
pub mod inbox;
pub mod mpd;
pub mod publisher;
pub mod supervisor;
pub mod watcher;

pub use builder::{EventLogBuilder, LiveManifest};
pub use error::{DashMetaError, DashMetaResult};
pub use event::{EventLog, EventStreamConfig, PersistentEvent};
pub use inbox::{FeedEntry, MetadataInbox, MetadataMessage, Receipt};
pub use mpd::NotReadyReason;
pub use publisher::{CycleOutcome, LiveManifestPublisher, PublisherConfig};
pub use supervisor::{ProcessState, ProcessSupervisor, StreamLiveness, TranscoderCommand};
pub use watcher::BaseManifestWatcher;
