use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use dashmeta::{
    CycleOutcome, LiveManifestPublisher, MetadataInbox, NotReadyReason, PersistentEvent,
    PublisherConfig, StreamLiveness,
};
use tempfile::TempDir;

use crate::{event_stream_section, init_test_tracing, BASE_MPD, NEXT_BASE_MPD};

struct TestStream {
    dir: TempDir,
    inbox: Arc<MetadataInbox>,
    alive: Arc<AtomicBool>,
}

impl TestStream {
    fn new() -> Self {
        init_test_tracing();
        Self {
            dir: tempfile::tempdir().unwrap(),
            inbox: Arc::new(MetadataInbox::new()),
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    fn config(&self) -> PublisherConfig {
        PublisherConfig::new(self.dir.path())
            .with_poll_interval(Duration::from_millis(1))
            .with_wait_interval(Duration::from_millis(1))
    }

    fn publisher(&self) -> LiveManifestPublisher<Arc<AtomicBool>> {
        LiveManifestPublisher::new(self.config(), self.inbox.clone(), self.alive.clone())
    }

    fn base_manifest(&self) -> PathBuf {
        self.config().base_manifest
    }

    fn live_manifest(&self) -> PathBuf {
        self.config().live_manifest
    }

    fn write_base(&self, contents: &str) {
        std::fs::write(self.base_manifest(), contents).unwrap();
    }

    fn live_document(&self) -> String {
        std::fs::read_to_string(self.live_manifest()).unwrap()
    }
}

fn event(id: u64, presentation_time: i64, text: &str) -> PersistentEvent {
    PersistentEvent {
        id,
        presentation_time,
        duration: 1,
        text: text.to_string(),
    }
}

#[tokio::test]
async fn test_one_event_per_cycle_in_submission_order() {
    let stream = TestStream::new();
    stream.write_base(BASE_MPD);
    for i in 0..5 {
        stream.inbox.submit(format!("message {i}"), 10 - i);
    }

    let mut publisher = stream.publisher();
    for i in 0..5 {
        let outcome = publisher.cycle().await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Advanced(event(i as u64, 10 - i, &format!("message {i}")))
        );
        assert_eq!(publisher.cursor(), i as usize + 1);
    }

    assert_eq!(publisher.cycle().await.unwrap(), CycleOutcome::NoOp);
    assert_eq!(publisher.cursor(), 5);

    let ids: Vec<_> = publisher.events().iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_arrival_order_is_kept_over_timestamps() {
    let stream = TestStream::new();
    stream.write_base(BASE_MPD);
    stream.inbox.submit("A", 5);
    stream.inbox.submit("B", 3);

    let mut publisher = stream.publisher();
    publisher.cycle().await.unwrap();
    publisher.cycle().await.unwrap();

    assert_eq!(publisher.events(), &[event(0, 5, "A"), event(1, 3, "B")]);
    assert_eq!(
        event_stream_section(stream.live_manifest()),
        concat!(
            r#"<EventStream schemeIdUri="urn:metadata" timescale="1" value="metadata">"#,
            r#"<Event presentationTime="5" duration="1" id="0">A</Event>"#,
            r#"<Event presentationTime="3" duration="1" id="1">B</Event>"#,
            r#"</EventStream>"#,
        )
    );
}

#[tokio::test]
async fn test_live_manifest_has_a_single_event_stream() {
    let stream = TestStream::new();
    stream.write_base(BASE_MPD);

    let mut publisher = stream.publisher();
    for i in 0..10 {
        if i % 3 == 0 {
            stream.inbox.submit(format!("message {i}"), i);
        }
        publisher.cycle().await.unwrap();

        let document = stream.live_document();
        assert_eq!(document.matches("<EventStream").count(), 1);

        let mpd = dash_mpd::parse(&document).unwrap();
        assert_eq!(mpd.periods.len(), 1);
    }
    assert_eq!(publisher.events().len(), 4);
}

#[tokio::test]
async fn test_control_characters_keep_manifest_valid() {
    let stream = TestStream::new();
    stream.write_base(BASE_MPD);
    stream.inbox.submit("bell\u{7} and nul\u{0}", 1);
    stream.inbox.submit("next", 2);

    let mut publisher = stream.publisher();
    publisher.cycle().await.unwrap();
    publisher.cycle().await.unwrap();

    let document = stream.live_document();
    assert!(dash_mpd::parse(&document).is_ok());
    assert_eq!(
        event_stream_section(stream.live_manifest()),
        concat!(
            r#"<EventStream schemeIdUri="urn:metadata" timescale="1" value="metadata">"#,
            r#"<Event presentationTime="1" duration="1" id="0">bell and nul</Event>"#,
            r#"<Event presentationTime="2" duration="1" id="1">next</Event>"#,
            r#"</EventStream>"#,
        )
    );
}

#[tokio::test]
async fn test_extra_cycle_keeps_event_log() {
    let stream = TestStream::new();
    stream.write_base(BASE_MPD);
    stream.inbox.submit("A", 1);
    stream.inbox.submit("B", 2);

    let mut publisher = stream.publisher();
    publisher.cycle().await.unwrap();
    publisher.cycle().await.unwrap();
    let before = event_stream_section(stream.live_manifest());

    // the transcoder replaced its manifest in the meantime
    stream.write_base(NEXT_BASE_MPD);
    assert_eq!(publisher.cycle().await.unwrap(), CycleOutcome::NoOp);

    assert_eq!(event_stream_section(stream.live_manifest()), before);
    let document = stream.live_document();
    assert!(document.contains(r#"<S t="0" d="30720" r="5" />"#));
    assert!(document.contains(r#"publishTime="2024-05-01T10:00:12Z""#));
}

#[tokio::test]
async fn test_base_timeline_is_copied_through() {
    let stream = TestStream::new();
    stream.write_base(BASE_MPD);

    let mut publisher = stream.publisher();
    publisher.cycle().await.unwrap();

    let document = stream.live_document();
    let (before, after) = BASE_MPD.split_once("\t</Period>").unwrap();
    assert!(document.starts_with(before));
    assert!(document.ends_with(&format!("</Period>{after}")));
}

#[tokio::test]
async fn test_missing_base_manifest() {
    let stream = TestStream::new();
    stream.inbox.submit("A", 1);

    let mut publisher = stream.publisher();
    assert_eq!(
        publisher.cycle().await.unwrap(),
        CycleOutcome::NotReady(NotReadyReason::Missing)
    );
    assert_eq!(publisher.cursor(), 0);
    assert!(publisher.events().is_empty());
    assert!(!stream.live_manifest().exists());
}

#[tokio::test]
async fn test_truncated_base_keeps_previous_live_manifest() {
    let stream = TestStream::new();
    stream.write_base(BASE_MPD);
    stream.inbox.submit("A", 1);

    let mut publisher = stream.publisher();
    publisher.cycle().await.unwrap();
    let published = std::fs::read(stream.live_manifest()).unwrap();

    stream.write_base("");
    stream.inbox.submit("B", 2);
    assert_eq!(
        publisher.cycle().await.unwrap(),
        CycleOutcome::NotReady(NotReadyReason::Empty)
    );
    assert_eq!(std::fs::read(stream.live_manifest()).unwrap(), published);
    assert_eq!(publisher.cursor(), 1);

    // half-written manifest
    stream.write_base(&BASE_MPD[..BASE_MPD.len() / 2]);
    assert!(matches!(
        publisher.cycle().await.unwrap(),
        CycleOutcome::NotReady(_)
    ));
    assert_eq!(std::fs::read(stream.live_manifest()).unwrap(), published);

    // the pending message is picked up once the manifest is back
    stream.write_base(NEXT_BASE_MPD);
    assert_eq!(
        publisher.cycle().await.unwrap(),
        CycleOutcome::Advanced(event(1, 2, "B"))
    );
}

#[tokio::test]
async fn test_manifest_without_period() {
    let stream = TestStream::new();
    stream.write_base(r#"<?xml version="1.0" encoding="utf-8"?><MPD xmlns="urn:mpeg:dash:schema:mpd:2011" type="dynamic"></MPD>"#);
    stream.inbox.submit("A", 1);

    let mut publisher = stream.publisher();
    assert_eq!(
        publisher.cycle().await.unwrap(),
        CycleOutcome::NotReady(NotReadyReason::NoPeriod)
    );
    assert_eq!(publisher.cursor(), 0);
}

#[tokio::test]
async fn test_write_failure_does_not_lose_event() {
    let stream = TestStream::new();
    stream.write_base(BASE_MPD);
    stream.inbox.submit("A", 1);

    let config = stream
        .config()
        .with_live_manifest(stream.dir.path().join("missing").join("live-manifest.mpd"));
    let mut publisher = LiveManifestPublisher::new(config, stream.inbox.clone(), stream.alive.clone());

    assert!(publisher.cycle().await.is_err());
    assert_eq!(publisher.cursor(), 1);
    assert_eq!(publisher.events(), &[event(0, 1, "A")]);
}

/// Reports the stream as ended, submitting some last messages right before.
struct EndsAfterSubmitting {
    inbox: Arc<MetadataInbox>,
    late: Vec<(&'static str, i64)>,
    fired: AtomicBool,
}

impl StreamLiveness for EndsAfterSubmitting {
    fn is_alive(&self) -> bool {
        if !self.fired.swap(true, Ordering::SeqCst) {
            for (text, time) in &self.late {
                self.inbox.submit(*text, *time);
            }
        }
        false
    }
}

#[tokio::test]
async fn test_final_cycle_flushes_pending_message() {
    let stream = TestStream::new();
    stream.write_base(BASE_MPD);
    stream.inbox.submit("early", 1);

    let liveness = EndsAfterSubmitting {
        inbox: stream.inbox.clone(),
        late: vec![("late", 2)],
        fired: AtomicBool::new(false),
    };
    let publisher = LiveManifestPublisher::new(stream.config(), stream.inbox.clone(), liveness);
    let log = publisher.run().await;

    assert_eq!(log.events(), &[event(0, 1, "early"), event(1, 2, "late")]);
    assert!(stream
        .live_document()
        .contains(r#"<Event presentationTime="2" duration="1" id="1">late</Event>"#));
}

#[tokio::test]
async fn test_exactly_one_final_cycle() {
    let stream = TestStream::new();
    stream.write_base(BASE_MPD);

    let liveness = EndsAfterSubmitting {
        inbox: stream.inbox.clone(),
        late: vec![("first", 1), ("second", 2)],
        fired: AtomicBool::new(false),
    };
    let publisher = LiveManifestPublisher::new(stream.config(), stream.inbox.clone(), liveness);
    let log = publisher.run().await;

    assert_eq!(log.events(), &[event(0, 1, "first")]);
}

#[tokio::test]
async fn test_run_ends_with_stream() {
    let stream = TestStream::new();
    stream.write_base(BASE_MPD);
    stream.inbox.submit("A", 1);

    let handle = tokio::spawn(stream.publisher().run());
    tokio::time::sleep(Duration::from_millis(50)).await;
    stream.inbox.submit("B", 2);
    tokio::time::sleep(Duration::from_millis(50)).await;
    stream.alive.store(false, Ordering::Release);

    let log = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(log.events(), &[event(0, 1, "A"), event(1, 2, "B")]);
}

#[tokio::test]
async fn test_stream_gone_before_first_manifest() {
    let stream = TestStream::new();
    stream.inbox.submit("A", 1);
    stream.alive.store(false, Ordering::Release);

    let log = stream.publisher().run().await;

    assert!(log.is_empty());
    assert!(!stream.live_manifest().exists());
}
