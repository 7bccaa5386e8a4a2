//! Rewriting of the transcoder's manifest.
//!
//! The base manifest is validated with `dash_mpd`, but the rewrite itself
//! streams the original document through `quick_xml` so that everything the
//! transcoder wrote (namespaces, comments, attributes `dash_mpd` does not
//! model) reaches the client untouched. Only `EventStream` children of the
//! first `Period` are dropped, and one fresh `EventStream` is appended to it.

use std::{borrow::Cow, fmt, io::Write};

use quick_xml::{
    events::{BytesEnd, BytesStart, BytesText, Event},
    Reader, Writer,
};

use crate::{error::DashMetaResult, event::EventStreamConfig, PersistentEvent};

/// Why a publish cycle could not produce a live manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotReadyReason {
    /// The base manifest does not exist yet.
    Missing,
    /// The base manifest exists but is empty, usually mid-write.
    Empty,
    /// The base manifest could not be parsed.
    Unparseable(String),
    /// The base manifest has no `Period` to attach events to.
    NoPeriod,
}

impl fmt::Display for NotReadyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotReadyReason::Missing => write!(f, "base manifest does not exist"),
            NotReadyReason::Empty => write!(f, "base manifest is empty"),
            NotReadyReason::Unparseable(e) => write!(f, "base manifest is invalid: {e}"),
            NotReadyReason::NoPeriod => write!(f, "base manifest has no period"),
        }
    }
}

/// Check that `base` is a non-empty MPD with at least one period.
pub fn check_manifest(base: &[u8]) -> Result<&str, NotReadyReason> {
    if base.is_empty() {
        return Err(NotReadyReason::Empty);
    }

    let text =
        std::str::from_utf8(base).map_err(|e| NotReadyReason::Unparseable(e.to_string()))?;
    let mpd = dash_mpd::parse(text).map_err(|e| NotReadyReason::Unparseable(e.to_string()))?;
    if mpd.periods.is_empty() {
        return Err(NotReadyReason::NoPeriod);
    }

    Ok(text)
}

fn is_named(start: &BytesStart, local_name: &[u8]) -> bool {
    start.name().local_name().as_ref() == local_name
}

fn prefix_of(start: &BytesStart) -> Option<String> {
    start
        .name()
        .prefix()
        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned())
}

fn qualified<'a>(prefix: Option<&str>, local_name: &'a str) -> Cow<'a, str> {
    match prefix {
        Some(prefix) => Cow::Owned(format!("{prefix}:{local_name}")),
        None => Cow::Borrowed(local_name),
    }
}

fn write_event_stream<'a, W, I>(
    writer: &mut Writer<W>,
    prefix: Option<&str>,
    events: I,
    config: &EventStreamConfig,
) -> DashMetaResult<()>
where
    W: Write,
    I: IntoIterator<Item = &'a PersistentEvent>,
{
    let stream_name = qualified(prefix, "EventStream");
    let event_name = qualified(prefix, "Event");

    let timescale = config.timescale.to_string();
    let mut stream = BytesStart::new(&*stream_name);
    stream.push_attribute(("schemeIdUri", config.scheme_id_uri.as_str()));
    stream.push_attribute(("timescale", timescale.as_str()));
    stream.push_attribute(("value", config.value.as_str()));
    writer.write_event(Event::Start(stream))?;

    for event in events {
        let presentation_time = event.presentation_time.to_string();
        let duration = event.duration.to_string();
        let id = event.id.to_string();

        let mut element = BytesStart::new(&*event_name);
        element.push_attribute(("presentationTime", presentation_time.as_str()));
        element.push_attribute(("duration", duration.as_str()));
        element.push_attribute(("id", id.as_str()));
        writer.write_event(Event::Start(element))?;
        writer.write_event(Event::Text(BytesText::new(&event.text)))?;
        writer.write_event(Event::End(BytesEnd::new(&*event_name)))?;
    }

    writer.write_event(Event::End(BytesEnd::new(&*stream_name)))?;
    Ok(())
}

/// Copy `base`, replacing every `EventStream` of its first `Period` with a
/// single one holding `events`.
///
/// Returns `None` if the document has no `Period` directly under its root.
pub fn inject_event_stream<'a, I>(
    base: &str,
    events: I,
    config: &EventStreamConfig,
) -> DashMetaResult<Option<Vec<u8>>>
where
    I: IntoIterator<Item = &'a PersistentEvent>,
{
    let mut reader = Reader::from_str(base);
    let mut writer = Writer::new(Vec::with_capacity(base.len()));
    let mut events = Some(events);

    // number of currently open elements
    let mut depth = 0usize;
    // > 0 while inside an EventStream that is being dropped
    let mut skipping = 0usize;
    // Some(prefix) while inside the target period
    let mut period: Option<Option<String>> = None;
    let mut injected = false;

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(start) => {
                if skipping > 0 {
                    skipping += 1;
                    continue;
                }
                if period.is_some() && depth == 2 && is_named(&start, b"EventStream") {
                    skipping = 1;
                    continue;
                }
                if !injected && period.is_none() && depth == 1 && is_named(&start, b"Period") {
                    period = Some(prefix_of(&start));
                }

                depth += 1;
                writer.write_event(Event::Start(start))?;
            }
            Event::End(end) => {
                if skipping > 0 {
                    skipping -= 1;
                    continue;
                }

                depth = depth.saturating_sub(1);
                if depth == 1 {
                    if let Some(prefix) = period.take() {
                        if let Some(events) = events.take() {
                            write_event_stream(&mut writer, prefix.as_deref(), events, config)?;
                        }
                        injected = true;
                    }
                }
                writer.write_event(Event::End(end))?;
            }
            Event::Empty(start) => {
                if skipping > 0 {
                    continue;
                }
                if period.is_some() && depth == 2 && is_named(&start, b"EventStream") {
                    continue;
                }
                if !injected && depth == 1 && is_named(&start, b"Period") {
                    // <Period/> has to be opened to receive the stream
                    let prefix = prefix_of(&start);
                    writer.write_event(Event::Start(start.borrow()))?;
                    if let Some(events) = events.take() {
                        write_event_stream(&mut writer, prefix.as_deref(), events, config)?;
                    }
                    writer.write_event(Event::End(start.to_end()))?;
                    injected = true;
                    continue;
                }

                writer.write_event(Event::Empty(start))?;
            }
            other => {
                if skipping == 0 {
                    writer.write_event(other)?;
                }
            }
        }
    }

    if !injected {
        return Ok(None);
    }
    Ok(Some(writer.into_inner()))
}
