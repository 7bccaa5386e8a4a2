use parking_lot::RwLock;
use serde::Serialize;

/// A single metadata message, as submitted by a producer.
///
/// Messages are immutable once accepted. `received_order` is the position of
/// the message in the [MetadataInbox], which is also its arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataMessage {
    pub text: String,
    pub presentation_time: i64,
    pub received_order: u64,
}

/// Read-back view of a stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedEntry {
    pub metadata: String,
    pub time: i64,
}

impl From<&MetadataMessage> for FeedEntry {
    fn from(message: &MetadataMessage) -> Self {
        Self {
            metadata: message.text.clone(),
            time: message.presentation_time,
        }
    }
}

/// What the producer gets back from [MetadataInbox::submit].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// The text that was received, echoed back as-is.
    pub received: String,
    /// Position of the stored message, `None` if the message was not stored.
    pub stored_at: Option<u64>,
}

/// Whether `c` may appear in an XML 1.0 document.
fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n' | '\r'
            | '\u{20}'..='\u{D7FF}'
            | '\u{E000}'..='\u{FFFD}'
            | '\u{10000}'..='\u{10FFFF}'
    )
}

/// Append-only, arrival-ordered collection of metadata messages.
///
/// Any number of writers may call [MetadataInbox::submit] concurrently, while
/// the publisher reads entries one by one with [MetadataInbox::get].
#[derive(Debug, Default)]
pub struct MetadataInbox {
    messages: RwLock<Vec<MetadataMessage>>,
}

impl MetadataInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message.
    ///
    /// Characters that can not appear in XML are removed before storing.
    /// Texts left empty are acknowledged but not stored. Timestamps are kept
    /// as given: duplicated or decreasing values are fine, ordering is by arrival.
    pub fn submit(&self, text: impl Into<String>, presentation_time: i64) -> Receipt {
        let text = text.into();
        let stored: String = text.chars().filter(|c| is_xml_char(*c)).collect();
        if stored.is_empty() {
            return Receipt {
                received: text,
                stored_at: None,
            };
        }
        if stored.len() != text.len() {
            tracing::warn!("Removed characters not allowed in XML from metadata: {stored}");
        }

        let mut messages = self.messages.write();
        let received_order = messages.len() as u64;
        messages.push(MetadataMessage {
            text: stored,
            presentation_time,
            received_order,
        });
        drop(messages);

        tracing::info!(order = received_order, presentation_time, "Received metadata: {text}");
        Receipt {
            received: text,
            stored_at: Some(received_order),
        }
    }

    /// Get a copy of the message at `index`, if it has arrived yet.
    pub fn get(&self, index: usize) -> Option<MetadataMessage> {
        self.messages.read().get(index).cloned()
    }

    /// Snapshot of every stored message, in arrival order.
    pub fn read_all(&self) -> Vec<FeedEntry> {
        self.messages.read().iter().map(FeedEntry::from).collect()
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }
}
