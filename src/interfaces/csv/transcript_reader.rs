use crate::domain::message::Inbound;
use crate::domain::{ChatId, UserId};
use crate::error::{Result, ShipError};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RowKind {
    Text,
    Callback,
    Wait,
}

#[derive(Debug, Deserialize)]
struct TranscriptRow {
    user_id: UserId,
    chat_id: ChatId,
    kind: RowKind,
    #[serde(default)]
    content: String,
}

/// One line of a recorded conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptEvent {
    Message(Inbound),
    /// Lets the replay clock run forward, in milliseconds.
    Wait(i64),
}

impl TranscriptRow {
    fn into_event(self) -> Result<TranscriptEvent> {
        Ok(match self.kind {
            RowKind::Text => TranscriptEvent::Message(Inbound::text(self.user_id, self.chat_id, self.content)),
            RowKind::Callback => {
                TranscriptEvent::Message(Inbound::callback(self.user_id, self.chat_id, self.content))
            }
            RowKind::Wait => {
                let millis = self.content.trim().parse::<i64>().map_err(|_| {
                    ShipError::Validation(format!("wait needs milliseconds, got {:?}", self.content))
                })?;
                TranscriptEvent::Wait(millis)
            }
        })
    }
}

/// Reads a `user_id,chat_id,kind,content` transcript.
///
/// Fields are trimmed, so a text message cannot start or end with spaces.
pub struct TranscriptReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> TranscriptReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily yields events; a malformed row yields an error and reading goes on.
    pub fn events(self) -> impl Iterator<Item = Result<TranscriptEvent>> {
        self.reader
            .into_deserialize::<TranscriptRow>()
            .map(|row| row.map_err(ShipError::from).and_then(TranscriptRow::into_event))
    }
}
