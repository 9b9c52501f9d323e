use chrono::{DateTime, Utc};
use serde::Serialize;

use super::model::{Message, Role};

/// Partial transcriptions for the live turn in flight
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TranscriptionBuffer {
    pub user: String,
    pub model: String,
}

impl TranscriptionBuffer {
    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.model.is_empty()
    }

    pub fn clear(&mut self) {
        self.user.clear();
        self.model.clear();
    }
}

/// Committed conversation plus the pending live turn
///
/// The pending turn is merged into the committed list only at turn
/// boundaries. Readers see it through [`Timeline::messages`] as one
/// trailing model message that grows in place.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    committed: Vec<Message>,
    pending: TranscriptionBuffer,
    pending_since: Option<DateTime<Utc>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finished message
    pub fn push(&mut self, message: Message) {
        self.committed.push(message);
    }

    pub fn committed(&self) -> &[Message] {
        &self.committed
    }

    pub fn pending(&self) -> &TranscriptionBuffer {
        &self.pending
    }

    /// Committed messages followed by the in-progress model reply, if any
    pub fn messages(&self) -> Vec<Message> {
        let mut messages = self.committed.clone();
        if !self.pending.model.is_empty() {
            messages.push(Message {
                role: Role::Model,
                content: self.pending.model.clone(),
                timestamp: self.pending_since.unwrap_or_else(Utc::now),
            });
        }
        messages
    }

    pub fn len(&self) -> usize {
        self.committed.len() + usize::from(!self.pending.model.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn append_user_partial(&mut self, text: &str, now: DateTime<Utc>) {
        self.pending_since.get_or_insert(now);
        self.pending.user.push_str(text);
    }

    pub fn append_model_partial(&mut self, text: &str, now: DateTime<Utc>) {
        self.pending_since.get_or_insert(now);
        self.pending.model.push_str(text);
    }

    /// Commit the pending turn as `[user, model]` and clear both buffers
    ///
    /// Empty halves are skipped. Returns the committed user text.
    pub fn commit_turn(&mut self, now: DateTime<Utc>) -> String {
        let since = self.pending_since.take().unwrap_or(now);
        let user_text = std::mem::take(&mut self.pending.user);
        let model_text = std::mem::take(&mut self.pending.model);

        let user_trimmed = user_text.trim();
        if !user_trimmed.is_empty() {
            self.committed.push(Message::user(user_trimmed, since));
        }
        if !model_text.is_empty() {
            self.committed.push(Message::model(model_text, since));
        }

        user_trimmed.to_string()
    }

    /// Drop the pending turn without committing it
    pub fn discard_pending(&mut self) {
        self.pending.clear();
        self.pending_since = None;
    }

    pub fn clear(&mut self) {
        self.committed.clear();
        self.discard_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_partials_merge_into_one_message() {
        let now = Utc::now();
        let mut timeline = Timeline::new();
        timeline.append_model_partial("Hi", now);
        timeline.append_model_partial(" there", now);

        let messages = timeline.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::Model);
        assert_eq!(messages[0].content, "Hi there");
    }

    #[test]
    fn test_commit_places_user_before_model() {
        let now = Utc::now();
        let mut timeline = Timeline::new();
        timeline.push(Message::model("Bienvenido", now));
        timeline.append_model_partial("Es un museo.", now);
        timeline.append_user_partial("what is this", now);

        let user = timeline.commit_turn(now);
        assert_eq!(user, "what is this");

        let messages = timeline.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1], Message::user("what is this", now));
        assert_eq!(messages[2], Message::model("Es un museo.", now));
        assert!(timeline.pending().is_empty());
    }

    #[test]
    fn test_commit_with_empty_user_buffer() {
        let now = Utc::now();
        let mut timeline = Timeline::new();
        timeline.append_model_partial("Hola", now);

        assert_eq!(timeline.commit_turn(now), "");
        assert_eq!(timeline.committed().len(), 1);
        assert!(timeline.pending().is_empty());
    }

    #[test]
    fn test_pending_never_overwrites_committed_model_message() {
        let now = Utc::now();
        let mut timeline = Timeline::new();
        timeline.push(Message::model("From text chat", now));
        timeline.append_model_partial("Live reply", now);

        let messages = timeline.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "From text chat");
    }
}
