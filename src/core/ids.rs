//! Identifier generation for projects, chats and streamed messages.

use chrono::Utc;

/// Source of identifiers that are unique within one repository.
pub trait IdGenerator: Send {
    fn next_id(&mut self) -> String;
}

/// Millisecond wall-clock identifiers, bumped forward when two calls land in
/// the same millisecond (or the clock steps backwards) so that every id is
/// strictly greater than the previous one.
#[derive(Debug, Default)]
pub struct TimestampIdGenerator {
    last: i64,
}

impl TimestampIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_value(&mut self, now_millis: i64) -> i64 {
        let value = if now_millis > self.last {
            now_millis
        } else {
            self.last + 1
        };
        self.last = value;
        value
    }
}

impl IdGenerator for TimestampIdGenerator {
    fn next_id(&mut self) -> String {
        self.next_value(Utc::now().timestamp_millis()).to_string()
    }
}

/// Deterministic identifiers (`<prefix>1`, `<prefix>2`, ...).
#[derive(Debug, Clone)]
pub struct SequentialIdGenerator {
    prefix: String,
    counter: u64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: 0,
        }
    }
}

impl Default for SequentialIdGenerator {
    fn default() -> Self {
        Self::new("id-")
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&mut self) -> String {
        self.counter += 1;
        format!("{}{}", self.prefix, self.counter)
    }
}
