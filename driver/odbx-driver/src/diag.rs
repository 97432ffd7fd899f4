///
/// Diagnostic records.
///
/// One record per notice or error the driver attached to a handle by its
/// most recent call: a five-character SQLSTATE, the native error code of the
/// data source and the message text.
///

use std::fmt;

/// Longest message text a record carries (`SQL_MAX_MESSAGE_LENGTH`).
pub const MAX_MESSAGE_LENGTH: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagRecord {
    pub state: String,
    pub native: i32,
    pub message: String,
}

impl DiagRecord {
    pub fn new(state: &str, native: i32, message: impl Into<String>) -> Self {
        let mut message = message.into();
        truncate_message(&mut message);
        Self {
            state: state.to_string(),
            native,
            message,
        }
    }
}

/// Cut `message` to at most `MAX_MESSAGE_LENGTH` bytes on a char boundary.
pub fn truncate_message(message: &mut String) {
    if message.len() <= MAX_MESSAGE_LENGTH {
        return;
    }
    let mut end = MAX_MESSAGE_LENGTH;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message.truncate(end);
}

impl fmt::Display for DiagRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ({}) {}", self.state, self.native, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_is_truncated() {
        let long = "é".repeat(400);
        let rec = DiagRecord::new("HY000", 1, long);
        assert!(rec.message.len() <= MAX_MESSAGE_LENGTH);
        assert_eq!(rec.message.len(), 512);
        assert_eq!(rec.to_string().split(' ').next(), Some("[HY000]"));
    }
}
