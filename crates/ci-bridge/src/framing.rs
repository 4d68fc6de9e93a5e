//! Newline-delimited JSON framing on the socket side of the Bridge
//! (spec.md §4.4).

use ci_core::Message;

/// Encode a [`Message`] as one newline-terminated JSON line.
pub fn encode(message: &Message) -> Result<Vec<u8>, serde_json::Error> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    Ok(line)
}

/// Decode one line (without its trailing newline) as a [`Message`].
pub fn decode(line: &str) -> Result<Message, serde_json::Error> {
    serde_json::from_str(line.trim_end_matches(['\r', '\n']))
}

/// Compute the bytes actually written to the child's stdin for an outbound
/// message: `content`, plus the effective delimiter if `execute` is set.
/// Precedence: the message's own delimiter, then the Bridge's configured
/// default, then a single `\n` (spec.md §4.4).
#[must_use]
pub fn stdin_payload(content: &str, execute: bool, effective_delimiter: &[u8]) -> Vec<u8> {
    let mut payload = content.as_bytes().to_vec();
    if execute {
        payload.extend_from_slice(effective_delimiter);
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use ci_core::Message;

    #[test]
    fn encode_decode_round_trips() {
        let msg = Message::chat("cli", "echo-ci", "hello");
        let line = encode(&msg).unwrap();
        let text = String::from_utf8(line).unwrap();
        let decoded = decode(&text).unwrap();
        assert_eq!(decoded.content, "hello");
    }

    #[test]
    fn execute_appends_delimiter() {
        let payload = stdin_payload("hello", true, b"\n");
        assert_eq!(payload, b"hello\n");
    }

    #[test]
    fn non_execute_sends_content_only() {
        let payload = stdin_payload("hello", false, b"\n");
        assert_eq!(payload, b"hello");
    }
}
