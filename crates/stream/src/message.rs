//! Defensive parsing of inbound recognition messages.

use aura_events::TranscriptEvent;
use serde_json::Value;

/// Extract a transcript event from one inbound text message.
///
/// The far end is untrusted: a malformed or unexpected message must never
/// crash the client, so every step of the `channel.alternatives[0].transcript`
/// path is optional and any miss yields no event. Blank or whitespace-only
/// transcripts (silence, keepalive results) are suppressed as well.
pub fn parse_transcript(raw: &str) -> Option<TranscriptEvent> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let transcript = value
        .get("channel")?
        .get("alternatives")?
        .get(0)?
        .get("transcript")?
        .as_str()?;

    if transcript.trim().is_empty() {
        return None;
    }

    let is_final = value
        .get("is_final")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Some(TranscriptEvent::new(transcript, is_final))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(transcript: &str, is_final: bool) -> String {
        format!(
            r#"{{"channel":{{"alternatives":[{{"transcript":"{transcript}"}}]}},"is_final":{is_final}}}"#
        )
    }

    #[test]
    fn test_extracts_transcript_and_final_flag() {
        let event = parse_transcript(&message("hello world", true)).unwrap();
        assert_eq!(event.text, "hello world");
        assert!(event.is_final);

        let event = parse_transcript(&message("still talking", false)).unwrap();
        assert!(!event.is_final);
    }

    #[test]
    fn test_blank_transcript_produces_no_event() {
        assert!(parse_transcript(&message("", true)).is_none());
        assert!(parse_transcript(&message("   ", true)).is_none());
    }

    #[test]
    fn test_missing_path_produces_no_event() {
        assert!(parse_transcript(r#"{"type":"Metadata"}"#).is_none());
        assert!(parse_transcript(r#"{"channel":{}}"#).is_none());
        assert!(parse_transcript(r#"{"channel":{"alternatives":[]}}"#).is_none());
        assert!(parse_transcript(r#"{"channel":{"alternatives":[{}]}}"#).is_none());
    }

    #[test]
    fn test_malformed_json_is_ignored() {
        assert!(parse_transcript("not json at all").is_none());
        assert!(parse_transcript("").is_none());
        assert!(parse_transcript(r#"{"channel": 42}"#).is_none());
    }

    #[test]
    fn test_missing_final_flag_defaults_to_interim() {
        let raw = r#"{"channel":{"alternatives":[{"transcript":"hi there"}]}}"#;
        let event = parse_transcript(raw).unwrap();
        assert!(!event.is_final);
    }
}
