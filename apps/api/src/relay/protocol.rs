//! Message translation between the browser protocol and the Gemini Live
//! `BidiGenerateContent` protocol. Everything here is pure; the socket
//! plumbing lives in `proxy`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::interview::session::{Speaker, TranscriptTurn};

pub const INPUT_AUDIO_MIME: &str = "audio/pcm;rate=16000";

/// Text frames the browser may send.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientControl {
    Setup {
        system_instruction: Option<String>,
        voice: Option<String>,
    },
    Text {
        text: String,
    },
    End,
}

/// What the relay does with one upstream message, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    Ready,
    Audio(Vec<u8>),
    Transcript { role: Speaker, text: String },
    TurnComplete,
    Interrupted,
    Error(String),
}

impl RelayEvent {
    /// JSON frame for the browser. Audio goes out as a binary frame instead.
    pub fn to_client_json(&self) -> Option<String> {
        let value = match self {
            RelayEvent::Ready => json!({ "type": "ready" }),
            RelayEvent::Audio(_) => return None,
            RelayEvent::Transcript { role, text } => {
                json!({ "type": "transcript", "role": role, "text": text })
            }
            RelayEvent::TurnComplete => json!({ "type": "turn_complete" }),
            RelayEvent::Interrupted => json!({ "type": "interrupted" }),
            RelayEvent::Error(message) => json!({ "type": "error", "message": message }),
        };
        Some(value.to_string())
    }
}

pub fn parse_client_control(text: &str) -> Result<ClientControl, serde_json::Error> {
    serde_json::from_str(text)
}

pub fn setup_message(model: &str, system_instruction: Option<&str>, voice: Option<&str>) -> Value {
    let mut generation_config = json!({ "responseModalities": ["AUDIO"] });
    if let Some(voice) = voice {
        generation_config["speechConfig"] = json!({
            "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice } }
        });
    }

    let mut setup = json!({
        "model": model,
        "generationConfig": generation_config,
        "inputAudioTranscription": {},
        "outputAudioTranscription": {},
    });
    if let Some(instruction) = system_instruction.filter(|s| !s.trim().is_empty()) {
        setup["systemInstruction"] = json!({ "parts": [{ "text": instruction }] });
    }

    json!({ "setup": setup })
}

pub fn audio_chunk_message(pcm: &[u8]) -> Value {
    json!({
        "realtimeInput": {
            "mediaChunks": [{ "mimeType": INPUT_AUDIO_MIME, "data": STANDARD.encode(pcm) }]
        }
    })
}

pub fn client_text_message(text: &str) -> Value {
    json!({
        "clientContent": {
            "turns": [{ "role": "user", "parts": [{ "text": text }] }],
            "turnComplete": true
        }
    })
}

/// Translates one upstream server message into relay events.
///
/// Unknown keys are ignored so new server fields do not break the relay.
pub fn translate_upstream(raw: &str) -> Result<Vec<RelayEvent>, serde_json::Error> {
    let message: Value = serde_json::from_str(raw)?;
    let mut events = Vec::new();

    if message.get("setupComplete").is_some() {
        events.push(RelayEvent::Ready);
    }

    if let Some(error) = message.get("error") {
        let text = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        events.push(RelayEvent::Error(text));
    }

    if let Some(content) = message.get("serverContent") {
        if content.get("interrupted").and_then(Value::as_bool) == Some(true) {
            events.push(RelayEvent::Interrupted);
        }

        let parts = content
            .pointer("/modelTurn/parts")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for part in parts {
            let Some(data) = part.pointer("/inlineData/data").and_then(Value::as_str) else {
                continue;
            };
            match STANDARD.decode(data) {
                Ok(pcm) => events.push(RelayEvent::Audio(pcm)),
                Err(e) => events.push(RelayEvent::Error(format!("bad audio payload: {e}"))),
            }
        }

        for (key, role) in [
            ("inputTranscription", Speaker::Candidate),
            ("outputTranscription", Speaker::Interviewer),
        ] {
            if let Some(text) = content.pointer(&format!("/{key}/text")).and_then(Value::as_str) {
                if !text.is_empty() {
                    events.push(RelayEvent::Transcript {
                        role,
                        text: text.to_string(),
                    });
                }
            }
        }

        if content.get("turnComplete").and_then(Value::as_bool) == Some(true) {
            events.push(RelayEvent::TurnComplete);
        }
    }

    Ok(events)
}

/// Collects streamed transcription fragments into whole turns.
///
/// Fragments from the same speaker are joined until the speaker changes or
/// the model finishes its turn.
#[derive(Debug, Default)]
pub struct TranscriptBuffer {
    pending: Option<(Speaker, String)>,
    turns: Vec<TranscriptTurn>,
}

impl TranscriptBuffer {
    pub fn push(&mut self, role: Speaker, fragment: &str) {
        match &mut self.pending {
            Some((current, text)) if *current == role => text.push_str(fragment),
            _ => {
                self.flush();
                self.pending = Some((role, fragment.to_string()));
            }
        }
    }

    pub fn flush(&mut self) {
        if let Some((role, text)) = self.pending.take() {
            let text = text.trim();
            if !text.is_empty() {
                self.turns.push(TranscriptTurn {
                    role,
                    text: text.to_string(),
                    at: Utc::now(),
                });
            }
        }
    }

    pub fn into_turns(mut self) -> Vec<TranscriptTurn> {
        self.flush();
        self.turns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_controls_parse() {
        assert_eq!(
            parse_client_control(r#"{"type":"text","text":"hi"}"#).unwrap(),
            ClientControl::Text { text: "hi".into() }
        );
        assert_eq!(parse_client_control(r#"{"type":"end"}"#).unwrap(), ClientControl::End);
        assert_eq!(
            parse_client_control(r#"{"type":"setup","voice":"Puck"}"#).unwrap(),
            ClientControl::Setup {
                system_instruction: None,
                voice: Some("Puck".into())
            }
        );
        assert!(parse_client_control(r#"{"type":"dance"}"#).is_err());
    }

    #[test]
    fn test_setup_message_shape() {
        let msg = setup_message("models/live", Some("Be brief."), Some("Kore"));
        assert_eq!(msg["setup"]["model"], "models/live");
        assert_eq!(msg["setup"]["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            msg["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
                ["voiceName"],
            "Kore"
        );
        assert_eq!(msg["setup"]["systemInstruction"]["parts"][0]["text"], "Be brief.");
        assert!(msg["setup"]["inputAudioTranscription"].is_object());
    }

    #[test]
    fn test_setup_message_omits_blank_instruction() {
        let msg = setup_message("models/live", Some("  "), None);
        assert!(msg["setup"].get("systemInstruction").is_none());
        assert!(msg["setup"]["generationConfig"].get("speechConfig").is_none());
    }

    #[test]
    fn test_audio_chunk_is_base64_pcm() {
        let msg = audio_chunk_message(&[1, 2, 3, 4]);
        let chunk = &msg["realtimeInput"]["mediaChunks"][0];
        assert_eq!(chunk["mimeType"], INPUT_AUDIO_MIME);
        assert_eq!(chunk["data"], "AQIDBA==");
    }

    #[test]
    fn test_client_text_completes_turn() {
        let msg = client_text_message("hello");
        assert_eq!(msg["clientContent"]["turns"][0]["parts"][0]["text"], "hello");
        assert_eq!(msg["clientContent"]["turnComplete"], true);
    }

    #[test]
    fn test_setup_complete_becomes_ready() {
        assert_eq!(
            translate_upstream(r#"{"setupComplete":{}}"#).unwrap(),
            vec![RelayEvent::Ready]
        );
    }

    #[test]
    fn test_server_content_translates_in_order() {
        let raw = r#"{"serverContent":{
            "modelTurn":{"parts":[{"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"AQI="}}]},
            "outputTranscription":{"text":"Tell me"},
            "inputTranscription":{"text":"Sure"},
            "turnComplete":true}}"#;
        assert_eq!(
            translate_upstream(raw).unwrap(),
            vec![
                RelayEvent::Audio(vec![1, 2]),
                RelayEvent::Transcript {
                    role: Speaker::Candidate,
                    text: "Sure".into()
                },
                RelayEvent::Transcript {
                    role: Speaker::Interviewer,
                    text: "Tell me".into()
                },
                RelayEvent::TurnComplete,
            ]
        );
    }

    #[test]
    fn test_interrupted_and_unknown_fields() {
        let events =
            translate_upstream(r#"{"serverContent":{"interrupted":true},"usageMetadata":{}}"#).unwrap();
        assert_eq!(events, vec![RelayEvent::Interrupted]);
        assert!(translate_upstream(r#"{"goAway":{}}"#).unwrap().is_empty());
        assert!(translate_upstream("not json").is_err());
    }

    #[test]
    fn test_client_json_frames() {
        assert_eq!(RelayEvent::Ready.to_client_json().unwrap(), r#"{"type":"ready"}"#);
        assert!(RelayEvent::Audio(vec![0]).to_client_json().is_none());
        let frame: Value = serde_json::from_str(
            &RelayEvent::Transcript {
                role: Speaker::Interviewer,
                text: "Hi".into(),
            }
            .to_client_json()
            .unwrap(),
        )
        .unwrap();
        assert_eq!(frame["role"], "interviewer");
        assert_eq!(frame["type"], "transcript");
    }

    #[test]
    fn test_transcript_buffer_joins_fragments_per_speaker() {
        let mut buffer = TranscriptBuffer::default();
        buffer.push(Speaker::Interviewer, "Tell me ");
        buffer.push(Speaker::Interviewer, "about yourself.");
        buffer.push(Speaker::Candidate, " I build ");
        buffer.push(Speaker::Candidate, "compilers.");
        buffer.flush();
        buffer.push(Speaker::Candidate, "   ");

        let turns = buffer.into_turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].text, "Tell me about yourself.");
        assert_eq!(turns[1].role, Speaker::Candidate);
        assert_eq!(turns[1].text, "I build compilers.");
    }
}
