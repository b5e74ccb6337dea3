use std::fmt::Display;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message as ClientMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as UpstreamMessage},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::resolve_token;
use crate::errors::AppError;
use crate::interview::handlers::load_authorized;
use crate::interview::session::{append_transcript, get_session};
use crate::relay::protocol::{
    audio_chunk_message, client_text_message, parse_client_control, setup_message,
    translate_upstream, ClientControl, RelayEvent, TranscriptBuffer,
};
use crate::state::AppState;

const LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
const SETUP_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
pub struct RelayQuery {
    pub session_id: Option<Uuid>,
    /// Browsers cannot set headers on upgrades, so the token rides in the query.
    pub access_token: Option<String>,
}

enum Flow {
    Continue,
    Stop,
}

/// How the relay opens, decided from the first client frame.
#[derive(Debug, PartialEq)]
struct Opening {
    system_instruction: Option<String>,
    voice: Option<String>,
    /// A first frame that was not a setup, sent upstream after the default setup.
    replay: Option<ClientMessage>,
}

/// GET /ws/gemini-proxy
///
/// Every relay needs a valid token. Binding to an interview session also
/// requires that the user may see it; the relay then appends the
/// conversation to that session on close.
pub async fn handle_gemini_proxy(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<RelayQuery>,
) -> Result<Response, AppError> {
    let user = resolve_token(&state, relay_token(&query)?).await?;
    if let Some(id) = query.session_id {
        load_authorized(&state, &user, id).await?;
    }
    debug!(user_id = %user.id, session_id = ?query.session_id, "Relay upgrade accepted");

    let session = query.session_id;
    Ok(ws.on_upgrade(move |socket| run_relay(state, socket, session)))
}

fn relay_token(query: &RelayQuery) -> Result<&str, AppError> {
    query
        .access_token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Unauthorized)
}

async fn run_relay(state: AppState, socket: WebSocket, session_id: Option<Uuid>) {
    let (mut client_tx, mut client_rx) = socket.split();

    let first = match tokio::time::timeout(SETUP_WAIT, client_rx.next()).await {
        Ok(Some(Ok(frame))) => Some(frame),
        Ok(Some(Err(e))) => {
            debug!("Client socket failed before setup: {e}");
            return;
        }
        Ok(None) => return,
        Err(_) => None,
    };
    let Some(opening) = plan_opening(first) else {
        return;
    };

    let mut system_instruction = opening.system_instruction;
    if system_instruction.is_none() {
        if let Some(id) = session_id {
            system_instruction = session_instruction(&state, id).await;
        }
    }
    let setup = setup_message(
        &state.config.gemini_live_model,
        system_instruction.as_deref(),
        opening.voice.as_deref(),
    );

    let url = format!("{LIVE_ENDPOINT}?key={}", state.config.gemini_api_key);
    let upstream = match connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            warn!("Failed to connect to Gemini Live: {e}");
            send_event(&mut client_tx, RelayEvent::Error("upstream unavailable".into())).await;
            let _ = client_tx.send(ClientMessage::Close(None)).await;
            return;
        }
    };
    info!(session_id = ?session_id, "Gemini Live relay opened");

    let (upstream_tx, upstream_rx) = upstream.split();
    let transcript = relay_session(
        client_rx,
        client_tx,
        upstream_rx,
        upstream_tx,
        setup,
        opening.replay,
    )
    .await;
    info!(session_id = ?session_id, "Gemini Live relay closed");

    if let Some(id) = session_id {
        persist_transcript(&state, id, transcript).await;
    }
}

/// A setup frame configures the session. A close ends it before it starts.
/// Anything else, or no frame at all, gets the default setup.
fn plan_opening(first: Option<ClientMessage>) -> Option<Opening> {
    let default = |replay| Opening {
        system_instruction: None,
        voice: None,
        replay,
    };
    match first {
        Some(ClientMessage::Text(text)) => match parse_client_control(&text) {
            Ok(ClientControl::Setup {
                system_instruction,
                voice,
            }) => Some(Opening {
                system_instruction,
                voice,
                replay: None,
            }),
            _ => Some(default(Some(ClientMessage::Text(text)))),
        },
        Some(ClientMessage::Close(_)) => None,
        other => Some(default(other)),
    }
}

/// Sends the setup, replays the held-back frame, then forwards in both
/// directions until either side stops. Returns the transcript collected.
async fn relay_session<CR, CE, CT, UR, UT>(
    mut client_rx: CR,
    mut client_tx: CT,
    mut upstream_rx: UR,
    mut upstream_tx: UT,
    setup: Value,
    replay: Option<ClientMessage>,
) -> TranscriptBuffer
where
    CR: Stream<Item = Result<ClientMessage, CE>> + Unpin,
    CE: Display,
    CT: Sink<ClientMessage> + Unpin,
    UR: Stream<Item = Result<UpstreamMessage, WsError>> + Unpin,
    UT: Sink<UpstreamMessage> + Unpin,
    UT::Error: Display,
{
    let mut transcript = TranscriptBuffer::default();

    if let Err(e) = upstream_tx.send(UpstreamMessage::text(setup.to_string())).await {
        warn!("Failed to send Live setup: {e}");
        send_event(&mut client_tx, RelayEvent::Error("upstream setup failed".into())).await;
        let _ = client_tx.send(ClientMessage::Close(None)).await;
        return transcript;
    }

    let mut pending = replay;
    loop {
        let flow = if let Some(frame) = pending.take() {
            forward_client_frame(Ok::<_, CE>(frame), &mut upstream_tx).await
        } else {
            tokio::select! {
                frame = client_rx.next() => match frame {
                    Some(frame) => forward_client_frame(frame, &mut upstream_tx).await,
                    None => Flow::Stop,
                },
                message = upstream_rx.next() => {
                    forward_upstream_message(message, &mut client_tx, &mut transcript).await
                }
            }
        };

        if let Flow::Stop = flow {
            break;
        }
    }

    let _ = upstream_tx.close().await;
    let _ = client_tx.send(ClientMessage::Close(None)).await;
    transcript
}

async fn forward_client_frame<E, UT>(frame: Result<ClientMessage, E>, upstream_tx: &mut UT) -> Flow
where
    E: Display,
    UT: Sink<UpstreamMessage> + Unpin,
    UT::Error: Display,
{
    let outbound = match frame {
        Ok(ClientMessage::Binary(pcm)) => audio_chunk_message(&pcm),
        Ok(ClientMessage::Text(text)) => match parse_client_control(&text) {
            Ok(ClientControl::Text { text }) => client_text_message(&text),
            Ok(ClientControl::End) => return Flow::Stop,
            Ok(ClientControl::Setup { .. }) => {
                debug!("Ignoring repeated setup from client");
                return Flow::Continue;
            }
            Err(e) => {
                debug!("Ignoring unparseable client frame: {e}");
                return Flow::Continue;
            }
        },
        Ok(ClientMessage::Close(_)) => return Flow::Stop,
        Ok(_) => return Flow::Continue,
        Err(e) => {
            debug!("Client socket error: {e}");
            return Flow::Stop;
        }
    };

    match upstream_tx.send(UpstreamMessage::text(outbound.to_string())).await {
        Ok(()) => Flow::Continue,
        Err(e) => {
            warn!("Failed to forward to Gemini Live: {e}");
            Flow::Stop
        }
    }
}

async fn forward_upstream_message<CT>(
    message: Option<Result<UpstreamMessage, WsError>>,
    client_tx: &mut CT,
    transcript: &mut TranscriptBuffer,
) -> Flow
where
    CT: Sink<ClientMessage> + Unpin,
{
    // The Live API delivers JSON in binary frames as well as text frames.
    let raw = match message {
        Some(Ok(UpstreamMessage::Text(text))) => text.as_str().to_string(),
        Some(Ok(UpstreamMessage::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => text,
            Err(_) => {
                debug!("Ignoring non-UTF-8 upstream frame");
                return Flow::Continue;
            }
        },
        Some(Ok(UpstreamMessage::Close(frame))) => {
            let reason = frame
                .map(|f| f.reason.to_string())
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| "upstream closed".to_string());
            send_event(client_tx, RelayEvent::Error(reason)).await;
            return Flow::Stop;
        }
        Some(Ok(_)) => return Flow::Continue,
        Some(Err(e)) => {
            warn!("Gemini Live socket error: {e}");
            send_event(client_tx, RelayEvent::Error("upstream error".into())).await;
            return Flow::Stop;
        }
        None => {
            send_event(client_tx, RelayEvent::Error("upstream closed".into())).await;
            return Flow::Stop;
        }
    };

    let events = match translate_upstream(&raw) {
        Ok(events) => events,
        Err(e) => {
            debug!("Ignoring malformed upstream message: {e}");
            return Flow::Continue;
        }
    };

    for event in events {
        match &event {
            RelayEvent::Transcript { role, text } => transcript.push(*role, text),
            RelayEvent::TurnComplete | RelayEvent::Interrupted => transcript.flush(),
            _ => {}
        }
        let fatal = matches!(event, RelayEvent::Error(_));
        if !send_event(client_tx, event).await || fatal {
            return Flow::Stop;
        }
    }
    Flow::Continue
}

/// Sends one event to the browser. Returns false once the client is gone.
async fn send_event<CT>(client_tx: &mut CT, event: RelayEvent) -> bool
where
    CT: Sink<ClientMessage> + Unpin,
{
    let frame = match event {
        RelayEvent::Audio(pcm) => ClientMessage::Binary(pcm),
        other => match other.to_client_json() {
            Some(json) => ClientMessage::Text(json),
            None => return true,
        },
    };
    client_tx.send(frame).await.is_ok()
}

async fn session_instruction(state: &AppState, id: Uuid) -> Option<String> {
    let session = get_session(&state.db, id).await.ok()?;
    session
        .interview_config
        .get("system_instruction")
        .and_then(Value::as_str)
        .map(str::to_string)
}

async fn persist_transcript(state: &AppState, id: Uuid, transcript: TranscriptBuffer) {
    let turns = transcript.into_turns();
    if turns.is_empty() {
        return;
    }
    match append_transcript(&state.db, id, &turns).await {
        Ok(_) => info!(session_id = %id, turns = turns.len(), "Relay transcript saved"),
        Err(e) => warn!(session_id = %id, "Failed to save relay transcript: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use futures_util::stream;
    use serde_json::json;

    use super::*;
    use crate::interview::session::{append_turns, Speaker};

    fn upstream_frames(frames: &[&str]) -> impl Stream<Item = Result<UpstreamMessage, WsError>> + Unpin {
        let frames: Vec<_> = frames
            .iter()
            .map(|f| Ok(UpstreamMessage::text(f.to_string())))
            .collect();
        stream::iter(frames)
    }

    fn quiet_client() -> impl Stream<Item = Result<ClientMessage, Infallible>> + Unpin {
        stream::pending()
    }

    fn quiet_upstream() -> impl Stream<Item = Result<UpstreamMessage, WsError>> + Unpin {
        stream::pending()
    }

    fn upstream_json(message: &UpstreamMessage) -> Value {
        match message {
            UpstreamMessage::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    fn client_json(message: &ClientMessage) -> Value {
        match message {
            ClientMessage::Text(text) => serde_json::from_str(text).unwrap(),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    #[test]
    fn test_relay_requires_token_with_or_without_session() {
        let anonymous = RelayQuery {
            session_id: None,
            access_token: None,
        };
        assert!(matches!(relay_token(&anonymous), Err(AppError::Unauthorized)));

        let blank = RelayQuery {
            session_id: Some(Uuid::new_v4()),
            access_token: Some("  ".into()),
        };
        assert!(matches!(relay_token(&blank), Err(AppError::Unauthorized)));

        let signed_in = RelayQuery {
            session_id: None,
            access_token: Some("abc".into()),
        };
        assert_eq!(relay_token(&signed_in).unwrap(), "abc");
    }

    #[test]
    fn test_setup_frame_configures_opening() {
        let first = ClientMessage::Text(
            r#"{"type":"setup","system_instruction":"Ask about Rust.","voice":"Puck"}"#.into(),
        );
        assert_eq!(
            plan_opening(Some(first)),
            Some(Opening {
                system_instruction: Some("Ask about Rust.".into()),
                voice: Some("Puck".into()),
                replay: None,
            })
        );
    }

    #[test]
    fn test_other_first_frames_are_held_for_replay() {
        let text = ClientMessage::Text(r#"{"type":"text","text":"hi"}"#.into());
        let opening = plan_opening(Some(text.clone())).unwrap();
        assert_eq!(opening.system_instruction, None);
        assert_eq!(opening.replay, Some(text));

        let audio = ClientMessage::Binary(vec![0, 1]);
        assert_eq!(plan_opening(Some(audio.clone())).unwrap().replay, Some(audio));
    }

    #[test]
    fn test_silent_client_gets_default_opening_and_close_ends_it() {
        let opening = plan_opening(None).unwrap();
        assert_eq!(opening.replay, None);
        assert_eq!(opening.voice, None);
        assert_eq!(plan_opening(Some(ClientMessage::Close(None))), None);
    }

    #[tokio::test]
    async fn test_replayed_frame_follows_default_setup() {
        let opening =
            plan_opening(Some(ClientMessage::Text(r#"{"type":"text","text":"Hello there"}"#.into())))
                .unwrap();
        let setup = setup_message("models/live", Some("Interview for a Rust role."), None);

        let mut to_upstream = Vec::new();
        let mut to_client = Vec::new();
        relay_session(
            quiet_client(),
            &mut to_client,
            upstream_frames(&[r#"{"setupComplete":{}}"#]),
            &mut to_upstream,
            setup,
            opening.replay,
        )
        .await;

        assert_eq!(to_upstream.len(), 2);
        assert_eq!(
            upstream_json(&to_upstream[0])["setup"]["systemInstruction"]["parts"][0]["text"],
            "Interview for a Rust role."
        );
        assert_eq!(
            upstream_json(&to_upstream[1])["clientContent"]["turns"][0]["parts"][0]["text"],
            "Hello there"
        );

        assert_eq!(client_json(&to_client[0])["type"], "ready");
        assert_eq!(client_json(&to_client[1])["type"], "error");
        assert_eq!(to_client.last(), Some(&ClientMessage::Close(None)));
    }

    #[tokio::test]
    async fn test_client_audio_forwarded_until_end() {
        let client = stream::iter(vec![
            Ok::<_, Infallible>(ClientMessage::Binary(vec![1, 2, 3, 4])),
            Ok(ClientMessage::Text(r#"{"type":"end"}"#.into())),
            Ok(ClientMessage::Text(r#"{"type":"text","text":"never sent"}"#.into())),
        ]);

        let mut to_upstream = Vec::new();
        let mut to_client = Vec::new();
        relay_session(
            client,
            &mut to_client,
            quiet_upstream(),
            &mut to_upstream,
            setup_message("models/live", None, None),
            None,
        )
        .await;

        assert_eq!(to_upstream.len(), 2);
        assert_eq!(
            upstream_json(&to_upstream[1])["realtimeInput"]["mediaChunks"][0]["data"],
            "AQIDBA=="
        );
        assert_eq!(to_client, vec![ClientMessage::Close(None)]);
    }

    #[tokio::test]
    async fn test_upstream_audio_in_binary_frame_reaches_client() {
        let raw = json!({
            "serverContent": {
                "modelTurn": { "parts": [{ "inlineData": { "mimeType": "audio/pcm", "data": "AQID" } }] }
            }
        })
        .to_string();
        let upstream = stream::iter(vec![Ok(UpstreamMessage::binary(raw.into_bytes()))]);

        let mut to_upstream = Vec::new();
        let mut to_client = Vec::new();
        relay_session(
            quiet_client(),
            &mut to_client,
            upstream,
            &mut to_upstream,
            setup_message("models/live", None, None),
            None,
        )
        .await;

        assert_eq!(to_client[0], ClientMessage::Binary(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_transcript_collected_for_teardown() {
        let upstream = upstream_frames(&[
            r#"{"serverContent":{"outputTranscription":{"text":"Tell me about "}}}"#,
            r#"{"serverContent":{"outputTranscription":{"text":"yourself."}}}"#,
            r#"{"serverContent":{"turnComplete":true}}"#,
            r#"{"serverContent":{"inputTranscription":{"text":"I build APIs"}}}"#,
        ]);

        let mut to_upstream = Vec::new();
        let mut to_client = Vec::new();
        let transcript = relay_session(
            quiet_client(),
            &mut to_client,
            upstream,
            &mut to_upstream,
            setup_message("models/live", None, None),
            None,
        )
        .await;

        let turns = transcript.into_turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Speaker::Interviewer);
        assert_eq!(turns[0].text, "Tell me about yourself.");
        assert_eq!(turns[1].role, Speaker::Candidate);
        assert_eq!(turns[1].text, "I build APIs");

        let stored = append_turns(&json!([]), &turns).unwrap();
        assert_eq!(stored.as_array().map(Vec::len), Some(2));
    }
}
