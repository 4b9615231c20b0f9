//! Wire formats for the game server socket and the shared API socket.
//!
//! Both sockets exchange `{"type": ..., "data": ...}` envelopes. On the game
//! socket `data` is itself a JSON-encoded string (or a plain reason string for
//! `quit`); on the shared API socket it is a JSON object.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientError;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope<D> {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: D,
}

/// Serialize a game-socket message: `data` is the JSON text of `payload`.
pub fn envelope<T: Serialize>(kind: &str, payload: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Envelope {
        kind: kind.to_string(),
        data: serde_json::to_string(payload)?,
    })
}

/// Serialize a shared-socket message: `data` is embedded as an object.
pub fn object_envelope<T: Serialize>(kind: &str, payload: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Envelope {
        kind: kind.to_string(),
        data: serde_json::to_value(payload)?,
    })
}

/// Decode a `data` field that may be a JSON string, an object or absent.
fn payload<T: DeserializeOwned>(data: Value) -> Result<T, serde_json::Error> {
    match data {
        Value::String(text) if text.trim().is_empty() => serde_json::from_value(Value::Object(Default::default())),
        Value::String(text) => serde_json::from_str(&text),
        Value::Null => serde_json::from_value(Value::Object(Default::default())),
        other => serde_json::from_value(other),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitData {
    pub room_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveData {
    #[serde(default)]
    pub move_s1: String,
    #[serde(default)]
    pub move_s2: String,
    #[serde(default)]
    pub move_notation: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    #[default]
    Waiting,
    Ongoing,
    Ended,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WelcomeData {
    pub room_id: String,
    pub player1_id: String,
    pub player1_username: String,
    pub player2_id: String,
    pub player2_username: String,
    pub game_fen: String,
    pub game_pgn: String,
    pub last_move_s1: String,
    pub last_move_s2: String,
    pub game_status: GameStatus,
    pub winner_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEndedData {
    #[serde(default)]
    pub winner_id: String,
}

/// How a game finished, as announced by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Draw,
    Winner(String),
}

impl Outcome {
    /// `"draw"` or the winning client id. Empty means unknown.
    pub fn from_winner_id(winner_id: &str) -> Option<Self> {
        match winner_id {
            "" => None,
            "draw" => Some(Outcome::Draw),
            id => Some(Outcome::Winner(id.to_string())),
        }
    }
}

/// Messages the game server sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Welcome(WelcomeData),
    PlayerMoved(MoveData),
    GameStarted,
    GameEnded(GameEndedData),
    Ping,
    /// The room was closed; carries the server's reason.
    Quit(String),
}

impl InboundMessage {
    pub fn decode(text: &str) -> Result<Self, ClientError> {
        let envelope: Envelope<Value> = serde_json::from_str(text)?;
        let data = envelope.data;

        let message = match envelope.kind.as_str() {
            "welcome" => InboundMessage::Welcome(payload(data)?),
            "player_moved" => InboundMessage::PlayerMoved(payload(data)?),
            "game_started" => InboundMessage::GameStarted,
            "game_ended" => InboundMessage::GameEnded(payload(data)?),
            "ping" => InboundMessage::Ping,
            "quit" => InboundMessage::Quit(match data {
                Value::String(reason) => reason,
                Value::Null => String::new(),
                other => other.to_string(),
            }),
            other => {
                return Err(ClientError::Protocol(format!("Unknown message type: {other}")));
            }
        };
        Ok(message)
    }
}

/// Messages the client sends to the game server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Init(InitData),
    PlayerMoved(MoveData),
    Resign,
    Ping,
}

impl OutboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Init(_) => "init",
            OutboundMessage::PlayerMoved(_) => "player_moved",
            OutboundMessage::Resign => "resign",
            OutboundMessage::Ping => "ping",
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let empty = serde_json::Map::new();
        match self {
            OutboundMessage::Init(data) => envelope(self.kind(), data),
            OutboundMessage::PlayerMoved(data) => envelope(self.kind(), data),
            OutboundMessage::Resign | OutboundMessage::Ping => envelope(self.kind(), &empty),
        }
    }
}

/// Message on the shared API socket, kept loosely typed for dispatch by type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuxMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl MuxMessage {
    pub fn new<T: Serialize>(kind: &str, data: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind: kind.to_string(),
            data: serde_json::to_value(data)?,
        })
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        object_envelope(&self.kind, &self.data)
    }

    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        payload(self.data.clone())
    }
}

pub const JOIN_QUEUE: &str = "joinQueue";
pub const LEAVE_QUEUE: &str = "leaveQueue";
pub const MATCH_FOUND: &str = "matchFound";
pub const PING: &str = "ping";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinQueueData {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchFoundData {
    #[serde(rename = "roomId")]
    pub room_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_data_is_a_json_string() {
        let text = OutboundMessage::PlayerMoved(MoveData {
            move_s1: "e2".into(),
            move_s2: "e4".into(),
            move_notation: "e4".into(),
        })
        .encode()
        .unwrap();

        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "player_moved");
        let data: Value = serde_json::from_str(value["data"].as_str().unwrap()).unwrap();
        assert_eq!(data["move_s1"], "e2");
        assert_eq!(data["move_notation"], "e4");

        let ping: Value = serde_json::from_str(&OutboundMessage::Ping.encode().unwrap()).unwrap();
        assert_eq!(ping["data"], "{}");
    }

    #[test]
    fn test_decode_welcome() {
        let data = serde_json::json!({
            "room_id": "r1",
            "player1_id": "a",
            "player1_username": "alice",
            "player2_id": "b",
            "player2_username": "bob",
            "game_fen": "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1",
            "game_pgn": "1. e4 *",
            "last_move_s1": "e2",
            "last_move_s2": "e4",
            "game_status": "ongoing",
            "winner_id": ""
        });
        let text = serde_json::json!({ "type": "welcome", "data": data.to_string() }).to_string();

        let InboundMessage::Welcome(welcome) = InboundMessage::decode(&text).unwrap() else {
            panic!("expected welcome");
        };
        assert_eq!(welcome.player2_username, "bob");
        assert_eq!(welcome.game_status, GameStatus::Ongoing);
    }

    #[test]
    fn test_decode_empty_and_plain_string_payloads() {
        assert_eq!(
            InboundMessage::decode(r#"{"type":"game_started","data":""}"#).unwrap(),
            InboundMessage::GameStarted
        );
        assert_eq!(
            InboundMessage::decode(r#"{"type":"quit","data":"Game ended"}"#).unwrap(),
            InboundMessage::Quit("Game ended".into())
        );
        assert_eq!(
            InboundMessage::decode(r#"{"type":"game_ended","data":"{\"winner_id\":\"draw\"}"}"#).unwrap(),
            InboundMessage::GameEnded(GameEndedData {
                winner_id: "draw".into()
            })
        );
        assert!(matches!(
            InboundMessage::decode(r#"{"type":"chat","data":""}"#),
            Err(ClientError::Protocol(_))
        ));
    }

    #[test]
    fn test_mux_messages_embed_objects() {
        let msg = MuxMessage::new(JOIN_QUEUE, &JoinQueueData { id: "c1".into() }).unwrap();
        let value: Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(value["data"]["id"], "c1");

        let found = MuxMessage::decode(r#"{"type":"matchFound","data":{"roomId":"r9"}}"#).unwrap();
        assert_eq!(found.payload::<MatchFoundData>().unwrap().room_id, "r9");
    }

    #[test]
    fn test_unknown_status_does_not_fail() {
        let welcome: WelcomeData = serde_json::from_str(r#"{"game_status":"paused"}"#).unwrap();
        assert_eq!(welcome.game_status, GameStatus::Unknown);
    }
}
