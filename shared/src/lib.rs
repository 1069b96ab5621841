use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

pub mod frame;

pub use frame::{decode, decode_with_limit, encode, DEFAULT_MAX_FRAME_LEN, LENGTH_PREFIX_LEN};

pub const CANVAS_WIDTH: usize = 50;
pub const CANVAS_HEIGHT: usize = 50;
pub const DEFAULT_COLOR: Color = Color::WHITE;

/// Errors raised while moving messages across a byte stream
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("stream ended mid-frame: expected {expected} bytes, received {received}")]
    Framing { expected: usize, received: usize },
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
    #[error("frame of {len} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { len: u64, limit: u64 },
    #[error("peer disconnected")]
    PeerDisconnected,
    #[error("i/o error: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected => ProtocolError::PeerDisconnected,
            _ => ProtocolError::Io(err),
        }
    }
}

/// An RGB cell color.
///
/// On the wire a color is written as `"#rrggbb"`. Decoding also accepts a
/// `[r, g, b]` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::new(255, 255, 255);
    pub const BLACK: Color = Color::new(0, 0, 0);
    pub const RED: Color = Color::new(255, 0, 0);
    pub const GREEN: Color = Color::new(0, 255, 0);
    pub const BLUE: Color = Color::new(0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let digits = s.strip_prefix('#')?;
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::str::FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Color::from_hex(s).ok_or_else(|| format!("invalid color '{}', expected #rrggbb", s))
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ColorVisitor;

        impl<'de> Visitor<'de> for ColorVisitor {
            type Value = Color;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a \"#rrggbb\" string or an [r, g, b] array")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Color, E> {
                Color::from_hex(v).ok_or_else(|| E::invalid_value(de::Unexpected::Str(v), &self))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Color, A::Error> {
                let r = seq.next_element()?.ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let g = seq.next_element()?.ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let b = seq.next_element()?.ok_or_else(|| de::Error::invalid_length(2, &self))?;
                if seq.next_element::<u8>()?.is_some() {
                    return Err(de::Error::invalid_length(4, &self));
                }
                Ok(Color::new(r, g, b))
            }
        }

        deserializer.deserialize_any(ColorVisitor)
    }
}

/// Full board contents, indexed `grid[y][x]`
pub type Grid = Vec<Vec<Color>>;

/// Client to server commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "comando")]
pub enum Command {
    #[serde(rename = "pintar")]
    Paint { x: i64, y: i64, color: Color },
    #[serde(rename = "nuevo")]
    Join,
    #[serde(rename = "cerrar")]
    Close,
}

/// Server to client messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireServerMessage", into = "WireServerMessage")]
pub enum ServerMessage {
    Snapshot(Grid),
    Closed,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireServerMessage {
    Snapshot { tablero: Grid },
    Closed { cerrar: bool },
}

impl TryFrom<WireServerMessage> for ServerMessage {
    type Error = String;

    fn try_from(wire: WireServerMessage) -> Result<Self, Self::Error> {
        match wire {
            WireServerMessage::Snapshot { tablero } => Ok(ServerMessage::Snapshot(tablero)),
            WireServerMessage::Closed { cerrar: true } => Ok(ServerMessage::Closed),
            WireServerMessage::Closed { cerrar: false } => {
                Err("closed message must carry \"cerrar\": true".to_string())
            }
        }
    }
}

impl From<ServerMessage> for WireServerMessage {
    fn from(msg: ServerMessage) -> Self {
        match msg {
            ServerMessage::Snapshot(tablero) => WireServerMessage::Snapshot { tablero },
            ServerMessage::Closed => WireServerMessage::Closed { cerrar: true },
        }
    }
}
