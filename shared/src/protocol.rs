//! Slash-delimited text protocol spoken between arena clients and the server.
//!
//! Clients send newline-terminated lines that may carry several frames
//! (`NEWCOM/A0.5T1/NEWCOM/A0.0T0/`). The server writes frames back to back
//! with no terminator; readers split the stream on `/`.

use std::fmt;

use crate::vec2::Vec2;

// === Float rendering ===

/// Render an `f32` the way the reference clients parse it: shortest
/// round-trip digits, always with a fractional part, and `E` notation
/// outside `[1e-3, 1e7)`.
pub fn wire_f32(v: f32) -> String {
    render_float(
        f64::from(v.abs()),
        v.is_nan(),
        v.is_finite(),
        v < 0.0,
        format!("{:?}", v),
        format!("{:e}", v),
    )
}

/// Same as [`wire_f32`] for doubles (headings are sent in double precision).
pub fn wire_f64(v: f64) -> String {
    render_float(
        v.abs(),
        v.is_nan(),
        v.is_finite(),
        v < 0.0,
        format!("{:?}", v),
        format!("{:e}", v),
    )
}

fn render_float(
    abs: f64,
    nan: bool,
    finite: bool,
    negative: bool,
    plain: String,
    sci: String,
) -> String {
    if nan {
        return "NaN".to_string();
    }
    if !finite {
        return if negative { "-Infinity" } else { "Infinity" }.to_string();
    }
    if abs == 0.0 || (1e-3..1e7).contains(&abs) {
        return plain;
    }
    match sci.split_once('e') {
        Some((mantissa, exp)) if mantissa.contains('.') => format!("{}E{}", mantissa, exp),
        Some((mantissa, exp)) => format!("{}.0E{}", mantissa, exp),
        None => plain,
    }
}

// === Payload encoders ===

/// `X<x>Y<y>`
pub fn coord(pos: Vec2) -> String {
    format!("X{}Y{}", wire_f32(pos.x), wire_f32(pos.y))
}

/// `X<x>Y<y>VX<vx>VY<vy>T<radians>`
pub fn vcoord(pos: Vec2, velocity: Vec2, heading_rad: f64) -> String {
    format!(
        "{}VX{}VY{}T{}",
        coord(pos),
        wire_f32(velocity.x),
        wire_f32(velocity.y),
        wire_f64(heading_rad)
    )
}

/// `obs<id>:X<x>Y<y>`
pub fn obstacle_coord(id: u32, pos: Vec2) -> String {
    format!("obs{}:{}", id, coord(pos))
}

/// Join `name:payload` pairs with `|`.
pub fn join_pairs<I, N, P>(pairs: I) -> String
where
    I: IntoIterator<Item = (N, P)>,
    N: fmt::Display,
    P: fmt::Display,
{
    pairs
        .into_iter()
        .map(|(name, payload)| format!("{}:{}", name, payload))
        .collect::<Vec<_>>()
        .join("|")
}

// === Server -> Client ===

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WelcomePhase {
    /// Round not started yet, the player waits for `SESSION`
    Wait,
    /// Round already running
    Play,
}

/// A server frame. Payload fields hold already-encoded lists
/// (see [`coord`], [`vcoord`], [`obstacle_coord`], [`join_pairs`]).
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMsg {
    Denied,
    NewPlayer { name: String },
    Welcome {
        phase: WelcomePhase,
        scores: String,
        objective: String,
        bomb_counts: String,
    },
    Session {
        coords: String,
        objective: String,
        obstacles: String,
    },
    Tick { vcoords: String },
    BombPlaced { name: String, pos: Vec2 },
    BombHit { name: String, bomb: String },
    NewObjective { objective: String, scores: String },
    Winner { scores: String },
    PlayerLeft { name: String },
    PublicChat { text: String },
    PrivateChat { text: String, from: String },
}

impl fmt::Display for ServerMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMsg::Denied => write!(f, "DENIED/"),
            ServerMsg::NewPlayer { name } => write!(f, "NEWPLAYER/{}/", name),
            ServerMsg::Welcome {
                phase,
                scores,
                objective,
                bomb_counts,
            } => {
                let phase = match phase {
                    WelcomePhase::Wait => "wait",
                    WelcomePhase::Play => "play",
                };
                write!(f, "WELCOME/{}/{}/{}/{}/", phase, scores, objective, bomb_counts)
            }
            ServerMsg::Session {
                coords,
                objective,
                obstacles,
            } => write!(f, "SESSION/{}/{}/{}/", coords, objective, obstacles),
            ServerMsg::Tick { vcoords } => write!(f, "TICK/{}/", vcoords),
            ServerMsg::BombPlaced { name, pos } => write!(
                f,
                "PUT/{}/bombX{}Y{}",
                name,
                wire_f32(pos.x),
                wire_f32(pos.y)
            ),
            ServerMsg::BombHit { name, bomb } => write!(f, "HIT/{}/{}", name, bomb),
            ServerMsg::NewObjective { objective, scores } => {
                write!(f, "NEWOBJ/{}/{}/", objective, scores)
            }
            ServerMsg::Winner { scores } => write!(f, "WINNER/{}/", scores),
            ServerMsg::PlayerLeft { name } => write!(f, "PLAYERLEFT/{}/", name),
            ServerMsg::PublicChat { text } => write!(f, "RECEPTION/{}/", text),
            ServerMsg::PrivateChat { text, from } => write!(f, "PRECEPTION/{}/{}/", text, from),
        }
    }
}

// === Client -> Server ===

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMsg {
    /// `NAME/<pseudo>` (or the legacy `CONNECT/<pseudo>`)
    Join { name: String },
    /// `NEWCOM/A<angle>T<thrust>`: heading delta in radians and impulse count
    Command { angle: f32, thrust: u32 },
    /// `PUT/A<x>T<y>`
    PutBomb { x: f32, y: f32 },
    Exit,
    /// `ENVOI/<text>`
    PublicChat { text: String },
    /// `PENVOI/<dst>/<text>`
    PrivateChat { to: String, text: String },
}

impl ClientMsg {
    /// Parse every recognised frame on one received line, in order.
    ///
    /// Unknown or malformed frames are skipped. Parsing stops after `EXIT`.
    pub fn parse_line(line: &str) -> Vec<ClientMsg> {
        let tokens: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('/').collect();
        let mut msgs = Vec::new();
        let mut i = 0;

        while i < tokens.len() {
            let at = i;
            let arg = |k: usize| tokens.get(at + k).copied();
            match tokens[i] {
                "NAME" | "CONNECT" => {
                    if let Some(name) = arg(1) {
                        msgs.push(ClientMsg::Join {
                            name: name.to_string(),
                        });
                    }
                    i += 2;
                }
                "NEWCOM" => {
                    let parsed = arg(1).and_then(split_a_t).and_then(|(a, t)| {
                        let angle = parse_finite(a)?;
                        let thrust = t.parse::<u32>().ok()?;
                        Some(ClientMsg::Command { angle, thrust })
                    });
                    msgs.extend(parsed);
                    i += 2;
                }
                "PUT" => {
                    let parsed = arg(1).and_then(split_a_t).and_then(|(a, t)| {
                        Some(ClientMsg::PutBomb {
                            x: parse_finite(a)?,
                            y: parse_finite(t)?,
                        })
                    });
                    msgs.extend(parsed);
                    i += 2;
                }
                "EXIT" => {
                    msgs.push(ClientMsg::Exit);
                    break;
                }
                "ENVOI" => {
                    if let Some(text) = arg(1) {
                        msgs.push(ClientMsg::PublicChat {
                            text: text.to_string(),
                        });
                    }
                    i += 2;
                }
                "PENVOI" => {
                    if let (Some(to), Some(text)) = (arg(1), arg(2)) {
                        msgs.push(ClientMsg::PrivateChat {
                            to: to.to_string(),
                            text: text.to_string(),
                        });
                    }
                    i += 3;
                }
                _ => i += 1,
            }
        }

        msgs
    }
}

impl fmt::Display for ClientMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientMsg::Join { name } => write!(f, "NAME/{}/", name),
            ClientMsg::Command { angle, thrust } => {
                write!(f, "NEWCOM/A{}T{}/", wire_f32(*angle), thrust)
            }
            ClientMsg::PutBomb { x, y } => write!(f, "PUT/A{}T{}/", wire_f32(*x), wire_f32(*y)),
            ClientMsg::Exit => write!(f, "EXIT/"),
            ClientMsg::PublicChat { text } => write!(f, "ENVOI/{}/", text),
            ClientMsg::PrivateChat { to, text } => write!(f, "PENVOI/{}/{}/", to, text),
        }
    }
}

/// Split `A<first>T<second>` into its two halves.
fn split_a_t(s: &str) -> Option<(&str, &str)> {
    let rest = s.strip_prefix('A')?;
    let t = rest.rfind('T')?;
    Some((&rest[..t], &rest[t + 1..]))
}

fn parse_finite(s: &str) -> Option<f32> {
    s.parse::<f32>().ok().filter(|v| v.is_finite())
}
