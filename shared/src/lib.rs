//! Types shared between the arena server and its clients: game tuning
//! constants, the text wire protocol and 2D vector helpers.

pub mod config;
pub mod protocol;
pub mod vec2;
