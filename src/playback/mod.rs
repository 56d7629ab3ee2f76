//! File playback subsystem

pub mod decoder;
pub mod player;

pub use decoder::{decode_file, DecodedAudio};
pub use player::{Player, PlayerState};
