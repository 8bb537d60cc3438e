//! Watches a directory of MIDI files and rewrites them in place according
//! to filename-matched rules.

pub mod codec;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod midi_event;
pub mod note_length;
pub mod processor;
pub mod rules;
pub mod scanner;
pub mod transform;
pub mod watch;
pub mod writer;

pub use config::{Config, ConfigError};
pub use error::{Error, Result};
pub use midi_event::MidiFile;
