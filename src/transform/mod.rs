use std::collections::BTreeSet;
use std::fmt;

use crate::error::Result;
use crate::midi_event::MidiFile;
use crate::note_length;

mod cap_length;
mod notes;
mod strip;
mod track_name;

pub use cap_length::cap_note_length;
pub use notes::{force_channel, transpose};
pub use strip::strip_to_notes;
pub use track_name::set_track_name;

/// One parameterized transform invocation in a rule plan.
///
/// Every operator takes the file by reference and returns a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    StripToNotes { keep_meta: BTreeSet<String> },
    Transpose { semitones: i32 },
    /// Length spec such as `"1/8"`, resolved against the file's resolution.
    CapNoteLength { max_length: String },
    ForceChannel { channel: u8 },
    SetTrackName { name: String },
}

impl Operator {
    pub fn apply(&self, file: &MidiFile) -> Result<MidiFile> {
        let out = match self {
            Operator::StripToNotes { keep_meta } => strip_to_notes(file, keep_meta),
            Operator::Transpose { semitones } => transpose(file, *semitones),
            Operator::CapNoteLength { max_length } => {
                let max_ticks = note_length::to_ticks(max_length, file.ticks_per_beat)?;
                cap_note_length(file, max_ticks)
            }
            Operator::ForceChannel { channel } => force_channel(file, *channel),
            Operator::SetTrackName { name } => set_track_name(file, name),
        };
        Ok(out)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::StripToNotes { keep_meta } => {
                let keep: Vec<&str> = keep_meta.iter().map(String::as_str).collect();
                write!(f, "strip_to_notes(keep=[{}])", keep.join(","))
            }
            Operator::Transpose { semitones } => write!(f, "transpose({semitones})"),
            Operator::CapNoteLength { max_length } => write!(f, "cap_note_length({max_length})"),
            Operator::ForceChannel { channel } => write!(f, "force_channel({channel})"),
            Operator::SetTrackName { name } => write!(f, "set_track_name({name:?})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::midi_event::{Event, TrackEvent};

    fn one_note(len: u32) -> MidiFile {
        let on = Event::NoteOn {
            channel: 2,
            note: 60,
            velocity: 100,
        };
        let off = Event::NoteOff {
            channel: 2,
            note: 60,
            velocity: 0,
        };
        MidiFile {
            format: midly::Format::SingleTrack,
            ticks_per_beat: 480,
            tracks: vec![vec![TrackEvent::new(0, on), TrackEvent::new(len, off)]],
        }
    }

    fn cap(max_length: &str) -> Operator {
        Operator::CapNoteLength {
            max_length: max_length.to_string(),
        }
    }

    #[test]
    fn test_cap_resolves_spec_against_resolution() {
        let op = cap("1/8");
        let out = op.apply(&one_note(480)).unwrap();
        assert_eq!(out.tracks[0][1].delta, 240);
    }

    #[test]
    fn test_cap_with_unsupported_spec_fails() {
        let op = cap("3/16");
        let err = op.apply(&one_note(480)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedNoteLength(_)));
    }

    #[test]
    fn test_apply_leaves_input_untouched() {
        let input = one_note(480);
        let before = input.clone();
        Operator::Transpose { semitones: 5 }.apply(&input).unwrap();
        Operator::ForceChannel { channel: 0 }.apply(&input).unwrap();
        assert_eq!(input, before);
    }

    #[test]
    fn test_display() {
        let keep = ["tempo".to_string()].into_iter().collect();
        assert_eq!(
            Operator::StripToNotes { keep_meta: keep }.to_string(),
            "strip_to_notes(keep=[tempo])"
        );
        let shift = Operator::Transpose { semitones: -12 };
        assert_eq!(shift.to_string(), "transpose(-12)");
        assert_eq!(cap("1/8").to_string(), "cap_note_length(1/8)");

        let name = Operator::SetTrackName {
            name: "Bass".to_string(),
        };
        assert_eq!(name.to_string(), "set_track_name(\"Bass\")");
    }
}
