use crate::midi_event::{Event, MidiFile, TrackEvent};

/// Shift every note by `semitones`, clamped to 0..=127. Distinct notes may
/// collapse onto the same pitch at the edges of the range.
pub fn transpose(file: &MidiFile, semitones: i32) -> MidiFile {
    let shift = |note: u8| (note as i32 + semitones).clamp(0, 127) as u8;
    map_notes(file, shift, |c| c)
}

/// Move every note event onto `channel`. Everything else is untouched.
pub fn force_channel(file: &MidiFile, channel: u8) -> MidiFile {
    map_notes(file, |note| note, |_| channel)
}

fn map_notes(
    file: &MidiFile,
    note_fn: impl Fn(u8) -> u8,
    channel_fn: impl Fn(u8) -> u8,
) -> MidiFile {
    let map_event = |event: &Event| match event {
        Event::NoteOn {
            channel,
            note,
            velocity,
        } => Event::NoteOn {
            channel: channel_fn(*channel),
            note: note_fn(*note),
            velocity: *velocity,
        },
        Event::NoteOff {
            channel,
            note,
            velocity,
        } => Event::NoteOff {
            channel: channel_fn(*channel),
            note: note_fn(*note),
            velocity: *velocity,
        },
        other => other.clone(),
    };

    MidiFile {
        format: file.format,
        ticks_per_beat: file.ticks_per_beat,
        tracks: file
            .tracks
            .iter()
            .map(|track| {
                track
                    .iter()
                    .map(|e| TrackEvent::new(e.delta, map_event(&e.event)))
                    .collect()
            })
            .collect(),
    }
}
