use std::collections::BTreeSet;

use crate::midi_event::{Event, MetaEvent, MidiFile, Track, TrackEvent};

/// Keep only note events, end-of-track, and meta events whose subtype name
/// is in `keep_meta`. Dropped deltas roll into the next kept event so every
/// kept event stays at its absolute tick.
pub fn strip_to_notes(file: &MidiFile, keep_meta: &BTreeSet<String>) -> MidiFile {
    MidiFile {
        format: file.format,
        ticks_per_beat: file.ticks_per_beat,
        tracks: file
            .tracks
            .iter()
            .map(|track| strip_track(track, keep_meta))
            .collect(),
    }
}

fn strip_track(track: &Track, keep_meta: &BTreeSet<String>) -> Track {
    let mut out = Vec::with_capacity(track.len());
    let mut pending: u64 = 0;

    for e in track {
        pending += e.delta as u64;
        if !keeps(&e.event, keep_meta) {
            continue;
        }
        out.push(TrackEvent::new(clamp_delta(pending), e.event.clone()));
        pending = 0;
    }

    let terminated = out.last().is_some_and(|e| e.event.is_end_of_track());
    if !terminated {
        let end = Event::Meta(MetaEvent::EndOfTrack);
        out.push(TrackEvent::new(clamp_delta(pending), end));
    }
    out
}

fn keeps(event: &Event, keep_meta: &BTreeSet<String>) -> bool {
    match event {
        Event::NoteOn { .. } | Event::NoteOff { .. } => true,
        Event::Meta(MetaEvent::EndOfTrack) => true,
        Event::Meta(meta) => keep_meta.contains(meta.subtype_name()),
        Event::Other(_) => false,
    }
}

// Oversized deltas are rejected by the encoder.
fn clamp_delta(ticks: u64) -> u32 {
    u32::try_from(ticks).unwrap_or(u32::MAX)
}
