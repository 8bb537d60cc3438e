//! Note-length capping.
//!
//! Overlapping notes of the same pitch on one channel are paired
//! last-opened-first-closed: each `(note, channel)` key has its own stack of
//! open start ticks, and a terminator closes the most recent one. Only
//! terminators of pairs longer than the cap move; everything else keeps its
//! absolute tick. The track is then re-sorted by `(tick, original index)` and
//! deltas are rebuilt from the sorted ticks.

use std::collections::HashMap;

use crate::midi_event::{absolute_ticks, MidiFile, Track, TrackEvent};

/// Shorten every matched note longer than `max_ticks` to exactly `max_ticks`.
///
/// Terminators with no open note are left where they are. The number of
/// events per track never changes.
pub fn cap_note_length(file: &MidiFile, max_ticks: u32) -> MidiFile {
    MidiFile {
        format: file.format,
        ticks_per_beat: file.ticks_per_beat,
        tracks: file
            .tracks
            .iter()
            .map(|track| cap_track(track, max_ticks as u64))
            .collect(),
    }
}

fn cap_track(track: &Track, max_ticks: u64) -> Track {
    let original = absolute_ticks(track);
    let mut ticks = original.clone();

    // (note, channel) -> start ticks of notes still sounding
    let mut open: HashMap<(u8, u8), Vec<u64>> = HashMap::new();

    for (idx, e) in track.iter().enumerate() {
        let Some(key) = e.event.note_key() else {
            continue;
        };
        if e.event.is_note_start() {
            open.entry(key).or_default().push(original[idx]);
        } else if e.event.is_terminator() {
            let Some(start) = open.get_mut(&key).and_then(Vec::pop) else {
                continue;
            };
            let end = original[idx];
            if end.saturating_sub(start) > max_ticks {
                ticks[idx] = start + max_ticks;
            }
        }
    }

    let mut order: Vec<usize> = (0..track.len()).collect();
    order.sort_by_key(|&idx| (ticks[idx], idx));

    let mut now = 0u64;
    order
        .into_iter()
        .map(|idx| {
            let delta = u32::try_from(ticks[idx] - now).unwrap_or(u32::MAX);
            now = ticks[idx];
            TrackEvent::new(delta, track[idx].event.clone())
        })
        .collect()
}
