use crate::midi_event::{Event, MetaEvent, MidiFile, Track, TrackEvent};

/// Name every track `name`.
///
/// The first existing track-name event is rewritten in place. A track without
/// one gets a new event in front, which takes over the first event's delta so
/// no event changes absolute tick.
pub fn set_track_name(file: &MidiFile, name: &str) -> MidiFile {
    MidiFile {
        format: file.format,
        ticks_per_beat: file.ticks_per_beat,
        tracks: file
            .tracks
            .iter()
            .map(|track| name_track(track, name))
            .collect(),
    }
}

fn name_track(track: &Track, name: &str) -> Track {
    let named = Event::Meta(MetaEvent::TrackName(name.as_bytes().to_vec()));
    let mut out = track.clone();

    let existing = out
        .iter_mut()
        .find(|e| matches!(e.event, Event::Meta(MetaEvent::TrackName(_))));
    if let Some(existing) = existing {
        existing.event = named;
        return out;
    }

    match out.first_mut() {
        None => out.push(TrackEvent::new(0, named)),
        Some(first) => {
            let delta = std::mem::take(&mut first.delta);
            out.insert(0, TrackEvent::new(delta, named));
        }
    }
    out
}
