//! Byte-level decode/encode, delegated to `midly`.

use midly::{Header, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

use crate::error::{Error, Result};
use crate::midi_event::{Event, MetaEvent, MidiFile, OtherEvent, TrackEvent};

/// Largest delta a standard MIDI file can encode (28-bit VLQ).
const MAX_DELTA: u32 = 0x0FFF_FFFF;

/// Parse standard MIDI file bytes into the owned event model.
pub fn parse(bytes: &[u8]) -> Result<MidiFile> {
    let smf = Smf::parse(bytes).map_err(|e| Error::Parse(e.to_string()))?;

    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(tpb) => tpb.as_int(),
        Timing::Timecode(..) => return Err(Error::UnsupportedTiming),
    };
    if ticks_per_beat == 0 {
        return Err(Error::Parse("ticks per beat is zero".to_string()));
    }

    let tracks = smf
        .tracks
        .iter()
        .map(|track| {
            track
                .iter()
                .map(|e| TrackEvent::new(e.delta.as_int(), decode_kind(&e.kind)))
                .collect()
        })
        .collect();

    Ok(MidiFile {
        format: smf.header.format,
        ticks_per_beat,
        tracks,
    })
}

/// Encode the event model back into standard MIDI file bytes.
pub fn serialize(file: &MidiFile) -> Result<Vec<u8>> {
    let header = Header::new(file.format, Timing::Metrical(file.ticks_per_beat.into()));

    let mut tracks = Vec::with_capacity(file.tracks.len());
    for track in &file.tracks {
        let mut events = Vec::with_capacity(track.len());
        for e in track {
            if e.delta > MAX_DELTA {
                return Err(Error::Encode(format!(
                    "delta time {} exceeds the 28-bit limit",
                    e.delta
                )));
            }
            events.push(midly::TrackEvent {
                delta: e.delta.into(),
                kind: encode_kind(&e.event),
            });
        }
        tracks.push(events);
    }

    let smf = Smf { header, tracks };
    let mut buffer = Vec::new();
    smf.write(&mut buffer)
        .map_err(|e| Error::Encode(e.to_string()))?;
    Ok(buffer)
}

fn decode_kind(kind: &TrackEventKind<'_>) -> Event {
    match *kind {
        TrackEventKind::Midi { channel, message } => {
            let channel = channel.as_int();
            match message {
                MidiMessage::NoteOn { key, vel } => Event::NoteOn {
                    channel,
                    note: key.as_int(),
                    velocity: vel.as_int(),
                },
                MidiMessage::NoteOff { key, vel } => Event::NoteOff {
                    channel,
                    note: key.as_int(),
                    velocity: vel.as_int(),
                },
                message => Event::Other(OtherEvent::Channel { channel, message }),
            }
        }
        TrackEventKind::SysEx(data) => Event::Other(OtherEvent::SysEx(data.to_vec())),
        TrackEventKind::Escape(data) => Event::Other(OtherEvent::Escape(data.to_vec())),
        TrackEventKind::Meta(meta) => Event::Meta(decode_meta(meta)),
    }
}

fn decode_meta(meta: MetaMessage<'_>) -> MetaEvent {
    match meta {
        MetaMessage::TrackNumber(n) => MetaEvent::TrackNumber(n),
        MetaMessage::Text(t) => MetaEvent::Text(t.to_vec()),
        MetaMessage::Copyright(t) => MetaEvent::Copyright(t.to_vec()),
        MetaMessage::TrackName(t) => MetaEvent::TrackName(t.to_vec()),
        MetaMessage::InstrumentName(t) => MetaEvent::InstrumentName(t.to_vec()),
        MetaMessage::Lyric(t) => MetaEvent::Lyric(t.to_vec()),
        MetaMessage::Marker(t) => MetaEvent::Marker(t.to_vec()),
        MetaMessage::CuePoint(t) => MetaEvent::CuePoint(t.to_vec()),
        MetaMessage::ProgramName(t) => MetaEvent::ProgramName(t.to_vec()),
        MetaMessage::DeviceName(t) => MetaEvent::DeviceName(t.to_vec()),
        MetaMessage::MidiChannel(c) => MetaEvent::MidiChannel(c.as_int()),
        MetaMessage::MidiPort(p) => MetaEvent::MidiPort(p.as_int()),
        MetaMessage::EndOfTrack => MetaEvent::EndOfTrack,
        MetaMessage::Tempo(t) => MetaEvent::Tempo(t.as_int()),
        MetaMessage::SmpteOffset(s) => MetaEvent::SmpteOffset(s),
        MetaMessage::TimeSignature(n, d, c, b) => MetaEvent::TimeSignature(n, d, c, b),
        MetaMessage::KeySignature(sf, minor) => MetaEvent::KeySignature(sf, minor),
        MetaMessage::SequencerSpecific(d) => MetaEvent::SequencerSpecific(d.to_vec()),
        MetaMessage::Unknown(kind, d) => MetaEvent::Unknown(kind, d.to_vec()),
    }
}

fn encode_kind(event: &Event) -> TrackEventKind<'_> {
    match event {
        Event::NoteOn {
            channel,
            note,
            velocity,
        } => TrackEventKind::Midi {
            channel: (*channel).into(),
            message: MidiMessage::NoteOn {
                key: (*note).into(),
                vel: (*velocity).into(),
            },
        },
        Event::NoteOff {
            channel,
            note,
            velocity,
        } => TrackEventKind::Midi {
            channel: (*channel).into(),
            message: MidiMessage::NoteOff {
                key: (*note).into(),
                vel: (*velocity).into(),
            },
        },
        Event::Other(OtherEvent::Channel { channel, message }) => TrackEventKind::Midi {
            channel: (*channel).into(),
            message: *message,
        },
        Event::Other(OtherEvent::SysEx(data)) => TrackEventKind::SysEx(data),
        Event::Other(OtherEvent::Escape(data)) => TrackEventKind::Escape(data),
        Event::Meta(meta) => TrackEventKind::Meta(encode_meta(meta)),
    }
}

fn encode_meta(meta: &MetaEvent) -> MetaMessage<'_> {
    match meta {
        MetaEvent::TrackNumber(n) => MetaMessage::TrackNumber(*n),
        MetaEvent::Text(t) => MetaMessage::Text(t),
        MetaEvent::Copyright(t) => MetaMessage::Copyright(t),
        MetaEvent::TrackName(t) => MetaMessage::TrackName(t),
        MetaEvent::InstrumentName(t) => MetaMessage::InstrumentName(t),
        MetaEvent::Lyric(t) => MetaMessage::Lyric(t),
        MetaEvent::Marker(t) => MetaMessage::Marker(t),
        MetaEvent::CuePoint(t) => MetaMessage::CuePoint(t),
        MetaEvent::ProgramName(t) => MetaMessage::ProgramName(t),
        MetaEvent::DeviceName(t) => MetaMessage::DeviceName(t),
        MetaEvent::MidiChannel(c) => MetaMessage::MidiChannel((*c).into()),
        MetaEvent::MidiPort(p) => MetaMessage::MidiPort((*p).into()),
        MetaEvent::EndOfTrack => MetaMessage::EndOfTrack,
        MetaEvent::Tempo(t) => MetaMessage::Tempo((*t).into()),
        MetaEvent::SmpteOffset(s) => MetaMessage::SmpteOffset(*s),
        MetaEvent::TimeSignature(n, d, c, b) => MetaMessage::TimeSignature(*n, *d, *c, *b),
        MetaEvent::KeySignature(sf, minor) => MetaMessage::KeySignature(*sf, *minor),
        MetaEvent::SequencerSpecific(d) => MetaMessage::SequencerSpecific(d),
        MetaEvent::Unknown(kind, d) => MetaMessage::Unknown(*kind, d),
    }
}
