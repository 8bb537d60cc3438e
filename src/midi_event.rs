//! In-memory MIDI model that the transforms operate on.
//!
//! Tracks keep MIDI's native delta-time encoding: an event's absolute tick is
//! the sum of every delta up to and including it.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiFile {
    pub format: midly::Format,
    pub ticks_per_beat: u16,
    pub tracks: Vec<Track>,
}

pub type Track = Vec<TrackEvent>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackEvent {
    pub delta: u32,
    pub event: Event,
}

impl TrackEvent {
    pub fn new(delta: u32, event: Event) -> Self {
        Self { delta, event }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    Meta(MetaEvent),
    Other(OtherEvent),
}

impl Event {
    pub fn is_note(&self) -> bool {
        matches!(self, Event::NoteOn { .. } | Event::NoteOff { .. })
    }

    /// A note-on with velocity > 0.
    pub fn is_note_start(&self) -> bool {
        matches!(self, Event::NoteOn { velocity, .. } if *velocity > 0)
    }

    /// A note-off, or a note-on with velocity 0 (running-status release).
    pub fn is_terminator(&self) -> bool {
        match self {
            Event::NoteOff { .. } => true,
            Event::NoteOn { velocity, .. } => *velocity == 0,
            _ => false,
        }
    }

    /// `(note, channel)` for note events.
    pub fn note_key(&self) -> Option<(u8, u8)> {
        match self {
            Event::NoteOn { channel, note, .. } | Event::NoteOff { channel, note, .. } => {
                Some((*note, *channel))
            }
            _ => None,
        }
    }

    pub fn is_end_of_track(&self) -> bool {
        matches!(self, Event::Meta(MetaEvent::EndOfTrack))
    }
}

/// Meta events, owned. Subtype names follow the config vocabulary
/// (see [`MetaEvent::subtype_name`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaEvent {
    TrackNumber(Option<u16>),
    Text(Vec<u8>),
    Copyright(Vec<u8>),
    TrackName(Vec<u8>),
    InstrumentName(Vec<u8>),
    Lyric(Vec<u8>),
    Marker(Vec<u8>),
    CuePoint(Vec<u8>),
    ProgramName(Vec<u8>),
    DeviceName(Vec<u8>),
    MidiChannel(u8),
    MidiPort(u8),
    EndOfTrack,
    /// Microseconds per beat.
    Tempo(u32),
    SmpteOffset(midly::SmpteTime),
    TimeSignature(u8, u8, u8, u8),
    KeySignature(i8, bool),
    SequencerSpecific(Vec<u8>),
    Unknown(u8, Vec<u8>),
}

/// Every subtype name accepted in `strip_keep_meta`.
pub const META_SUBTYPE_NAMES: &[&str] = &[
    "track_number",
    "text",
    "copyright",
    "track_name",
    "instrument_name",
    "lyric",
    "marker",
    "cue_point",
    "program_name",
    "device_name",
    "midi_channel",
    "midi_port",
    "end_of_track",
    "tempo",
    "smpte_offset",
    "time_signature",
    "key_signature",
    "sequencer_specific",
    "unknown",
];

impl MetaEvent {
    pub fn subtype_name(&self) -> &'static str {
        match self {
            MetaEvent::TrackNumber(_) => "track_number",
            MetaEvent::Text(_) => "text",
            MetaEvent::Copyright(_) => "copyright",
            MetaEvent::TrackName(_) => "track_name",
            MetaEvent::InstrumentName(_) => "instrument_name",
            MetaEvent::Lyric(_) => "lyric",
            MetaEvent::Marker(_) => "marker",
            MetaEvent::CuePoint(_) => "cue_point",
            MetaEvent::ProgramName(_) => "program_name",
            MetaEvent::DeviceName(_) => "device_name",
            MetaEvent::MidiChannel(_) => "midi_channel",
            MetaEvent::MidiPort(_) => "midi_port",
            MetaEvent::EndOfTrack => "end_of_track",
            MetaEvent::Tempo(_) => "tempo",
            MetaEvent::SmpteOffset(_) => "smpte_offset",
            MetaEvent::TimeSignature(..) => "time_signature",
            MetaEvent::KeySignature(..) => "key_signature",
            MetaEvent::SequencerSpecific(_) => "sequencer_specific",
            MetaEvent::Unknown(..) => "unknown",
        }
    }
}

/// Events the transforms pass through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtherEvent {
    Channel {
        channel: u8,
        message: midly::MidiMessage,
    },
    SysEx(Vec<u8>),
    Escape(Vec<u8>),
}

/// Absolute tick of every event in `track`, in order.
pub fn absolute_ticks(track: &[TrackEvent]) -> Vec<u64> {
    let mut now = 0u64;
    track
        .iter()
        .map(|e| {
            now += e.delta as u64;
            now
        })
        .collect()
}
