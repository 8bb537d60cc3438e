//! Filename-driven rule pipeline.
//!
//! Every file gets the same fixed shape of plan:
//! `StripToNotes` (if enabled), then the operators of the first rule whose
//! keywords match the filename (bass, then drums, then wildcard), then
//! `ForceChannel` (if enabled).

use std::path::Path;

use tracing::debug;

use crate::codec;
use crate::config::{BassRule, Config, DrumsRule, WildcardRule};
use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::midi_event::{Event, MetaEvent, MidiFile, Track, TrackEvent};
use crate::transform::Operator;

/// Payload prefix of the sequencer-specific meta event marking a processed
/// file.
const STAMP_PREFIX: &[u8] = b"midiwatch:";

/// A filename rule: a match predicate plus the operators it contributes.
pub trait Rule: Send + Sync {
    fn name(&self) -> &'static str;

    /// `filename` is already lowercased.
    fn matches(&self, filename: &str) -> bool;

    fn operators(&self) -> Vec<Operator>;
}

fn contains_any(filename: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .any(|k| filename.contains(k.to_lowercase().as_str()))
}

impl Rule for BassRule {
    fn name(&self) -> &'static str {
        "bass"
    }

    fn matches(&self, filename: &str) -> bool {
        contains_any(filename, &self.filename_contains)
    }

    fn operators(&self) -> Vec<Operator> {
        let mut ops = vec![Operator::Transpose {
            semitones: self.transpose_semitones,
        }];
        if let Some(name) = &self.track_name {
            ops.push(Operator::SetTrackName { name: name.clone() });
        }
        ops
    }
}

impl Rule for DrumsRule {
    fn name(&self) -> &'static str {
        "drums"
    }

    fn matches(&self, filename: &str) -> bool {
        contains_any(filename, &self.filename_contains)
    }

    fn operators(&self) -> Vec<Operator> {
        let mut ops = vec![Operator::CapNoteLength {
            max_length: self.max_note_length.clone(),
        }];
        if let Some(name) = &self.track_name {
            ops.push(Operator::SetTrackName { name: name.clone() });
        }
        ops
    }
}

impl Rule for WildcardRule {
    fn name(&self) -> &'static str {
        "wildcard"
    }

    fn matches(&self, _filename: &str) -> bool {
        true
    }

    fn operators(&self) -> Vec<Operator> {
        let mut ops = Vec::new();
        if let Some(semitones) = self.transpose_semitones {
            ops.push(Operator::Transpose { semitones });
        }
        if let Some(name) = &self.track_name {
            ops.push(Operator::SetTrackName { name: name.clone() });
        }
        if let Some(max_length) = &self.max_note_length {
            ops.push(Operator::CapNoteLength {
                max_length: max_length.clone(),
            });
        }
        ops
    }
}

pub struct Pipeline {
    strip: Option<Operator>,
    /// Checked in order; the first match wins.
    rules: Vec<Box<dyn Rule>>,
    force_channel: Option<Operator>,
    mark_processed: bool,
}

impl Pipeline {
    pub fn from_config(config: &Config) -> Self {
        let global = &config.global;

        let strip = global.strip_to_notes.then(|| Operator::StripToNotes {
            keep_meta: global.strip_keep_meta.iter().cloned().collect(),
        });
        let force_channel = global
            .force_channel_zero
            .then_some(Operator::ForceChannel { channel: 0 });

        let mut rules: Vec<Box<dyn Rule>> = vec![
            Box::new(config.rules.bass.clone()),
            Box::new(config.rules.drums.clone()),
        ];
        if let Some(wildcard) = &config.rules.wildcard {
            rules.push(Box::new(wildcard.clone()));
        }

        Self {
            strip,
            rules,
            force_channel,
            mark_processed: global.mark_processed,
        }
    }

    /// The ordered operators for the file at `path`.
    pub fn plan(&self, path: &Path) -> Vec<Operator> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let mut ops = Vec::new();
        ops.extend(self.strip.clone());
        if let Some(rule) = self.rules.iter().find(|r| r.matches(&filename)) {
            debug!("{} matched rule {}", path.display(), rule.name());
            ops.extend(rule.operators());
        }
        ops.extend(self.force_channel.clone());
        ops
    }

    /// Run the plan for `path` over `file`.
    ///
    /// With `mark_processed` and a plan that transposes, the output carries a
    /// stamp over the plan and the resulting content. A file whose stamp
    /// still matches is returned unchanged, so running twice equals running
    /// once. Other plans are idempotent on their own and never get a stamp.
    pub fn run(&self, file: &MidiFile, path: &Path) -> Result<MidiFile> {
        let ops = self.plan(path);
        if ops.is_empty() {
            return Ok(file.clone());
        }
        if !(self.mark_processed && needs_stamp(&ops)) {
            return apply_all(file.clone(), &ops);
        }

        let bare = remove_stamps(file);
        if let Some(existing) = find_stamp(file) {
            if *existing == stamp_for(&ops, &bare)? {
                debug!("{} already processed with this plan", path.display());
                return Ok(file.clone());
            }
        }

        let mut out = apply_all(bare, &ops)?;
        let stamp = stamp_for(&ops, &out)?;
        if let Some(first) = out.tracks.first_mut() {
            first.insert(
                0,
                TrackEvent::new(0, Event::Meta(MetaEvent::SequencerSpecific(stamp))),
            );
        }
        Ok(out)
    }
}

fn needs_stamp(ops: &[Operator]) -> bool {
    ops.iter().any(|op| match op {
        Operator::Transpose { semitones } => *semitones != 0,
        _ => false,
    })
}

fn apply_all(mut file: MidiFile, ops: &[Operator]) -> Result<MidiFile> {
    for op in ops {
        file = op.apply(&file)?;
    }
    Ok(file)
}

/// `file` must not carry a stamp itself.
fn stamp_for(ops: &[Operator], file: &MidiFile) -> Result<Vec<u8>> {
    let mut keyed: Vec<u8> = Vec::new();
    for op in ops {
        keyed.extend_from_slice(op.to_string().as_bytes());
        keyed.push(b'\n');
    }
    keyed.extend_from_slice(&codec::serialize(file)?);

    let key = Fingerprint::from_data(&keyed);
    let mut payload = STAMP_PREFIX.to_vec();
    payload.extend_from_slice(key.to_string().as_bytes());
    Ok(payload)
}

fn stamp_payload(event: &Event) -> Option<&Vec<u8>> {
    match event {
        Event::Meta(MetaEvent::SequencerSpecific(data)) if data.starts_with(STAMP_PREFIX) => {
            Some(data)
        }
        _ => None,
    }
}

fn is_stamp(event: &Event) -> bool {
    stamp_payload(event).is_some()
}

fn find_stamp(file: &MidiFile) -> Option<&Vec<u8>> {
    file.tracks
        .first()
        .and_then(|track| track.iter().find_map(|e| stamp_payload(&e.event)))
}

/// Drop every stamp, rolling its delta into the next event.
fn remove_stamps(file: &MidiFile) -> MidiFile {
    let strip = |track: &Track| -> Track {
        let mut out = Vec::with_capacity(track.len());
        let mut carry = 0u32;
        for e in track {
            if is_stamp(&e.event) {
                carry = carry.saturating_add(e.delta);
                continue;
            }
            let delta = e.delta.saturating_add(carry);
            out.push(TrackEvent::new(delta, e.event.clone()));
            carry = 0;
        }
        out
    };
    MidiFile {
        format: file.format,
        ticks_per_beat: file.ticks_per_beat,
        tracks: file.tracks.iter().map(strip).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi_event::absolute_ticks;
    use pretty_assertions::assert_eq;

    fn config(extra: &str) -> Config {
        let toml = format!(
            r#"
            {extra}

            [rules.bass]
            filename_contains = ["Bass"]
            transpose_semitones = -12
            track_name = "Bass"

            [rules.drums]
            filename_contains = ["drum", "perc"]
            max_note_length = "1/8"
            "#
        );
        Config::parse(&toml, Path::new("test.toml")).unwrap()
    }

    fn marked() -> Config {
        config("[global]\nmark_processed = true")
    }

    fn plan_of(pipeline: &Pipeline, name: &str) -> Vec<String> {
        pipeline
            .plan(Path::new(name))
            .iter()
            .map(Operator::to_string)
            .collect()
    }

    fn note(delta: u32, note: u8, velocity: u8) -> TrackEvent {
        let event = Event::NoteOn {
            channel: 4,
            note,
            velocity,
        };
        TrackEvent::new(delta, event)
    }

    fn song() -> MidiFile {
        MidiFile {
            format: midly::Format::Parallel,
            ticks_per_beat: 480,
            tracks: vec![vec![
                TrackEvent::new(0, Event::Meta(MetaEvent::Tempo(500_000))),
                note(0, 40, 100),
                note(960, 40, 0),
                TrackEvent::new(0, Event::Meta(MetaEvent::EndOfTrack)),
            ]],
        }
    }

    fn notes(file: &MidiFile) -> Vec<(u8, u8)> {
        file.tracks[0]
            .iter()
            .filter_map(|e| e.event.note_key())
            .collect()
    }

    fn stamps(file: &MidiFile) -> usize {
        file.tracks[0].iter().filter(|e| is_stamp(&e.event)).count()
    }

    #[test]
    fn test_bass_plan() {
        let pipeline = Pipeline::from_config(&config(""));
        assert_eq!(
            plan_of(&pipeline, "dir/MY_BASS_line.MID"),
            vec![
                "strip_to_notes(keep=[])",
                "transpose(-12)",
                "set_track_name(\"Bass\")",
                "force_channel(0)",
            ]
        );
    }

    #[test]
    fn test_drums_plan_without_name() {
        let pipeline = Pipeline::from_config(&config(""));
        assert_eq!(
            plan_of(&pipeline, "Perc_Loop.mid"),
            vec![
                "strip_to_notes(keep=[])",
                "cap_note_length(1/8)",
                "force_channel(0)",
            ]
        );
    }

    #[test]
    fn test_bass_wins_over_drums() {
        let pipeline = Pipeline::from_config(&config(""));
        let plan = plan_of(&pipeline, "bass_and_drums.mid");
        assert!(plan.contains(&"transpose(-12)".to_string()));
        assert!(!plan.iter().any(|op| op.starts_with("cap_note_length")));
    }

    #[test]
    fn test_wildcard_order_and_fallback() {
        let pipeline = Pipeline::from_config(&config(
            r#"
            [global]
            strip_to_notes = false
            force_channel_zero = false

            [rules.wildcard]
            max_note_length = "1/16"
            track_name = "Keys"
            transpose_semitones = 3
            "#,
        ));
        assert_eq!(
            plan_of(&pipeline, "piano.mid"),
            vec![
                "transpose(3)",
                "set_track_name(\"Keys\")",
                "cap_note_length(1/16)",
            ]
        );
        assert_eq!(
            plan_of(&pipeline, "bass.mid"),
            vec!["transpose(-12)", "set_track_name(\"Bass\")"]
        );
    }

    #[test]
    fn test_unmatched_without_wildcard_only_globals() {
        let pipeline = Pipeline::from_config(&config(
            "[global]\nstrip_keep_meta = [\"tempo\", \"time_signature\"]",
        ));
        assert_eq!(
            plan_of(&pipeline, "piano.mid"),
            vec![
                "strip_to_notes(keep=[tempo,time_signature])",
                "force_channel(0)",
            ]
        );
    }

    #[test]
    fn test_empty_plan_leaves_file_alone() {
        let pipeline = Pipeline::from_config(&config(
            "[global]\nstrip_to_notes = false\nforce_channel_zero = false",
        ));
        let input = song();
        let out = pipeline.run(&input, Path::new("piano.mid")).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_default_run_adds_nothing_beyond_kept_meta() {
        let pipeline = Pipeline::from_config(&config("[global]\nstrip_keep_meta = [\"tempo\"]"));
        for name in ["bass.mid", "drums.mid", "piano.mid"] {
            let out = pipeline.run(&song(), Path::new(name)).unwrap();
            for e in &out.tracks[0] {
                assert!(
                    e.event.is_note()
                        || matches!(
                            e.event,
                            Event::Meta(MetaEvent::Tempo(_))
                                | Event::Meta(MetaEvent::TrackName(_))
                                | Event::Meta(MetaEvent::EndOfTrack)
                        ),
                    "{name}: unexpected event {:?}",
                    e.event
                );
            }
        }
    }

    #[test]
    fn test_marking_skips_plans_without_transpose() {
        let pipeline = Pipeline::from_config(&marked());
        let drums = pipeline.run(&song(), Path::new("drums.mid")).unwrap();
        assert_eq!(stamps(&drums), 0);
        let again = pipeline.run(&drums, Path::new("drums.mid")).unwrap();
        assert_eq!(again, drums);

        let piano = pipeline.run(&song(), Path::new("piano.mid")).unwrap();
        assert_eq!(stamps(&piano), 0);
    }

    #[test]
    fn test_run_stamps_and_second_run_is_identity() {
        let pipeline = Pipeline::from_config(&marked());
        let path = Path::new("bass.mid");
        let once = pipeline.run(&song(), path).unwrap();

        assert!(is_stamp(&once.tracks[0][0].event));
        assert_eq!(once.tracks[0][0].delta, 0);
        assert_eq!(notes(&once), vec![(28, 0), (28, 0)]);

        let twice = pipeline.run(&once, path).unwrap();
        assert_eq!(twice, once);
    }

    #[test]
    fn test_edited_output_is_processed_again() {
        let pipeline = Pipeline::from_config(&marked());
        let path = Path::new("bass.mid");
        let mut edited = pipeline.run(&song(), path).unwrap();

        // a new note added after processing, stamp left in place
        let eot = edited.tracks[0].len() - 1;
        edited.tracks[0].insert(eot, note(0, 52, 80));
        edited.tracks[0].insert(eot + 1, note(120, 52, 0));

        let again = pipeline.run(&edited, path).unwrap();
        assert_ne!(again, edited);
        assert!(notes(&again).contains(&(40, 0)));
        assert_eq!(pipeline.run(&again, path).unwrap(), again);
    }

    #[test]
    fn test_changed_plan_replaces_stale_stamp() {
        let path = Path::new("bass.mid");
        let stamped = Pipeline::from_config(&marked()).run(&song(), path).unwrap();

        let second = Pipeline::from_config(&config(
            "[global]\nmark_processed = true\nstrip_keep_meta = [\"tempo\"]",
        ));
        let restamped = second.run(&stamped, path).unwrap();

        assert_eq!(stamps(&restamped), 1);
        assert_ne!(restamped.tracks[0][0], stamped.tracks[0][0]);
    }

    #[test]
    fn test_without_marking_no_stamp() {
        let pipeline = Pipeline::from_config(&config(""));
        let bass = pipeline.run(&song(), Path::new("bass.mid")).unwrap();
        assert_eq!(stamps(&bass), 0);

        let drums = pipeline.run(&song(), Path::new("drums.mid")).unwrap();
        assert_eq!(stamps(&drums), 0);
        assert_eq!(absolute_ticks(&drums.tracks[0]), vec![0, 240, 960]);
    }

    #[test]
    fn test_remove_stamps_keeps_timing() {
        let payload = b"midiwatch:old".to_vec();
        let stale = TrackEvent::new(30, Event::Meta(MetaEvent::SequencerSpecific(payload)));
        let mut file = song();
        file.tracks[0].insert(1, stale);
        file.tracks[0][2].delta = 5;

        let cleaned = remove_stamps(&file);
        assert_eq!(cleaned.tracks[0].len(), 4);
        assert_eq!(absolute_ticks(&cleaned.tracks[0]), vec![0, 35, 995, 995]);
    }
}
