use crate::error::{Error, Result};

/// Denominators accepted in `"1/N"` note-length specs.
const SUPPORTED_DENOMINATORS: &[u32] = &[1, 2, 4, 8, 16, 32, 64];

/// Resolve a note-length spec such as `"1/8"` to ticks.
///
/// `"1/N"` is a 1/N whole note, so `"1/4"` is one beat and `"1/8"` half a beat.
pub fn to_ticks(spec: &str, ticks_per_beat: u16) -> Result<u32> {
    let unsupported = || Error::UnsupportedNoteLength(spec.to_string());

    let (numerator, denominator) = spec.trim().split_once('/').ok_or_else(unsupported)?;
    if numerator.trim() != "1" {
        return Err(unsupported());
    }
    let denominator: u32 = denominator.trim().parse().map_err(|_| unsupported())?;
    if !SUPPORTED_DENOMINATORS.contains(&denominator) {
        return Err(unsupported());
    }

    let ticks = ticks_per_beat as u32 * 4 / denominator;
    if ticks == 0 {
        return Err(unsupported());
    }
    Ok(ticks)
}
