use crate::dsp::oscillator::SynthesisMode;
use crate::error::{InputError, ParseError, ParseErrorKind, Span};

/// Parse a frequency list such as `"432, 528.5"` or `"40, 110 b"`.
///
/// Entries are comma separated. A trailing standalone `b` (either case)
/// selects binaural mode.
pub fn parse_frequency_input(input: &str) -> Result<(Vec<f64>, SynthesisMode), ParseError> {
    let (list, mode) = split_mode_flag(input);

    if list.trim().is_empty() {
        return Err(ParseError {
            kind: ParseErrorKind::Empty,
            span: Span {
                start: 0,
                end: input.len(),
            },
        });
    }

    let mut frequencies = Vec::new();
    let mut offset = 0;
    for entry in list.split(',') {
        let span = trimmed_span(entry, offset);
        offset += entry.len() + 1;

        let text = entry.trim();
        if text.is_empty() {
            return Err(ParseError {
                kind: ParseErrorKind::EmptyEntry,
                span,
            });
        }
        let value: f64 = text.parse().map_err(|_| ParseError {
            kind: ParseErrorKind::InvalidNumber(text.to_string()),
            span,
        })?;
        if !(value.is_finite() && value > 0.0) {
            return Err(ParseError {
                kind: ParseErrorKind::NonPositive(value),
                span,
            });
        }
        frequencies.push(value);
    }

    Ok((frequencies, mode))
}

/// Strip a trailing ` b` / ` B` token, returning the remaining text.
fn split_mode_flag(input: &str) -> (&str, SynthesisMode) {
    let trimmed = input.trim_end();
    if let Some(idx) = trimmed.rfind(char::is_whitespace) {
        let last = trimmed[idx..].trim_start();
        if last.eq_ignore_ascii_case("b") {
            return (&trimmed[..idx], SynthesisMode::Binaural);
        }
    } else if trimmed.trim_start().eq_ignore_ascii_case("b") {
        return ("", SynthesisMode::Binaural);
    }
    (input, SynthesisMode::Mono)
}

fn trimmed_span(entry: &str, offset: usize) -> Span {
    let lead = entry.len() - entry.trim_start().len();
    let body = entry.trim().len();
    Span {
        start: offset + lead,
        end: offset + lead + body,
    }
}

/// Total seconds for an hours + minutes duration.
pub fn duration_from_hours_minutes(hours: i64, minutes: i64) -> Result<i64, InputError> {
    hours
        .checked_mul(3600)
        .zip(minutes.checked_mul(60))
        .and_then(|(h, m)| h.checked_add(m))
        .ok_or(InputError::DurationOverflow { hours, minutes })
}
