//! Lyrics timestamps in `mm:ss.xx` form.
//!
//! The fractional part is kept as whole microseconds together with the number
//! of decimal digits it is rendered with. Every constructor rounds the value to
//! that number of digits, so a timestamp always renders exactly and two
//! timestamps that render the same are equal. All rounding is
//! round-half-to-even.

use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Fraction digits used when nothing else is specified (`mm:ss.xx`)
pub const DEFAULT_PRECISION: u8 = 2;

/// Finest supported fraction (microseconds)
pub const MAX_PRECISION: u8 = 6;

const MICROS_PER_SECOND: u32 = 1_000_000;

#[allow(clippy::expect_used)]
static TIMESTAMP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]+):([0-9]+)\.([0-9]+)$").expect("timestamp pattern is valid")
});

/// Why a timestamp could not be built.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("'{0}' is not in mm:ss.xx form")]
    Malformed(String),

    #[error("seconds must be below 60, got {0}")]
    SecondsOutOfRange(String),

    #[error("fraction must be in [0, 1), got {0}")]
    FractionOutOfRange(f64),

    #[error("precision must be between 1 and 6 digits, got {0}")]
    Precision(usize),

    #[error("{0} seconds cannot be represented as a timestamp")]
    InvalidSeconds(f64),

    #[error("minutes value '{0}' is too large")]
    MinutesOverflow(String),
}

/// A point in a song, as written in LRC files.
///
/// Equality and ordering compare minutes, seconds and fraction only; the
/// rendering precision does not take part, so `00:01.5 == 00:01.50`.
#[derive(Debug, Clone, Copy)]
pub struct Timestamp {
    minutes: u64,
    seconds: u32,
    micros: u32,
    precision: u8,
}

impl Timestamp {
    /// Build a timestamp from its components, rounding `fraction` to two digits.
    ///
    /// # Errors
    ///
    /// Returns an error if `seconds >= 60` or `fraction` is not in `[0, 1)`
    /// once rounded.
    pub fn new(minutes: u64, seconds: u32, fraction: f64) -> Result<Self, TimestampError> {
        if seconds >= 60 {
            return Err(TimestampError::SecondsOutOfRange(seconds.to_string()));
        }
        if !(0.0..1.0).contains(&fraction) {
            return Err(TimestampError::FractionOutOfRange(fraction));
        }

        let scale = 10u32.pow(u32::from(DEFAULT_PRECISION));
        // fraction < 1.0 keeps this at most `scale`, so the cast cannot truncate
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let units = (fraction * f64::from(scale)).round_ties_even() as u32;
        if units >= scale {
            return Err(TimestampError::FractionOutOfRange(fraction));
        }

        Ok(Self {
            minutes,
            seconds,
            micros: units * 10u32.pow(u32::from(MAX_PRECISION - DEFAULT_PRECISION)),
            precision: DEFAULT_PRECISION,
        })
    }

    /// Parse `mm:ss.f` where each part is a run of ASCII digits.
    ///
    /// The number of fraction digits becomes the rendering precision.
    ///
    /// # Errors
    ///
    /// Returns an error if the text does not match the grammar, the seconds are
    /// 60 or more, or the fraction has more than six digits.
    pub fn parse(text: &str) -> Result<Self, TimestampError> {
        let caps = TIMESTAMP_REGEX
            .captures(text)
            .ok_or_else(|| TimestampError::Malformed(text.to_string()))?;

        let minutes: u64 = caps[1]
            .parse()
            .map_err(|_| TimestampError::MinutesOverflow(caps[1].to_string()))?;

        let seconds = caps[2]
            .parse::<u32>()
            .ok()
            .filter(|s| *s < 60)
            .ok_or_else(|| TimestampError::SecondsOutOfRange(caps[2].to_string()))?;

        let digits = &caps[3];
        let precision = check_precision(digits.len())?;
        let fraction: u32 = digits
            .parse()
            .map_err(|_| TimestampError::Malformed(text.to_string()))?;

        Ok(Self {
            minutes,
            seconds,
            micros: fraction * 10u32.pow(u32::from(MAX_PRECISION - precision)),
            precision,
        })
    }

    /// Split a number of seconds into a timestamp, rounding to `precision` digits.
    ///
    /// # Errors
    ///
    /// Returns an error if `seconds` is negative, not finite or too large, or
    /// if `precision` is not between 1 and 6.
    pub fn from_seconds(seconds: f64, precision: u8) -> Result<Self, TimestampError> {
        let precision = check_precision(usize::from(precision))?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(TimestampError::InvalidSeconds(seconds));
        }

        let scale = 10u32.pow(u32::from(precision));
        let units = (seconds * f64::from(scale)).round_ties_even();
        // 2^64 as f64; anything at or above it does not fit in u64
        if units >= 18_446_744_073_709_551_616.0 {
            return Err(TimestampError::InvalidSeconds(seconds));
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let units = units as u64;
        Ok(Self::from_units(u128::from(units), precision))
    }

    /// Convert a duration, rounding to `precision` digits.
    ///
    /// # Errors
    ///
    /// Returns an error if `precision` is not between 1 and 6.
    pub fn from_duration(duration: Duration, precision: u8) -> Result<Self, TimestampError> {
        let precision = check_precision(usize::from(precision))?;
        let units = round_half_even(duration.as_micros(), micros_divisor(precision));
        Ok(Self::from_units(units, precision))
    }

    /// Build from a count of `10^-precision` second units.
    // seconds < 60 and fraction < 1e6 by construction; minutes saturate
    #[allow(clippy::cast_possible_truncation)]
    fn from_units(units: u128, precision: u8) -> Self {
        let scale = 10u128.pow(u32::from(precision));
        let whole_seconds = units / scale;
        let fraction = units % scale;

        Self {
            minutes: u64::try_from(whole_seconds / 60).unwrap_or(u64::MAX),
            seconds: (whole_seconds % 60) as u32,
            micros: (fraction * micros_divisor(precision)) as u32,
            precision,
        }
    }

    /// Re-round to another number of fraction digits, half to even.
    ///
    /// Widening keeps the value; narrowing may move it (`00:01.15` at one
    /// digit becomes `00:01.2`).
    ///
    /// # Errors
    ///
    /// Returns an error if `precision` is not between 1 and 6.
    pub fn with_precision(self, precision: u8) -> Result<Self, TimestampError> {
        let precision = check_precision(usize::from(precision))?;
        let units = round_half_even(self.total_micros(), micros_divisor(precision));
        Ok(Self::from_units(units, precision))
    }

    #[must_use]
    pub const fn minutes(&self) -> u64 {
        self.minutes
    }

    #[must_use]
    pub const fn seconds(&self) -> u32 {
        self.seconds
    }

    /// Fractional second in `[0, 1)`
    #[must_use]
    pub fn fraction(&self) -> f64 {
        f64::from(self.micros) / f64::from(MICROS_PER_SECOND)
    }

    /// Number of fraction digits used by [`Timestamp::render`]
    #[must_use]
    pub const fn precision(&self) -> u8 {
        self.precision
    }

    /// Total seconds: `60 * minutes + seconds + fraction`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_seconds(&self) -> f64 {
        self.minutes as f64 * 60.0 + f64::from(self.seconds) + self.fraction()
    }

    /// Saturates at `Duration::MAX` for absurdly large minute counts
    #[must_use]
    pub fn to_duration(&self) -> Duration {
        let whole = self
            .minutes
            .saturating_mul(60)
            .saturating_add(u64::from(self.seconds));
        Duration::from_secs(whole).saturating_add(Duration::from_micros(u64::from(self.micros)))
    }

    /// Canonical text, e.g. `01:17.30`
    #[must_use]
    pub fn render(&self) -> String {
        self.format_at(self.precision)
    }

    /// Render with `precision` fraction digits, rounding half to even.
    ///
    /// # Errors
    ///
    /// Returns an error if `precision` is not between 1 and 6.
    pub fn render_with(&self, precision: u8) -> Result<String, TimestampError> {
        let precision = check_precision(usize::from(precision))?;
        Ok(self.format_at(precision))
    }

    fn format_at(&self, precision: u8) -> String {
        let units = round_half_even(self.total_micros(), micros_divisor(precision));
        let scale = 10u128.pow(u32::from(precision));
        let whole_seconds = units / scale;

        format!(
            "{:02}:{:02}.{:0width$}",
            whole_seconds / 60,
            whole_seconds % 60,
            units % scale,
            width = usize::from(precision)
        )
    }

    fn total_micros(&self) -> u128 {
        (u128::from(self.minutes) * 60 + u128::from(self.seconds))
            * u128::from(MICROS_PER_SECOND)
            + u128::from(self.micros)
    }

    const fn key(&self) -> (u64, u32, u32) {
        (self.minutes, self.seconds, self.micros)
    }
}

fn check_precision(digits: usize) -> Result<u8, TimestampError> {
    match u8::try_from(digits) {
        Ok(precision) if (1..=MAX_PRECISION).contains(&precision) => Ok(precision),
        _ => Err(TimestampError::Precision(digits)),
    }
}

/// Microseconds per unit of the last rendered digit
fn micros_divisor(precision: u8) -> u128 {
    10u128.pow(u32::from(MAX_PRECISION - precision))
}

fn round_half_even(value: u128, divisor: u128) -> u128 {
    let quotient = value / divisor;
    let twice_remainder = (value % divisor) * 2;
    match twice_remainder.cmp(&divisor) {
        Ordering::Greater => quotient + 1,
        Ordering::Equal if quotient % 2 == 1 => quotient + 1,
        _ => quotient,
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Timestamp {}

impl Hash for Timestamp {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl FromStr for Timestamp {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
