// Step Parameter Types
// Transport selection and common step options, parsed from step input JSON

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Keyword under which step input carries its transport block
pub const TRANSPORT_KEYWORD: &str = "transport";

/// Tagged transport configuration: protocol name plus protocol-specific options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportParameters {
    pub proto: String,
    #[serde(default)]
    pub options: serde_json::Value,
}

/// Options shared by every step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepOptions {
    /// Zero or absent means unbounded
    #[serde(default)]
    pub timeout: StepDuration,
}

impl StepOptions {
    pub fn timeout(&self) -> Option<Duration> {
        Some(self.timeout.0).filter(|d| !d.is_zero())
    }
}

/// Duration accepting Go-style strings ("30s", "1h30m", "250ms") or integer nanoseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepDuration(pub Duration);

impl StepDuration {
    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl From<Duration> for StepDuration {
    fn from(d: Duration) -> Self {
        Self(d)
    }
}

impl fmt::Display for StepDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl Serialize for StepDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}ns", self.0.as_nanos()))
    }
}

impl<'de> Deserialize<'de> for StepDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Nanos(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Nanos(n) => Ok(StepDuration(Duration::from_nanos(n))),
            Raw::Text(s) => parse_duration(&s).map(StepDuration).map_err(de::Error::custom),
        }
    }
}

/// Parse a Go-style duration string
///
/// Accumulates integer nanoseconds; anything beyond `u64::MAX` ns is out of range.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let out_of_range = || format!("duration '{}' out of range", input);
    let mut total: u64 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration '{}'", input))?;
        let (whole, frac) = match rest[..num_len].split_once('.') {
            Some((w, f)) => (w, f),
            None => (&rest[..num_len], ""),
        };
        if (whole.is_empty() && frac.is_empty()) || frac.contains('.') {
            return Err(format!("invalid duration '{}'", input));
        }
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit: u64 = match &rest[..unit_len] {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            other => return Err(format!("unknown unit '{}' in duration '{}'", other, input)),
        };
        rest = &rest[unit_len..];

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| out_of_range())?
        };
        let mut nanos = whole.checked_mul(unit).ok_or_else(out_of_range)?;

        // fractional digits beyond nanosecond precision are dropped
        let mut scale = unit;
        for digit in frac.bytes() {
            scale /= 10;
            if scale == 0 {
                break;
            }
            nanos = nanos
                .checked_add(u64::from(digit - b'0') * scale)
                .ok_or_else(out_of_range)?;
        }
        total = total.checked_add(nanos).ok_or_else(out_of_range)?;
    }

    Ok(Duration::from_nanos(total))
}
