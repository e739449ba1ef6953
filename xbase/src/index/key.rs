//! Index keys.
//!
//! A `NodeKey` holds exactly one of three kinds of value. Keys are only
//! ordered against keys of the same kind; what happens for mixed kinds is
//! chosen by `KeyComparison`.

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use std::borrow::Cow;
use std::cmp::Ordering;

/// On-disk width of a numeric key.
pub const NUMERIC_KEY_LEN: usize = 8;

/// On-disk width of a float key.
pub const FLOAT_KEY_LEN: usize = 12;

/// Reserved text byte that sorts as 0x1F.
const UNDERSCORE: char = '_';
const UNIT_SEPARATOR: char = '\u{1F}';

/// Normalize a text key for comparison.
///
/// `_` decodes to 0x1F. Normalizing twice is a no-op.
#[must_use]
pub fn normalize_text(text: &str) -> Cow<'_, str> {
    if text.contains(UNDERSCORE) {
        Cow::Owned(text.replace(UNDERSCORE, "\u{1F}"))
    } else {
        Cow::Borrowed(text)
    }
}

fn normalized_chars(text: &str) -> impl Iterator<Item = char> + '_ {
    text.chars()
        .map(|c| if c == UNDERSCORE { UNIT_SEPARATOR } else { c })
}

/// Which variant a key carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Text,
    Numeric,
    Float,
}

impl std::fmt::Display for KeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Numeric => write!(f, "numeric"),
            Self::Float => write!(f, "float"),
        }
    }
}

/// How to treat a comparison between keys of different kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyComparison {
    /// Mixed kinds are an error.
    #[default]
    Strict,
    /// Mixed kinds compare as `Less`, as legacy readers do.
    Lenient,
}

/// Errors raised by key operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// Two keys of different kinds were compared in strict mode.
    TypeMismatch { left: KeyKind, right: KeyKind },
}

impl std::fmt::Display for KeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TypeMismatch { left, right } => {
                write!(f, "cannot compare a {left} key with a {right} key")
            }
        }
    }
}

impl std::error::Error for KeyError {}

/// A key stored in an index page.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKey {
    /// Character key, compared after `normalize_text`.
    Text(String),
    /// 8-byte IEEE-754 key (numeric and date expressions in NDX, dates in MDX).
    Numeric(f64),
    /// 12-byte packed decimal key (numeric expressions in MDX).
    Float(FloatKey),
}

impl NodeKey {
    /// Build a text key.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Build a float key from a double.
    #[must_use]
    pub fn float(value: f64) -> Self {
        Self::Float(FloatKey::from_f64(value))
    }

    /// The variant this key carries.
    #[must_use]
    pub const fn kind(&self) -> KeyKind {
        match self {
            Self::Text(_) => KeyKind::Text,
            Self::Numeric(_) => KeyKind::Numeric,
            Self::Float(_) => KeyKind::Float,
        }
    }

    /// Length used to size on-disk slots.
    ///
    /// Text keys report their character count; numeric and float keys
    /// report their fixed widths.
    #[must_use]
    pub fn length(&self) -> usize {
        match self {
            Self::Text(text) => text.chars().count(),
            Self::Numeric(_) => NUMERIC_KEY_LEN,
            Self::Float(_) => FLOAT_KEY_LEN,
        }
    }

    /// Compare two keys.
    pub fn compare(&self, other: &Self, mode: KeyComparison) -> Result<Ordering, KeyError> {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => Ok(normalized_chars(a).cmp(normalized_chars(b))),
            (Self::Numeric(a), Self::Numeric(b)) => Ok(compare_doubles(*a, *b)),
            (Self::Float(a), Self::Float(b)) => Ok(a.compare(b)),
            _ => match mode {
                KeyComparison::Strict => Err(KeyError::TypeMismatch {
                    left: self.kind(),
                    right: other.kind(),
                }),
                KeyComparison::Lenient => Ok(Ordering::Less),
            },
        }
    }
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => write!(f, "{text:?}"),
            Self::Numeric(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{}", value.to_f64()),
        }
    }
}

fn compare_doubles(a: f64, b: f64) -> Ordering {
    let diff = a - b;
    if diff < 0.0 {
        Ordering::Less
    } else if diff > 0.0 {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}

/// dBase IV packed-decimal numeric key.
///
/// Layout:
/// - byte 0: decimal exponent biased by 0x34 (value = 0.d1d2... x 10^exp)
/// - byte 1: significant digit count << 2, 0x80 set when negative
/// - bytes 2-11: 20 BCD digits, two per byte, most significant first
///
/// A digit count of zero means the value is zero.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FloatKey([u8; FLOAT_KEY_LEN]);

const EXPONENT_BIAS: i32 = 0x34;
const SIGN_BIT: u8 = 0x80;
const DIGITS: usize = 20;
const SATURATED_EXPONENT: u8 = 0xFF;

impl FloatKey {
    /// Zero.
    pub const ZERO: Self = Self([EXPONENT_BIAS as u8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);

    /// Sorts after every finite value.
    pub const MAX: Self = Self([
        SATURATED_EXPONENT,
        (DIGITS as u8) << 2,
        0x99,
        0x99,
        0x99,
        0x99,
        0x99,
        0x99,
        0x99,
        0x99,
        0x99,
        0x99,
    ]);

    /// Sorts before every finite value.
    pub const MIN: Self = Self([
        SATURATED_EXPONENT,
        SIGN_BIT | ((DIGITS as u8) << 2),
        0x99,
        0x99,
        0x99,
        0x99,
        0x99,
        0x99,
        0x99,
        0x99,
        0x99,
        0x99,
    ]);

    /// Wrap raw on-disk bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; FLOAT_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw on-disk bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; FLOAT_KEY_LEN] {
        &self.0
    }

    /// Encode a double with 20 significant digits.
    ///
    /// NaN encodes as zero, infinities and out-of-range magnitudes
    /// saturate to `MAX`/`MIN`, and magnitudes too small to represent
    /// become zero.
    #[must_use]
    pub fn from_f64(value: f64) -> Self {
        if value.is_nan() || value == 0.0 {
            return Self::ZERO;
        }
        let negative = value < 0.0;
        let saturated = if negative { Self::MIN } else { Self::MAX };
        if value.is_infinite() {
            return saturated;
        }

        let text = format!("{:.*e}", DIGITS - 1, value.abs());
        let Some((mantissa, exponent)) = text.split_once('e') else {
            return Self::ZERO;
        };
        let Ok(exponent) = exponent.parse::<i32>() else {
            return Self::ZERO;
        };
        let biased = EXPONENT_BIAS + exponent + 1;
        if biased >= i32::from(SATURATED_EXPONENT) {
            return saturated;
        }
        if biased < 1 {
            return Self::ZERO;
        }

        let digits: Vec<u8> = mantissa
            .bytes()
            .filter(u8::is_ascii_digit)
            .map(|b| b - b'0')
            .collect();
        let significant = digits.iter().rposition(|&d| d != 0).map_or(0, |i| i + 1);

        let mut bytes = [0u8; FLOAT_KEY_LEN];
        bytes[0] = biased as u8;
        bytes[1] = ((significant as u8) << 2) | if negative { SIGN_BIT } else { 0 };
        for (i, pair) in digits.chunks(2).take(DIGITS / 2).enumerate() {
            let high = pair[0];
            let low = pair.get(1).copied().unwrap_or(0);
            bytes[2 + i] = (high << 4) | low;
        }
        Self(bytes)
    }

    /// Encode a double, or `None` when it is not finite or too large in
    /// magnitude to encode without saturating.
    #[must_use]
    pub fn checked_from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let key = Self::from_f64(value);
        (key != Self::MAX && key != Self::MIN).then_some(key)
    }

    /// Decode to a double.
    #[must_use]
    pub fn to_f64(&self) -> f64 {
        if self.is_zero() {
            return 0.0;
        }
        let digits: String = self
            .digits()
            .map(|d| char::from(b'0' + d))
            .collect();
        let exponent = i32::from(self.0[0]) - EXPONENT_BIAS;
        let magnitude = format!("0.{digits}e{exponent}")
            .parse::<f64>()
            .unwrap_or(0.0);
        if self.is_negative() { -magnitude } else { magnitude }
    }

    fn digit_count(&self) -> usize {
        usize::from((self.0[1] & !SIGN_BIT) >> 2).min(DIGITS)
    }

    fn digits(&self) -> impl Iterator<Item = u8> + '_ {
        self.0[2..]
            .iter()
            .flat_map(|b| [b >> 4, b & 0x0F])
            .take(self.digit_count())
    }

    /// Whether this key encodes zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.digit_count() == 0
    }

    /// Whether this key encodes a negative value.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0[1] & SIGN_BIT != 0
    }

    fn sign_class(&self) -> i8 {
        if self.is_zero() {
            0
        } else if self.is_negative() {
            -1
        } else {
            1
        }
    }

    /// Order two packed-decimal keys.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        let sign = self.sign_class();
        match sign.cmp(&other.sign_class()) {
            Ordering::Equal if sign == 0 => Ordering::Equal,
            Ordering::Equal => {
                let magnitude = self.0[0]
                    .cmp(&other.0[0])
                    .then_with(|| self.0[2..].cmp(&other.0[2..]));
                if sign < 0 { magnitude.reverse() } else { magnitude }
            }
            unequal => unequal,
        }
    }
}

impl std::fmt::Debug for FloatKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FloatKey").field(&self.to_f64()).finish()
    }
}
