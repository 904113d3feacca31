//! Typed storage slots that parsed values are written into.

use crate::ParseError;

/// Numeric storage that can be assigned from a command-line literal.
///
/// Implemented for every primitive integer and float type via [`std::str::FromStr`].
/// Conversion is strict: surrounding whitespace or trailing garbage is rejected.
pub trait NumericValue {
    /// Parse `literal` and overwrite `self`; returns a human-readable reason on failure.
    fn assign(&mut self, literal: &str) -> Result<(), String>;
}

macro_rules! impl_numeric_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl NumericValue for $ty {
                fn assign(&mut self, literal: &str) -> Result<(), String> {
                    *self = literal.parse::<$ty>().map_err(|e| e.to_string())?;
                    Ok(())
                }
            }
        )*
    };
}

impl_numeric_value!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

/// Where the value of a matched argument is stored.
///
/// The set of kinds is closed; the parser matches on it exhaustively.
pub enum Destination<'a> {
    /// Set to `true` unless the literal value is exactly `false`.
    Flag(&'a mut bool),
    /// Receives the whole value verbatim; an empty value is rejected.
    Text(&'a mut String),
    /// Receives the value converted with [`NumericValue::assign`].
    Number(&'a mut dyn NumericValue),
}

impl<'a> Destination<'a> {
    pub fn flag(slot: &'a mut bool) -> Self {
        Self::Flag(slot)
    }

    pub fn text(slot: &'a mut String) -> Self {
        Self::Text(slot)
    }

    pub fn number<T: NumericValue>(slot: &'a mut T) -> Self {
        Self::Number(slot)
    }

    /// Whether this destination requires a value (and may take it from the next token).
    pub(crate) fn takes_value(&self) -> bool {
        !matches!(self, Self::Flag(_))
    }

    /// Store `value` for `flag`.
    pub(crate) fn store(&mut self, flag: &str, value: Option<&str>) -> Result<(), ParseError> {
        match self {
            Self::Flag(slot) => {
                **slot = value != Some("false");
                Ok(())
            }
            Self::Text(slot) => {
                let value = require_value(flag, value)?;
                **slot = value.to_string();
                Ok(())
            }
            Self::Number(slot) => {
                let value = require_value(flag, value)?;
                slot.assign(value).map_err(|reason| ParseError::InvalidValue {
                    flag: flag.to_string(),
                    value: value.to_string(),
                    reason,
                })
            }
        }
    }
}

fn require_value<'v>(flag: &str, value: Option<&'v str>) -> Result<&'v str, ParseError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ParseError::MissingValue {
            flag: flag.to_string(),
        }),
    }
}
