//! Stored Blob Decoding
//!
//! Tier tables and condition sets arrive from storage as opaque blobs. Older rows use a legacy
//! array serialization (`a:2:{i:0;s:3:"foo";...}`); newer rows are YAML or JSON. Both are
//! decoded into a [`serde_norway::Value`] here so the rest of the crate only ever deserializes
//! typed records.
//!
//! Numbers in the legacy format are frequently stored as strings, so the `lenient*` helpers
//! accept either representation when deserializing typed fields.

use std::{fmt, str::FromStr};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_norway::{Mapping, Number, Value};
use thiserror::Error;

/// Nesting limit for legacy arrays.
const MAX_DEPTH: usize = 32;

/// Errors raised while decoding a stored blob.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Input ended in the middle of a value.
    #[error("unexpected end of input at byte {0}")]
    UnexpectedEnd(usize),

    /// Input contained something other than what the format allows at this point.
    #[error("expected {expected} at byte {position}")]
    Unexpected {
        /// Byte offset
        position: usize,

        /// What the decoder was looking for
        expected: &'static str,
    },

    /// A length, integer or float could not be parsed.
    #[error("invalid number at byte {0}")]
    InvalidNumber(usize),

    /// A string value was not valid UTF-8.
    #[error("invalid UTF-8 in string at byte {0}")]
    InvalidUtf8(usize),

    /// Arrays were nested deeper than the decoder allows.
    #[error("arrays are nested too deeply")]
    TooDeep,

    /// Bytes were left over after a complete value.
    #[error("trailing data at byte {0}")]
    TrailingData(usize),

    /// The blob decoded but was not a collection of records.
    #[error("expected a list or map of records")]
    NotACollection,

    /// YAML/JSON parse failure, or a record that does not fit its type.
    #[error(transparent)]
    Yaml(#[from] serde_norway::Error),
}

/// Storage format of a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobFormat {
    /// Legacy array serialization
    Legacy,

    /// YAML or JSON
    Structured,
}

impl BlobFormat {
    /// Detect the format of `blob`.
    pub fn detect(blob: &str) -> Self {
        let bytes = blob.trim_start().as_bytes();

        match bytes {
            [b'N', b';', ..] => Self::Legacy,
            [b'a' | b'b' | b'd' | b'i' | b's', b':', next, ..]
                if next.is_ascii_digit() || *next == b'-' =>
            {
                Self::Legacy
            }
            _ => Self::Structured,
        }
    }
}

/// Key of a legacy array entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyKey {
    /// Integer key
    Int(i64),

    /// String key
    Str(String),
}

impl fmt::Display for LegacyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(key) => write!(f, "{key}"),
            Self::Str(key) => f.write_str(key),
        }
    }
}

/// A value in the legacy array serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyValue {
    /// `N;`
    Null,

    /// `b:0;` or `b:1;`
    Bool(bool),

    /// `i:42;`
    Int(i64),

    /// `d:1.5;`, kept as text so no precision is lost
    Float(String),

    /// `s:3:"foo";`
    Str(String),

    /// `a:1:{...}` in source order
    Array(Vec<(LegacyKey, LegacyValue)>),
}

impl LegacyValue {
    /// Parse a complete legacy blob.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the input is malformed or has trailing bytes.
    pub fn parse(input: &str) -> Result<Self, DecodeError> {
        let mut cursor = Cursor {
            input: input.trim().as_bytes(),
            position: 0,
        };

        let value = cursor.value(0)?;

        if cursor.position < cursor.input.len() {
            return Err(DecodeError::TrailingData(cursor.position));
        }

        Ok(value)
    }
}

impl From<LegacyValue> for Value {
    fn from(value: LegacyValue) -> Self {
        match value {
            LegacyValue::Null => Value::Null,
            LegacyValue::Bool(flag) => Value::Bool(flag),
            LegacyValue::Int(number) => Value::Number(Number::from(number)),
            LegacyValue::Float(text) | LegacyValue::Str(text) => Value::String(text),
            LegacyValue::Array(entries) => {
                let is_list = entries.iter().enumerate().all(|(index, (key, _))| {
                    matches!(key, LegacyKey::Int(k) if usize::try_from(*k).ok() == Some(index))
                });

                if is_list {
                    Value::Sequence(entries.into_iter().map(|(_, value)| value.into()).collect())
                } else {
                    let mut mapping = Mapping::new();

                    for (key, value) in entries {
                        mapping.insert(Value::String(key.to_string()), value.into());
                    }

                    Value::Mapping(mapping)
                }
            }
        }
    }
}

/// Decode a blob of either format into a generic value.
///
/// A blank blob decodes to [`Value::Null`].
///
/// # Errors
///
/// Returns a [`DecodeError`] if the blob is malformed.
pub fn decode_value(blob: &str) -> Result<Value, DecodeError> {
    if blob.trim().is_empty() {
        return Ok(Value::Null);
    }

    match BlobFormat::detect(blob) {
        BlobFormat::Legacy => LegacyValue::parse(blob).map(Value::from),
        BlobFormat::Structured => Ok(serde_norway::from_str(blob)?),
    }
}

/// Decode a blob holding a list, or a keyed map, of records.
///
/// Records keep their stored order. Map keys are returned next to each record; list entries
/// have no key.
///
/// # Errors
///
/// Returns a [`DecodeError`] if the blob is malformed, is not a collection, or a record does not
/// fit `T`.
pub fn decode_records<T: DeserializeOwned>(
    blob: &str,
) -> Result<Vec<(Option<String>, T)>, DecodeError> {
    match decode_value(blob)? {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(entries) => entries
            .into_iter()
            .map(|entry| -> Result<_, DecodeError> {
                Ok((None, serde_norway::from_value(entry)?))
            })
            .collect(),
        Value::Mapping(entries) => entries
            .into_iter()
            .map(|(key, entry)| -> Result<_, DecodeError> {
                Ok((key_text(&key), serde_norway::from_value(entry)?))
            })
            .collect(),
        _ => Err(DecodeError::NotACollection),
    }
}

fn key_text(key: &Value) -> Option<String> {
    match key {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

struct Cursor<'a> {
    input: &'a [u8],
    position: usize,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.position).copied()
    }

    fn bump(&mut self) -> Result<u8, DecodeError> {
        let byte = self
            .peek()
            .ok_or(DecodeError::UnexpectedEnd(self.position))?;

        self.position += 1;

        Ok(byte)
    }

    fn consume(&mut self, wanted: u8, expected: &'static str) -> Result<(), DecodeError> {
        let position = self.position;

        if self.bump()? == wanted {
            Ok(())
        } else {
            Err(DecodeError::Unexpected { position, expected })
        }
    }

    /// Read up to (and consume) `terminator`, returning the text before it.
    fn until(&mut self, terminator: u8) -> Result<&str, DecodeError> {
        let start = self.position;

        let length = self
            .input
            .get(start..)
            .and_then(|rest| rest.iter().position(|byte| *byte == terminator))
            .ok_or(DecodeError::UnexpectedEnd(self.input.len()))?;

        let text = self
            .input
            .get(start..start + length)
            .ok_or(DecodeError::UnexpectedEnd(start))?;

        self.position = start + length + 1;

        std::str::from_utf8(text).map_err(|_utf8| DecodeError::InvalidUtf8(start))
    }

    fn number<T: FromStr>(&mut self, terminator: u8) -> Result<T, DecodeError> {
        let start = self.position;

        self.until(terminator)?
            .parse()
            .map_err(|_parse| DecodeError::InvalidNumber(start))
    }

    fn value(&mut self, depth: usize) -> Result<LegacyValue, DecodeError> {
        let position = self.position;

        match self.bump()? {
            b'N' => {
                self.consume(b';', "`;`")?;

                Ok(LegacyValue::Null)
            }
            b'b' => {
                self.consume(b':', "`:`")?;

                match self.number::<u8>(b';')? {
                    0 => Ok(LegacyValue::Bool(false)),
                    1 => Ok(LegacyValue::Bool(true)),
                    _ => Err(DecodeError::InvalidNumber(position)),
                }
            }
            b'i' => {
                self.consume(b':', "`:`")?;

                Ok(LegacyValue::Int(self.number(b';')?))
            }
            b'd' => {
                self.consume(b':', "`:`")?;

                let start = self.position;
                let text = self.until(b';')?;

                if text.parse::<f64>().is_err() {
                    return Err(DecodeError::InvalidNumber(start));
                }

                Ok(LegacyValue::Float(text.to_string()))
            }
            b's' => {
                self.consume(b':', "`:`")?;

                Ok(LegacyValue::Str(self.string()?))
            }
            b'a' => {
                if depth >= MAX_DEPTH {
                    return Err(DecodeError::TooDeep);
                }

                self.consume(b':', "`:`")?;

                let count: usize = self.number(b':')?;

                self.consume(b'{', "`{`")?;

                let mut entries = Vec::with_capacity(count.min(64));

                for _ in 0..count {
                    let key = self.key()?;
                    let value = self.value(depth + 1)?;

                    entries.push((key, value));
                }

                self.consume(b'}', "`}`")?;

                Ok(LegacyValue::Array(entries))
            }
            _ => Err(DecodeError::Unexpected {
                position,
                expected: "a value",
            }),
        }
    }

    fn key(&mut self) -> Result<LegacyKey, DecodeError> {
        let position = self.position;

        match self.bump()? {
            b'i' => {
                self.consume(b':', "`:`")?;

                Ok(LegacyKey::Int(self.number(b';')?))
            }
            b's' => {
                self.consume(b':', "`:`")?;

                Ok(LegacyKey::Str(self.string()?))
            }
            _ => Err(DecodeError::Unexpected {
                position,
                expected: "an array key",
            }),
        }
    }

    /// `<len>:"<bytes>";` after the `s:` prefix. The length counts bytes, not characters.
    fn string(&mut self) -> Result<String, DecodeError> {
        let length: usize = self.number(b':')?;

        self.consume(b'"', "`\"`")?;

        let start = self.position;
        let bytes = self
            .input
            .get(start..start.saturating_add(length))
            .ok_or(DecodeError::UnexpectedEnd(self.input.len()))?;

        let text = std::str::from_utf8(bytes).map_err(|_utf8| DecodeError::InvalidUtf8(start))?;

        self.position = start + length;

        self.consume(b'"', "`\"`")?;
        self.consume(b';', "`;`")?;

        Ok(text.to_string())
    }
}

/// Scalar as it may appear in either blob format.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Self::Bool(flag) => flag.to_string(),
            Self::Int(number) => number.to_string(),
            Self::Float(number) => number.to_string(),
            Self::Text(text) => text,
        }
    }
}

/// Deserialize an optional value that may be stored as a number or as text.
///
/// Null, missing and blank values become `None`.
///
/// # Errors
///
/// Returns a deserialization error if the value is present but does not parse as `T`.
pub fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let Some(scalar) = Option::<Scalar>::deserialize(deserializer)? else {
        return Ok(None);
    };

    let text = scalar.into_text();
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return Ok(None);
    }

    trimmed
        .parse()
        .map(Some)
        .map_err(|err| serde::de::Error::custom(format!("invalid value `{trimmed}`: {err}")))
}

/// Deserialize a flag stored as a boolean, `0`/`1`, or text such as `"yes"`.
///
/// # Errors
///
/// Returns a deserialization error for text that is not a recognised flag.
pub fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Scalar>::deserialize(deserializer)? {
        None => Ok(false),
        Some(Scalar::Bool(flag)) => Ok(flag),
        Some(Scalar::Int(number)) => Ok(number != 0),
        Some(Scalar::Float(number)) => Ok(number.abs() > 0.0),
        Some(Scalar::Text(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "" | "0" | "false" | "no" | "off" => Ok(false),
            other => Err(serde::de::Error::custom(format!("invalid flag `{other}`"))),
        },
    }
}

/// Field bag as stored. Legacy arrays with no entries, or only positional keys, decode as lists.
#[derive(Deserialize)]
#[serde(untagged)]
enum FieldBag {
    Map(FxHashMap<String, Option<Scalar>>),
    List(Vec<Option<Scalar>>),
}

/// Deserialize a field map whose values may be numbers, flags or text.
///
/// A list is read as a map keyed by position, so an empty legacy array is an empty map.
///
/// # Errors
///
/// Returns a deserialization error if a value is not a scalar.
pub fn lenient_fields<'de, D>(deserializer: D) -> Result<FxHashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = |value: Option<Scalar>| value.map(Scalar::into_text).unwrap_or_default();

    Ok(match Option::<FieldBag>::deserialize(deserializer)? {
        None => FxHashMap::default(),
        Some(FieldBag::Map(fields)) => fields
            .into_iter()
            .map(|(name, value)| (name, text(value)))
            .collect(),
        Some(FieldBag::List(values)) => values
            .into_iter()
            .enumerate()
            .map(|(index, value)| (index.to_string(), text(value)))
            .collect(),
    })
}
