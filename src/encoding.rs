/*
This code is part of the ShapeIO shapefile I/O library.
License: MIT

Notes: A single text encoding governs all character-field, memo, and
field-name text in the dbf file. The encoding is selected by label,
defaulting to UTF-8, and may be overridden by a .cpg sidecar.
*/
use crate::error::{Result, ShapefileError};
use encoding_rs::{Encoding, UTF_8};
use std::fmt;
use std::str::FromStr;

/// Policy applied when bytes cannot be decoded, or text cannot be
/// encoded, under the selected encoding.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EncodingErrors {
    /// Fail the operation.
    Strict,
    /// Substitute the replacement character (decode) or `?` (encode).
    Replace,
    /// Drop the offending input.
    Ignore,
}

impl Default for EncodingErrors {
    fn default() -> EncodingErrors {
        EncodingErrors::Strict
    }
}

impl fmt::Display for EncodingErrors {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let printable = match *self {
            EncodingErrors::Strict => "strict",
            EncodingErrors::Replace => "replace",
            EncodingErrors::Ignore => "ignore",
        };
        write!(f, "{}", printable)
    }
}

impl FromStr for EncodingErrors {
    type Err = ShapefileError;

    fn from_str(s: &str) -> Result<EncodingErrors> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(EncodingErrors::Strict),
            "replace" => Ok(EncodingErrors::Replace),
            "ignore" => Ok(EncodingErrors::Ignore),
            _ => Err(ShapefileError::Encoding(format!(
                "unknown encoding error policy '{}'",
                s
            ))),
        }
    }
}

/// A text encoding paired with its error policy. The policy applies
/// symmetrically to decoding and encoding.
#[derive(Clone, Copy)]
pub struct TextEncoding {
    encoding: &'static Encoding,
    errors: EncodingErrors,
}

impl Default for TextEncoding {
    fn default() -> TextEncoding {
        TextEncoding {
            encoding: UTF_8,
            errors: EncodingErrors::Strict,
        }
    }
}

impl fmt::Debug for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TextEncoding({}, {})", self.encoding.name(), self.errors)
    }
}

impl TextEncoding {
    /// Resolves an encoding label such as `utf-8`, `latin1` or `cp1252`.
    pub fn new(label: &str, errors: EncodingErrors) -> Result<TextEncoding> {
        // windows code page labels are commonly written "cp1252"
        let normalized = if let Some(page) = label.strip_prefix("cp") {
            format!("windows-{}", page)
        } else {
            label.to_string()
        };
        let encoding = Encoding::for_label(normalized.as_bytes())
            .or_else(|| Encoding::for_label(label.as_bytes()))
            .ok_or_else(|| {
                ShapefileError::Encoding(format!("unknown encoding label '{}'", label))
            })?;
        Ok(TextEncoding { encoding, errors })
    }

    /// The canonical name of the selected encoding.
    pub fn label(&self) -> &'static str {
        self.encoding.name()
    }

    pub fn errors(&self) -> EncodingErrors {
        self.errors
    }

    /// Decodes raw dbf bytes into text, honoring the error policy.
    pub fn decode(&self, bytes: &[u8]) -> Result<String> {
        let (text, had_errors) = self.encoding.decode_without_bom_handling(bytes);
        if !had_errors {
            return Ok(text.into_owned());
        }
        match self.errors {
            EncodingErrors::Strict => Err(ShapefileError::Encoding(format!(
                "cannot decode bytes as {}",
                self.encoding.name()
            ))),
            EncodingErrors::Replace => Ok(text.into_owned()),
            EncodingErrors::Ignore => Ok(text.replace('\u{FFFD}', "")),
        }
    }

    /// Encodes text into raw dbf bytes, honoring the error policy.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
        let (bytes, _, had_errors) = self.encoding.encode(text);
        if !had_errors {
            return Ok(bytes.into_owned());
        }
        match self.errors {
            EncodingErrors::Strict => Err(ShapefileError::Encoding(format!(
                "cannot encode text as {}",
                self.encoding.name()
            ))),
            // encode character by character so that only the unmappable
            // ones are substituted or dropped
            EncodingErrors::Replace | EncodingErrors::Ignore => {
                let mut out = Vec::with_capacity(text.len());
                let mut buf = [0u8; 4];
                for ch in text.chars() {
                    let s = ch.encode_utf8(&mut buf);
                    let (b, _, bad) = self.encoding.encode(s);
                    if bad {
                        if self.errors == EncodingErrors::Replace {
                            out.push(b'?');
                        }
                    } else {
                        out.extend_from_slice(&b);
                    }
                }
                Ok(out)
            }
        }
    }
}
