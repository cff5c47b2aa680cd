/*
This code is part of the ShapeIO shapefile I/O library.
License: MIT

Notes: Structures and functions for the shapefile attribute table held in
the associated .dbf file, including the fixed-width value codec for the
C, N, F, L, D, and M field kinds.
*/
use crate::encoding::TextEncoding;
use crate::error::{Result, ShapefileError};
use log::warn;
use std::collections::HashMap;
use std::fmt;
use std::ops::Index;
use std::sync::Arc;

/// The xBase header limit of 65,535 bytes caps the descriptor array at
/// 2046 fields.
pub const MAX_FIELDS: usize = 2046;

/// The kind of one dbf field.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FieldType {
    Character,
    Numeric,
    Float,
    Logical,
    Date,
    Memo,
}

impl FieldType {
    pub fn from_char(c: char) -> Option<FieldType> {
        match c.to_ascii_uppercase() {
            'C' => Some(FieldType::Character),
            'N' => Some(FieldType::Numeric),
            'F' => Some(FieldType::Float),
            'L' => Some(FieldType::Logical),
            'D' => Some(FieldType::Date),
            'M' => Some(FieldType::Memo),
            _ => None,
        }
    }

    pub fn to_char(&self) -> char {
        match self {
            FieldType::Character => 'C',
            FieldType::Numeric => 'N',
            FieldType::Float => 'F',
            FieldType::Logical => 'L',
            FieldType::Date => 'D',
            FieldType::Memo => 'M',
        }
    }

    /// The field width used when none is specified.
    pub fn default_length(&self) -> u8 {
        match self {
            FieldType::Character => 50,
            FieldType::Numeric | FieldType::Float => 10,
            FieldType::Logical => 1,
            FieldType::Date => 8,
            FieldType::Memo => 10,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

/// A calendar date as stored in a dbf D field.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DateData {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl DateData {
    pub fn new(year: u16, month: u8, day: u8) -> DateData {
        DateData { year, month, day }
    }
}

impl fmt::Display for DateData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:04}{:02}{:02}", self.year, self.month, self.day)
    }
}

/// One attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldData {
    Int(i64),
    Real(f64),
    Text(String),
    Date(DateData),
    Bool(bool),
    Null,
}

impl FieldData {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldData::Null)
    }
}

/// One dbf field descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeField {
    pub name: String,
    pub field_type: FieldType,
    pub field_length: u8,
    pub decimal_count: u8,
}

impl AttributeField {
    pub fn new(
        name: &str,
        field_type: FieldType,
        field_length: u8,
        decimal_count: u8,
    ) -> AttributeField {
        AttributeField {
            name: name.to_string(),
            field_type,
            field_length,
            decimal_count,
        }
    }

    /// A descriptor with the kind's default width.
    pub fn default_sized(name: &str, field_type: FieldType) -> AttributeField {
        AttributeField::new(name, field_type, field_type.default_length(), 0)
    }

    /// The synthetic first descriptor covering the per-record deletion
    /// flag byte. It is inserted at position 0 of an opened table and is
    /// hidden from record values.
    pub(crate) fn deletion_flag() -> AttributeField {
        AttributeField::new("DeletionFlag", FieldType::Character, 1, 0)
    }
}

/// The fixed 32-byte dbf file header, as far as this library interprets
/// it.
#[derive(Debug, Default, Clone)]
pub struct AttributeHeader {
    pub version: u8,
    pub year: u32,
    pub month: u8,
    pub day: u8,
    pub num_records: u32,
    pub num_fields: u32, // not actually stored in file but derived
    pub bytes_in_header: u16,
    pub bytes_in_record: u16,
}

/// Shared name-to-position table for the user-visible fields of a table.
#[derive(Debug)]
pub(crate) struct FieldLookup {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl FieldLookup {
    pub(crate) fn from_names(names: Vec<String>) -> FieldLookup {
        let index = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        FieldLookup { names, index }
    }

    pub(crate) fn names(&self) -> &[String] {
        &self.names
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }
}

/// One attribute row, with values aligned 1:1 against the user-visible
/// fields. Values are reachable by position or by field name.
#[derive(Debug, Clone)]
pub struct Record {
    oid: i32,
    values: Vec<FieldData>,
    lookup: Arc<FieldLookup>,
}

impl Record {
    pub(crate) fn new(oid: i32, values: Vec<FieldData>, lookup: Arc<FieldLookup>) -> Record {
        Record {
            oid,
            values,
            lookup,
        }
    }

    /// The zero-based record index within its file.
    pub fn oid(&self) -> i32 {
        self.oid
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FieldData> {
        self.values.get(index)
    }

    /// Looks a value up by its field name.
    pub fn value(&self, name: &str) -> Option<&FieldData> {
        self.lookup.position(name).and_then(|i| self.values.get(i))
    }

    pub fn values(&self) -> &[FieldData] {
        &self.values
    }

    pub fn into_values(self) -> Vec<FieldData> {
        self.values
    }

    /// The record as ordered (field name, value) pairs.
    pub fn to_pairs(&self) -> Vec<(String, FieldData)> {
        self.lookup
            .names()
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }
}

impl Index<usize> for Record {
    type Output = FieldData;

    fn index(&self, index: usize) -> &FieldData {
        &self.values[index]
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Record) -> bool {
        self.values == other.values && self.lookup.names() == other.lookup.names()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Record #{}: {:?}", self.oid, self.values)
    }
}

/// Parses the fixed-width byte slot of one field into a value.
/// Unparseable content degrades to `Null` (or raw text for dates) rather
/// than failing, except for encoding errors under the strict policy.
pub(crate) fn parse_field_value(
    bytes: &[u8],
    field: &AttributeField,
    encoding: &TextEncoding,
    verbose: bool,
) -> Result<FieldData> {
    match field.field_type {
        FieldType::Numeric | FieldType::Float => {
            // strip padding NULs, QGIS all-asterisk nulls, and blanks
            let cleaned: String = bytes
                .iter()
                .filter(|&&b| b != 0 && b != b'*')
                .map(|&b| b as char)
                .collect();
            let cleaned = cleaned.trim();
            if cleaned.is_empty() {
                return Ok(FieldData::Null);
            }
            if field.decimal_count == 0 {
                if let Ok(v) = cleaned.parse::<i64>() {
                    return Ok(FieldData::Int(v));
                }
                // probably stored as a float; forcing through f64 would
                // lose precision for large ints, so only do it on demand
                if let Ok(v) = cleaned.parse::<f64>() {
                    return Ok(FieldData::Int(v.trunc() as i64));
                }
            } else if let Ok(v) = cleaned.parse::<f64>() {
                return Ok(FieldData::Real(v));
            }
            if verbose {
                warn!(
                    "value '{}' in field '{}' is not parseable as {}",
                    cleaned, field.name, field.field_type
                );
            }
            Ok(FieldData::Null)
        }
        FieldType::Date => {
            // no official null exists; all NULs, blanks, or zeros
            // (QGIS) are read as missing
            if bytes
                .iter()
                .all(|&b| b == 0 || b == b' ' || b == b'0')
            {
                return Ok(FieldData::Null);
            }
            let digits: Vec<u8> = bytes.to_vec();
            let parsed = if digits.len() >= 8 {
                let y = std::str::from_utf8(&digits[0..4])
                    .ok()
                    .and_then(|s| s.trim().parse::<u16>().ok());
                let m = std::str::from_utf8(&digits[4..6])
                    .ok()
                    .and_then(|s| s.trim().parse::<u8>().ok());
                let d = std::str::from_utf8(&digits[6..8])
                    .ok()
                    .and_then(|s| s.trim().parse::<u8>().ok());
                match (y, m, d) {
                    (Some(y), Some(m), Some(d)) if (1..=12).contains(&m) && (1..=31).contains(&d) => {
                        Some(DateData::new(y, m, d))
                    }
                    _ => None,
                }
            } else {
                None
            };
            match parsed {
                Some(date) => Ok(FieldData::Date(date)),
                None => {
                    // partially valid content is handed back as text so
                    // the caller can decide what to make of it
                    let text = encoding.decode(bytes)?;
                    let text = text.trim_end_matches(|c| c == ' ' || c == '\0');
                    Ok(FieldData::Text(text.to_string()))
                }
            }
        }
        FieldType::Logical => {
            let b = bytes.first().copied().unwrap_or(b' ');
            match b {
                b' ' | b'?' => Ok(FieldData::Null),
                b'Y' | b'y' | b'T' | b't' | b'1' => Ok(FieldData::Bool(true)),
                b'N' | b'n' | b'F' | b'f' | b'0' => Ok(FieldData::Bool(false)),
                _ => {
                    if verbose {
                        warn!(
                            "unrecognized logical value 0x{:02X} in field '{}'",
                            b, field.name
                        );
                    }
                    Ok(FieldData::Null)
                }
            }
        }
        FieldType::Character | FieldType::Memo => {
            let text = encoding.decode(bytes)?;
            // older writers pad with NULs rather than spaces
            let text = text.trim_end_matches(|c| c == ' ' || c == '\0');
            if text.is_empty() {
                Ok(FieldData::Null)
            } else {
                Ok(FieldData::Text(text.to_string()))
            }
        }
    }
}

/// Formats one value into its fixed-width byte slot. Numeric values that
/// do not fit the declared width fail; over-width text is truncated with
/// a warning.
pub(crate) fn format_field_value(
    value: &FieldData,
    field: &AttributeField,
    encoding: &TextEncoding,
    verbose: bool,
) -> Result<Vec<u8>> {
    let size = field.field_length as usize;
    match field.field_type {
        FieldType::Numeric | FieldType::Float => {
            let s = match value {
                FieldData::Null => return Ok(vec![b' '; size]),
                FieldData::Int(v) => {
                    if field.decimal_count == 0 {
                        v.to_string()
                    } else {
                        format!("{:.*}", field.decimal_count as usize, *v as f64)
                    }
                }
                FieldData::Real(v) => {
                    if field.decimal_count == 0 {
                        let t = v.trunc();
                        if t >= i64::MIN as f64 && t <= i64::MAX as f64 {
                            (t as i64).to_string()
                        } else {
                            format!("{:.0}", t)
                        }
                    } else {
                        format!("{:.*}", field.decimal_count as usize, v)
                    }
                }
                other => {
                    return Err(ShapefileError::Value(format!(
                        "field '{}' expects a numeric value, got {:?}",
                        field.name, other
                    )))
                }
            };
            if s.len() > size {
                return Err(ShapefileError::Value(format!(
                    "value '{}' does not fit field '{}' of width {}",
                    s, field.name, size
                )));
            }
            let mut out = vec![b' '; size - s.len()];
            out.extend_from_slice(s.as_bytes());
            Ok(out)
        }
        FieldType::Date => {
            let s = match value {
                FieldData::Date(d) => d.to_string(),
                FieldData::Text(t)
                    if t.len() == 8 && t.bytes().all(|b| b.is_ascii_digit()) =>
                {
                    t.clone()
                }
                FieldData::Null => "00000000".to_string(),
                other => {
                    return Err(ShapefileError::Value(format!(
                        "field '{}' expects a date or YYYYMMDD string, got {:?}",
                        field.name, other
                    )))
                }
            };
            if s.len() > size {
                return Err(ShapefileError::Value(format!(
                    "date value does not fit field '{}' of width {}",
                    field.name, size
                )));
            }
            let mut out = s.into_bytes();
            out.resize(size, b' ');
            Ok(out)
        }
        FieldType::Logical => {
            let b = match value {
                FieldData::Bool(true) => b'T',
                FieldData::Bool(false) => b'F',
                FieldData::Null => b' ',
                other => {
                    return Err(ShapefileError::Value(format!(
                        "field '{}' expects a boolean value, got {:?}",
                        field.name, other
                    )))
                }
            };
            let mut out = vec![b' '; size];
            out[0] = b;
            Ok(out)
        }
        FieldType::Character | FieldType::Memo => {
            let text = match value {
                FieldData::Text(s) => s.as_str(),
                FieldData::Null => return Ok(vec![b' '; size]),
                other => {
                    return Err(ShapefileError::Value(format!(
                        "field '{}' expects text, got {:?}",
                        field.name, other
                    )))
                }
            };
            let mut bytes = encoding.encode(text)?;
            if bytes.len() > size {
                if verbose {
                    warn!(
                        "truncating value in field '{}' from {} to {} bytes",
                        field.name,
                        bytes.len(),
                        size
                    );
                }
                bytes.truncate(size);
            }
            bytes.resize(size, b' ');
            Ok(bytes)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encoding::EncodingErrors;

    fn utf8() -> TextEncoding {
        TextEncoding::new("utf-8", EncodingErrors::Strict).unwrap()
    }

    #[test]
    fn test_numeric_formatting() {
        let fld = AttributeField::new("FLT", FieldType::Numeric, 18, 10);
        let bytes = format_field_value(&FieldData::Real(1.3217328), &fld, &utf8(), true).unwrap();
        assert_eq!(bytes, b"      1.3217328000".to_vec());

        let fld = AttributeField::new("INT", FieldType::Numeric, 10, 0);
        let bytes = format_field_value(&FieldData::Int(1), &fld, &utf8(), true).unwrap();
        assert_eq!(bytes, b"         1".to_vec());
    }

    #[test]
    fn test_numeric_too_wide_fails() {
        let fld = AttributeField::new("N", FieldType::Numeric, 4, 0);
        assert!(format_field_value(&FieldData::Int(123456), &fld, &utf8(), true).is_err());
    }

    #[test]
    fn test_numeric_parsing() {
        let fld = AttributeField::new("INT", FieldType::Numeric, 10, 0);
        assert_eq!(
            parse_field_value(b"         1", &fld, &utf8(), true).unwrap(),
            FieldData::Int(1)
        );
        assert_eq!(
            parse_field_value(b"       1.5", &fld, &utf8(), true).unwrap(),
            FieldData::Int(1)
        );
        assert_eq!(
            parse_field_value(b"          ", &fld, &utf8(), true).unwrap(),
            FieldData::Null
        );
        assert_eq!(
            parse_field_value(b"**********", &fld, &utf8(), true).unwrap(),
            FieldData::Null
        );
        assert_eq!(
            parse_field_value(b"   garbage", &fld, &utf8(), false).unwrap(),
            FieldData::Null
        );

        let fld = AttributeField::new("FLT", FieldType::Numeric, 18, 10);
        assert_eq!(
            parse_field_value(b"      1.3217328000", &fld, &utf8(), true).unwrap(),
            FieldData::Real(1.3217328)
        );
    }

    #[test]
    fn test_date_round_trip() {
        let fld = AttributeField::new("DATE", FieldType::Date, 8, 0);
        let bytes =
            format_field_value(&FieldData::Date(DateData::new(1998, 1, 30)), &fld, &utf8(), true)
                .unwrap();
        assert_eq!(bytes, b"19980130".to_vec());
        assert_eq!(
            parse_field_value(&bytes, &fld, &utf8(), true).unwrap(),
            FieldData::Date(DateData::new(1998, 1, 30))
        );
        // null dates are stored as all zeros and read back as missing
        let bytes = format_field_value(&FieldData::Null, &fld, &utf8(), true).unwrap();
        assert_eq!(bytes, b"00000000".to_vec());
        assert_eq!(
            parse_field_value(&bytes, &fld, &utf8(), true).unwrap(),
            FieldData::Null
        );
        // partially valid content is handed back as text
        assert_eq!(
            parse_field_value(b"19981340", &fld, &utf8(), true).unwrap(),
            FieldData::Text("19981340".to_string())
        );
    }

    #[test]
    fn test_logical_values() {
        let fld = AttributeField::new("BOOL", FieldType::Logical, 1, 0);
        for b in [b"Y", b"y", b"T", b"t", b"1"] {
            assert_eq!(
                parse_field_value(b, &fld, &utf8(), true).unwrap(),
                FieldData::Bool(true)
            );
        }
        for b in [b"N", b"n", b"F", b"f", b"0"] {
            assert_eq!(
                parse_field_value(b, &fld, &utf8(), true).unwrap(),
                FieldData::Bool(false)
            );
        }
        assert_eq!(
            parse_field_value(b" ", &fld, &utf8(), true).unwrap(),
            FieldData::Null
        );
        assert_eq!(
            parse_field_value(b"?", &fld, &utf8(), true).unwrap(),
            FieldData::Null
        );
        assert_eq!(
            parse_field_value(b"x", &fld, &utf8(), false).unwrap(),
            FieldData::Null
        );
        // the writer rejects non-boolean values
        assert!(format_field_value(&FieldData::Int(2), &fld, &utf8(), true).is_err());
    }

    #[test]
    fn test_character_trimming() {
        let fld = AttributeField::new("TXT", FieldType::Character, 8, 0);
        let bytes = format_field_value(
            &FieldData::Text("Hello".to_string()),
            &fld,
            &utf8(),
            true,
        )
        .unwrap();
        assert_eq!(bytes, b"Hello   ".to_vec());
        assert_eq!(
            parse_field_value(b"Hello\x00\x00\x00", &fld, &utf8(), true).unwrap(),
            FieldData::Text("Hello".to_string())
        );
        // over-width text is truncated, not an error
        let fld = AttributeField::new("TXT", FieldType::Character, 3, 0);
        let bytes = format_field_value(
            &FieldData::Text("Hello".to_string()),
            &fld,
            &utf8(),
            false,
        )
        .unwrap();
        assert_eq!(bytes, b"Hel".to_vec());
    }

    #[test]
    fn test_record_access() {
        let lookup = Arc::new(FieldLookup::from_names(vec![
            "ID".to_string(),
            "NAME".to_string(),
        ]));
        let rec = Record::new(
            0,
            vec![FieldData::Int(7), FieldData::Text("x".to_string())],
            lookup,
        );
        assert_eq!(rec[0], FieldData::Int(7));
        assert_eq!(rec.value("NAME"), Some(&FieldData::Text("x".to_string())));
        assert_eq!(rec.value("MISSING"), None);
        assert_eq!(rec.oid(), 0);
        assert_eq!(
            rec.to_pairs(),
            vec![
                ("ID".to_string(), FieldData::Int(7)),
                ("NAME".to_string(), FieldData::Text("x".to_string()))
            ]
        );
    }
}
