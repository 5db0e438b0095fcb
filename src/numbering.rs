//! Page number formatting
//!
//! Labels are rendered either as Arabic digits or as Roman numerals using the
//! standard subtractive notation.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::Error;

/// How page numbers are written on the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum PageNumberFormat {
    /// 1, 2, 3, ...
    #[default]
    Arabic,
    /// I, II, III, ...
    Roman,
}

/// Largest number written in Roman numerals
pub const MAX_ROMAN: u32 = 3999;

impl PageNumberFormat {
    /// Largest number this format can label
    pub fn max_number(&self) -> u32 {
        match self {
            PageNumberFormat::Arabic => u32::MAX,
            PageNumberFormat::Roman => MAX_ROMAN,
        }
    }

    /// Render `number` in this format
    pub fn label(&self, number: u32) -> String {
        match self {
            PageNumberFormat::Arabic => number.to_string(),
            PageNumberFormat::Roman => to_roman(number),
        }
    }
}

impl FromStr for PageNumberFormat {
    type Err = Error;

    /// Accepts the English names and the labels used by the desktop tool.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "數字" => return Ok(PageNumberFormat::Arabic),
            "羅馬數字" => return Ok(PageNumberFormat::Roman),
            _ => {}
        }

        match s.trim().to_lowercase().as_str() {
            "arabic" | "numeric" | "digits" => Ok(PageNumberFormat::Arabic),
            "roman" => Ok(PageNumberFormat::Roman),
            other => Err(Error::General(format!("Unknown page number format: {}", other))),
        }
    }
}

impl TryFrom<String> for PageNumberFormat {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for PageNumberFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageNumberFormat::Arabic => f.write_str("arabic"),
            PageNumberFormat::Roman => f.write_str("roman"),
        }
    }
}

const ROMAN_TABLE: [(u32, &str); 13] = [
    (1000, "M"),
    (900, "CM"),
    (500, "D"),
    (400, "CD"),
    (100, "C"),
    (90, "XC"),
    (50, "L"),
    (40, "XL"),
    (10, "X"),
    (9, "IX"),
    (5, "V"),
    (4, "IV"),
    (1, "I"),
];

/// Encode a number as Roman numerals
///
/// Repeatedly consumes the largest table value not exceeding the remainder.
/// Zero yields an empty string; values above 3999 keep prepending `M`.
pub fn to_roman(mut number: u32) -> String {
    let mut out = String::new();
    for &(value, symbol) in ROMAN_TABLE.iter() {
        while number >= value {
            out.push_str(symbol);
            number -= value;
        }
    }
    out
}

/// Decode a Roman numeral using standard numeral values
///
/// Returns `None` for empty input or characters outside `IVXLCDM`.
pub fn from_roman(text: &str) -> Option<u32> {
    fn value(c: char) -> Option<u32> {
        Some(match c {
            'I' => 1,
            'V' => 5,
            'X' => 10,
            'L' => 50,
            'C' => 100,
            'D' => 500,
            'M' => 1000,
            _ => return None,
        })
    }

    if text.is_empty() {
        return None;
    }

    let values: Vec<u32> = text.chars().map(value).collect::<Option<_>>()?;
    let mut total = 0u32;
    let mut previous = 0u32;
    for v in values {
        total = total.checked_add(v)?;
        // A smaller symbol before a larger one subtracts: undo its addition too
        if v > previous {
            total = total.checked_sub(2 * previous)?;
        }
        previous = v;
    }
    Some(total)
}
