//! FITS header card decoding.
//!
//! A header is a sequence of 80-character ASCII cards stored in 2880-byte
//! blocks and terminated by an `END` card. A card carries a value when
//! columns 9-10 hold the value indicator `"= "`; the value field then runs
//! up to an optional `/ comment`.
//!
//! Values are decoded with `nom`:
//!
//! * `'text'` - character string (`''` is an escaped quote, trailing blanks dropped)
//! * `T` / `F` - logical
//! * `123`, `-4` - integer
//! * `1.5`, `-2.0E-3`, `1.0D+02` - real (Fortran `D` exponents accepted)
//! * `(1.0, 2.0)` - complex
//! * nothing - undefined
//!
//! Long strings split across `CONTINUE` cards (each fragment but the last
//! ending in `&`) are joined back into a single value.

use crate::error::FormatError;
use nom::{
    IResult,
    branch::alt,
    bytes::complete::take_while,
    character::complete::{char, digit0, digit1, one_of, space0},
    combinator::{all_consuming, map, map_res, opt, recognize},
    sequence::{delimited, pair, separated_pair, tuple},
};
use std::fmt;

/// Length of one header card in bytes.
pub const CARD_LEN: usize = 80;

/// Length of one FITS block in bytes (headers and data are padded to it).
pub const BLOCK_LEN: usize = 2880;

/// A decoded header value.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    /// Character string, unquoted
    Str(String),
    /// Logical `T`/`F`
    Logical(bool),
    /// Integer
    Integer(i64),
    /// Floating point
    Real(f64),
    /// Complex number `(re, im)`
    Complex(f64, f64),
    /// Value indicator present but value field blank
    Undefined,
    /// Value text that matches no FITS value type, kept verbatim
    Raw(String),
}

impl HeaderValue {
    /// Integer view of the value (integers only).
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            HeaderValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Real view of the value (integers are widened).
    pub fn as_real(&self) -> Option<f64> {
        match self {
            HeaderValue::Integer(i) => Some(*i as f64),
            HeaderValue::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// String view of the value (strings only).
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Renders the value the way it appears in the metadata table.
///
/// Undefined values render as the empty string.
impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Str(s) => f.write_str(s),
            HeaderValue::Logical(true) => f.write_str("True"),
            HeaderValue::Logical(false) => f.write_str("False"),
            HeaderValue::Integer(i) => write!(f, "{i}"),
            HeaderValue::Real(r) => f.write_str(&format_real(*r)),
            HeaderValue::Complex(re, im) => {
                write!(f, "({}, {})", format_real(*re), format_real(*im))
            }
            HeaderValue::Undefined => Ok(()),
            HeaderValue::Raw(raw) => f.write_str(raw),
        }
    }
}

/// Shortest round-trip rendering of a real number.
///
/// Fixed notation with at least one fractional digit for decimal exponents in
/// `-4..16`, scientific notation with a signed two-digit exponent otherwise
/// (`0.5`, `120.0`, `1e-05`, `1.5e+16`).
pub fn format_real(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    // `{:e}` yields the shortest round-trip digits, e.g. "-1.2345e3"
    let sci = format!("{:e}", value);
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(m) => ("-", m),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    if (-4..16).contains(&exponent) {
        let point = exponent + 1;
        let body = if point <= 0 {
            format!("0.{}{}", "0".repeat((-point) as usize), digits)
        } else if point as usize >= digits.len() {
            format!("{}{}.0", digits, "0".repeat(point as usize - digits.len()))
        } else {
            let (int, frac) = digits.split_at(point as usize);
            format!("{int}.{frac}")
        };
        format!("{sign}{body}")
    } else {
        let exp_sign = if exponent < 0 { '-' } else { '+' };
        format!("{sign}{mantissa}e{exp_sign}{:02}", exponent.abs())
    }
}

/// One header card.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    /// Keyword, upper case, trailing blanks removed
    pub keyword: String,
    /// Decoded value, `None` for commentary cards
    pub value: Option<HeaderValue>,
}

/// The ordered cards of one header unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    cards: Vec<Card>,
}

impl Header {
    /// Look up a keyword (case-insensitive); the first occurrence wins.
    pub fn get(&self, keyword: &str) -> Option<&HeaderValue> {
        self.cards
            .iter()
            .find(|card| card.keyword.eq_ignore_ascii_case(keyword))
            .and_then(|card| card.value.as_ref())
    }

    /// Integer value of a keyword, if present and integral.
    pub fn integer(&self, keyword: &str) -> Option<i64> {
        self.get(keyword).and_then(HeaderValue::as_integer)
    }

    /// Real value of a keyword, if present and numeric.
    pub fn real(&self, keyword: &str) -> Option<f64> {
        self.get(keyword).and_then(HeaderValue::as_real)
    }

    /// All cards in file order.
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Keyword of the first card (`SIMPLE` or `XTENSION` in a valid file).
    pub fn first_keyword(&self) -> Option<&str> {
        self.cards.first().map(|card| card.keyword.as_str())
    }

    /// Decode one 2880-byte block, appending its cards.
    ///
    /// Returns `true` once the `END` card has been seen; cards after it are
    /// padding and ignored.
    pub fn push_block(&mut self, block: &[u8]) -> Result<bool, FormatError> {
        for raw in block.chunks(CARD_LEN) {
            let text = std::str::from_utf8(raw)
                .ok()
                .filter(|s| s.bytes().all(|b| (0x20..=0x7e).contains(&b)))
                .ok_or_else(|| {
                    FormatError::InvalidCard(String::from_utf8_lossy(raw).into_owned())
                })?;

            let card = parse_card(text);
            if card.keyword == "END" {
                return Ok(true);
            }
            if card.keyword == "CONTINUE" && self.extend_long_string(&card) {
                continue;
            }
            self.cards.push(card);
        }
        Ok(false)
    }

    /// Append a `CONTINUE` fragment to the previous string if it ends in `&`.
    fn extend_long_string(&mut self, card: &Card) -> bool {
        let Some(HeaderValue::Str(fragment)) = &card.value else {
            return false;
        };
        let Some(Card {
            value: Some(HeaderValue::Str(previous)),
            ..
        }) = self.cards.last_mut()
        else {
            return false;
        };
        match previous.strip_suffix('&') {
            Some(stem) => {
                let joined = format!("{stem}{fragment}");
                *previous = joined;
                true
            }
            None => false,
        }
    }
}

/// Decode a single 80-column card.
pub fn parse_card(text: &str) -> Card {
    let keyword = text.get(..8).unwrap_or(text).trim_end().to_ascii_uppercase();

    let value = if keyword == "CONTINUE" {
        // CONTINUE has no value indicator, the value starts in column 11
        text.get(10..).map(parse_value_field)
    } else if text.get(8..10) == Some("= ") {
        text.get(10..).map(parse_value_field)
    } else {
        None
    };

    Card { keyword, value }
}

/// Decode the value field of a card (columns 11-80).
pub fn parse_value_field(field: &str) -> HeaderValue {
    let field = field.trim_start();
    if field.starts_with('\'') {
        return match quoted_string(field) {
            Ok((_, s)) => HeaderValue::Str(s.trim_end().to_string()),
            Err(_) => HeaderValue::Raw(field.trim_end().to_string()),
        };
    }

    let token = field.split('/').next().unwrap_or("").trim();
    if token.is_empty() {
        return HeaderValue::Undefined;
    }

    match alt((
        all_consuming(logical),
        all_consuming(integer),
        all_consuming(real),
        all_consuming(complex),
    ))(token)
    {
        Ok((_, value)) => value,
        Err(_) => HeaderValue::Raw(token.to_string()),
    }
}

fn quoted_string(input: &str) -> IResult<&str, String> {
    let (mut rest, _) = char('\'')(input)?;
    let mut out = String::new();
    loop {
        let (r, chunk) = take_while(|c| c != '\'')(rest)?;
        out.push_str(chunk);
        let (r, _) = char('\'')(r)?;
        // A doubled quote is an escaped quote
        match char::<&str, nom::error::Error<&str>>('\'')(r) {
            Ok((r, _)) => {
                out.push('\'');
                rest = r;
            }
            Err(_) => return Ok((r, out)),
        }
    }
}

fn logical(input: &str) -> IResult<&str, HeaderValue> {
    map(one_of("TF"), |c| HeaderValue::Logical(c == 'T'))(input)
}

fn integer(input: &str) -> IResult<&str, HeaderValue> {
    map_res(recognize(pair(opt(one_of("+-")), digit1)), |s: &str| {
        s.parse::<i64>().map(HeaderValue::Integer)
    })(input)
}

fn real_number(input: &str) -> IResult<&str, f64> {
    map_res(
        recognize(tuple((
            opt(one_of("+-")),
            alt((
                recognize(pair(digit1, opt(pair(char('.'), digit0)))),
                recognize(pair(char('.'), digit1)),
            )),
            opt(tuple((one_of("EeDd"), opt(one_of("+-")), digit1))),
        ))),
        |s: &str| s.replace(['D', 'd'], "E").parse::<f64>(),
    )(input)
}

fn real(input: &str) -> IResult<&str, HeaderValue> {
    map(real_number, HeaderValue::Real)(input)
}

fn complex(input: &str) -> IResult<&str, HeaderValue> {
    map(
        delimited(
            pair(char('('), space0),
            separated_pair(real_number, tuple((space0, char(','), space0)), real_number),
            pair(space0, char(')')),
        ),
        |(re, im)| HeaderValue::Complex(re, im),
    )(input)
}
