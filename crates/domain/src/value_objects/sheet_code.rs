//! Sheet code codec.
//!
//! Every printed sheet carries a short code that identifies what it belongs
//! to. The wire form is `<prefix>-<token>-<check>`, fifteen characters:
//!
//! - `L` prefix for live turn sheets, `J` for blank join sheets;
//! - the token is eight Crockford base32 symbols (40 bits). It is stored on the
//!   turn sheet or manager subscription row, and the store resolves it back to
//!   the game, instance, account and sheet it stands for;
//! - the check is four base32 symbols holding a position-weighted sum of the
//!   prefix tag and token symbols modulo a prime just under 2^20.
//!
//! Crockford base32 has no `I`, `L`, `O` or `U`, so OCR confusions fold back
//! to one symbol. Because the modulus is prime and every weight is non-zero,
//! changing any single symbol, or swapping two adjacent different symbols,
//! always changes the check value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";
const CHECK_MODULUS: u64 = 1_048_573;
const CHECK_WEIGHT_BASE: u64 = 33;
const CHECK_SYMBOLS: usize = 4;
const TOKEN_SYMBOLS: usize = 8;
const TOKEN_BITS: u32 = 5 * TOKEN_SYMBOLS as u32;
const TOKEN_MASK: u64 = (1 << TOKEN_BITS) - 1;

/// Length of every encoded code.
pub const SHEET_CODE_LEN: usize = 2 + TOKEN_SYMBOLS + 1 + CHECK_SYMBOLS;

const LIVE_PREFIX: char = 'L';
const JOIN_PREFIX: char = 'J';

/// Errors from decoding a printed sheet code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SheetCodeError {
    #[error("Malformed sheet code: {0}")]
    MalformedCode(String),
    #[error("Sheet code checksum mismatch")]
    ChecksumMismatch,
}

/// The 40-bit token a printed code carries.
///
/// Zero is reserved for preview placeholders and is never minted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SheetToken(u64);

impl SheetToken {
    /// Placeholder printed on previews; no row ever carries it.
    pub const PLACEHOLDER: Self = Self(0);

    /// Mint a fresh random token.
    pub fn generate() -> Self {
        loop {
            let random = Uuid::new_v4();
            // The first five bytes of a v4 uuid are fully random.
            let bits = random.as_bytes()[..5]
                .iter()
                .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
            if bits != 0 {
                return Self(bits);
            }
        }
    }

    /// Rebuild a stored token. Fails when the value does not fit in 40 bits.
    pub fn from_bits(bits: u64) -> Result<Self, SheetCodeError> {
        if bits & !TOKEN_MASK != 0 {
            return Err(SheetCodeError::MalformedCode(format!(
                "token {} exceeds {} bits",
                bits, TOKEN_BITS
            )));
        }
        Ok(Self(bits))
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    fn symbols(&self) -> [u8; TOKEN_SYMBOLS] {
        let mut out = [0u8; TOKEN_SYMBOLS];
        for (i, slot) in out.iter_mut().enumerate() {
            let shift = 5 * (TOKEN_SYMBOLS - 1 - i);
            *slot = ((self.0 >> shift) & 0x1f) as u8;
        }
        out
    }
}

impl fmt::Display for SheetToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for v in self.symbols() {
            write!(f, "{}", ALPHABET[v as usize] as char)?;
        }
        Ok(())
    }
}

/// A decoded sheet code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "variant", content = "token", rename_all = "snake_case")]
pub enum SheetCode {
    /// Printed on a turn sheet; resolves to the sheet row.
    Live(SheetToken),
    /// Printed on a blank join sheet; resolves to a manager subscription.
    Join(SheetToken),
}

impl SheetCode {
    pub fn token(&self) -> SheetToken {
        match self {
            Self::Live(token) | Self::Join(token) => *token,
        }
    }

    /// Encode to the printable wire form.
    pub fn encode(&self) -> String {
        let prefix = self.prefix();
        let body = self.token().symbols();
        let check = checksum(prefix, &body);

        let mut out = String::with_capacity(SHEET_CODE_LEN);
        out.push(prefix);
        out.push('-');
        out.extend(body.iter().map(|&v| ALPHABET[v as usize] as char));
        out.push('-');
        out.push_str(&check_symbols(check));
        out
    }

    /// Decode the printed wire form.
    ///
    /// Whitespace is ignored and lower case accepted. `O` reads as `0`, and
    /// `I` or `L` read as `1` inside the token and check.
    pub fn decode(text: &str) -> Result<Self, SheetCodeError> {
        let cleaned: String = text
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        let mut chars = cleaned.chars();
        let prefix = chars
            .next()
            .ok_or_else(|| SheetCodeError::MalformedCode("empty code".to_string()))?;
        if chars.next() != Some('-') {
            return Err(SheetCodeError::MalformedCode(
                "missing prefix separator".to_string(),
            ));
        }
        if prefix != LIVE_PREFIX && prefix != JOIN_PREFIX {
            return Err(SheetCodeError::MalformedCode(format!(
                "unknown prefix '{}'",
                prefix
            )));
        }

        let rest = chars.as_str();
        let (body_text, check_text) = rest.rsplit_once('-').ok_or_else(|| {
            SheetCodeError::MalformedCode("missing checksum separator".to_string())
        })?;

        if body_text.chars().count() != TOKEN_SYMBOLS {
            return Err(SheetCodeError::MalformedCode(format!(
                "expected {} token symbols, found {}",
                TOKEN_SYMBOLS,
                body_text.chars().count()
            )));
        }
        if check_text.chars().count() != CHECK_SYMBOLS {
            return Err(SheetCodeError::MalformedCode(format!(
                "expected {} checksum symbols",
                CHECK_SYMBOLS
            )));
        }

        let body = symbols(body_text)?;
        let claimed = symbols(check_text)?
            .iter()
            .fold(0u64, |acc, &v| (acc << 5) | u64::from(v));

        if claimed != checksum(prefix, &body) {
            return Err(SheetCodeError::ChecksumMismatch);
        }

        let token = SheetToken(
            body.iter()
                .fold(0u64, |acc, &v| (acc << 5) | u64::from(v)),
        );
        Ok(match prefix {
            LIVE_PREFIX => Self::Live(token),
            _ => Self::Join(token),
        })
    }

    fn prefix(&self) -> char {
        match self {
            Self::Live(_) => LIVE_PREFIX,
            Self::Join(_) => JOIN_PREFIX,
        }
    }
}

impl fmt::Display for SheetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for SheetCode {
    type Err = SheetCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

fn symbol_value(c: char) -> Option<u8> {
    let folded = match c {
        'O' => '0',
        'I' | 'L' => '1',
        other => other,
    };
    ALPHABET
        .iter()
        .position(|&a| a as char == folded)
        .map(|p| p as u8)
}

fn symbols(text: &str) -> Result<Vec<u8>, SheetCodeError> {
    text.chars()
        .map(|c| {
            symbol_value(c).ok_or_else(|| {
                SheetCodeError::MalformedCode(format!("invalid character '{}'", c))
            })
        })
        .collect()
}

fn checksum(prefix: char, body: &[u8]) -> u64 {
    let tag = match prefix {
        LIVE_PREFIX => 1u64,
        _ => 2u64,
    };
    let mut weight = 1u64;
    let mut sum = tag;
    for &value in body {
        weight = (weight * CHECK_WEIGHT_BASE) % CHECK_MODULUS;
        sum = (sum + weight * u64::from(value)) % CHECK_MODULUS;
    }
    sum
}

fn check_symbols(check: u64) -> String {
    (0..CHECK_SYMBOLS)
        .rev()
        .map(|i| ALPHABET[((check >> (5 * i)) & 0x1f) as usize] as char)
        .collect()
}
