//! Card brand detection and number checks
//!
//! Detection walks an ordered table of prefix ranges; more specific prefixes
//! come first, so the first match wins and no two rules can claim the same
//! number. UzCard and Humo are domestic schemes without a Luhn check digit;
//! they are always 16 digits.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardBrand {
    UzCard,
    Humo,
    Amex,
    UnionPay,
    Mir,
    Mastercard,
    Maestro,
    Visa,
    Unknown,
}

impl CardBrand {
    pub fn name(&self) -> &'static str {
        match self {
            CardBrand::UzCard => "UzCard",
            CardBrand::Humo => "Humo",
            CardBrand::Amex => "American Express",
            CardBrand::UnionPay => "UnionPay",
            CardBrand::Mir => "Mir",
            CardBrand::Mastercard => "Mastercard",
            CardBrand::Maestro => "Maestro",
            CardBrand::Visa => "Visa",
            CardBrand::Unknown => "Unknown",
        }
    }

    pub fn uses_luhn(&self) -> bool {
        !matches!(self, CardBrand::UzCard | CardBrand::Humo)
    }

    fn accepts_length(&self, len: usize) -> bool {
        match self {
            CardBrand::UzCard | CardBrand::Humo => len == 16,
            CardBrand::Amex => len == 15,
            _ => (13..=19).contains(&len),
        }
    }
}

/// `(low, high, prefix digits, brand)`, checked in order.
const PREFIX_RULES: &[(u32, u32, usize, CardBrand)] = &[
    (8600, 8600, 4, CardBrand::UzCard),
    (5614, 5614, 4, CardBrand::UzCard),
    (9860, 9860, 4, CardBrand::Humo),
    (34, 34, 2, CardBrand::Amex),
    (37, 37, 2, CardBrand::Amex),
    (62, 62, 2, CardBrand::UnionPay),
    (2200, 2204, 4, CardBrand::Mir),
    (2221, 2720, 4, CardBrand::Mastercard),
    (51, 55, 2, CardBrand::Mastercard),
    (6, 6, 1, CardBrand::Maestro),
    (4, 4, 1, CardBrand::Visa),
];

fn digits_of(input: &str) -> String {
    input.chars().filter(char::is_ascii_digit).collect()
}

/// Detect the brand from a (possibly partial, possibly spaced) card number.
pub fn detect_brand(input: &str) -> CardBrand {
    let digits = digits_of(input);
    for &(low, high, width, brand) in PREFIX_RULES {
        if digits.len() < width {
            continue;
        }
        if let Ok(prefix) = digits[..width].parse::<u32>()
            && (low..=high).contains(&prefix)
        {
            return brand;
        }
    }
    CardBrand::Unknown
}

/// Luhn mod-10 check over the digits of `input`. Empty input fails.
pub fn luhn_valid(input: &str) -> bool {
    let digits = digits_of(input);
    if digits.is_empty() {
        return false;
    }
    let sum: u32 = digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let d = u32::from(b - b'0');
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

/// Check a full card number before it is sent for payment.
pub fn validate_card_number(input: &str) -> Result<CardBrand> {
    let digits = digits_of(input);
    let brand = detect_brand(&digits);

    if brand == CardBrand::Unknown {
        return Err(Error::InvalidCard("unsupported card brand".into()));
    }
    if !brand.accepts_length(digits.len()) {
        return Err(Error::InvalidCard(format!(
            "{} numbers cannot have {} digits",
            brand.name(),
            digits.len()
        )));
    }
    if brand.uses_luhn() && !luhn_valid(&digits) {
        return Err(Error::InvalidCard("card number failed checksum".into()));
    }
    Ok(brand)
}
