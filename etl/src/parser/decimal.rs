//! Decimal parsing for locale-formatted and plain amounts.
//!
//! Statement archives always use the Brazilian layout (`1.234.567,89`).
//! Tables written by this pipeline use a plain dot decimal (`1234567.89`).
//! Readers of mixed provenance go through [`DecimalFormat::detect`].

/// Textual layout of a decimal amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalFormat {
    /// `.` groups thousands, `,` separates decimals.
    CommaDecimal,
    /// `.` separates decimals, no grouping.
    DotDecimal,
}

impl DecimalFormat {
    /// A comma anywhere means comma-decimal; otherwise dot-decimal.
    pub fn detect(raw: &str) -> Self {
        if raw.contains(',') {
            DecimalFormat::CommaDecimal
        } else {
            DecimalFormat::DotDecimal
        }
    }

    /// Parse `raw` in this layout. Non-finite and malformed values are `None`.
    pub fn parse(self, raw: &str) -> Option<f64> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let canonical = match self {
            DecimalFormat::CommaDecimal => trimmed.replace('.', "").replace(',', "."),
            DecimalFormat::DotDecimal => trimmed.to_string(),
        };

        if !is_plain_number(&canonical) {
            return None;
        }
        canonical.parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

/// Parse a statement balance (`1.234,56`).
pub fn parse_locale_decimal(raw: &str) -> Option<f64> {
    DecimalFormat::CommaDecimal.parse(raw)
}

/// Parse a value whose layout is detected per value.
pub fn parse_detected_decimal(raw: &str) -> Option<f64> {
    DecimalFormat::detect(raw).parse(raw)
}

/// Optional sign, digits, at most one `.`; rejects `inf`, `NaN`, exponents.
fn is_plain_number(s: &str) -> bool {
    let body = s.strip_prefix(['-', '+']).unwrap_or(s);
    let mut seen_digit = false;
    let mut seen_dot = false;
    for c in body.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return false,
        }
    }
    seen_digit
}
