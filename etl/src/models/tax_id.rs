//! CNPJ (14-digit Brazilian tax identifier) normalization and check digits.

/// Number of digits in a tax identifier.
pub const TAX_ID_LEN: usize = 14;

const FIRST_DIGIT_WEIGHTS: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
const SECOND_DIGIT_WEIGHTS: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

/// Keep only ASCII digits: `"12.345.678/0001-95"` → `"12345678000195"`.
pub fn normalize_tax_id(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Check-digit validation over the normalized value.
pub fn is_valid_tax_id(raw: &str) -> bool {
    let digits: Vec<u32> = normalize_tax_id(raw)
        .chars()
        .filter_map(|c| c.to_digit(10))
        .collect();

    if digits.len() != TAX_ID_LEN {
        return false;
    }
    if digits.iter().all(|d| *d == digits[0]) {
        return false;
    }

    let first = check_digit(&digits[..12], &FIRST_DIGIT_WEIGHTS);
    let second = check_digit(&digits[..13], &SECOND_DIGIT_WEIGHTS);
    digits[12] == first && digits[13] == second
}

fn check_digit(base: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = base.iter().zip(weights).map(|(d, w)| d * w).sum();
    match sum % 11 {
        r if r < 2 => 0,
        r => 11 - r,
    }
}
