//! Conversion of Kubernetes resource quantities into exact integers.
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use lazy_static::lazy_static;
use regex::Regex;

// i128 holds any 36 digit mantissa with room to spare for the scaling below.
const MAX_MANTISSA_DIGITS: usize = 36;

lazy_static! {
    // <sign><whole>.<fraction><suffix>, where the suffix is a binary SI suffix, a decimal SI suffix or an exponent.
    static ref QUANTITY_RE: Regex = Regex::new(
        r"^([+-]?)([0-9]*)(?:\.([0-9]*))?(Ki|Mi|Gi|Ti|Pi|Ei|n|u|m|k|M|G|T|P|E|[eE][+-]?[0-9]+)?$"
    )
    .expect("Invalid regex literal.");
}

/// Returns the `(power of two, power of ten)` multiplier encoded by a quantity suffix.
fn suffix_exponents(suffix: &str) -> Option<(u32, i32)> {
    let exponents = match suffix {
        "" => (0, 0),
        "Ki" => (10, 0),
        "Mi" => (20, 0),
        "Gi" => (30, 0),
        "Ti" => (40, 0),
        "Pi" => (50, 0),
        "Ei" => (60, 0),
        "n" => (0, -9),
        "u" => (0, -6),
        "m" => (0, -3),
        "k" => (0, 3),
        "M" => (0, 6),
        "G" => (0, 9),
        "T" => (0, 12),
        "P" => (0, 15),
        "E" => (0, 18),
        exponent => (0, exponent[1..].parse().ok()?),
    };
    Some(exponents)
}

/// Returns the value of a quantity if, and only if, it is an exact integer which fits in an `i64`.
///
/// `1Gi`, `1.5Gi`, `1000m` and `1e3` all convert; `100m`, `1.5` and anything beyond the `i64` range do not.
pub fn quantity_as_i64(quantity: &Quantity) -> Option<i64> {
    let captures = QUANTITY_RE.captures(quantity.0.trim())?;

    let negative = &captures[1] == "-";
    let whole = captures.get(2).map_or("", |m| m.as_str());
    let fraction = captures.get(3).map_or("", |m| m.as_str());
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    let (binary_exponent, decimal_exponent) =
        suffix_exponents(captures.get(4).map_or("", |m| m.as_str()))?;

    let digits = format!("{}{}", whole, fraction);
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Some(0);
    }
    // Trailing zeros only scale the mantissa, so they are carried in the exponent instead.
    let significant = digits.trim_end_matches('0');
    let trailing_zeros = digits.len() - significant.len();
    if significant.len() > MAX_MANTISSA_DIGITS {
        return None;
    }

    let mut value: i128 = significant.parse().ok()?;
    value = value.checked_mul(2i128.checked_pow(binary_exponent)?)?;

    // The fractional digits were folded into the mantissa, so shift the decimal point back.
    let decimal_exponent = decimal_exponent
        .checked_sub(i32::try_from(fraction.len()).ok()?)?
        .checked_add(i32::try_from(trailing_zeros).ok()?)?;
    if decimal_exponent >= 0 {
        value = value.checked_mul(10i128.checked_pow(decimal_exponent.unsigned_abs())?)?;
    } else {
        let divisor = 10i128.checked_pow(decimal_exponent.unsigned_abs())?;
        if value % divisor != 0 {
            return None;
        }
        value /= divisor;
    }

    if negative {
        value = -value;
    }
    i64::try_from(value).ok()
}
