//! Human readable data sizes for `--max-archive-size`.

/// Parses sizes such as `500GB`, `64MiB` or `4096`.
///
/// Decimal units (`KB`, `MB`, `GB`, `TB`) are powers of 1000, binary units
/// (`KiB`, `MiB`, `GiB`, `TiB`) powers of 1024. Unit letters are matched
/// case-insensitively except for the `i` of binary units. A bare number is a
/// byte count.
pub fn parse_data_size(input: &str) -> Result<u64, String> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, unit) = input.split_at(split);

    if digits.is_empty() {
        return Err(format!("invalid data size '{input}': missing number"));
    }

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid data size '{input}': number too large"))?;
    let multiplier = unit_multiplier(unit.trim())
        .ok_or_else(|| format!("invalid data size '{input}': unknown unit '{}'", unit.trim()))?;

    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("invalid data size '{input}': overflows 64 bits"))
}

fn unit_multiplier(unit: &str) -> Option<u64> {
    let (prefix, base) = match unit.as_bytes() {
        [] => return Some(1),
        [b] if b.eq_ignore_ascii_case(&b'b') => return Some(1),
        [prefix, b] if b.eq_ignore_ascii_case(&b'b') => (*prefix, 1000u64),
        [prefix, b'i', b] if b.eq_ignore_ascii_case(&b'b') => (*prefix, 1024u64),
        _ => return None,
    };

    let exponent = match prefix.to_ascii_lowercase() {
        b'k' => 1,
        b'm' => 2,
        b'g' => 3,
        b't' => 4,
        _ => return None,
    };

    Some(base.pow(exponent))
}
