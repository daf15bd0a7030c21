//! Size and reduction-ratio accounting shared by every pipeline path.

/// Percentage reduction from `original` to `compressed` bytes.
///
/// `round((1 - compressed / original) * 100)` with round-half-up, computed in
/// integer arithmetic so results such as 500 000 → 150 000 land exactly on 70.
/// Expansion yields a negative value. `original == 0` yields 0.
pub fn reduction_ratio(original: usize, compressed: usize) -> i64 {
    if original == 0 {
        return 0;
    }
    let o = original as i128;
    let saved = (o - compressed as i128) * 100;
    // floor(saved / o + 1/2)
    (2 * saved + o).div_euclid(2 * o) as i64
}

const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Human-readable size with base-1024 units, e.g. `1.5 KB`, `0 B`.
///
/// At most two decimals, trailing zeros dropped; sizes past GB stay in GB.
pub fn format_bytes(bytes: usize) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let fixed = format!("{value:.2}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}
