//! Human-readable ISK values

/// Scale and suffix of each unit, ascending.
const UNITS: [(f64, &str); 12] = [
    (1e3, "k"),
    (1e6, "m"),
    (1e9, "b"),
    (1e12, "t"),
    (1e15, "qa"),
    (1e18, "qi"),
    (1e21, "sx"),
    (1e24, "sp"),
    (1e27, "oct"),
    (1e30, "non"),
    (1e33, "dec"),
    (1e100, "googol"),
];

/// Abbreviate a value with a power-of-1000 suffix.
///
/// Below 1000 the integer part is printed as-is. Otherwise the value is
/// scaled to its unit and printed with two decimals under 10, one decimal
/// under 100, and none above. A rendering that reaches 1000 of a unit moves
/// up to the next unit, so `999_999` reads `1.00m`.
pub fn abbreviate(value: f64) -> String {
    let value = value.trunc();
    if !value.is_finite() || value < UNITS[0].0 {
        return format!("{}", value as i64);
    }

    let mut idx = UNITS
        .iter()
        .rposition(|(scale, _)| value >= *scale)
        .unwrap_or(0);

    loop {
        let (scale, suffix) = UNITS[idx];
        let chopped = value / scale;

        let (rendered, shown) = if chopped < 10.0 {
            let s = format!("{:.2}", chopped);
            let shown = s.parse::<f64>().unwrap_or(chopped);
            (s, shown)
        } else if chopped < 100.0 {
            let s = format!("{:.1}", chopped);
            let shown = s.parse::<f64>().unwrap_or(chopped);
            (s, shown)
        } else {
            let rounded = chopped.round();
            (format!("{:.0}", rounded), rounded)
        };

        // googol is not one step above dec, so it never receives a promotion
        let next_is_adjacent = idx + 2 < UNITS.len();
        if shown >= 1000.0 && next_is_adjacent {
            idx += 1;
            continue;
        }

        return format!("{}{}", rendered, suffix);
    }
}
