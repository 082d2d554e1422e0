//! Human duration parsing for flags like `--expires 30d` and `--timeout 10m`.

use std::time::Duration;

const MINUTE: f64 = 60.0;
const HOUR: f64 = 60.0 * MINUTE;
const DAY: f64 = 24.0 * HOUR;
const YEAR: f64 = 365.0 * DAY;

/// Parses `90s`, `10m`, `1.5h`, `30d`, `1y` and concatenations like `1h30m`.
///
/// Used directly as a clap `value_parser`.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total = 0.0_f64;
    let mut rest = input;

    while !rest.is_empty() {
        let split = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration '{input}' (use s, m, h, d or y)"))?;
        if split == 0 {
            return Err(format!("invalid duration '{input}'"));
        }

        let (number, tail) = rest.split_at(split);
        let value: f64 = number
            .parse()
            .map_err(|_| format!("invalid number '{number}' in duration '{input}'"))?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_len);
        let scale = match unit {
            "s" => 1.0,
            "m" => MINUTE,
            "h" => HOUR,
            "d" => DAY,
            "y" => YEAR,
            other => return Err(format!("unknown unit '{other}' in duration '{input}'")),
        };

        total += value * scale;
        rest = next;
    }

    Duration::try_from_secs_f64(total).map_err(|e| format!("invalid duration '{input}': {e}"))
}
