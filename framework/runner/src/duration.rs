use std::time::Duration;

/// Parse a duration written the way load test configurations usually write them, such as `500ms`,
/// `30s`, `1m30s`, `0.5s` or `2h`.
///
/// A bare `0` is accepted. Any other value needs a unit: `ms`, `s`, `m`, `h` or `d`.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input == "0" {
        return Some(Duration::ZERO);
    }
    if input.is_empty() {
        return None;
    }

    let mut total = 0.0_f64;
    let mut rest = input;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let value = rest[..number_len].parse::<f64>().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let seconds = match &rest[..unit_len] {
            "ms" => value / 1000.0,
            "s" => value,
            "m" => value * 60.0,
            "h" => value * 3600.0,
            "d" => value * 86400.0,
            _ => return None,
        };
        rest = &rest[unit_len..];

        total += seconds;
    }

    Duration::try_from_secs_f64(total).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_k6_style_durations() {
        assert_eq!(Some(Duration::from_millis(500)), parse_duration("500ms"));
        assert_eq!(Some(Duration::from_secs(30)), parse_duration("30s"));
        assert_eq!(Some(Duration::from_secs(90)), parse_duration("1m30s"));
        assert_eq!(Some(Duration::from_millis(200)), parse_duration("0.2s"));
        assert_eq!(Some(Duration::from_secs(7200)), parse_duration("2h"));
        assert_eq!(Some(Duration::ZERO), parse_duration("0"));
        assert_eq!(Some(Duration::ZERO), parse_duration("0s"));
    }

    #[test]
    fn fractional_values_in_any_unit() {
        assert_eq!(Some(Duration::from_millis(500)), parse_duration("0.5s"));
        assert_eq!(Some(Duration::from_secs(90)), parse_duration("1.5m"));
        assert_eq!(Some(Duration::from_secs(1800)), parse_duration("0.5h"));
        assert_eq!(Some(Duration::from_millis(1250)), parse_duration("1s250ms"));
    }

    #[test]
    fn rejects_malformed_durations() {
        assert_eq!(None, parse_duration(""));
        assert_eq!(None, parse_duration("30"));
        assert_eq!(None, parse_duration("-5s"));
        assert_eq!(None, parse_duration("5 parsecs"));
        assert_eq!(None, parse_duration("s"));
        assert_eq!(None, parse_duration("1..2s"));
    }
}
