use std::time::Duration;

use crate::ConfigError;

fn seconds_per_unit(unit: char) -> Option<u64> {
    match unit {
        's' => Some(1),
        'm' => Some(60),
        'h' => Some(3600),
        'd' => Some(86_400),
        'w' => Some(604_800),
        _ => None,
    }
}

/// Parses a campaign length such as `30s`, `5m`, `1h`, `2d` or `1w`.
pub fn parse_duration(raw: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(raw.to_string());
    let trimmed = raw.trim();
    let unit = trimmed.chars().last().ok_or_else(invalid)?;
    let per_unit = seconds_per_unit(unit).ok_or_else(invalid)?;
    let count: u64 = trimmed[..trimmed.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| invalid())?;
    let secs = count.checked_mul(per_unit).ok_or_else(invalid)?;
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_unit() {
        assert_eq!(parse_duration("45s").unwrap().as_secs(), 45);
        assert_eq!(parse_duration("5m").unwrap().as_secs(), 300);
        assert_eq!(parse_duration("1h").unwrap().as_secs(), 3600);
        assert_eq!(parse_duration("2d").unwrap().as_secs(), 172_800);
        assert_eq!(parse_duration("1w").unwrap().as_secs(), 604_800);
    }

    #[test]
    fn rejects_missing_or_unknown_suffix() {
        for raw in ["", "300", "5y", "m", "-1h", "1.5h", "h1"] {
            match parse_duration(raw) {
                Err(ConfigError::InvalidDuration(v)) => assert_eq!(v, raw),
                other => panic!("expected InvalidDuration for {raw:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_overflow() {
        assert!(parse_duration("99999999999999999w").is_err());
    }
}
