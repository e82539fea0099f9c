//! Month expression parsing: "1-6", "01-06", "1,2,3", "01,02,03".

use super::Period;
use crate::error::InputError;

/// Parse a month expression into periods.
///
/// A range (`start-end`, inclusive) must satisfy 1 <= start <= end <= 12.
/// A list is comma separated; blank entries are ignored. Duplicates in a list
/// are kept as written.
pub fn parse_periods(expr: &str) -> Result<Vec<Period>, InputError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(InputError::EmptyExpression);
    }

    if let Some((start_s, end_s)) = expr.split_once('-') {
        let start = parse_month(start_s).map_err(|_| InputError::InvalidRange(expr.to_string()))?;
        let end = parse_month(end_s).map_err(|_| InputError::InvalidRange(expr.to_string()))?;
        if start < 1 || end > 12 || start > end {
            return Err(InputError::InvalidRange(expr.to_string()));
        }
        return (start..=end).map(Period::new).collect();
    }

    let periods = expr
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            parse_month(p)
                .and_then(Period::new)
                .map_err(|_| InputError::InvalidPeriod(p.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if periods.is_empty() {
        return Err(InputError::EmptyExpression);
    }
    Ok(periods)
}

fn parse_month(s: &str) -> Result<u8, InputError> {
    s.trim()
        .parse::<u8>()
        .map_err(|_| InputError::InvalidPeriod(s.trim().to_string()))
}
