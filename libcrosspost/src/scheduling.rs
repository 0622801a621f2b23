//! Schedule string parsing for the queue CLI
//!
//! Accepts relative durations ("30m", "2h", "1 day") and natural language
//! ("tomorrow 3pm", "next friday"), returning a UTC timestamp.

use chrono::{DateTime, Duration, Utc};

use crate::error::{CrosspostError, Result};

/// Parse a schedule string into a DateTime
pub fn parse_schedule(input: &str) -> Result<DateTime<Utc>> {
    if input.trim().is_empty() {
        return Err(CrosspostError::InvalidInput(
            "Schedule string cannot be empty".to_string(),
        ));
    }

    if let Ok(duration) = parse_duration(input) {
        return Ok(Utc::now() + duration);
    }

    if let Ok(dt) = parse_natural_language(input) {
        return Ok(dt);
    }

    Err(CrosspostError::InvalidInput(format!(
        "Could not parse schedule string: {}",
        input
    )))
}

fn parse_duration(input: &str) -> Result<Duration> {
    let std_duration = humantime::parse_duration(input).map_err(|_| {
        CrosspostError::InvalidInput(format!("Could not parse duration: {}", input))
    })?;
    Duration::try_seconds(std_duration.as_secs() as i64)
        .ok_or_else(|| CrosspostError::InvalidInput("Duration out of range".to_string()))
}

fn parse_natural_language(input: &str) -> Result<DateTime<Utc>> {
    chrono_english::parse_date_string(input, Utc::now(), chrono_english::Dialect::Us)
        .map_err(|e| CrosspostError::InvalidInput(format!("Could not parse time: {}", e)))
}
