//! Display helpers for readings and AC states. Nothing here touches the
//! control logic.

use chrono::{DateTime, Local, Utc};

use crate::types::{AcState, Measurement, Temperature};
use crate::{Error, Result};

/// `c * 9/5 + 32`, rounded to one decimal place.
pub fn fahrenheit(c: f64) -> f64 {
    ((c * 9.0 / 5.0 + 32.0) * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Unit {
    #[default]
    Celsius,
    Fahrenheit,
    Both,
}

/// Unit selection plus whether to suppress the unit suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TemperatureDisplay {
    pub unit: Unit,
    pub terse: bool,
}

impl TemperatureDisplay {
    pub fn new(unit: Unit, terse: bool) -> Self {
        Self { unit, terse }
    }

    pub fn format(&self, temp: Temperature) -> String {
        let c = self.celsius_form(temp.celsius());
        let f = self.fahrenheit_form(temp.fahrenheit());
        match self.unit {
            Unit::Celsius => c,
            Unit::Fahrenheit => f,
            Unit::Both => format!("{f} / {c}"),
        }
    }

    pub fn format_measurement(&self, measurement: &Measurement) -> Result<String> {
        let temp = measurement
            .temperature
            .ok_or_else(|| Error::MissingData("temperature in measurement".to_string()))?;
        Ok(self.format(temp))
    }

    fn celsius_form(&self, c: f64) -> String {
        if self.terse {
            format!("{c:.1}")
        } else {
            format!("{c:.1}\u{00b0}C")
        }
    }

    fn fahrenheit_form(&self, f: f64) -> String {
        if self.terse {
            format!("{f:.1}")
        } else {
            format!("{f:.1}\u{00b0}F")
        }
    }
}

/// Render an API timestamp in the local timezone.
pub fn format_local_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S %:z")
        .to_string()
}

/// One-line summary such as `on, cool, 17°C, fan high`.
pub fn describe_ac_state(state: &AcState) -> String {
    let mut parts = vec![
        if state.on { "on" } else { "off" }.to_string(),
        state.mode.as_api_str().to_string(),
    ];
    if let Some(t) = state.target_temperature {
        let unit = state.temperature_unit.as_deref().unwrap_or("C");
        parts.push(format!("{t}\u{00b0}{unit}"));
    }
    if let Some(level) = state.fan_level {
        parts.push(format!("fan {}", level.as_api_str()));
    }
    parts.join(", ")
}
