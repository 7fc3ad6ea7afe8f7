use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::{Error, Result};

/// Temperature stored as Celsius, the unit the Sensibo sensors report in.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Temperature(f64);

impl Temperature {
    pub fn from_celsius(c: f64) -> Self {
        Self(c)
    }

    pub fn celsius(&self) -> f64 {
        self.0
    }

    /// Fahrenheit, rounded to one decimal place.
    pub fn fahrenheit(&self) -> f64 {
        crate::format::fahrenheit(self.0)
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}\u{00b0}C", self.0)
    }
}

/// Opaque device UID as assigned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PodId(pub String);

impl PodId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pod {
    pub id: PodId,
    pub name: String,
}

/// What to do when two pods report the same room name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameCollision {
    /// Keep the later UID under the name, at the earlier listing position.
    #[default]
    Overwrite,
    /// Fail with [`Error::DuplicateDevice`].
    Reject,
}

/// Room name to pod UID map, in API listing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodDirectory {
    pods: Vec<Pod>,
}

impl PodDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory with [`NameCollision::Overwrite`] semantics.
    pub fn from_pairs<N, I>(pairs: impl IntoIterator<Item = (N, I)>) -> Self
    where
        N: Into<String>,
        I: Into<String>,
    {
        let mut dir = Self::new();
        for (name, id) in pairs {
            // overwrite never fails
            let _ = dir.insert(name, PodId::new(id), NameCollision::Overwrite);
        }
        dir
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        id: PodId,
        policy: NameCollision,
    ) -> Result<()> {
        let name = name.into();
        match self.pods.iter_mut().find(|p| p.name == name) {
            Some(existing) => match policy {
                NameCollision::Reject => Err(Error::DuplicateDevice(name)),
                NameCollision::Overwrite => {
                    warn!(name = %name, old = %existing.id, new = %id, "duplicate pod name, keeping later pod");
                    existing.id = id;
                    Ok(())
                }
            },
            None => {
                self.pods.push(Pod { id, name });
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&PodId> {
        self.pods.iter().find(|p| p.name == name).map(|p| &p.id)
    }

    pub fn resolve(&self, name: &str) -> Result<&PodId> {
        self.get(name)
            .ok_or_else(|| Error::UnknownDevice(name.to_string()))
    }

    pub fn name_of(&self, id: &PodId) -> Option<&str> {
        self.pods
            .iter()
            .find(|p| &p.id == id)
            .map(|p| p.name.as_str())
    }

    pub fn first(&self) -> Option<&Pod> {
        self.pods.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pod> {
        self.pods.iter()
    }

    pub fn ids(&self) -> Vec<PodId> {
        self.pods.iter().map(|p| p.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }
}

/// Timestamp block attached to measurements and AC state records.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTime {
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub seconds_ago: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Measurement {
    #[serde(default)]
    pub temperature: Option<Temperature>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub time: Option<ApiTime>,
}

impl Measurement {
    pub fn with_temperature(c: f64) -> Self {
        Self {
            temperature: Some(Temperature::from_celsius(c)),
            humidity: None,
            time: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcMode {
    Cool,
    Heat,
    Fan,
    Dry,
    Auto,
}

impl AcMode {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            AcMode::Cool => "cool",
            AcMode::Heat => "heat",
            AcMode::Fan => "fan",
            AcMode::Dry => "dry",
            AcMode::Auto => "auto",
        }
    }

    pub fn from_api_str(s: &str) -> Option<Self> {
        match s {
            "cool" => Some(AcMode::Cool),
            "heat" => Some(AcMode::Heat),
            "fan" => Some(AcMode::Fan),
            "dry" => Some(AcMode::Dry),
            "auto" => Some(AcMode::Auto),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanLevel {
    Quiet,
    Low,
    MediumLow,
    Medium,
    MediumHigh,
    High,
    Strong,
    Auto,
}

impl FanLevel {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            FanLevel::Quiet => "quiet",
            FanLevel::Low => "low",
            FanLevel::MediumLow => "medium_low",
            FanLevel::Medium => "medium",
            FanLevel::MediumHigh => "medium_high",
            FanLevel::High => "high",
            FanLevel::Strong => "strong",
            FanLevel::Auto => "auto",
        }
    }

    pub fn from_api_str(s: &str) -> Option<Self> {
        match s {
            "quiet" => Some(FanLevel::Quiet),
            "low" => Some(FanLevel::Low),
            "medium_low" => Some(FanLevel::MediumLow),
            "medium" => Some(FanLevel::Medium),
            "medium_high" => Some(FanLevel::MediumHigh),
            "high" => Some(FanLevel::High),
            "strong" => Some(FanLevel::Strong),
            "auto" => Some(FanLevel::Auto),
            _ => None,
        }
    }
}

/// Controllable configuration of an AC unit.
///
/// Fields the crate does not model (swing, light, ...) are kept in `extra`
/// so that a state read from the API can be sent back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcState {
    pub on: bool,
    pub mode: AcMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_temperature: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fan_level: Option<FanLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_unit: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AcState {
    pub fn new(on: bool, target_temperature: i32, mode: AcMode, fan_level: FanLevel) -> Self {
        Self {
            on,
            mode,
            target_temperature: Some(target_temperature),
            fan_level: Some(fan_level),
            temperature_unit: None,
            extra: Map::new(),
        }
    }

    pub fn apply(&mut self, change: &AcChange) {
        match *change {
            AcChange::On(on) => self.on = on,
            AcChange::Mode(mode) => self.mode = mode,
            AcChange::TargetTemperature(t) => self.target_temperature = Some(t),
            AcChange::FanLevel(level) => self.fan_level = Some(level),
        }
    }

    /// Modelled fields that differ from `previous`, expressed as changes
    /// that would turn `previous` into `self`.
    pub fn changes_from(&self, previous: &AcState) -> Vec<AcChange> {
        let mut changes = Vec::new();
        if self.on != previous.on {
            changes.push(AcChange::On(self.on));
        }
        if self.mode != previous.mode {
            changes.push(AcChange::Mode(self.mode));
        }
        if let Some(t) = self.target_temperature
            && previous.target_temperature != Some(t)
        {
            changes.push(AcChange::TargetTemperature(t));
        }
        if let Some(level) = self.fan_level
            && previous.fan_level != Some(level)
        {
            changes.push(AcChange::FanLevel(level));
        }
        changes
    }
}

/// A single-property AC state change, as sent by the PATCH endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcChange {
    On(bool),
    Mode(AcMode),
    TargetTemperature(i32),
    FanLevel(FanLevel),
}

impl AcChange {
    pub fn property(&self) -> &'static str {
        match self {
            AcChange::On(_) => "on",
            AcChange::Mode(_) => "mode",
            AcChange::TargetTemperature(_) => "targetTemperature",
            AcChange::FanLevel(_) => "fanLevel",
        }
    }

    pub fn value(&self) -> Value {
        match self {
            AcChange::On(on) => Value::Bool(*on),
            AcChange::Mode(mode) => Value::String(mode.as_api_str().to_string()),
            AcChange::TargetTemperature(t) => Value::from(*t),
            AcChange::FanLevel(level) => Value::String(level.as_api_str().to_string()),
        }
    }
}

impl fmt::Display for AcChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.property(), self.value())
    }
}

/// One entry of a pod's AC state history.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcStateRecord {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub reason: String,
    pub ac_state: AcState,
    #[serde(default)]
    pub time: Option<ApiTime>,
    #[serde(default)]
    pub changed_properties: Vec<String>,
}

impl AcStateRecord {
    pub fn succeeded(&self) -> bool {
        self.status == "Success"
    }
}
