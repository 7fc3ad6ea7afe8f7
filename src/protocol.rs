use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::types::*;
use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://home.sensibo.com/api/v2";

pub const API_KEY_PARAM: &str = "apiKey";

pub const PODS_FIELDS: &str = "id,room";
pub const LATEST_AC_STATE_FIELDS: &str = "status,reason,acState";
pub const AC_STATE_HISTORY_FIELDS: &str = "status,reason,time,changedProperties,acState";

pub fn pods_path() -> &'static str {
    "/users/me/pods"
}

pub fn measurements_path(pod: &PodId) -> String {
    format!("/pods/{pod}/measurements")
}

pub fn ac_states_path(pod: &PodId) -> String {
    format!("/pods/{pod}/acStates")
}

pub fn ac_state_property_path(pod: &PodId, property: &str) -> String {
    format!("/pods/{pod}/acStates/{property}")
}

pub fn set_ac_state_body(state: &AcState) -> Value {
    json!({ "acState": state })
}

pub fn patch_ac_state_body(current: &AcState, change: &AcChange) -> Value {
    json!({
        "currentAcState": current,
        "newValue": change.value(),
    })
}

#[derive(Deserialize)]
struct Envelope<T> {
    result: Option<T>,
}

#[derive(Deserialize)]
struct RawPod {
    id: PodId,
    #[serde(default)]
    room: Option<RawRoom>,
}

#[derive(Deserialize)]
struct RawRoom {
    #[serde(default)]
    name: Option<String>,
}

fn parse_result<T: DeserializeOwned>(body: &str, what: &str) -> Result<T> {
    let envelope: Envelope<T> = serde_json::from_str(body)?;
    envelope
        .result
        .ok_or_else(|| Error::MissingData(format!("result field in {what} response")))
}

/// Decode the pod listing. Pods without a room name are listed under their UID.
pub fn parse_pods(body: &str, policy: NameCollision) -> Result<PodDirectory> {
    let raw: Vec<RawPod> = parse_result(body, "pods")?;
    let mut dir = PodDirectory::new();
    for pod in raw {
        let name = pod
            .room
            .and_then(|r| r.name)
            .unwrap_or_else(|| pod.id.to_string());
        dir.insert(name, pod.id, policy)?;
    }
    Ok(dir)
}

/// Decode the measurement history and return its latest entry.
pub fn parse_latest_measurement(body: &str, pod: &PodId) -> Result<Measurement> {
    let mut entries: Vec<Measurement> = parse_result(body, "measurements")?;
    if entries.is_empty() {
        return Err(Error::MissingData(format!("measurements for pod {pod}")));
    }
    Ok(entries.swap_remove(0))
}

pub fn parse_ac_states(body: &str) -> Result<Vec<AcStateRecord>> {
    parse_result(body, "acStates")
}

/// Best-effort human readable reason from an error response body.
pub fn parse_error_reason(body: &str) -> String {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return body.trim().to_string(),
    };
    ["reason", "message", "status"]
        .iter()
        .find_map(|k| parsed.get(*k).and_then(|v| v.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| parsed.to_string())
}
