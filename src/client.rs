use std::sync::Mutex;
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;
use tracing::{debug, trace};

use crate::logger::{MessageLogMode, MessageLogger};
use crate::protocol::{
    ac_state_property_path, ac_states_path, measurements_path, parse_ac_states,
    parse_error_reason, parse_latest_measurement, parse_pods, patch_ac_state_body, pods_path,
    set_ac_state_body, AC_STATE_HISTORY_FIELDS, API_KEY_PARAM, DEFAULT_BASE_URL,
    LATEST_AC_STATE_FIELDS, PODS_FIELDS,
};
use crate::types::*;
use crate::{Error, Result};

/// The remote operations the temperature watcher depends on.
#[allow(async_fn_in_trait)]
pub trait AcApi {
    async fn list_devices(&self) -> Result<PodDirectory>;
    async fn get_measurement(&self, pod: &PodId) -> Result<Measurement>;
    async fn get_ac_state(&self, pod: &PodId) -> Result<AcStateRecord>;
    async fn set_ac_state(&self, pod: &PodId, state: &AcState) -> Result<()>;
    async fn set_ac_state_field(
        &self,
        pod: &PodId,
        current: &AcState,
        change: AcChange,
    ) -> Result<()>;
}

/// Bring `current` in line with `changes`, writing only what differs.
///
/// A single differing property is patched with `current` as the witness;
/// several are merged into `current` and posted as one state. Returns the
/// state the pod should now be in.
pub async fn apply_ac_changes<C: AcApi>(
    api: &C,
    pod: &PodId,
    current: &AcState,
    changes: &[AcChange],
) -> Result<AcState> {
    let mut desired = current.clone();
    for change in changes {
        desired.apply(change);
    }

    match desired.changes_from(current).as_slice() {
        [] => debug!(pod = %pod, "AC state already as requested"),
        [change] => api.set_ac_state_field(pod, current, *change).await?,
        several => {
            debug!(pod = %pod, count = several.len(), "posting merged AC state");
            api.set_ac_state(pod, &desired).await?;
        }
    }
    Ok(desired)
}

pub struct SensiboClientBuilder {
    api_key: String,
    base_url: String,
    timeout: Option<Duration>,
    name_collision: NameCollision,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
}

impl SensiboClientBuilder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: None,
            name_collision: NameCollision::default(),
            log_mode: None,
            log_path: None,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Per-request timeout. Unset, the HTTP client's default applies.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn name_collision(mut self, policy: NameCollision) -> Self {
        self.name_collision = policy;
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<SensiboClient> {
        let mut http = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            http = http.timeout(timeout);
        }
        let http = http.build()?;

        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(Mutex::new(MessageLogger::new(mode, &path)?)),
            _ => None,
        };

        Ok(SensiboClient {
            http,
            base_url: self.base_url,
            api_key: self.api_key,
            name_collision: self.name_collision,
            logger,
        })
    }
}

/// Client for the Sensibo cloud API.
///
/// Every call is a direct round trip: nothing is cached and nothing is retried.
pub struct SensiboClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    name_collision: NameCollision,
    logger: Option<Mutex<MessageLogger>>,
}

impl SensiboClient {
    pub fn builder(api_key: impl Into<String>) -> SensiboClientBuilder {
        SensiboClientBuilder::new(api_key)
    }

    pub async fn list_devices(&self) -> Result<PodDirectory> {
        let body = self
            .request(Method::GET, pods_path(), &[("fields", PODS_FIELDS)], None)
            .await?;
        let dir = parse_pods(&body, self.name_collision)?;
        debug!(count = dir.len(), "listed pods");
        Ok(dir)
    }

    pub async fn pod_uids(&self) -> Result<Vec<PodId>> {
        Ok(self.list_devices().await?.ids())
    }

    /// Latest measurement of a pod.
    pub async fn get_measurement(&self, pod: &PodId) -> Result<Measurement> {
        let body = self
            .request(Method::GET, &measurements_path(pod), &[], None)
            .await?;
        parse_latest_measurement(&body, pod)
    }

    /// Most recent AC state record of a pod.
    pub async fn get_ac_state(&self, pod: &PodId) -> Result<AcStateRecord> {
        let body = self
            .request(
                Method::GET,
                &ac_states_path(pod),
                &[("limit", "1"), ("fields", LATEST_AC_STATE_FIELDS)],
                None,
            )
            .await?;
        parse_ac_states(&body)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::MissingData(format!("AC state for pod {pod}")))
    }

    /// Last `limit` AC state records, newest first.
    pub async fn get_ac_states(&self, pod: &PodId, limit: u32) -> Result<Vec<AcStateRecord>> {
        let limit = limit.to_string();
        let body = self
            .request(
                Method::GET,
                &ac_states_path(pod),
                &[("limit", limit.as_str()), ("fields", AC_STATE_HISTORY_FIELDS)],
                None,
            )
            .await?;
        parse_ac_states(&body)
    }

    /// Replace the whole AC state.
    pub async fn set_ac_state(&self, pod: &PodId, state: &AcState) -> Result<()> {
        let data = set_ac_state_body(state);
        self.log_command("set_ac_state", pod, &data);
        self.request(Method::POST, &ac_states_path(pod), &[], Some(&data))
            .await?;
        Ok(())
    }

    /// Change a single property, sending `current` as the state the change
    /// was computed against. A 409 from the API becomes [`Error::Conflict`].
    pub async fn set_ac_state_field(
        &self,
        pod: &PodId,
        current: &AcState,
        change: AcChange,
    ) -> Result<()> {
        let property = change.property();
        let data = patch_ac_state_body(current, &change);
        self.log_command("set_ac_state_field", pod, &data);
        match self
            .request(
                Method::PATCH,
                &ac_state_property_path(pod, property),
                &[],
                Some(&data),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(Error::Api { status: 409, reason }) => Err(Error::Conflict {
                pod: pod.to_string(),
                property: property.to_string(),
                reason,
            }),
            Err(e) => Err(e),
        }
    }

    /// Read the current state, then patch one property against it.
    pub async fn change_ac_field(&self, pod: &PodId, change: AcChange) -> Result<AcState> {
        let current = self.get_ac_state(pod).await?.ac_state;
        self.set_ac_state_field(pod, &current, change).await?;
        let mut updated = current;
        updated.apply(&change);
        Ok(updated)
    }

    fn log_command(&self, action: &str, pod: &PodId, data: &Value) {
        if let Some(logger) = &self.logger
            && let Ok(mut logger) = logger.lock()
        {
            logger.log_command(action, pod.as_str(), data);
        }
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, path = %path, "sending request");

        if let Some(logger) = &self.logger
            && let Ok(mut logger) = logger.lock()
        {
            logger.log_request(method.as_str(), path, body);
        }

        let mut req = self
            .http
            .request(method, &url)
            .query(&[(API_KEY_PARAM, self.api_key.as_str())])
            .query(query);
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        trace!(status = status.as_u16(), bytes = text.len(), "response received");

        if let Some(logger) = &self.logger
            && let Ok(mut logger) = logger.lock()
        {
            logger.log_response(path, status.as_u16(), &text);
        }

        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                reason: parse_error_reason(&text),
            });
        }
        Ok(text)
    }
}

impl AcApi for SensiboClient {
    async fn list_devices(&self) -> Result<PodDirectory> {
        SensiboClient::list_devices(self).await
    }

    async fn get_measurement(&self, pod: &PodId) -> Result<Measurement> {
        SensiboClient::get_measurement(self, pod).await
    }

    async fn get_ac_state(&self, pod: &PodId) -> Result<AcStateRecord> {
        SensiboClient::get_ac_state(self, pod).await
    }

    async fn set_ac_state(&self, pod: &PodId, state: &AcState) -> Result<()> {
        SensiboClient::set_ac_state(self, pod, state).await
    }

    async fn set_ac_state_field(
        &self,
        pod: &PodId,
        current: &AcState,
        change: AcChange,
    ) -> Result<()> {
        SensiboClient::set_ac_state_field(self, pod, current, change).await
    }
}
