use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn, Instrument, Span};

use crate::client::AcApi;
use crate::types::*;
use crate::{Error, Result};

pub const MIN_OPERATING_C: i32 = 17;
pub const MAX_OPERATING_C: i32 = 27;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

type DecisionCallback = Box<dyn Fn(&PodDecision) + Send + Sync>;
type StopCallback = Box<dyn Fn(&Stopped) + Send + Sync>;

/// Hysteresis bounds plus the setpoint sent with every command, in whole °C.
///
/// Always satisfies `low < high`, `operating <= low` and
/// `MIN_OPERATING_C <= operating <= MAX_OPERATING_C`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    low: i32,
    high: i32,
    operating: i32,
}

impl Thresholds {
    pub fn new(low: i32, high: i32, operating: i32) -> Result<Self> {
        if low >= high {
            return Err(Error::InvalidThresholds(format!(
                "low temperature {low} must be lower than high temperature {high}"
            )));
        }
        if operating > low {
            return Err(Error::InvalidThresholds(format!(
                "operation temperature {operating} must be lower than or equal to low temperature {low}"
            )));
        }
        if operating > MAX_OPERATING_C {
            return Err(Error::InvalidThresholds(format!(
                "operation temperature {operating} cannot exceed {MAX_OPERATING_C}"
            )));
        }
        if operating < MIN_OPERATING_C {
            return Err(Error::InvalidThresholds(format!(
                "operation temperature {operating} cannot be lower than {MIN_OPERATING_C}"
            )));
        }
        Ok(Self { low, high, operating })
    }

    pub fn low(&self) -> i32 {
        self.low
    }

    pub fn high(&self) -> i32 {
        self.high
    }

    pub fn operating(&self) -> i32 {
        self.operating
    }

    pub fn decide(&self, temperature: f64) -> Decision {
        if temperature >= f64::from(self.high) {
            Decision::TurnOn
        } else if temperature <= f64::from(self.low) {
            Decision::TurnOff
        } else {
            Decision::Hold
        }
    }

    /// The AC state written for a decision, if any.
    pub fn command(&self, decision: Decision) -> Option<AcState> {
        match decision {
            Decision::TurnOn => Some(AcState::new(true, self.operating, AcMode::Cool, FanLevel::High)),
            Decision::TurnOff => Some(AcState::new(false, self.operating, AcMode::Cool, FanLevel::Auto)),
            Decision::Hold => None,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low: 23,
            high: 25,
            operating: 17,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    TurnOn,
    TurnOff,
    Hold,
}

/// Outcome of evaluating one pod during a poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PodDecision {
    pub pod: Pod,
    pub temperature: f64,
    pub decision: Decision,
}

/// What a failed poll does to the run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// The first error from any pod ends the poll and stops the watcher.
    #[default]
    StopOnError,
    /// Per-pod errors are logged and skipped. The watcher stops after
    /// `max_consecutive_failures` failed cycles in a row, waiting `backoff`
    /// instead of the poll interval after each failed cycle.
    Tolerate {
        max_consecutive_failures: u32,
        backoff: Duration,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Interrupt,
    Error,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Interrupt => f.write_str("interrupt"),
            StopReason::Error => f.write_str("exception"),
        }
    }
}

/// Terminal state of a watcher run.
#[derive(Debug)]
pub struct Stopped {
    pub reason: StopReason,
    pub error: Option<Error>,
    /// Poll cycles completed before stopping.
    pub cycles: u64,
}

/// Result of one poll cycle. `failures` is only populated under
/// [`FailurePolicy::Tolerate`].
#[derive(Debug, Default)]
pub struct CycleReport {
    pub decisions: Vec<PodDecision>,
    pub failures: Vec<(PodId, Error)>,
}

pub struct WatcherBuilder<C> {
    client: C,
    thresholds: Thresholds,
    interval: Duration,
    policy: FailurePolicy,
    span: Option<Span>,
    decision_callbacks: Vec<DecisionCallback>,
    stop_callbacks: Vec<StopCallback>,
}

impl<C: AcApi> WatcherBuilder<C> {
    pub fn new(client: C, thresholds: Thresholds) -> Self {
        Self {
            client,
            thresholds,
            interval: DEFAULT_INTERVAL,
            policy: FailurePolicy::default(),
            span: None,
            decision_callbacks: Vec::new(),
            stop_callbacks: Vec::new(),
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Span every watcher log line is recorded under.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn on_decision(mut self, f: impl Fn(&PodDecision) + Send + Sync + 'static) -> Self {
        self.decision_callbacks.push(Box::new(f));
        self
    }

    pub fn on_stop(mut self, f: impl Fn(&Stopped) + Send + Sync + 'static) -> Self {
        self.stop_callbacks.push(Box::new(f));
        self
    }

    pub fn build(self) -> Watcher<C> {
        Watcher {
            client: self.client,
            thresholds: self.thresholds,
            interval: self.interval,
            policy: self.policy,
            span: self
                .span
                .unwrap_or_else(|| tracing::info_span!("watcher")),
            decision_callbacks: self.decision_callbacks,
            stop_callbacks: self.stop_callbacks,
        }
    }
}

/// Closed-loop temperature watcher: poll every pod, switch its AC on above
/// the high bound and off below the low bound.
pub struct Watcher<C> {
    client: C,
    thresholds: Thresholds,
    interval: Duration,
    policy: FailurePolicy,
    span: Span,
    decision_callbacks: Vec<DecisionCallback>,
    stop_callbacks: Vec<StopCallback>,
}

impl<C: AcApi> Watcher<C> {
    pub fn builder(client: C, thresholds: Thresholds) -> WatcherBuilder<C> {
        WatcherBuilder::new(client, thresholds)
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Run one cycle over every pod the account can see.
    pub async fn poll(&self) -> Result<CycleReport> {
        self.poll_cycle().instrument(self.span.clone()).await
    }

    async fn poll_cycle(&self) -> Result<CycleReport> {
        let pods = self.client.list_devices().await?;
        debug!(count = pods.len(), "polling pods");

        let mut report = CycleReport::default();
        for pod in pods.iter() {
            match self.poll_pod(pod).await {
                Ok(decision) => report.decisions.push(decision),
                Err(e) if matches!(self.policy, FailurePolicy::Tolerate { .. }) => {
                    warn!(pod = %pod.name, id = %pod.id, error = %e, "pod poll failed, skipping");
                    report.failures.push((pod.id.clone(), e));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    async fn poll_pod(&self, pod: &Pod) -> Result<PodDecision> {
        let measurement = self.client.get_measurement(&pod.id).await?;
        let temperature = measurement
            .temperature
            .map(|t| t.celsius())
            .unwrap_or(0.0);

        let decision = self.thresholds.decide(temperature);
        let (low, high) = (self.thresholds.low, self.thresholds.high);
        // Intent is logged first so a failed write still leaves a trace.
        match decision {
            Decision::TurnOn => {
                warn!(pod = %pod.name, temperature, high, "turning on AC as {temperature} >= {high}")
            }
            Decision::TurnOff => {
                warn!(pod = %pod.name, temperature, low, "turning off AC as {temperature} <= {low}")
            }
            Decision::Hold => {
                info!(pod = %pod.name, temperature, low, high, "temperature {temperature}C is within range {low}-{high}C, noop")
            }
        }
        if let Some(state) = self.thresholds.command(decision) {
            self.client.set_ac_state(&pod.id, &state).await?;
        }

        let outcome = PodDecision {
            pod: pod.clone(),
            temperature,
            decision,
        };
        for cb in &self.decision_callbacks {
            cb(&outcome);
        }
        Ok(outcome)
    }

    /// Poll, sleep, repeat until `shutdown` completes or the failure policy
    /// gives up. Cleanup runs exactly once before returning.
    pub async fn run_until<F>(&self, shutdown: F) -> Stopped
    where
        F: Future<Output = ()>,
    {
        let stopped = self.run_loop(shutdown).instrument(self.span.clone()).await;
        self.cleanup(&stopped);
        stopped
    }

    async fn run_loop<F>(&self, shutdown: F) -> Stopped
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut cycles = 0u64;
        let mut consecutive_failures = 0u32;

        loop {
            let outcome = tokio::select! {
                _ = &mut shutdown => break interrupted(cycles),
                outcome = self.poll_cycle() => outcome,
            };
            cycles += 1;

            let failure = match outcome {
                Ok(mut report) => report.failures.pop().map(|(_, e)| e),
                Err(e) => Some(e),
            };

            let pause = match (failure, self.policy) {
                (None, _) => {
                    consecutive_failures = 0;
                    self.interval
                }
                (Some(e), FailurePolicy::StopOnError) => break failed(e, cycles),
                (
                    Some(e),
                    FailurePolicy::Tolerate {
                        max_consecutive_failures,
                        backoff,
                    },
                ) => {
                    consecutive_failures += 1;
                    warn!(
                        consecutive = consecutive_failures,
                        max = max_consecutive_failures,
                        error = %e,
                        "poll cycle failed"
                    );
                    if consecutive_failures >= max_consecutive_failures {
                        break failed(e, cycles);
                    }
                    backoff
                }
            };

            tokio::select! {
                _ = &mut shutdown => break interrupted(cycles),
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    fn cleanup(&self, stopped: &Stopped) {
        let _guard = self.span.enter();
        match &stopped.error {
            Some(e) => warn!(reason = %stopped.reason, cycles = stopped.cycles, "cleanup after {} with {e}", stopped.reason),
            None => warn!(reason = %stopped.reason, cycles = stopped.cycles, "cleanup after {} with no exception", stopped.reason),
        }
        for cb in &self.stop_callbacks {
            cb(stopped);
        }
    }
}

fn interrupted(cycles: u64) -> Stopped {
    Stopped {
        reason: StopReason::Interrupt,
        error: None,
        cycles,
    }
}

fn failed(error: Error, cycles: u64) -> Stopped {
    Stopped {
        reason: StopReason::Error,
        error: Some(error),
        cycles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_thresholds() {
        let t = Thresholds::new(23, 25, 17).unwrap();
        assert_eq!((t.low(), t.high(), t.operating()), (23, 25, 17));
        assert_eq!(Thresholds::default(), t);
        assert!(Thresholds::new(27, 28, 27).is_ok());
        assert!(Thresholds::new(17, 18, 17).is_ok());
    }

    #[test]
    fn invalid_thresholds() {
        for (low, high, op) in [
            (25, 25, 17), // low == high
            (26, 25, 17), // low > high
            (20, 25, 21), // op above low
            (30, 32, 28), // op above max
            (20, 25, 16), // op below min
        ] {
            let err = Thresholds::new(low, high, op).unwrap_err();
            assert!(
                matches!(err, Error::InvalidThresholds(_)),
                "({low}, {high}, {op}) should be rejected"
            );
        }
    }

    #[test]
    fn decide_priority() {
        let t = Thresholds::new(23, 25, 17).unwrap();
        assert_eq!(t.decide(25.0), Decision::TurnOn);
        assert_eq!(t.decide(30.5), Decision::TurnOn);
        assert_eq!(t.decide(23.0), Decision::TurnOff);
        assert_eq!(t.decide(0.0), Decision::TurnOff);
        assert_eq!(t.decide(24.0), Decision::Hold);
        assert_eq!(t.decide(23.01), Decision::Hold);
        assert_eq!(t.decide(24.99), Decision::Hold);
    }

    #[test]
    fn commands_use_operating_setpoint() {
        let t = Thresholds::new(22, 26, 18).unwrap();
        let on = t.command(Decision::TurnOn).unwrap();
        assert!(on.on);
        assert_eq!(on.target_temperature, Some(18));
        assert_eq!(on.mode, AcMode::Cool);
        assert_eq!(on.fan_level, Some(FanLevel::High));

        let off = t.command(Decision::TurnOff).unwrap();
        assert!(!off.on);
        assert_eq!(off.target_temperature, Some(18));
        assert_eq!(off.fan_level, Some(FanLevel::Auto));

        assert!(t.command(Decision::Hold).is_none());
    }

    #[test]
    fn stop_reason_labels() {
        assert_eq!(StopReason::Interrupt.to_string(), "interrupt");
        assert_eq!(StopReason::Error.to_string(), "exception");
    }
}
