// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use tick::Clock;

use crate::circuit::derive_name;
use crate::classifier::Defect;
use crate::constants::{DEFAULT_FAILURE_THRESHOLD, DEFAULT_RECOVERY_TIMEOUT, UNNAMED_CIRCUIT};
use crate::telemetry::CircuitTelemetry;
use crate::{Circuit, CircuitState, ConfigError, FailureClassifier, Protected, Registry};

/// Configuration of a circuit, validated and turned into a [`Circuit`] by [`build`][Self::build].
///
/// | Option | Default |
/// |---|---|
/// | [`name`][Self::name] | `unnamed_circuit`, or the operation's type name for [`protect`][Self::protect] |
/// | [`failure_threshold`][Self::failure_threshold] | 5 |
/// | [`recovery_timeout`][Self::recovery_timeout] | 30 seconds |
/// | [`classifier`][Self::classifier] | every error is a failure |
/// | [`registry`][Self::registry] | [`Registry::global`] |
///
/// Named [`CircuitPreset`]s and a deserializable [`CircuitConfig`] cover the common combinations
/// of threshold and timeout.
///
/// # Examples
///
/// ```rust
/// use std::io::{Error, ErrorKind};
///
/// use tick::Clock;
/// use tripwire::{CircuitOptions, CircuitPreset, FailureClassifier};
///
/// let circuit = CircuitOptions::<Error>::new("payments", Clock::new_frozen())
///     .preset(CircuitPreset::Nervous)
///     .classifier(FailureClassifier::kinds([ErrorKind::TimedOut, ErrorKind::ConnectionReset]))
///     .build()?;
///
/// assert_eq!(circuit.state().failure_threshold(), 1);
/// # Ok::<(), tripwire::ConfigError>(())
/// ```
pub struct CircuitOptions<E> {
    name: Option<Cow<'static, str>>,
    clock: Clock,
    failure_threshold: u32,
    recovery_timeout: Duration,
    classifier: FailureClassifier<E>,
    registry: Registry,
    #[cfg(any(feature = "logs", test))]
    logs_enabled: bool,
    #[cfg(any(feature = "metrics", test))]
    meter: Option<opentelemetry::metrics::Meter>,
}

impl<E> CircuitOptions<E> {
    /// Creates options for a circuit called `name`, timed by `clock`.
    ///
    /// Prefer short `snake_case` names; they show up in errors and telemetry.
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>, clock: impl AsRef<Clock>) -> Self {
        Self::unnamed(clock).name(name)
    }

    /// Creates options without a name.
    ///
    /// [`build`][Self::build] names the circuit `unnamed_circuit`, while [`protect`][Self::protect]
    /// derives the name from the type name of the protected operation.
    #[must_use]
    pub fn unnamed(clock: impl AsRef<Clock>) -> Self {
        Self {
            name: None,
            clock: clock.as_ref().clone(),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
            classifier: FailureClassifier::all(),
            registry: Registry::global().clone(),
            #[cfg(any(feature = "logs", test))]
            logs_enabled: false,
            #[cfg(any(feature = "metrics", test))]
            meter: None,
        }
    }

    /// Sets the circuit name.
    #[must_use]
    pub fn name(self, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Sets the number of consecutive classified failures that opens a closed circuit.
    #[must_use]
    pub fn failure_threshold(self, failure_threshold: u32) -> Self {
        Self { failure_threshold, ..self }
    }

    /// Sets how long an open circuit denies executions before it admits a probe.
    #[must_use]
    pub fn recovery_timeout(self, recovery_timeout: Duration) -> Self {
        Self { recovery_timeout, ..self }
    }

    /// Applies the threshold and timeout of a named preset.
    #[must_use]
    pub fn preset(self, preset: CircuitPreset) -> Self {
        self.config(&preset.config())
    }

    /// Applies the threshold and timeout of `config`.
    #[must_use]
    pub fn config(self, config: &CircuitConfig) -> Self {
        self.failure_threshold(config.failure_threshold)
            .recovery_timeout(config.recovery_timeout)
    }

    /// Sets which errors count as circuit failures.
    #[must_use]
    pub fn classifier(self, classifier: FailureClassifier<E>) -> Self {
        Self { classifier, ..self }
    }

    /// Registers the circuit in `registry` instead of the process-wide one.
    #[must_use]
    pub fn registry(self, registry: &Registry) -> Self {
        Self {
            registry: registry.clone(),
            ..self
        }
    }

    /// Enables structured `tracing` events for rejections, probes and transitions.
    #[must_use]
    #[cfg(any(feature = "logs", test))]
    pub fn enable_logs(self) -> Self {
        Self {
            logs_enabled: true,
            ..self
        }
    }

    /// Enables OpenTelemetry metrics reported through `provider`.
    #[must_use]
    #[cfg(any(feature = "metrics", test))]
    pub fn enable_metrics(self, provider: &dyn opentelemetry::metrics::MeterProvider) -> Self {
        Self {
            meter: Some(crate::telemetry::metrics::create_meter(provider)),
            ..self
        }
    }

    /// Validates the options, creates the circuit and registers it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the name is empty, the failure threshold or recovery timeout is
    /// zero, or the classifier was built from an empty set of error kinds.
    pub fn build(mut self) -> Result<Circuit<E>, ConfigError> {
        let name = self.name.take().unwrap_or(Cow::Borrowed(UNNAMED_CIRCUIT));
        self.build_named(name)
    }

    /// Builds the circuit and binds `operation` to it.
    ///
    /// Without an explicit name the circuit is named after the type of `operation`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] under the same conditions as [`build`][Self::build].
    pub fn protect<F>(mut self, operation: F) -> Result<Protected<F, E>, ConfigError> {
        let name = derive_name::<F>(self.name.take());
        Ok(self.build_named(name)?.protect(operation))
    }

    fn build_named(self, name: Cow<'static, str>) -> Result<Circuit<E>, ConfigError> {
        if name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold(name));
        }
        if self.recovery_timeout.is_zero() {
            return Err(ConfigError::ZeroRecoveryTimeout(name));
        }
        if let Some(Defect::EmptyKindSet) = self.classifier.defect() {
            return Err(ConfigError::EmptyKindSet(name));
        }

        let telemetry = CircuitTelemetry::new(name.clone());
        #[cfg(any(feature = "logs", test))]
        let telemetry = telemetry.with_logs(self.logs_enabled);
        #[cfg(any(feature = "metrics", test))]
        let telemetry = match &self.meter {
            Some(meter) => telemetry.with_meter(meter),
            None => telemetry,
        };

        let state = Arc::new(CircuitState::new(name, self.failure_threshold, self.recovery_timeout, self.clock));
        self.registry.register_state(&state);

        Ok(Circuit::new(state, self.classifier, telemetry))
    }
}

impl<E> Debug for CircuitOptions<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitOptions")
            .field("name", &self.name)
            .field("failure_threshold", &self.failure_threshold)
            .field("recovery_timeout", &self.recovery_timeout)
            .field("classifier", &self.classifier)
            .finish_non_exhaustive()
    }
}

/// Named combinations of failure threshold and recovery timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(any(feature = "serde", test), derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(any(feature = "serde", test), serde(rename_all = "snake_case"))]
#[non_exhaustive]
pub enum CircuitPreset {
    /// 5 failures, 30 seconds. The defaults.
    #[default]
    Standard,

    /// 1 failure, 30 seconds. For dependencies where a single failure means an outage.
    Nervous,

    /// 20 failures, 60 seconds. For flaky dependencies that usually recover on their own.
    Tolerant,
}

impl CircuitPreset {
    /// Returns the threshold and timeout of this preset.
    #[must_use]
    pub fn config(self) -> CircuitConfig {
        match self {
            Self::Standard => CircuitConfig::default(),
            Self::Nervous => CircuitConfig::new(1, Duration::from_secs(30)),
            Self::Tolerant => CircuitConfig::new(20, Duration::from_secs(60)),
        }
    }
}

/// Failure threshold and recovery timeout as plain data.
///
/// With the `serde` feature this deserializes from configuration files. Missing fields take their
/// defaults and the timeout is given in milliseconds:
///
/// ```json
/// { "failure_threshold": 3, "recovery_timeout_ms": 10000 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(any(feature = "serde", test), derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(any(feature = "serde", test), serde(default))]
#[non_exhaustive]
pub struct CircuitConfig {
    /// Consecutive classified failures that open a closed circuit.
    pub failure_threshold: u32,

    /// Time an open circuit waits before it admits a probe.
    #[cfg_attr(
        any(feature = "serde", test),
        serde(rename = "recovery_timeout_ms", with = "duration_millis")
    )]
    pub recovery_timeout: Duration,
}

impl CircuitConfig {
    /// Creates a configuration with the given threshold and timeout.
    #[must_use]
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
        }
    }
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_RECOVERY_TIMEOUT)
    }
}

#[cfg(any(feature = "serde", test))]
mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::io::{Error, ErrorKind};

    use rstest::rstest;
    use tick::ClockControl;

    use super::*;
    use crate::CircuitStatus;
    use crate::testing::{FooError, FooKind};

    fn options() -> CircuitOptions<FooError> {
        CircuitOptions::new("options", ClockControl::new().to_clock()).registry(&Registry::new())
    }

    #[test]
    fn defaults() {
        let circuit = CircuitOptions::<FooError>::unnamed(ClockControl::new().to_clock())
            .registry(&Registry::new())
            .build()
            .unwrap();

        assert_eq!(circuit.name(), "unnamed_circuit");
        assert_eq!(circuit.state().failure_threshold(), 5);
        assert_eq!(circuit.state().recovery_timeout(), Duration::from_secs(30));
        assert!(circuit.call(|| Err::<(), _>(FooError::bar(1))).is_err());
        assert_eq!(circuit.state().failure_count(), 1);
    }

    #[rstest]
    #[case(CircuitPreset::Standard, 5, 30)]
    #[case(CircuitPreset::Nervous, 1, 30)]
    #[case(CircuitPreset::Tolerant, 20, 60)]
    fn presets(#[case] preset: CircuitPreset, #[case] threshold: u32, #[case] timeout_secs: u64) {
        let circuit = options().preset(preset).build().unwrap();

        assert_eq!(circuit.state().failure_threshold(), threshold);
        assert_eq!(circuit.state().recovery_timeout(), Duration::from_secs(timeout_secs));
    }

    #[test]
    fn explicit_values_override_preset() {
        let circuit = options()
            .preset(CircuitPreset::Tolerant)
            .failure_threshold(2)
            .build()
            .unwrap();

        assert_eq!(circuit.state().failure_threshold(), 2);
        assert_eq!(circuit.state().recovery_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn config_applies_values() {
        let circuit = options()
            .config(&CircuitConfig::new(3, Duration::from_secs(10)))
            .build()
            .unwrap();

        assert_eq!(circuit.state().failure_threshold(), 3);
        assert_eq!(circuit.state().recovery_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: CircuitConfig = serde_json::from_str(r#"{ "recovery_timeout_ms": 1500 }"#).unwrap();
        assert_eq!(config, CircuitConfig::new(5, Duration::from_millis(1500)));

        let config: CircuitConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, CircuitConfig::default());

        let json = serde_json::to_string(&CircuitPreset::Nervous.config()).unwrap();
        assert_eq!(json, r#"{"failure_threshold":1,"recovery_timeout_ms":30000}"#);
    }

    #[test]
    fn preset_deserializes_from_snake_case() {
        let preset: CircuitPreset = serde_json::from_str("\"tolerant\"").unwrap();

        assert_eq!(preset, CircuitPreset::Tolerant);
        assert_eq!(CircuitPreset::default(), CircuitPreset::Standard);
    }

    #[test]
    fn classifier_is_used() {
        let circuit = options().classifier(FailureClassifier::kind(FooKind::Bar)).build().unwrap();

        let _ = circuit.call(|| Err::<(), _>(FooError::new(1)));
        assert_eq!(circuit.state().failure_count(), 0);

        let _ = circuit.call(|| Err::<(), _>(FooError::bar(1)));
        assert_eq!(circuit.state().failure_count(), 1);
    }

    #[test]
    fn empty_name_is_rejected() {
        assert_eq!(options().name("").build().unwrap_err(), ConfigError::EmptyName);
    }

    #[test]
    fn zero_threshold_is_rejected() {
        assert_eq!(
            options().failure_threshold(0).build().unwrap_err(),
            ConfigError::ZeroFailureThreshold("options".into())
        );
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert_eq!(
            options().recovery_timeout(Duration::ZERO).build().unwrap_err(),
            ConfigError::ZeroRecoveryTimeout("options".into())
        );
    }

    #[test]
    fn empty_kind_set_is_rejected() {
        let error = CircuitOptions::<Error>::new("kinds", ClockControl::new().to_clock())
            .registry(&Registry::new())
            .classifier(FailureClassifier::kinds(Vec::<ErrorKind>::new()))
            .build()
            .unwrap_err();

        assert_eq!(error, ConfigError::EmptyKindSet("kinds".into()));
    }

    #[test]
    fn invalid_options_are_not_registered() {
        let registry = Registry::new();

        let result = CircuitOptions::<FooError>::new("invalid", ClockControl::new().to_clock())
            .registry(&registry)
            .failure_threshold(0)
            .build();

        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn build_registers_circuit() {
        let registry = Registry::new();

        let circuit = CircuitOptions::<FooError>::new("registered", ClockControl::new().to_clock())
            .registry(&registry)
            .build()
            .unwrap();

        assert_eq!(registry.get("registered").unwrap().status(), CircuitStatus::Closed);
        drop(circuit);
    }

    #[test]
    fn protect_keeps_explicit_name() {
        let protected = options().protect(|value: u32| Ok::<_, FooError>(value)).unwrap();

        assert_eq!(protected.circuit().name(), "options");
    }

    #[test]
    fn debug_shows_configuration() {
        let debug = format!("{:?}", options().failure_threshold(7));

        assert!(debug.contains("CircuitOptions"));
        assert!(debug.contains("options"));
        assert!(debug.contains('7'));
    }
}
