// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use opentelemetry::InstrumentationScope;
use opentelemetry::metrics::{Counter, Gauge, Meter, MeterProvider};

const METER_NAME: &str = "tripwire";
const VERSION: &str = "v0.1.0";
const SCHEMA_URL: &str = "https://opentelemetry.io/schemas/1.47.0";

pub(crate) fn create_meter(meter_provider: &dyn MeterProvider) -> Meter {
    meter_provider.meter_with_scope(
        InstrumentationScope::builder(METER_NAME)
            .with_version(VERSION)
            .with_schema_url(SCHEMA_URL)
            .build(),
    )
}

pub(crate) fn create_resilience_event_counter(meter: &Meter) -> Counter<u64> {
    meter
        .u64_counter("resilience.event")
        .with_description("Emitted upon the occurrence of a resilience event.")
        .with_unit("u64")
        .build()
}

pub(crate) fn create_execution_counter(meter: &Meter) -> Counter<u64> {
    meter
        .u64_counter("circuit.execution")
        .with_description("Emitted once for every execution admitted by a circuit.")
        .with_unit("u64")
        .build()
}

pub(crate) fn create_state_gauge(meter: &Meter) -> Gauge<f64> {
    meter
        .f64_gauge("circuit.state")
        .with_description("Current state of a circuit: 0 when closed, 0.5 when half-open and 1 when open.")
        .build()
}
