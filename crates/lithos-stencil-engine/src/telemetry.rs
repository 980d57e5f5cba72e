// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Optional OpenTelemetry instrumentation.
//!
//! Recording is off until [`enable`] is called, and compiles to no-ops
//! without the `telemetry` feature.
#![cfg_attr(not(feature = "telemetry"), allow(dead_code))]

#[cfg(feature = "telemetry")]
mod otel {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::OnceLock;
    use std::time::Duration;

    use opentelemetry::global;
    use opentelemetry::metrics::{Counter, Histogram};
    use opentelemetry::trace::{Span as _, SpanKind, Tracer};
    use opentelemetry::KeyValue;

    const INSTRUMENTATION_NAME: &str = "lithos_stencil_engine";

    static ENABLED: AtomicBool = AtomicBool::new(false);
    static HANDLES: OnceLock<Handles> = OnceLock::new();

    struct Handles {
        tracer: global::BoxedTracer,
        render_duration: Histogram<f64>,
        parse_duration: Histogram<f64>,
        render_count: Counter<u64>,
        parse_count: Counter<u64>,
        filter_count: Counter<u64>,
    }

    impl Handles {
        fn new() -> Self {
            let meter = global::meter(INSTRUMENTATION_NAME);
            Self {
                tracer: global::tracer(INSTRUMENTATION_NAME),
                render_duration: meter
                    .f64_histogram("stencil.render.duration_ms")
                    .with_description("Template render duration in milliseconds")
                    .init(),
                parse_duration: meter
                    .f64_histogram("stencil.parse.duration_ms")
                    .with_description("Template parse duration in milliseconds")
                    .init(),
                render_count: meter
                    .u64_counter("stencil.render.count")
                    .with_description("Number of template renders")
                    .init(),
                parse_count: meter
                    .u64_counter("stencil.parse.count")
                    .with_description("Number of templates parsed")
                    .init(),
                filter_count: meter
                    .u64_counter("stencil.filter.count")
                    .with_description("Number of filter invocations")
                    .init(),
            }
        }
    }

    fn handles() -> &'static Handles {
        HANDLES.get_or_init(Handles::new)
    }

    pub fn enable() {
        ENABLED.store(true, Ordering::Relaxed);
    }

    pub fn disable() {
        ENABLED.store(false, Ordering::Relaxed);
    }

    fn enabled() -> bool {
        ENABLED.load(Ordering::Relaxed)
    }

    #[allow(clippy::cast_possible_wrap)]
    fn record_operation(
        operation: &'static str,
        template: &str,
        template_len: usize,
        duration: Duration,
        success: bool,
    ) {
        let hs = handles();
        let duration_ms = duration.as_secs_f64() * 1_000.0;
        let attrs = [
            KeyValue::new("template.name", template.to_string()),
            KeyValue::new("template.length", template_len as i64),
            KeyValue::new("success", success),
        ];
        let (counter, histogram, span_name) = match operation {
            "parse" => (&hs.parse_count, &hs.parse_duration, "Template::parse"),
            _ => (&hs.render_count, &hs.render_duration, "Template::render"),
        };
        counter.add(1, &attrs);
        histogram.record(duration_ms, &attrs);

        let mut span = hs
            .tracer
            .span_builder(span_name)
            .with_kind(SpanKind::Internal)
            .start(&hs.tracer);
        for attr in attrs {
            span.set_attribute(attr);
        }
        span.set_attribute(KeyValue::new("duration_ms", duration_ms));
        span.end();
    }

    pub fn record_render(template: &str, template_len: usize, duration: Duration, success: bool) {
        if enabled() {
            record_operation("render", template, template_len, duration, success);
        }
    }

    pub fn record_parse(template: &str, template_len: usize, duration: Duration, success: bool) {
        if enabled() {
            record_operation("parse", template, template_len, duration, success);
        }
    }

    pub fn record_filter_invocation(name: &str, success: bool) {
        if !enabled() {
            return;
        }
        let attrs = [
            KeyValue::new("filter.name", name.to_string()),
            KeyValue::new("filter.success", success),
        ];
        handles().filter_count.add(1, &attrs);
    }
}

#[cfg(not(feature = "telemetry"))]
mod otel {
    use std::time::Duration;

    pub fn enable() {}
    pub fn disable() {}
    pub fn record_render(
        _template: &str,
        _template_len: usize,
        _duration: Duration,
        _success: bool,
    ) {
    }
    pub fn record_parse(
        _template: &str,
        _template_len: usize,
        _duration: Duration,
        _success: bool,
    ) {
    }
    pub fn record_filter_invocation(_name: &str, _success: bool) {}
}

pub use otel::{disable, enable, record_filter_invocation, record_parse, record_render};
