// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Recording of cache events.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

#[cfg(any(feature = "metrics", test))]
use opentelemetry::metrics::Meter;
use tracing::Level;

#[cfg(any(feature = "metrics", test))]
use crate::telemetry::metrics::Instruments;
use crate::telemetry::{CacheActivity, CacheOperation};

/// Emits `tracing` events and OpenTelemetry measurements for one cache instance.
///
/// Clones share the same instruments.
#[derive(Clone, Debug)]
pub(crate) struct CacheTelemetry {
    inner: Arc<TelemetryInner>,
}

#[derive(Debug)]
struct TelemetryInner {
    name: String,
    logging_enabled: bool,
    #[cfg(any(feature = "metrics", test))]
    instruments: Option<Instruments>,
}

/// One event, before it is fanned out to logs and metrics.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Event<'a> {
    pub operation: CacheOperation,
    pub activity: CacheActivity,
    pub key: Option<&'a str>,
    pub duration: Option<Duration>,
}

impl<'a> Event<'a> {
    pub fn new(operation: CacheOperation, activity: CacheActivity) -> Self {
        Self {
            operation,
            activity,
            key: None,
            duration: None,
        }
    }

    pub fn key(self, key: &'a str) -> Self {
        Self { key: Some(key), ..self }
    }

    pub fn duration(self, duration: Duration) -> Self {
        Self {
            duration: Some(duration),
            ..self
        }
    }
}

impl CacheTelemetry {
    pub(crate) fn new(name: impl Into<String>, logging_enabled: bool) -> Self {
        Self {
            inner: Arc::new(TelemetryInner {
                name: name.into(),
                logging_enabled,
                #[cfg(any(feature = "metrics", test))]
                instruments: None,
            }),
        }
    }

    #[cfg(any(feature = "metrics", test))]
    pub(crate) fn with_meter(name: impl Into<String>, logging_enabled: bool, meter: &Meter) -> Self {
        Self {
            inner: Arc::new(TelemetryInner {
                name: name.into(),
                logging_enabled,
                instruments: Some(Instruments::new(meter)),
            }),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.inner.name
    }

    /// Records an event.
    pub(crate) fn record(&self, event: Event<'_>) {
        self.measure(&event);
        if self.inner.logging_enabled {
            self.emit(&event, None);
        }
    }

    /// Records a failure that was absorbed rather than returned.
    pub(crate) fn record_failure(&self, operation: CacheOperation, key: Option<&str>, error: &dyn Display) {
        let event = Event {
            operation,
            activity: CacheActivity::Error,
            key,
            duration: None,
        };
        self.measure(&event);
        if self.inner.logging_enabled {
            self.emit(&event, Some(&error.to_string()));
        }
    }

    /// Records the current number of local entries.
    #[cfg_attr(not(any(feature = "metrics", test)), expect(unused_variables, reason = "no-op without metrics"))]
    pub(crate) fn record_size(&self, size: usize) {
        #[cfg(any(feature = "metrics", test))]
        if let Some(instruments) = &self.inner.instruments {
            instruments.size(&self.inner.name, size);
        }
    }

    #[cfg_attr(not(any(feature = "metrics", test)), expect(unused_variables, reason = "no-op without metrics"))]
    fn measure(&self, event: &Event<'_>) {
        #[cfg(any(feature = "metrics", test))]
        if let Some(instruments) = &self.inner.instruments {
            instruments.event(&self.inner.name, event.operation.as_str(), event.activity.as_str(), event.duration);
        }
    }

    fn emit(&self, event: &Event<'_>, error: Option<&str>) {
        let name = self.inner.name.as_str();
        let op = event.operation.as_str();
        let ev = event.activity.as_str();
        let key = event.key;
        let duration_ns = event.duration.map(|d| d.as_nanos());

        // Tracing levels must be constant, so the macro is expanded once per level.
        // Field names must match the constants in attributes.rs.
        macro_rules! emit_event {
            ($level:ident) => {
                tracing::$level!(
                    cache.name = name,
                    cache.operation = op,
                    cache.activity = ev,
                    cache.key = key,
                    cache.duration_ns = ?duration_ns,
                    error = error,
                    "cache.event"
                )
            };
        }

        let level = event.activity.level();
        if level == Level::ERROR {
            emit_event!(error);
        } else if level == Level::WARN {
            emit_event!(warn);
        } else if level == Level::INFO {
            emit_event!(info);
        } else {
            emit_event!(debug);
        }
    }
}
