//! Metrics recorder initialization and configuration.

use {anyhow::Result, tracing::info};

/// Handle to the installed recorder.
#[derive(Clone)]
pub struct MetricsHandle {
    #[cfg(feature = "prometheus")]
    prometheus_handle: metrics_exporter_prometheus::PrometheusHandle,
}

impl MetricsHandle {
    /// Render metrics in Prometheus text format.
    ///
    /// Empty when the `prometheus` feature is off.
    #[must_use]
    pub fn render(&self) -> String {
        #[cfg(feature = "prometheus")]
        {
            self.prometheus_handle.render()
        }
        #[cfg(not(feature = "prometheus"))]
        {
            String::new()
        }
    }
}

/// Configuration for the metrics system.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorderConfig {
    pub enabled: bool,
    /// Labels added to every series
    pub global_labels: Vec<(String, String)>,
}

/// Install the global metrics recorder.
///
/// Call once at startup. Without the `prometheus` feature, or when disabled,
/// no recorder is installed and the `metrics` macros are no-ops.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or bucket
/// configuration is rejected.
pub fn init_metrics(config: MetricsRecorderConfig) -> Result<Option<MetricsHandle>> {
    if !config.enabled {
        info!("metrics collection is disabled");
        return Ok(None);
    }

    #[cfg(feature = "prometheus")]
    {
        let handle = init_prometheus(config)?;
        info!("prometheus metrics recorder installed");
        Ok(Some(MetricsHandle {
            prometheus_handle: handle,
        }))
    }

    #[cfg(not(feature = "prometheus"))]
    {
        let _ = config;
        info!("metrics feature not enabled at compile time");
        Ok(None)
    }
}

#[cfg(feature = "prometheus")]
fn init_prometheus(
    config: MetricsRecorderConfig,
) -> Result<metrics_exporter_prometheus::PrometheusHandle> {
    use {
        crate::{broadcast, buckets, session},
        metrics_exporter_prometheus::{Matcher, PrometheusBuilder},
    };

    let mut builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(session::READY_DURATION_SECONDS.to_string()),
            buckets::READY_DURATION,
        )?
        .set_buckets_for_metric(
            Matcher::Full(broadcast::DURATION_SECONDS.to_string()),
            buckets::BROADCAST_DURATION,
        )?;

    for (key, value) in config.global_labels {
        builder = builder.add_global_label(key, value);
    }

    // install_recorder() registers globally and hands back a render handle
    // without spawning an HTTP listener.
    Ok(builder.install_recorder()?)
}
