use std::net::SocketAddr;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::core::config::Settings;

/// Install the Prometheus recorder with its built-in scrape endpoint.
/// This binary has no API surface of its own, so the exporter serves
/// `/metrics` itself.
pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let addr = parse_listen_addr(&settings.telemetry().prometheus_addr)?;
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(%addr, "Prometheus exporter listening");
    Ok(())
}

fn parse_listen_addr(raw: &str) -> anyhow::Result<SocketAddr> {
    raw.parse().with_context(|| format!("invalid Prometheus listen address: {raw}"))
}

#[cfg(test)]
mod tests {
    use super::parse_listen_addr;

    #[test]
    fn default_listen_address_parses() {
        let addr = parse_listen_addr("0.0.0.0:9000").expect("parse");
        assert_eq!(addr.port(), 9000);
    }

    #[test]
    fn hostnames_are_rejected() {
        assert!(parse_listen_addr("metrics.internal:9000").is_err());
    }
}
