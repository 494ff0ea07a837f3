//! Validation rules (§4.A).

use crate::{ConfigError, ConfigWarning, ProxyConfig, LARGE_BODY_WARNING_THRESHOLD, WELL_KNOWN_PORTS};

pub fn validate(cfg: &ProxyConfig) -> (Vec<ConfigError>, Vec<ConfigWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    check_port_range(cfg.proxy.http_port, &mut errors);
    if let Some(https) = cfg.proxy.https_port {
        check_port_range(https, &mut errors);
        if https == cfg.proxy.http_port {
            errors.push(ConfigError::PortsEqual(https));
        }
    }

    if cfg.storage.db_path.as_os_str().is_empty() {
        errors.push(ConfigError::EmptyDatabasePath);
    }

    // `max_body_size` is unsigned in `ProxyConfig`, but the spec states the
    // constraint in terms of a signed quantity (a caller could pass a
    // negative CLI value before it's parsed into this type); we still check
    // it here so the rule has one place to live, using `i64` to match the
    // spec's wording.
    if (cfg.capture.max_body_size as i64) < 0 {
        errors.push(ConfigError::NegativeBodySize(cfg.capture.max_body_size as i64));
    }

    if cfg.proxy.enable_https
        && (!cfg.proxy.cert_path.exists() || !cfg.proxy.key_path.exists())
    {
        warnings.push(ConfigWarning::MissingCertOrKey);
    }

    if cfg.capture.max_body_size > LARGE_BODY_WARNING_THRESHOLD {
        warnings.push(ConfigWarning::LargeBodySize(cfg.capture.max_body_size));
    }

    for &port in [Some(cfg.proxy.http_port), cfg.proxy.https_port]
        .iter()
        .flatten()
    {
        if WELL_KNOWN_PORTS.contains(&port) {
            warnings.push(ConfigWarning::WellKnownPort(port));
        }
    }

    (errors, warnings)
}

fn check_port_range(port: u16, errors: &mut Vec<ConfigError>) {
    if port == 0 {
        errors.push(ConfigError::PortOutOfRange(port as u32));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_equal_ports() {
        let mut cfg = ProxyConfig::default();
        cfg.proxy.http_port = 8080;
        cfg.proxy.https_port = Some(8080);
        let (errors, _) = validate(&cfg);
        assert!(errors.contains(&ConfigError::PortsEqual(8080)));
    }

    #[test]
    fn rejects_port_zero() {
        let mut cfg = ProxyConfig::default();
        cfg.proxy.http_port = 0;
        let (errors, _) = validate(&cfg);
        assert!(errors.contains(&ConfigError::PortOutOfRange(0)));
    }

    #[test]
    fn rejects_empty_db_path() {
        let mut cfg = ProxyConfig::default();
        cfg.storage.db_path = "".into();
        let (errors, _) = validate(&cfg);
        assert!(errors.contains(&ConfigError::EmptyDatabasePath));
    }

    #[test]
    fn warns_on_well_known_port() {
        let mut cfg = ProxyConfig::default();
        cfg.proxy.http_port = 443;
        let (_, warnings) = validate(&cfg);
        assert!(warnings.contains(&ConfigWarning::WellKnownPort(443)));
    }

    #[test]
    fn warns_on_large_body_size() {
        let mut cfg = ProxyConfig::default();
        cfg.capture.max_body_size = 200 * 1024 * 1024;
        let (_, warnings) = validate(&cfg);
        assert!(matches!(
            warnings.as_slice(),
            [ConfigWarning::LargeBodySize(n)] if *n == 200 * 1024 * 1024
        ));
    }

    #[test]
    fn warns_on_missing_cert_when_https_enabled() {
        let mut cfg = ProxyConfig::default();
        cfg.proxy.enable_https = true;
        cfg.proxy.cert_path = "/nonexistent/cert.pem".into();
        cfg.proxy.key_path = "/nonexistent/key.pem".into();
        let (_, warnings) = validate(&cfg);
        assert!(warnings.contains(&ConfigWarning::MissingCertOrKey));
    }

    #[test]
    fn no_warning_when_https_disabled_and_certs_missing() {
        let mut cfg = ProxyConfig::default();
        cfg.proxy.enable_https = false;
        cfg.proxy.cert_path = "/nonexistent/cert.pem".into();
        cfg.proxy.key_path = "/nonexistent/key.pem".into();
        let (_, warnings) = validate(&cfg);
        assert!(!warnings.contains(&ConfigWarning::MissingCertOrKey));
    }
}
