use crate::config::{CheckSpec, Config, ServerSpec};
use crate::error::{Error, Result};
use std::collections::HashSet;

/// Validates a single check of a server.
pub fn validate_check(server: &str, check: &CheckSpec) -> Result<()> {
    if check.name.is_empty() {
        return Err(Error::ConfigInvalid(format!(
            "Server '{}' has a check without a name",
            server
        )));
    }

    let limit = &check.limit;
    if !limit.actions.is_empty() && limit.count == 0 && limit.after.is_zero() {
        return Err(Error::ConfigInvalid(format!(
            "Check '{}' of server '{}' has actions but neither limit.count nor limit.after",
            check.name, server
        )));
    }

    Ok(())
}

/// Validates a server specification
pub fn validate_server_spec(spec: &ServerSpec) -> Result<()> {
    if spec.name.trim().is_empty() {
        return Err(Error::ConfigInvalid("Server has empty name".to_string()));
    }

    for check in &spec.checks {
        validate_check(&spec.name, check)?;
    }

    Ok(())
}

/// Validates a list of servers, including name uniqueness
pub fn validate_servers(servers: &[ServerSpec]) -> Result<()> {
    let mut seen = HashSet::new();
    for spec in servers {
        validate_server_spec(spec)?;
        if !seen.insert(spec.name.to_ascii_lowercase()) {
            return Err(Error::ConfigInvalid(format!(
                "Server '{}' is configured more than once",
                spec.name
            )));
        }
    }

    Ok(())
}

/// Full configuration validation
pub fn validate_config(config: &Config) -> Result<()> {
    validate_servers(&config.servers)?;

    let splay = config.checker.splay;
    if splay.end < splay.start {
        return Err(Error::ConfigInvalid(format!(
            "checker.splay.end ({}) is smaller than checker.splay.start ({})",
            splay.end, splay.start
        )));
    }

    if let Some(cachet) = &config.cachet {
        if cachet.url.is_empty() || cachet.token.is_empty() {
            return Err(Error::ConfigInvalid(
                "cachet.url and cachet.token must both be set".to_string(),
            ));
        }
    }

    Ok(())
}
