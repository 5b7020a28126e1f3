use thiserror::Error;

use tarn_utils::networking::NetAddress;

use crate::args::Config;

pub const VALID_MODULES: &str = "cgtwe";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unable to parse --modules flag, unrecognized or duplicate modules: {0}")]
    InvalidModules(String),

    #[error("a blank host will listen on all interfaces, did you mean localhost:{0}?\nyou must pass --disable-api-security to bind the API to a non-localhost address")]
    BlankApiHost(String),

    #[error("you must pass --disable-api-security to bind the API to a non-localhost address")]
    NonLoopbackApiBind,

    #[error("cannot use --disable-api-security without setting an api password")]
    ApiBindWithoutAuthentication,

    #[error("password cannot be blank")]
    BlankPassword,

    #[error("{0}")]
    Multiple(String),
}

/// Adds a ':' to a bare integer, so that it is read as a port number rather
/// than a host name.
pub fn process_net_addr(addr: &str) -> String {
    if addr.parse::<i64>().is_ok() {
        format!(":{addr}")
    } else {
        addr.to_owned()
    }
}

/// Lower-cases the modules string and rejects unrecognized or duplicate
/// module letters.
pub fn process_modules(modules: &str) -> Result<String, ConfigError> {
    let modules = modules.to_lowercase();
    let mut invalid = modules.clone();
    for letter in VALID_MODULES.chars() {
        if let Some(pos) = invalid.find(letter) {
            invalid.remove(pos);
        }
    }
    if !invalid.is_empty() {
        return Err(ConfigError::InvalidModules(invalid));
    }
    Ok(modules)
}

/// Checks that the security flags describe a sane, secure system: binding the
/// API away from loopback requires both opting out of the bind restriction
/// and turning authentication on.
pub fn verify_api_security(config: &Config) -> Result<(), ConfigError> {
    if !config.allow_api_bind {
        let addr = NetAddress::from(config.api_addr.as_str());
        if !addr.is_loopback() {
            if addr.host().is_empty() {
                return Err(ConfigError::BlankApiHost(addr.port().to_owned()));
            }
            return Err(ConfigError::NonLoopbackApiBind);
        }
        return Ok(());
    }

    if !config.authenticate_api {
        return Err(ConfigError::ApiBindWithoutAuthentication);
    }
    Ok(())
}

/// Checks the configuration values and performs cleanup on incorrect but
/// allowed values. Independent failures are joined into one report.
pub fn process_config(mut config: Config) -> Result<Config, ConfigError> {
    if config.authenticate_api && config.api_password.is_empty() {
        return Err(ConfigError::BlankPassword);
    }

    config.api_addr = process_net_addr(&config.api_addr);
    config.rpc_addr = process_net_addr(&config.rpc_addr);
    config.host_addr = process_net_addr(&config.host_addr);

    let mut errors: Vec<ConfigError> = Vec::new();
    match process_modules(&config.modules) {
        Ok(modules) => config.modules = modules,
        Err(err) => errors.push(err),
    }
    if let Err(err) = verify_api_security(&config) {
        errors.push(err);
    }

    match errors.len() {
        0 => Ok(config),
        1 => Err(errors.remove(0)),
        _ => {
            let joined = errors.iter().map(|err| err.to_string()).collect::<Vec<_>>().join(", and ");
            Err(ConfigError::Multiple(joined))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_integers_become_ports() {
        assert_eq!(process_net_addr("4280"), ":4280");
        assert_eq!(process_net_addr(":4280"), ":4280");
        assert_eq!(process_net_addr("localhost:4280"), "localhost:4280");
        assert_eq!(process_net_addr("example.com"), "example.com");
    }

    #[test]
    fn module_letters_are_lowered_and_checked() {
        assert_eq!(process_modules("cgtwe").unwrap(), "cgtwe");
        assert_eq!(process_modules("CG").unwrap(), "cg");
        assert_eq!(process_modules("").unwrap(), "");

        assert_eq!(process_modules("cgx"), Err(ConfigError::InvalidModules("x".into())));
        // duplicates are reported as the surplus letters
        assert_eq!(process_modules("ccg"), Err(ConfigError::InvalidModules("c".into())));
    }

    #[test]
    fn api_binding_rules() {
        let loopback = Config { api_addr: "localhost:4280".into(), ..Default::default() };
        verify_api_security(&loopback).unwrap();

        let blank = Config { api_addr: ":4280".into(), ..Default::default() };
        assert_eq!(verify_api_security(&blank), Err(ConfigError::BlankApiHost("4280".into())));

        let exposed = Config { api_addr: "0.0.0.0:4280".into(), ..Default::default() };
        assert_eq!(verify_api_security(&exposed), Err(ConfigError::NonLoopbackApiBind));

        let unauthenticated =
            Config { api_addr: "0.0.0.0:4280".into(), allow_api_bind: true, ..Default::default() };
        assert_eq!(verify_api_security(&unauthenticated), Err(ConfigError::ApiBindWithoutAuthentication));

        let secured = Config {
            api_addr: "0.0.0.0:4280".into(),
            allow_api_bind: true,
            authenticate_api: true,
            ..Default::default()
        };
        verify_api_security(&secured).unwrap();
    }

    #[test]
    fn blank_password_is_rejected_when_authenticating() {
        let config = Config { authenticate_api: true, ..Default::default() };
        assert_eq!(process_config(config), Err(ConfigError::BlankPassword));

        let config =
            Config { authenticate_api: true, api_password: "hunter2".into(), ..Default::default() };
        process_config(config).unwrap();
    }

    #[test]
    fn independent_failures_are_joined() {
        let config = Config { modules: "zz".into(), api_addr: "0.0.0.0:4280".into(), ..Default::default() };
        let err = process_config(config).unwrap_err();
        match err {
            ConfigError::Multiple(joined) => {
                assert!(joined.contains("unrecognized or duplicate"));
                assert!(joined.contains(", and "));
                assert!(joined.contains("--disable-api-security"));
            }
            other => panic!("expected joined error, got {other}"),
        }
    }

    #[test]
    fn addresses_are_coerced_during_processing() {
        let config = Config { rpc_addr: "4281".into(), host_addr: "4282".into(), ..Default::default() };
        let processed = process_config(config).unwrap();
        assert_eq!(processed.rpc_addr, ":4281");
        assert_eq!(processed.host_addr, ":4282");
    }
}
