use clap::{Arg, ArgAction, Command};
use std::ffi::OsString;

/// Daemon configuration after argument parsing, before `process_config`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_addr: String,
    pub rpc_addr: String,
    pub host_addr: String,
    pub modules: String,
    pub authenticate_api: bool,
    /// Set by `--disable-api-security`; allows binding the API to a
    /// non-loopback address.
    pub allow_api_bind: bool,
    pub no_bootstrap: bool,
    pub tarn_dir: String,
    pub required_user_agent: String,
    pub profile: bool,
    pub profile_dir: String,
    pub api_password: String,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_addr: "localhost:4280".into(),
            rpc_addr: ":4281".into(),
            host_addr: ":4282".into(),
            modules: "cgtwe".into(),
            authenticate_api: false,
            allow_api_bind: false,
            no_bootstrap: false,
            tarn_dir: ".".into(),
            required_user_agent: "Tarn-Agent".into(),
            profile: false,
            profile_dir: "profiles".into(),
            api_password: String::new(),
            log_level: "info".into(),
        }
    }
}

pub fn cli() -> Command {
    let defaults = Config::default();
    Command::new("tarnd")
        .about("the tarn storage network daemon")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(Arg::new("api-addr").long("api-addr").default_value(defaults.api_addr).help("address the API server listens on"))
        .arg(Arg::new("rpc-addr").long("rpc-addr").default_value(defaults.rpc_addr).help("address the gateway listens on"))
        .arg(Arg::new("host-addr").long("host-addr").default_value(defaults.host_addr).help("address the host listens on"))
        .arg(Arg::new("modules").long("modules").default_value(defaults.modules).help("enabled modules, a subset of cgtwe"))
        .arg(Arg::new("authenticate-api").long("authenticate-api").action(ArgAction::SetTrue).help("enable API password protection"))
        .arg(Arg::new("disable-api-security").long("disable-api-security").action(ArgAction::SetTrue).help("allow binding the API to a non-localhost address"))
        .arg(Arg::new("no-bootstrap").long("no-bootstrap").action(ArgAction::SetTrue).help("do not bootstrap from well-known peers"))
        .arg(Arg::new("tarn-dir").long("tarn-dir").default_value(defaults.tarn_dir).help("location of the tarn data directory"))
        .arg(Arg::new("required-user-agent").long("required-user-agent").default_value(defaults.required_user_agent).help("user agent the API requires from clients"))
        .arg(Arg::new("profile").long("profile").action(ArgAction::SetTrue).help("enable continuous profiling"))
        .arg(Arg::new("profile-dir").long("profile-dir").default_value(defaults.profile_dir).help("location of the profiling directory"))
        .arg(Arg::new("api-password").long("api-password").default_value("").help("password for the authenticated API"))
        .arg(Arg::new("log-level").long("log-level").default_value(defaults.log_level).help("log verbosity"))
}

pub fn parse_from<I, T>(args: I) -> Config
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = cli().get_matches_from(args);
    let get = |name: &str| matches.get_one::<String>(name).cloned().unwrap_or_default();
    Config {
        api_addr: get("api-addr"),
        rpc_addr: get("rpc-addr"),
        host_addr: get("host-addr"),
        modules: get("modules"),
        authenticate_api: matches.get_flag("authenticate-api"),
        allow_api_bind: matches.get_flag("disable-api-security"),
        no_bootstrap: matches.get_flag("no-bootstrap"),
        tarn_dir: get("tarn-dir"),
        required_user_agent: get("required-user-agent"),
        profile: matches.get_flag("profile"),
        profile_dir: get("profile-dir"),
        api_password: get("api-password"),
        log_level: get("log-level"),
    }
}

pub fn parse() -> Config {
    parse_from(std::env::args_os())
}
