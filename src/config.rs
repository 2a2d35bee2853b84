use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub robot: RobotConfig,
    pub http: HttpConfig,
    pub profile: Profile,
}

#[derive(Debug, Clone)]
pub struct RobotConfig {
    /// `host` or `host:port` of the remote robot service
    pub host: String,
    pub credentials: Credentials,
    pub board_name: String,
    pub dial_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub port: u16,
    pub serve_static: bool,
    /// Serve the front-end from this directory instead of the bundled page.
    pub static_dir: Option<PathBuf>,
    /// Upper bound on a single remote get/set. `None` leaves the call bounded
    /// only by the inbound request.
    pub pin_call_timeout: Option<Duration>,
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    LocationSecret(String),
    ApiKey { id: String, key: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Production,
    Development,
}

impl Credentials {
    pub fn scheme(&self) -> &'static str {
        match self {
            Credentials::LocationSecret(_) => "robot-location-secret",
            Credentials::ApiKey { .. } => "api-key",
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Credentials::LocationSecret(secret) => secret.is_empty(),
            Credentials::ApiKey { id, key } => id.is_empty() || key.is_empty(),
        }
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::LocationSecret(_) => f.write_str("LocationSecret(***)"),
            Credentials::ApiKey { id, .. } => {
                f.debug_struct("ApiKey").field("id", id).field("key", &"***").finish()
            }
        }
    }
}

impl Profile {
    pub fn default_log_filter(self) -> &'static str {
        match self {
            Profile::Production => "info",
            Profile::Development => "debug",
        }
    }
}

const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_DIAL_TIMEOUT_SECS: u64 = 30;

/// Lookup source for configuration values. Empty values count as absent.
pub trait Vars {
    fn get(&self, key: &str) -> Option<String>;
}

impl<F> Vars for F
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        self(key)
    }
}

fn env_required(vars: &impl Vars, key: &str) -> Result<String, String> {
    env_optional(vars, key).ok_or_else(|| format!("{key} environment variable is required"))
}

fn env_optional(vars: &impl Vars, key: &str) -> Option<String> {
    vars.get(key).filter(|v| !v.is_empty())
}

fn env_or_default<T: std::str::FromStr>(vars: &impl Vars, key: &str, default: T) -> Result<T, String> {
    match env_optional(vars, key) {
        Some(v) => v.parse().map_err(|_| format!("{key} has an invalid value: {v}")),
        None => Ok(default),
    }
}

fn env_bool(vars: &impl Vars, key: &str, default: bool) -> Result<bool, String> {
    match env_optional(vars, key).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(format!("{key} has an invalid value: {v}")),
    }
}

/// Load `.env` from the working directory into the process environment.
/// Variables already set win. Returns false when there is no such file.
pub fn load_dotenv() -> Result<bool, String> {
    load_dotenv_from(Path::new(".env"))
}

fn load_dotenv_from(path: &Path) -> Result<bool, String> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(e) => Err(format!("Error loading {}: {e}", path.display())),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_vars(&|key: &str| env::var(key).ok())
    }

    pub fn from_vars(vars: &impl Vars) -> Result<Self, String> {
        let profile = match env_optional(vars, "RDK_PROFILE").as_deref() {
            Some("development") => Profile::Development,
            _ => Profile::Production,
        };

        let dial_timeout_secs: u64 =
            env_or_default(vars, "RDK_DIAL_TIMEOUT_SECS", DEFAULT_DIAL_TIMEOUT_SECS)?;
        let pin_call_timeout = env_optional(vars, "RDK_PIN_CALL_TIMEOUT_SECS")
            .map(|v| {
                v.parse::<u64>()
                    .map_err(|_| format!("RDK_PIN_CALL_TIMEOUT_SECS has an invalid value: {v}"))
            })
            .transpose()?;

        let config = Self {
            robot: RobotConfig {
                host: env_required(vars, "RDK_ROBOT_HOSTNAME")?,
                credentials: load_credentials(vars)?,
                board_name: env_required(vars, "RDK_ROBOT_BOARD_NAME")?,
                dial_timeout: Duration::from_secs(dial_timeout_secs),
            },
            http: HttpConfig {
                port: env_or_default(vars, "RDK_HTTP_PORT", DEFAULT_HTTP_PORT)?,
                serve_static: env_bool(vars, "RDK_SERVE_STATIC", true)?,
                static_dir: env_optional(vars, "RDK_STATIC_DIR").map(PathBuf::from),
                pin_call_timeout: pin_call_timeout.map(Duration::from_secs),
            },
            profile,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.robot.host.is_empty() {
            return Err("RDK_ROBOT_HOSTNAME must not be empty".into());
        }
        if self.robot.credentials.is_empty() {
            return Err("robot credentials must not be empty".into());
        }
        if self.robot.board_name.is_empty() {
            return Err("RDK_ROBOT_BOARD_NAME must not be empty".into());
        }
        if self.robot.dial_timeout.is_zero() {
            return Err("RDK_DIAL_TIMEOUT_SECS must be > 0".into());
        }
        if self.http.pin_call_timeout.is_some_and(|t| t.is_zero()) {
            return Err("RDK_PIN_CALL_TIMEOUT_SECS must be > 0".into());
        }
        Ok(())
    }
}

/// API-key pair when an id is present, otherwise the location secret.
fn load_credentials(vars: &impl Vars) -> Result<Credentials, String> {
    if let Some(id) = env_optional(vars, "RDK_ROBOT_API_KEY_ID") {
        let key = env_required(vars, "RDK_ROBOT_API_KEY")?;
        return Ok(Credentials::ApiKey { id, key });
    }
    match env_optional(vars, "RDK_ROBOT_LOCATION_SECRET") {
        Some(secret) => Ok(Credentials::LocationSecret(secret)),
        None => Err(
            "RDK_ROBOT_LOCATION_SECRET or RDK_ROBOT_API_KEY_ID/RDK_ROBOT_API_KEY environment variables are required"
                .into(),
        ),
    }
}
