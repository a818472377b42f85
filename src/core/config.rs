use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "TENDER_PILOT_CONFIG";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const CAPTCHA_KEY_ENV: &str = "CAPTCHA_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserConfig,
    pub portal: PortalConfig,
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
    pub alerts: AlertConfig,
    pub paths: PathsConfig,
    pub database: DatabaseConfig,
    pub captcha: CaptchaConfig,
    pub clients: Vec<ClientPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport: Viewport,
    pub user_agent: Option<String>,
    pub disable_images: bool,
    pub args: Vec<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub home_url: String,
    pub search_url: String,
    /// Title shown once the session is authenticated.
    pub authenticated_title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub element_timeout_ms: u64,
    pub min_strategy_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub document_ready_timeout_ms: u64,
    pub async_idle_timeout_ms: u64,
    pub symbol_timeout_ms: u64,
    pub alert_poll_ms: u64,
    pub settle_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub login_attempts: u32,
    /// The standalone login check makes a single attempt unless told otherwise.
    pub login_only_attempts: u32,
    pub login_retry_delay_ms: u64,
    pub alert_attempts: u32,
    pub page_change: TransitionPolicy,
    pub wizard_step: TransitionPolicy,
}

/// Bounded retry with a linearly growing pause between attempts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransitionPolicy {
    pub max_attempts: u32,
    pub indicator_timeout_ms: u64,
    pub initial_delay_ms: u64,
    pub delay_step_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub critical_keywords: Vec<String>,
    pub login_keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub status_dir: PathBuf,
    pub documents_root: PathBuf,
    pub artifacts_dir: PathBuf,
    pub users_cache: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub fallback_url: Option<String>,
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptchaConfig {
    pub api_base: String,
    pub api_key: String,
    pub initial_wait_ms: u64,
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
}

/// Behavior switched per client organization, keyed by its RUT.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ClientPolicy {
    pub rut: String,
    pub artifacts_dir: Option<PathBuf>,
    pub unit_keyword: Option<String>,
    pub verbose_documents: bool,
}

impl Config {
    /// Reads a TOML file, falling back to defaults for anything it omits.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&raw)?;
        config.apply_env();
        Ok(config)
    }

    /// Explicit path first, then `TENDER_PILOT_CONFIG`, then built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => {
                let mut config = Config::default();
                config.apply_env();
                Ok(config)
            }
        }
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            self.database.url = url;
        }
        if let Ok(key) = std::env::var(CAPTCHA_KEY_ENV) {
            self.captcha.api_key = key;
        }
    }

    pub fn client_policy(&self, rut: &str) -> ClientPolicy {
        self.clients
            .iter()
            .find(|policy| policy.rut == rut)
            .cloned()
            .unwrap_or_else(|| ClientPolicy {
                rut: rut.to_string(),
                ..Default::default()
            })
    }

    pub fn artifacts_dir_for(&self, rut: &str) -> PathBuf {
        self.client_policy(rut)
            .artifacts_dir
            .unwrap_or_else(|| self.paths.artifacts_dir.clone())
    }
}

impl TimeoutConfig {
    pub fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl TransitionPolicy {
    pub fn indicator_timeout(&self) -> Duration {
        Duration::from_millis(self.indicator_timeout_ms)
    }

    /// Pause before attempt `attempt` (1-based); the first attempt waits
    /// `initial_delay_ms`, every later one adds `delay_step_ms` up to the cap.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        let grown = self
            .initial_delay_ms
            .saturating_add(self.delay_step_ms.saturating_mul(attempt.saturating_sub(1) as u64));
        Duration::from_millis(grown.min(self.max_delay_ms))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser: BrowserConfig::default(),
            portal: PortalConfig::default(),
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
            alerts: AlertConfig::default(),
            paths: PathsConfig::default(),
            database: DatabaseConfig::default(),
            captcha: CaptchaConfig::default(),
            clients: vec![
                ClientPolicy {
                    rut: "76285229-2".to_string(),
                    artifacts_dir: Some(PathBuf::from("/home/coordinador/galenicum/")),
                    unit_keyword: None,
                    verbose_documents: true,
                },
                ClientPolicy {
                    rut: "80621200-8".to_string(),
                    artifacts_dir: Some(PathBuf::from("/home/coordinador/merck/")),
                    unit_keyword: Some("farma".to_string()),
                    verbose_documents: false,
                },
            ],
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport::default(),
            user_agent: None,
            disable_images: false,
            args: vec![],
            timeout_ms: 30000,
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            home_url: "https://www.mercadopublico.cl".to_string(),
            search_url: "https://www.mercadopublico.cl/BID/Modules/RFB/NEwSearchProcurement.aspx"
                .to_string(),
            authenticated_title: "Mercado publico la nueva plataforma de licitaciones de ChileCompra"
                .to_string(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            element_timeout_ms: 30000,
            min_strategy_timeout_ms: 2000,
            poll_interval_ms: 250,
            document_ready_timeout_ms: 60000,
            async_idle_timeout_ms: 10000,
            symbol_timeout_ms: 15000,
            alert_poll_ms: 3000,
            settle_delay_ms: 2000,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            login_attempts: 30,
            login_only_attempts: 1,
            login_retry_delay_ms: 5000,
            alert_attempts: 3,
            page_change: TransitionPolicy {
                max_attempts: 5,
                indicator_timeout_ms: 30000,
                initial_delay_ms: 5000,
                delay_step_ms: 3000,
                max_delay_ms: 20000,
            },
            wizard_step: TransitionPolicy::default(),
        }
    }
}

impl Default for TransitionPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            indicator_timeout_ms: 20000,
            initial_delay_ms: 2000,
            delay_step_ms: 2000,
            max_delay_ms: 10000,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        let owned = |words: &[&str]| words.iter().map(|w| w.to_string()).collect();
        Self {
            critical_keywords: owned(&[
                "error",
                "intente nuevamente",
                "credenciales",
                "usuario o contraseña",
                "acceso denegado",
                "ha ocurrido un error",
                "sesión expirada",
                "tiempo agotado",
                "connection",
                "network",
                "servidor no disponible",
            ]),
            login_keywords: owned(&[
                "error al iniciar sesión",
                "intenta nuevamente",
                "credenciales incorrectas",
                "usuario o contraseña",
                "acceso denegado",
            ]),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            status_dir: PathBuf::from("/var/www/html/CRONJOBS"),
            documents_root: PathBuf::from("/var/www/html/PYTHON/scraping/imagenes/carga_documentos"),
            artifacts_dir: PathBuf::from("/home/coordinador/"),
            users_cache: PathBuf::from("/var/www/html/CRONJOBS/users_cache.json"),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "mysql://localhost:3306/postulaciones".to_string(),
            fallback_url: None,
            connect_timeout_ms: 10000,
        }
    }
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            api_base: "https://2captcha.com".to_string(),
            api_key: String::new(),
            initial_wait_ms: 20000,
            poll_interval_ms: 5000,
            timeout_ms: 180000,
        }
    }
}
