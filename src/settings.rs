use serde_derive::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_REPORT_PASSWORD: &str = "Qu1m3rr4_";

/// Runtime settings, read once at startup from an optional settings file
/// overlaid with environment variables (`PORT`, `HOST`, `REPORT_PASSWORD`,
/// `DATABASE_URL`, `PGSSLMODE`, `DB_PATH`, `EVENT_NAME`).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub port: u16,
    pub host: String,
    pub report_password: String,
    /// Selects the PostgreSQL backend when present.
    pub database_url: Option<String>,
    pub pgsslmode: Option<String>,
    pub db_path: PathBuf,
    pub event_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            port: 3000,
            host: "0.0.0.0".to_owned(),
            report_password: DEFAULT_REPORT_PASSWORD.to_owned(),
            database_url: None,
            pgsslmode: None,
            db_path: PathBuf::from("rsvps.db"),
            event_name: "Confirmação de presença".to_owned(),
        }
    }
}

impl Settings {
    pub fn load(settings_file: &str) -> Result<Settings, config::ConfigError> {
        Self::load_from(settings_file, config::Environment::default())
    }

    fn load_from(
        settings_file: &str,
        environment: config::Environment,
    ) -> Result<Settings, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(settings_file).required(false))
            .add_source(environment.ignore_empty(true))
            .build()?
            .try_deserialize::<Settings>()?;
        Ok(settings.normalized())
    }

    // Blank values (e.g. `DATABASE_URL=`) count as unset, in the file too.
    fn normalized(mut self) -> Settings {
        if self.report_password.is_empty() {
            self.report_password = DEFAULT_REPORT_PASSWORD.to_owned();
        }
        self.database_url = self.database_url.filter(|url| !url.trim().is_empty());
        self.pgsslmode = self.pgsslmode.filter(|mode| !mode.trim().is_empty());
        self
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn postgres_tls(&self) -> bool {
        self.pgsslmode.as_deref() != Some("disable")
    }

    pub fn uses_default_password(&self) -> bool {
        self.report_password == DEFAULT_REPORT_PASSWORD
    }
}
