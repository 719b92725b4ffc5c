use serde::Deserialize;
use std::path::PathBuf;

/// Server configuration. Loaded from the TOML file named by
/// `WRITEOFF_CONFIG` (default `writeoff.toml` in the working directory);
/// a missing file falls back to defaults so a dev instance starts bare.
/// The provider secret may also arrive via `WRITEOFF_PROVIDER_SECRET` so it
/// can stay out of the file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_addr: String,
    pub database_path: PathBuf,
    pub provider: ProviderSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub base_url: String,
    pub client_id: String,
    pub secret: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            bind_addr: "127.0.0.1:8787".to_string(),
            database_path: PathBuf::from("writeoff.db"),
            provider: ProviderSettings::default(),
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        ProviderSettings {
            base_url: "https://sandbox.plaid.com".to_string(),
            client_id: String::new(),
            secret: String::new(),
        }
    }
}

impl Settings {
    pub fn load() -> anyhow::Result<Settings> {
        let path = std::env::var("WRITEOFF_CONFIG").unwrap_or_else(|_| "writeoff.toml".to_string());

        let mut settings = match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
            Err(e) => return Err(e.into()),
        };

        if let Ok(secret) = std::env::var("WRITEOFF_PROVIDER_SECRET") {
            settings.provider.secret = secret;
        }

        Ok(settings)
    }
}
