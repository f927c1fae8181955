use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde_derive::Deserialize;

/// Service settings, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,

    /// Render operations allowed to run at once.
    pub max_concurrent: usize,

    /// Give up waiting for a permit after this many milliseconds. Unset means
    /// wait forever.
    pub acquire_timeout_ms: Option<u64>,

    /// Browser binary; probed for when unset.
    pub chrome_path: Option<PathBuf>,

    /// Accept probed binaries without running `--version` on them.
    pub skip_version_check: bool,

    /// JSON file of registry records served by the lookup provider.
    pub registry_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            max_concurrent: 2,
            acquire_timeout_ms: None,
            chrome_path: None,
            skip_version_check: false,
            registry_file: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Builds a config from `PORT`, `MAX_CONCURRENT`, `ACQUIRE_TIMEOUT_MS`,
    /// `CHROME_PATH`, `CHROME_SKIP_VERSION_CHECK` and `REGISTRY_FILE`. Values
    /// that do not parse keep their default.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();

        for (key, value) in vars {
            let value = value.as_ref().trim();
            match key.as_ref() {
                "PORT" => {
                    parse_into(&mut config.port, "PORT", value);
                }
                "MAX_CONCURRENT" => {
                    parse_into(&mut config.max_concurrent, "MAX_CONCURRENT", value);
                }
                "ACQUIRE_TIMEOUT_MS" => {
                    let mut timeout = 0u64;
                    if parse_into(&mut timeout, "ACQUIRE_TIMEOUT_MS", value) && timeout > 0 {
                        config.acquire_timeout_ms = Some(timeout);
                    }
                }
                "CHROME_PATH" if !value.is_empty() => {
                    config.chrome_path = Some(PathBuf::from(value));
                }
                "CHROME_SKIP_VERSION_CHECK" => {
                    config.skip_version_check = matches!(value, "1" | "true" | "yes");
                }
                "REGISTRY_FILE" if !value.is_empty() => {
                    config.registry_file = Some(PathBuf::from(value));
                }
                _ => (),
            }
        }

        if config.max_concurrent == 0 {
            log::warn!("MAX_CONCURRENT must be positive, using 1");
            config.max_concurrent = 1;
        }

        config
    }

    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }
}

fn parse_into<T: FromStr>(slot: &mut T, name: &str, value: &str) -> bool {
    match value.parse() {
        Ok(parsed) => {
            *slot = parsed;
            true
        }
        Err(_) => {
            log::warn!("ignoring unparsable {}={:?}", name, value);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_known_variables() {
        let config = Config::from_vars(vec![
            ("PORT", "8080"),
            ("MAX_CONCURRENT", "4"),
            ("ACQUIRE_TIMEOUT_MS", "1500"),
            ("CHROME_PATH", "/opt/chromium"),
            ("REGISTRY_FILE", "/etc/pdfgate/registry.json"),
            ("CHROME_SKIP_VERSION_CHECK", "1"),
            ("HOME", "/root"),
        ]);

        assert_eq!(config.port, 8080);
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.acquire_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.chrome_path, Some(PathBuf::from("/opt/chromium")));
        assert!(config.skip_version_check);
        assert_eq!(
            config.registry_file,
            Some(PathBuf::from("/etc/pdfgate/registry.json"))
        );
    }

    #[test]
    fn bad_values_keep_defaults() {
        let config = Config::from_vars(vec![
            ("PORT", "eighty"),
            ("MAX_CONCURRENT", "0"),
            ("ACQUIRE_TIMEOUT_MS", "0"),
            ("CHROME_PATH", ""),
        ]);

        assert_eq!(config.port, 3000);
        assert_eq!(config.max_concurrent, 1);
        assert_eq!(config.acquire_timeout(), None);
        assert_eq!(config.chrome_path, None);
        assert!(!config.skip_version_check);
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: Config = serde_json::from_str(r#"{"max_concurrent": 3}"#).unwrap();
        assert_eq!(config.max_concurrent, 3);
        assert_eq!(config.port, 3000);
    }
}
