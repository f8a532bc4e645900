//! Contains the system configuration.
//!
//! The configuration is loaded from a YAML file (**config/settings.yml** by default). The file
//! is observed for changes and re-loaded once a change is detected. Therefore each user of the
//! config should attach itself to the [Config::notifier](Config::notifier) and re-process the
//! config once a change message is received. This way the cache can be re-dimensioned without
//! restarting the process.
//!
//! Note that the **Config** struct can be obtained from the **Platform** once and then kept
//! around. However, the handle returned by **Config::current()** should not be stored, as it
//! will not be updated once a new config has been loaded.
//!
//! # Examples
//!
//! Reading a value:
//! ```
//! # use rations::config::Config;
//! let config = Config::new("settings.yml");
//! config.load_from_string("
//! cache:
//!     size: 128
//! ", None).unwrap();
//!
//! let size = config.current().query("cache.size").as_int().unwrap_or(64);
//! assert_eq!(size, 128);
//! ```
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwap;
use yaml_rust::{Yaml, YamlLoader};

use crate::fmt::parse_duration;
use crate::platform::Platform;

/// The config file used if nothing else is specified.
pub const DEFAULT_CONFIG_FILE: &str = "config/settings.yml";

/// Provides access to the system configuration.
///
/// Most probably a config instance is installed by the [Builder](crate::builder::Builder) and
/// can be obtained via `platform.require::<Config>()`.
pub struct Config {
    filename: String,
    tx: tokio::sync::broadcast::Sender<()>,
    config: ArcSwap<(Yaml, Option<SystemTime>)>,
}

/// Represents the change listener.
///
/// Internally this is simply the receiver of a broadcast. The message itself carries no
/// information. Once it has been received, the config was changed and needs to be re-processed.
pub type ChangeNotifier = tokio::sync::broadcast::Receiver<()>;

/// Represents a handle to the currently loaded configuration.
pub struct Handle {
    config: Arc<(Yaml, Option<SystemTime>)>,
}

/// Represents a value within the configuration, which might also be absent.
#[derive(Copy, Clone, Debug)]
pub struct Setting<'a> {
    value: Option<&'a Yaml>,
}

impl Config {
    /// Creates a new config reading the given file.
    ///
    /// Note that this neither loads the file nor installs a change listener. This is done by
    /// the [install](install) function.
    pub fn new(file: &str) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(1);
        Config {
            filename: file.to_owned(),
            config: ArcSwap::new(Arc::new((Yaml::Null, None))),
            tx,
        }
    }

    /// Obtains a change notifier which receives a message once the config changed.
    pub fn notifier(&self) -> ChangeNotifier {
        self.tx.subscribe()
    }

    /// Obtains a handle to the currently loaded configuration.
    pub fn current(&self) -> Handle {
        Handle {
            config: self.config.load_full(),
        }
    }

    #[cfg(not(test))]
    async fn last_modified(&self) -> Option<SystemTime> {
        tokio::fs::metadata(&self.filename)
            .await
            .ok()
            .filter(|meta| meta.is_file())
            .and_then(|meta| meta.modified().ok())
    }

    /// Reads the underlying file.
    ///
    /// A missing file is not an error, as every setting has a sensible default.
    pub async fn load(&self) -> anyhow::Result<()> {
        match tokio::fs::metadata(&self.filename).await {
            Ok(metadata) if metadata.is_file() => (),
            _ => {
                log::info!(
                    "Config file {} doesn't exist - using the defaults.",
                    &self.filename
                );
                return Ok(());
            }
        }

        log::info!("Loading config file {}...", &self.filename);
        let config_data = tokio::fs::read_to_string(&self.filename)
            .await
            .map_err(|error| {
                anyhow::anyhow!("Cannot load config file {}: {}", &self.filename, error)
            })?;

        let last_modified = tokio::fs::metadata(&self.filename)
            .await
            .ok()
            .and_then(|metadata| metadata.modified().ok());

        self.load_from_string(config_data.as_str(), last_modified)
    }

    /// Loads a configuration from the given string instead of a file.
    ///
    /// If the data cannot be parsed, an error is returned and the previous configuration
    /// remains active.
    ///
    /// # Example
    ///
    /// ```
    /// # use rations::config::Config;
    /// let config = Config::new("somefile.yml");
    /// config.load_from_string("menus:\n    retries: 5", None).unwrap();
    /// assert_eq!(config.current().query("menus.retries").as_int(), Some(5));
    ///
    /// assert_eq!(config.load_from_string("menus: 'broken", None).is_err(), true);
    /// assert_eq!(config.current().query("menus.retries").as_int(), Some(5));
    /// ```
    pub fn load_from_string(
        &self,
        data: &str,
        last_modified: Option<SystemTime>,
    ) -> anyhow::Result<()> {
        let docs = YamlLoader::load_from_str(data).map_err(|error| {
            anyhow::anyhow!("Cannot parse config file {}: {}", &self.filename, error)
        })?;

        let doc = match docs.into_iter().next() {
            Some(doc @ Yaml::Hash(_)) => doc,
            Some(Yaml::Null) | None => Yaml::Null,
            Some(_) => {
                return Err(anyhow::anyhow!(
                    "Cannot use config file {}: Expected a map of settings at the top level",
                    &self.filename
                ))
            }
        };

        self.config.store(Arc::new((doc, last_modified)));

        // Notify all listeners - we ignore if there are none...
        let _ = self.tx.send(());

        Ok(())
    }
}

impl Handle {
    /// Returns the root of the configuration.
    pub fn root(&self) -> Setting<'_> {
        Setting {
            value: Some(&self.config.0),
        }
    }

    /// Resolves a dotted path like "cache.ttl" against the configuration.
    pub fn query(&self, path: impl AsRef<str>) -> Setting<'_> {
        self.root().query(path)
    }
}

impl<'a> Setting<'a> {
    /// Resolves a dotted path relative to this setting.
    pub fn query(&self, path: impl AsRef<str>) -> Setting<'a> {
        path.as_ref()
            .split('.')
            .filter(|key| !key.is_empty())
            .fold(*self, |setting, key| setting.get(key))
    }

    /// Returns the child with the given key if this setting is a map.
    pub fn get(&self, key: &str) -> Setting<'a> {
        let value = match self.value {
            Some(Yaml::Hash(map)) => map.get(&Yaml::String(key.to_owned())),
            _ => None,
        };

        Setting { value }
    }

    /// Determines if a (non null) value is present.
    pub fn is_present(&self) -> bool {
        !matches!(self.value, None | Some(Yaml::Null) | Some(Yaml::BadValue))
    }

    /// Returns the value as string. Numbers and booleans are not converted.
    pub fn as_str(&self) -> Option<&'a str> {
        self.value.and_then(Yaml::as_str)
    }

    /// Returns the value as integer.
    pub fn as_int(&self) -> Option<i64> {
        self.value.and_then(Yaml::as_i64)
    }

    /// Returns the value as boolean.
    pub fn as_bool(&self) -> Option<bool> {
        self.value.and_then(Yaml::as_bool)
    }

    /// Interprets the value as duration.
    ///
    /// Strings are parsed by [parse_duration], plain integers are treated as milliseconds.
    /// Returns **None** if no value is present and an error if the value is malformed.
    ///
    /// # Example
    ///
    /// ```
    /// # use rations::config::Config;
    /// # use std::time::Duration;
    /// let config = Config::new("somefile.yml");
    /// config.load_from_string("ttl: 15m\nfallback: 250\nbroken: soon", None).unwrap();
    ///
    /// let handle = config.current();
    /// assert_eq!(handle.query("ttl").as_duration().unwrap(), Some(Duration::from_secs(900)));
    /// assert_eq!(handle.query("fallback").as_duration().unwrap(), Some(Duration::from_millis(250)));
    /// assert_eq!(handle.query("missing").as_duration().unwrap(), None);
    /// assert_eq!(handle.query("broken").as_duration().is_err(), true);
    /// ```
    pub fn as_duration(&self) -> anyhow::Result<Option<Duration>> {
        match self.value {
            None | Some(Yaml::Null) => Ok(None),
            Some(Yaml::String(value)) => parse_duration(value).map(Some),
            Some(Yaml::Integer(millis)) if *millis >= 0 => {
                Ok(Some(Duration::from_millis(*millis as u64)))
            }
            Some(other) => Err(anyhow::anyhow!("Cannot use {:?} as duration", other)),
        }
    }

    /// Returns the elements if this setting is a list.
    pub fn elements(&self) -> Vec<Setting<'a>> {
        match self.value {
            Some(Yaml::Array(elements)) => elements
                .iter()
                .map(|value| Setting { value: Some(value) })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Returns all string keys and their values if this setting is a map, in file order.
    pub fn entries(&self) -> Vec<(&'a str, Setting<'a>)> {
        match self.value {
            Some(Yaml::Hash(map)) => map
                .iter()
                .filter_map(|(key, value)| {
                    key.as_str().map(|key| (key, Setting { value: Some(value) }))
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Creates and installs a **Config** for the given platform.
///
/// This will read the given file and also install a change listener for it. Note that this
/// listener only watches the "last modified" date of the file and will not perform a
/// structural comparison. Therefore it is the duty of each config user to gracefully handle
/// partial config changes.
pub async fn install(platform: Arc<Platform>, file: &str) -> Arc<Config> {
    if let Some(parent) = Path::new(file).parent().filter(|dir| !dir.as_os_str().is_empty()) {
        if let Err(error) = tokio::fs::create_dir_all(parent).await {
            log::warn!(
                "Failed to create config base directory {}: {}",
                parent.to_string_lossy(),
                error
            )
        }
    }

    let config = Arc::new(Config::new(file));
    platform.register::<Config>(config.clone());

    if let Err(error) = config.load().await {
        log::error!("{}", error);
    }

    run_config_change_monitor(platform, config.clone());

    config
}

#[cfg(test)]
fn run_config_change_monitor(_platform: Arc<Platform>, _config: Arc<Config>) {
    // No automatic updates during testing...
}

#[cfg(not(test))]
fn run_config_change_monitor(platform: Arc<Platform>, config: Arc<Config>) {
    crate::spawn!(async move {
        while platform.is_running() {
            tokio::time::sleep(Duration::from_secs(2)).await;

            // None if the file is absent...
            let last_modified = config.last_modified().await;

            // None if nothing has been loaded so far...
            let last_loaded = config.config.load().1;

            if last_modified.is_some() && (last_loaded.is_none() || last_modified > last_loaded) {
                match config.load().await {
                    Ok(_) => log::info!("System configuration was re-loaded."),
                    Err(error) => log::error!("Failed to re-load system config: {}", error),
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use std::time::SystemTime;

    #[test]
    fn ensure_config_update_works() {
        crate::testing::test_async(async {
            let config = Config::new("settings.yml");
            config
                .load_from_string("test: 42", Some(SystemTime::now()))
                .unwrap();

            let mut change_notifier = config.notifier();
            let (tx, rx) = tokio::sync::oneshot::channel();
            let _ = tokio::spawn(async move {
                if change_notifier.recv().await.is_ok() {
                    let _ = tx.send(());
                }
            });

            // A malformed config is rejected and the previous one is kept...
            assert_eq!(
                config
                    .load_from_string("test: 'invalid", Some(SystemTime::now()))
                    .is_err(),
                true
            );
            assert_eq!(config.current().query("test").as_int().unwrap(), 42);

            config
                .load_from_string("test: 4242", Some(SystemTime::now()))
                .unwrap();

            assert_eq!(rx.await.is_ok(), true);
            assert_eq!(config.current().query("test").as_int().unwrap(), 4242);
        });
    }

    #[test]
    fn nested_values_can_be_queried() {
        let config = Config::new("settings.yml");
        config
            .load_from_string(
                "
menus:
    ignore: [Beverages, Desserts]
    halls:
        Burge:
            school: burge-market
            meals: [breakfast, lunch, dinner-3]
        Catlett:
            school: catlett-market-place
            meals: [lunch-2]
warmer:
    enabled: false
",
                None,
            )
            .unwrap();

        let handle = config.current();
        assert_eq!(
            handle
                .query("menus.ignore")
                .elements()
                .iter()
                .filter_map(|setting| setting.as_str())
                .collect::<Vec<_>>(),
            vec!["Beverages", "Desserts"]
        );

        let halls = handle.query("menus.halls").entries();
        assert_eq!(
            halls.iter().map(|(hall, _)| *hall).collect::<Vec<_>>(),
            vec!["Burge", "Catlett"]
        );
        assert_eq!(halls[0].1.query("school").as_str(), Some("burge-market"));
        assert_eq!(halls[1].1.query("meals").elements().len(), 1);

        assert_eq!(handle.query("warmer.enabled").as_bool(), Some(false));
        assert_eq!(handle.query("warmer.days").is_present(), false);
        assert_eq!(handle.query("menus.halls.Burge.unknown.deep").is_present(), false);
    }

    #[test]
    fn empty_and_non_map_documents() {
        let config = Config::new("settings.yml");
        assert_eq!(config.load_from_string("", None).is_ok(), true);
        assert_eq!(config.current().query("cache.size").is_present(), false);

        assert_eq!(config.load_from_string("- just\n- a list", None).is_err(), true);
    }
}
