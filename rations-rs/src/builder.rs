//! Provides a builder which sets up and initializes all components.
//!
//! # Example
//! Setting up everything and requesting today's menus:
//! ```no_run
//! # use rations::builder::Builder;
//! # use rations::service::MenuService;
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let platform = Builder::new().enable_all().build().await?;
//!
//!     let service = platform.require::<MenuService>();
//!     let response = service.menus(service.today(), false).await?;
//!     println!("{}", serde_json::to_string_pretty(&response)?);
//!
//!     Ok(())
//! }
//! ```
use std::sync::Arc;

use crate::config::DEFAULT_CONFIG_FILE;
use crate::platform::Platform;
use crate::{init_logging, RATIONS_REVISION, RATIONS_VERSION};

/// Initializes the library by creating and installing the selected components.
pub struct Builder {
    setup_logging: bool,
    enable_signals: bool,
    setup_config: bool,
    config_file: String,
    setup_menus: bool,
    setup_warmer: bool,
}

impl Default for Builder {
    fn default() -> Self {
        Builder::new()
    }
}

impl Builder {
    /// Creates a new builder with all components disabled.
    pub fn new() -> Self {
        Builder {
            setup_logging: false,
            enable_signals: false,
            setup_config: false,
            config_file: DEFAULT_CONFIG_FILE.to_owned(),
            setup_menus: false,
            setup_warmer: false,
        }
    }

    /// Enables all components.
    pub fn enable_all(mut self) -> Self {
        self.setup_logging = true;
        self.enable_signals = true;
        self.setup_config = true;
        self.setup_menus = true;
        self.setup_warmer = true;

        self
    }

    /// Sets up **simplelog** to log to stdout.
    pub fn enable_logging(mut self) -> Self {
        self.setup_logging = true;
        self
    }

    /// Disables the setup of the logging system after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_logging(mut self) -> Self {
        self.setup_logging = false;
        self
    }

    /// Installs a signal listener which terminates the platform once **CTRL-C** or **SIGHUP**
    /// is received.
    ///
    /// For more details see: [signals](crate::signals)
    pub fn enable_signals(mut self) -> Self {
        self.enable_signals = true;
        self
    }

    /// Disables installing the signal listener after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_signals(mut self) -> Self {
        self.enable_signals = false;
        self
    }

    /// Installs a [Config](crate::config::Config) reading **config/settings.yml**.
    pub fn enable_config(mut self) -> Self {
        self.setup_config = true;
        self
    }

    /// Installs a [Config](crate::config::Config) reading the given file.
    pub fn with_config_file(mut self, file: impl Into<String>) -> Self {
        self.setup_config = true;
        self.config_file = file.into();
        self
    }

    /// Creates and installs the [MenuService](crate::service::MenuService).
    pub fn enable_menus(mut self) -> Self {
        self.setup_menus = true;
        self
    }

    /// Warms the menu cache in the background once everything is set up.
    ///
    /// For more details see: [warmer](crate::warmer)
    pub fn enable_warmer(mut self) -> Self {
        self.setup_warmer = true;
        self
    }

    /// Disables the cache warmer after [enable_all()](Builder::enable_all) has been used.
    pub fn disable_warmer(mut self) -> Self {
        self.setup_warmer = false;
        self
    }

    /// Builds the [Platform] with all enabled components being registered.
    ///
    /// Fails if the menu service cannot be created (e.g. if the food database cannot be
    /// opened).
    pub async fn build(self) -> anyhow::Result<Arc<Platform>> {
        let platform = Platform::new();

        if self.setup_logging {
            init_logging();
        }

        log::info!(
            "||. RATIONS (v {} - rev {}) running on {} core(s) in {} CPU(s)",
            RATIONS_VERSION,
            RATIONS_REVISION,
            num_cpus::get(),
            num_cpus::get_physical()
        );

        if self.enable_signals {
            crate::signals::install(platform.clone());
        }

        if self.setup_config {
            let _ = crate::config::install(platform.clone(), &self.config_file).await;
        }

        if self.setup_menus {
            let _ = crate::service::install(platform.clone())?;

            if self.setup_warmer {
                crate::warmer::install(platform.clone());
            }
        }

        Ok(platform)
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::Builder;
    use crate::config::Config;
    use crate::service::MenuService;

    #[test]
    fn components_are_registered() {
        crate::testing::test_async(async {
            let file = std::env::temp_dir().join(format!(
                "rations-builder-{}.yml",
                std::process::id()
            ));
            std::fs::write(&file, "cache:\n    size: 3\nwarmer:\n    enabled: false\n").unwrap();

            let platform = Builder::new()
                .with_config_file(file.to_string_lossy())
                .enable_menus()
                .enable_warmer()
                .build()
                .await
                .unwrap();

            assert_eq!(platform.find::<Config>().is_some(), true);
            assert_eq!(platform.require::<MenuService>().status().capacity, 3);

            platform.terminate();
            assert_eq!(platform.find::<MenuService>().is_none(), true);

            let _ = std::fs::remove_file(&file);
        });
    }
}
