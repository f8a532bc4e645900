//! Terminates the platform once CTRL+C or SIGHUP is received.
//!
//! Terminating the platform stops the config change monitor and the config listener of the
//! menu service and releases all registered services.
use std::sync::Arc;

use tokio::signal::unix::SignalKind;

use crate::platform::Platform;

/// Installs a signal handler for the given platform.
///
/// Note that this is automatically called by the [Builder](crate::builder::Builder) if enabled.
pub fn install(platform: Arc<Platform>) {
    crate::spawn!(async move {
        let mut sig_hup = match tokio::signal::unix::signal(SignalKind::hangup()) {
            Ok(signal) => signal,
            Err(error) => {
                log::error!("Failed to install a handler for SIGHUP: {}", error);
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::info!("Received CTRL-C. Shutting down...");
                    platform.terminate();
                }
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Received CTRL-C. Shutting down...");
                platform.terminate();
            },
            _ = sig_hup.recv() => {
                log::info!("Received SIGHUP. Shutting down...");
                platform.terminate();
            }
        }
    });
}
