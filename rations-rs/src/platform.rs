//! Provides a tiny registry which keeps all central components of the process.
//!
//! The platform is more or less a map which keeps all central components (the [Config](crate::config::Config),
//! the [MenuService](crate::service::MenuService)) as **Arc<T>** around. It also holds the
//! central **is_running** flag which is toggled to *false* once [Platform::terminate] is invoked.
//! Background tasks (like the config change monitor) poll this flag and stop once it is cleared.
//!
//! Note that once the shutdown is initiated, the internal map is cleared. Code which might run
//! after [Platform::terminate] was called should therefore use [Platform::find] and handle the
//! **None** case instead of calling [Platform::require].
//!
//! # Examples
//!
//! ```
//! # use std::sync::Arc;
//! # use rations::platform::Platform;
//! struct Service {
//!     value: i32
//! }
//!
//! struct UnknownService;
//!
//! let platform = Platform::new();
//! platform.register::<Service>(Arc::new(Service { value: 42 }));
//!
//! assert_eq!(platform.require::<Service>().value, 42);
//! assert_eq!(platform.find::<UnknownService>().is_none(), true);
//! assert_eq!(platform.is_running(), true);
//!
//! // Once terminated, all services are released...
//! platform.terminate();
//! assert_eq!(platform.find::<Service>().is_none(), true);
//! assert_eq!(platform.is_running(), false);
//! ```
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Keeps all central services in a single place.
pub struct Platform {
    services: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    is_running: AtomicBool,
}

type Services = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

impl Platform {
    /// Creates a new platform instance.
    pub fn new() -> Arc<Self> {
        Arc::new(Platform {
            services: Mutex::new(HashMap::new()),
            is_running: AtomicBool::new(true),
        })
    }

    fn services(&self) -> MutexGuard<'_, Services> {
        self.services.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a service. A previously registered service of the same type is replaced.
    pub fn register<T>(&self, service: Arc<T>)
    where
        T: Any + Send + Sync,
    {
        let _ = self.services().insert(TypeId::of::<T>(), service);
    }

    /// Tries to resolve a previously registered service.
    pub fn find<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.services()
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.clone().downcast::<T>().ok())
    }

    /// Resolves a previously registered service.
    ///
    /// # Panics
    /// Panics if the requested service isn't available or if the platform is already shutting
    /// down.
    ///
    /// ```should_panic
    /// # use rations::platform::Platform;
    /// struct UnknownService;
    ///
    /// let platform = Platform::new();
    /// platform.require::<UnknownService>();
    /// ```
    pub fn require<T>(&self) -> Arc<T>
    where
        T: Any + Send + Sync,
    {
        if !self.is_running() {
            panic!(
                "A required component ({}) has been requested but the system is already shutting down!",
                std::any::type_name::<T>()
            )
        }

        match self.find::<T>() {
            Some(service) => service,
            None => panic!(
                "A required component ({}) was not available in the platform registry!",
                std::any::type_name::<T>()
            ),
        }
    }

    /// Determines if the platform is still running or if [Platform::terminate] has already
    /// been called.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Terminates the platform.
    ///
    /// This releases all services and toggles the [is_running()](Platform::is_running) flag to
    /// **false**.
    pub fn terminate(&self) {
        self.services().clear();
        self.is_running.store(false, Ordering::Release);
    }
}
