//! Application context providing the dependency injection root.

use std::sync::Arc;

use crate::config::Config;
use crate::di::Context as ContextDerive;
use crate::repositories::RepositoryGateway;

/// Shared handle to the repository every service talks to.
pub type AppGateway = Arc<dyn RepositoryGateway>;

/// Root application context for dependency injection.
///
/// `#[derive(Context)]` generates a `FromRef` implementation for each field,
/// so services deriving `FromContext` can be built straight from a context.
#[derive(ContextDerive, Clone)]
pub struct Context {
    /// Repository gateway shared by all services.
    pub gateway: AppGateway,
    /// Application configuration.
    pub config: Arc<Config>,
}

impl Context {
    pub fn new(gateway: AppGateway, config: Config) -> Self {
        Self {
            gateway,
            config: Arc::new(config),
        }
    }

    /// Builds any service that derives `FromContext`.
    pub fn resolve<T: crate::FromRef<Self>>(&self) -> T {
        T::from_ref(self)
    }
}
