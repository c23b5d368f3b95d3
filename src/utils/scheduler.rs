use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::config::Config;
use crate::error::BotResult;

/// Trait for component schedulers that drive periodic work
pub trait Scheduler: Send + Sync + Sized + 'static {
    /// The type of handle used by this scheduler
    type Handle: Clone + Send + Sync + 'static;

    /// Start the scheduler, returning the running instance
    fn start(
        config: Arc<Config>,
        handle: Self::Handle,
    ) -> Pin<Box<dyn Future<Output = BotResult<Self>> + Send>>;

    /// Stop the scheduler gracefully
    fn stop(&self) -> Pin<Box<dyn Future<Output = BotResult<()>> + Send + '_>>;
}
