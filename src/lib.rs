pub mod db {
    pub mod schema_init;
}
pub mod cache;
pub mod config;
pub mod error;
pub mod lock;
pub mod monitoring;
pub mod page;
pub mod search;
pub mod session;

pub use cache::{CacheStore, MemoryCacheStore, RedisCache};
pub use config::AppConfig;
pub use error::{CoreError, CoreResult};
pub use lock::{DistributedLock, LockConfig, LockGuard};
pub use page::{PageContextCache, ResolvedPage};
pub use search::similarity::SimilaritySearch;
pub use session::{SessionHandle, SessionManager, SessionTurn};
