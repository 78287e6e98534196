pub mod partition;
pub mod pool;
pub mod ptr;

pub use partition::partition;
pub use pool::{default_thread_count, join_all, TaskError, TaskHandle, ThreadPool};
pub use ptr::{SendConstPtr, SendMutPtr};
