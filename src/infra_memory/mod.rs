mod event_publisher_memory;
mod identity_repo_memory;
mod session_store_memory;

pub use event_publisher_memory::*;
pub use identity_repo_memory::*;
pub use session_store_memory::*;
