// store

mod session_store;

pub use session_store::*;

// repo

mod identity_repo;

mod repo_tx;

pub use identity_repo::*;

pub use repo_tx::*;

// bus

mod event_publisher;

pub use event_publisher::*;
