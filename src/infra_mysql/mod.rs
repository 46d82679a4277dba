mod identity_repo_mysql;

pub use identity_repo_mysql::*;

mod repo_tx_mysql;

pub use repo_tx_mysql::*;
