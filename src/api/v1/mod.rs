mod cookie;
mod error;
mod handler;
mod router;

pub use cookie::{REFRESH_COOKIE, cleared_refresh_cookie, refresh_cookie};
pub use error::recover_error;
pub use router::routes;
