mod audit;
mod session;
mod user;

pub use audit::*;
pub use session::*;
pub use user::*;
