mod event_publisher_impl;
mod rate_limit;
mod server;

pub use event_publisher_impl::*;
pub use rate_limit::*;
pub use server::*;
