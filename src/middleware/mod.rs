pub mod logging;
pub mod rate_limit;
pub mod upstream_auth;
