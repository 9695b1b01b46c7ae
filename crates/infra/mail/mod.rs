pub mod http_relay;
pub mod logging;
