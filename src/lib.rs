pub mod demo_feed;
pub mod events;
pub mod format;
pub mod http_cache;
pub mod http_client;
pub mod logging;
pub mod model;
pub mod odds;
pub mod odds_api;
