pub mod backend;
pub mod charts;
pub mod config;
pub mod loader;
pub mod logging;
pub mod messages;
pub mod params;
pub mod retry;
pub mod series;
pub mod sync;
