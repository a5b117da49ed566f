#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod enrich;
pub mod import;
pub mod price_monitor;
pub(crate) mod progress;
pub mod store;

pub use enrich::{EnrichReport, Enricher};
pub use price_monitor::{MonitorReport, NewsApiClient, NewsSource, PriceMonitor};
pub use store::CatalogStore;
