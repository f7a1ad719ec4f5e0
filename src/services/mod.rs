pub mod aggregator;
pub mod bucket_store;
pub mod classifier;
pub mod composer;
pub mod live;
pub mod router;
pub mod scheduler;
