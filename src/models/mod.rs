pub mod bucket;
pub mod event;
pub mod health;
pub mod message;
pub mod outbound;
pub mod preference;
pub mod response;
pub mod retry;
pub mod schedule;
pub mod status;
