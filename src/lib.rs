pub mod analytics;
pub mod catalog;
pub mod config;
pub mod export;
pub mod model;
pub mod mutation;
pub mod outbox;
pub mod query;
pub mod store;
pub mod unify;
