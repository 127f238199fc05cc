pub mod account_link;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod judge_api;
pub mod profile_sync;
pub mod recommendation;
pub mod records;
pub mod streak;
