pub mod account_link;
pub mod auth;
pub mod problems;
pub mod recommendations;
pub mod records;
pub mod streaks;
pub mod tags;
pub mod users;
