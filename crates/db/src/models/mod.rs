pub mod auth_session;
pub mod date_record;
pub mod judge_account;
pub mod problem;
pub mod solve_record;
pub mod tag_skill;
pub mod user;
