pub mod account;
pub mod auth;
pub mod forms;
pub mod health;
pub mod team;
