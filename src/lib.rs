pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod mailer;
pub mod query;
pub mod resources;
pub mod response;
pub mod reviews;
pub mod state;
pub mod storage;
pub mod store;
pub mod tours;
pub mod users;
pub mod views;
