pub mod check;
pub mod common;
pub mod config;
pub mod delete;
pub mod fetch;
pub mod get;
pub mod put;
pub mod show;
pub mod stat;
pub mod submit;
