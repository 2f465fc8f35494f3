pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod form;
pub mod logging;
pub mod question;
pub mod responses;
pub mod storage;
pub mod submit;
