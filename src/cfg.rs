pub mod auth;

