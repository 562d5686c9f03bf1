pub mod admin;
pub mod auth;
pub mod missions;
pub mod vehicles;
