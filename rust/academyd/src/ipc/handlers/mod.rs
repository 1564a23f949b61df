pub mod auth;
pub mod backup;
pub mod classes;
pub mod core;
pub mod fixtures;
pub mod portal;
pub mod students;
pub mod teachers;
