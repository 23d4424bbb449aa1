pub mod analyzer;
pub mod dto;
pub mod handlers;
pub mod repo;
pub mod services;

pub use handlers::meal_routes;
