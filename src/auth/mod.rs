pub mod claims;
pub mod dto;
pub mod extractors;
pub mod google;
pub mod handlers;
pub mod jwt;
pub mod otp;
pub mod password;
pub mod sms;

pub use extractors::{AuthDietologist, AuthUser};
pub use handlers::auth_routes;
pub use jwt::JwtKeys;
