pub mod jwt;
pub mod password;
pub mod payload;
pub mod pkce;
pub mod secret;
