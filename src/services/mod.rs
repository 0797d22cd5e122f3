pub mod auth;
pub mod client_registry;
pub mod oauth;
pub mod scope;
pub mod token;

pub use auth::UserAuthService;
pub use oauth::OAuthService;
pub use token::TokenFactory;
