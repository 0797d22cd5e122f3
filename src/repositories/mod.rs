pub mod access_token;
pub mod authorization_code;
pub mod oauth_client;
pub mod refresh_token;
pub mod user;

pub use access_token::AccessTokenRepository;
pub use authorization_code::AuthorizationCodeRepository;
pub use oauth_client::OAuthClientRepository;
pub use refresh_token::RefreshTokenRepository;
pub use user::UserRepository;
