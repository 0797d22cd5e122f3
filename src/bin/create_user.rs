//! Operator tool: create a resource owner for the password grant and the
//! login dialog.
//!
//! Usage:
//!   create_user <username> <password> [scope]

use sqlx::mysql::MySqlPoolOptions;

use oauth2_server::repositories::UserRepository;
use oauth2_server::utils::password::hash_password;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")?;

    let mut args = std::env::args().skip(1);
    let (Some(username), Some(password)) = (args.next(), args.next()) else {
        eprintln!("usage: create_user <username> <password> [scope]");
        std::process::exit(2);
    };
    let scope = args.next().unwrap_or_else(|| "*".to_string());

    let pool = MySqlPoolOptions::new().connect(&database_url).await?;
    let password_hash = hash_password(&password)?;

    let user = UserRepository::new(pool)
        .create(&username, &password_hash, &scope)
        .await?;

    println!("user_id:  {}", user.id);
    println!("username: {}", user.username);
    println!("scope:    {}", user.scope);

    Ok(())
}
