//! Operator tool: register an OAuth client.
//!
//! Client registration is an admin concern, not an OAuth endpoint, so it
//! lives in this binary. The derived secret is printed once; it can always
//! be re-derived from the client id and the process key.
//!
//! Usage:
//!   register_client <name> <profile> <internal> [options]
//!     <profile>   web | user-agent-based | native
//!     <internal>  true | false
//!     --scope "<tokens>"       space-separated scope (internal defaults to *)
//!     --redirect-uri <url>     repeatable
//!     --domaine <url>          required for web and user-agent-based
//!     --description <text>

use sqlx::mysql::MySqlPoolOptions;

use oauth2_server::config::Config;
use oauth2_server::repositories::OAuthClientRepository;
use oauth2_server::services::client_registry::ClientDraft;
use oauth2_server::utils::secret::SecretDerivation;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let mut args = std::env::args().skip(1);
    let (Some(name), Some(profile), Some(internal)) = (args.next(), args.next(), args.next())
    else {
        eprintln!("usage: register_client <name> <profile> <internal> [options]");
        std::process::exit(2);
    };

    let mut scope = None;
    let mut redirect_uris = Vec::new();
    let mut domaine = None;
    let mut description = None;

    while let Some(flag) = args.next() {
        let value = args
            .next()
            .ok_or_else(|| format!("missing value for {}", flag))?;
        match flag.as_str() {
            "--scope" => scope = Some(value),
            "--redirect-uri" => redirect_uris.push(value),
            "--domaine" => domaine = Some(value),
            "--description" => description = Some(value),
            other => {
                eprintln!("unknown option: {}", other);
                std::process::exit(2);
            }
        }
    }

    let draft = ClientDraft {
        name,
        client_profile: profile.parse().map_err(|e: String| e)?,
        internal: internal.parse()?,
        scope,
        redirect_uris,
        domaine,
        logo: None,
        description,
        legal_terms_accepted_at: None,
    };

    let pool = MySqlPoolOptions::new().connect(&config.database_url).await?;
    let secrets = SecretDerivation::new(config.oauth_hmac_algorithm, &config.oauth_secret_key);

    let client = OAuthClientRepository::new(pool)
        .create(draft, &secrets)
        .await?;

    println!("client_id:     {}", client.client_id);
    println!("client_type:   {}", client.client_type);
    if let Some(secret) = &client.secret_key {
        println!("client_secret: {}", secret);
    }
    println!(
        "grants:        {}",
        client
            .grants
            .iter()
            .map(|g| g.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("scope:         {}", client.scope);

    Ok(())
}
