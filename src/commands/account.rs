use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::debug;

use crate::commands::AppContext;
use crate::config::Config;
use crate::output::{mask_key, render_owner};

const API_KEYS_URL: &str = "https://dashboard.render.com/u/settings#api-keys";

pub(crate) async fn login(config: Config, key: Option<String>) -> Result<()> {
    let key = match key {
        Some(key) => key,
        None => {
            println!("Get an API key from {API_KEYS_URL}");
            rpassword::prompt_password("Paste your API key: ").context("Failed to read API key")?
        }
    };
    let key = key.trim().to_string();
    if key.is_empty() {
        bail!("No API key given");
    }

    let mut config = config;
    config.api_key = Some(key.clone());
    let ctx = AppContext::new(config, None)?;

    // Both calls double as the key check
    let services = ctx
        .client
        .list_services(None)
        .await
        .context("Login failed")?;
    let owners = ctx.client.owners().await.context("Login failed")?;
    let user = match ctx.client.whoami().await {
        Ok(user) => Some(user),
        Err(err) => {
            debug!(error = %err, "User lookup failed, using workspace name");
            None
        }
    };

    let mut config = ctx.config;
    let workspace = owners.into_iter().find(|o| !o.id.is_empty());
    config.owner_id = workspace.as_ref().map(|o| o.id.clone());
    config.owner_name = user
        .as_ref()
        .map(|u| u.name.clone())
        .or_else(|| workspace.as_ref().map(|o| o.name.clone()));
    config.email = user
        .and_then(|u| u.email)
        .or_else(|| workspace.and_then(|o| o.email));
    config.login_time = Some(Utc::now());

    let path = config.save()?;
    println!(
        "Logged in as {}. Found {} services.",
        config.owner_name.as_deref().unwrap_or("unknown"),
        services.len()
    );
    println!("Credentials saved to {}", path.display());
    Ok(())
}

pub(crate) fn logout(mut config: Config) -> Result<()> {
    if !config.clear_credentials() {
        println!("Not logged in.");
        return Ok(());
    }
    config.save()?;
    println!("Logged out.");
    Ok(())
}

pub(crate) async fn whoami(ctx: &AppContext) -> Result<()> {
    let user = ctx
        .client
        .whoami()
        .await
        .context("Failed to get user info")?;
    let services = ctx
        .client
        .list_services(None)
        .await
        .context("Failed to list services")?;

    render_owner(
        &user,
        &mask_key(ctx.api_key()),
        ctx.config.login_time,
        services.len(),
    );
    Ok(())
}
