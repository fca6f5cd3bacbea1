use std::io::{self, BufRead, IsTerminal, Write};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::time::{Instant, sleep};
use tracing::debug;

use r4r_types::Deploy;

use crate::cli::{DeployArgs, ListArgs};
use crate::commands::AppContext;
use crate::output::{render_deploy_list, render_service_detail, render_service_list};

const DEPLOY_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub(crate) async fn list(ctx: &AppContext, args: ListArgs) -> Result<()> {
    let mut services = ctx
        .client
        .list_services(None)
        .await
        .context("Failed to list services")?;

    if let Some(kind) = &args.kind {
        services.retain(|s| s.kind.eq_ignore_ascii_case(kind));
    }
    if let Some(limit) = args.limit {
        services.truncate(limit);
    }

    if services.is_empty() {
        match &args.kind {
            Some(kind) => println!("No services found with type '{kind}'"),
            None => println!("No services found"),
        }
        return Ok(());
    }

    render_service_list(&services, args.detailed);
    Ok(())
}

pub(crate) async fn info(ctx: &AppContext, name_or_id: &str) -> Result<()> {
    let service = ctx.find_service(name_or_id).await?;
    let details = ctx
        .client
        .get_service(&service.id)
        .await
        .context("Failed to get service details")?;
    let deploys = ctx
        .client
        .list_deploys(&service.id, 5)
        .await
        .context("Failed to list deploys")?;

    render_service_detail(&details, &deploys);
    Ok(())
}

pub(crate) async fn deploy(ctx: &AppContext, args: DeployArgs) -> Result<()> {
    let service = ctx.find_service(&args.service).await?;
    let verb = if args.clear_cache {
        "Deploying with cache clear"
    } else {
        "Deploying"
    };
    println!("{verb}: {}", service.name);

    if !args.yes && !confirm("Continue?")? {
        println!("Cancelled");
        return Ok(());
    }

    let deploy = ctx
        .client
        .trigger_deploy(&service.id, args.clear_cache)
        .await
        .context("Deploy failed")?;
    println!("Deploy started: {}", deploy.id);

    if !args.wait {
        println!("Watch progress: https://dashboard.render.com/web/{}", service.id);
        return Ok(());
    }

    let timeout = Duration::from_secs(args.timeout_minutes.max(1) * 60);
    let finished = wait_for_deploy(ctx, &service.id, &deploy.id, timeout).await?;
    if finished.is_failed() {
        bail!("Deploy {} ended as {}", finished.id, finished.status);
    }
    println!("Deploy {} is live", finished.id);
    Ok(())
}

/// Poll until the deploy is live or has failed
async fn wait_for_deploy(
    ctx: &AppContext,
    service_id: &str,
    deploy_id: &str,
    timeout: Duration,
) -> Result<Deploy> {
    let deadline = Instant::now() + timeout;
    let mut last_status = String::new();

    loop {
        let deploy = ctx
            .client
            .get_deploy(service_id, deploy_id)
            .await
            .context("Failed to check deploy status")?;

        if deploy.status != last_status {
            println!("  status: {}", deploy.status);
            last_status = deploy.status.clone();
        }
        if deploy.is_live() || deploy.is_failed() {
            return Ok(deploy);
        }
        if Instant::now() + DEPLOY_POLL_INTERVAL > deadline {
            bail!(
                "Timed out after {} minutes waiting for deploy {deploy_id} (last status: {last_status})",
                timeout.as_secs() / 60
            );
        }

        debug!(deploy_id, status = %deploy.status, "Deploy still running");
        sleep(DEPLOY_POLL_INTERVAL).await;
    }
}

pub(crate) async fn deploys(ctx: &AppContext, name_or_id: &str, limit: u32) -> Result<()> {
    let service = ctx.find_service(name_or_id).await?;
    let deploys = ctx
        .client
        .list_deploys(&service.id, limit)
        .await
        .context("Failed to list deploys")?;

    if deploys.is_empty() {
        println!("No deploys found for {}", service.name);
        return Ok(());
    }

    println!("Deploys for {} (last {})", service.name, deploys.len());
    render_deploy_list(&deploys);
    Ok(())
}

/// Ask a yes/no question on the terminal; anything but yes declines
fn confirm(prompt: &str) -> Result<bool> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        bail!("Confirmation required; pass --yes to run non-interactively");
    }
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    read_confirmation(stdin.lock())
}

fn read_confirmation(mut input: impl BufRead) -> Result<bool> {
    let mut answer = String::new();
    input.read_line(&mut answer).context("Failed to read confirmation")?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
