mod account;
mod jobs;
mod logs;
mod services;

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use r4r_api::{RenderClient, RenderSocketConnector};
use r4r_logs::{HistoricalFetcher, LiveTailer, LogStreamManager};
use r4r_types::Service;

use crate::cli::{Cli, Command, TuiArgs};
use crate::config::Config;
use crate::viewer::{self, Target};

/// Everything an authenticated command needs
pub(crate) struct AppContext {
    pub config: Config,
    pub client: RenderClient,
    api_key: String,
}

impl AppContext {
    pub fn new(config: Config, api_key_override: Option<&str>) -> Result<Self> {
        let api_key = config.api_key(api_key_override).ok_or_else(|| {
            anyhow!("Not logged in. Run `r4r login` or set RENDER_API_KEY")
        })?;
        let client = RenderClient::new(&api_key, config.base_url(), config.logs.request_timeout())
            .context("Failed to create API client")?;
        Ok(Self {
            config,
            client,
            api_key,
        })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Resolve a service by name or id
    pub async fn find_service(&self, name_or_id: &str) -> Result<Service> {
        self.client
            .find_service(name_or_id)
            .await
            .context("Failed to list services")?
            .ok_or_else(|| {
                anyhow!("Service '{name_or_id}' not found (run `r4r list` to see available services)")
            })
    }

    /// Workspace that log queries are scoped to
    async fn owner_id(&self) -> Result<Option<String>> {
        if let Some(owner_id) = &self.config.owner_id {
            return Ok(Some(owner_id.clone()));
        }
        let owner_id = self
            .client
            .owner_id()
            .await
            .context("Failed to look up workspace")?;
        debug!(?owner_id, "Resolved workspace");
        Ok(owner_id)
    }

    /// Build the log pipeline from the configured settings
    pub async fn stream_manager(&self) -> Result<LogStreamManager> {
        let settings = &self.config.logs;
        let owner_id = self.owner_id().await?;

        let transport = self.client.clone().with_owner_id(owner_id.clone());
        let connector = RenderSocketConnector::new(&self.api_key, self.config.stream_url())
            .context("Invalid stream URL")?
            .with_owner_id(owner_id)
            .with_limit(settings.page_size)
            .with_connect_timeout(settings.request_timeout());

        let fetcher = HistoricalFetcher::new(Arc::new(transport))
            .with_page_timeout(settings.request_timeout());
        let tailer = LiveTailer::new(Arc::new(connector), fetcher.clone())
            .with_poll_interval(settings.poll_interval())
            .with_poll_page_size(settings.page_size)
            .with_backoff(settings.backoff());

        Ok(LogStreamManager::from_parts(fetcher, tailer).with_page_size(settings.page_size))
    }
}

pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let Cli {
        api_key, command, ..
    } = cli;

    match command {
        // These work without stored credentials
        Command::Login { key } => account::login(config, key.or(api_key)).await,
        Command::Logout => account::logout(config),
        command => {
            let ctx = AppContext::new(config, api_key.as_deref())?;
            dispatch(&ctx, command).await
        }
    }
}

async fn dispatch(ctx: &AppContext, command: Command) -> Result<()> {
    match command {
        Command::Login { .. } | Command::Logout => Ok(()),
        Command::Whoami => account::whoami(ctx).await,
        Command::List(args) => services::list(ctx, args).await,
        Command::Info { service } => services::info(ctx, &service).await,
        Command::Deploy(args) => services::deploy(ctx, args).await,
        Command::Rebuild(args) => services::deploy(ctx, args.into()).await,
        Command::Deploys { service, limit } => services::deploys(ctx, &service, limit).await,
        Command::Job(args) => jobs::create(ctx, args).await,
        Command::Jobs { service, limit } => jobs::list(ctx, &service, limit).await,
        Command::Status { job_id } => jobs::status(ctx, &job_id).await,
        Command::Logs(args) => logs::run(ctx, args).await,
        Command::Tui(args) => tui(ctx, args).await,
    }
}

async fn tui(ctx: &AppContext, args: TuiArgs) -> Result<()> {
    let target = match args.service {
        Some(name) => Target::Service(ctx.find_service(&name).await?),
        None if !args.resources.is_empty() => Target::Resources(args.resources),
        None => Target::Pick,
    };
    viewer::run(ctx, target).await
}
