use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::time::sleep;

use crate::cli::JobArgs;
use crate::commands::AppContext;
use crate::output::{render_job_detail, render_job_list};

const JOB_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub(crate) async fn create(ctx: &AppContext, args: JobArgs) -> Result<()> {
    let service = ctx.find_service(&args.service).await?;
    println!("Creating job for {}: {}", service.name, args.command);

    let job = ctx
        .client
        .create_job(&service.id, &args.command)
        .await
        .context("Failed to create job")?;
    println!("Job created: {}", job.id);

    if !args.wait {
        return Ok(());
    }

    let mut last_status = job.status.clone();
    let finished = loop {
        sleep(JOB_POLL_INTERVAL).await;
        let current = ctx
            .client
            .get_job(&job.id)
            .await
            .context("Failed to check job status")?;
        if current.status != last_status {
            println!("  status: {}", current.status);
            last_status = current.status.clone();
        }
        if current.is_finished() {
            break current;
        }
    };

    if finished.status != "succeeded" {
        bail!("Job {} ended as {}", finished.id, finished.status);
    }
    println!("Job {} succeeded", finished.id);
    Ok(())
}

pub(crate) async fn list(ctx: &AppContext, name_or_id: &str, limit: u32) -> Result<()> {
    let service = ctx.find_service(name_or_id).await?;
    let jobs = ctx
        .client
        .list_jobs(&service.id, limit)
        .await
        .context("Failed to list jobs")?;

    if jobs.is_empty() {
        println!("No jobs found for {}", service.name);
        return Ok(());
    }

    println!("Jobs for {} (last {})", service.name, jobs.len());
    render_job_list(&jobs);
    Ok(())
}

pub(crate) async fn status(ctx: &AppContext, job_id: &str) -> Result<()> {
    let job = ctx
        .client
        .get_job(job_id)
        .await
        .with_context(|| format!("Failed to get job {job_id}"))?;
    render_job_detail(&job);
    Ok(())
}
