//! Plain-text renderers for command output

use chrono::{DateTime, Duration, Utc};

use r4r_types::{Deploy, Job, Owner, Service};

const NA: &str = "N/A";

pub(crate) fn render_service_list(services: &[Service], detailed: bool) {
    if detailed {
        println!(
            "{:<24} {:<12} {:<10} {:<10} {:<10} {:<10} URL",
            "NAME", "TYPE", "STATUS", "REGION", "PLAN", "CREATED"
        );
    } else {
        println!("{:<24} {:<12} {:<10} URL", "NAME", "TYPE", "STATUS");
    }

    for service in services {
        let name = truncate(&service.name, 24);
        let kind = service_kind_label(&service.kind);
        let url = service_url(service).unwrap_or_else(|| NA.to_string());
        if detailed {
            println!(
                "{:<24} {:<12} {:<10} {:<10} {:<10} {:<10} {}",
                name,
                truncate(&kind, 12),
                service.status.as_str(),
                service.region.as_deref().unwrap_or(NA),
                service.plan.as_deref().unwrap_or(NA),
                service
                    .created_at
                    .map(|t| t.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| NA.to_string()),
                url
            );
        } else {
            println!(
                "{:<24} {:<12} {:<10} {}",
                name,
                truncate(&kind, 12),
                service.status.as_str(),
                url
            );
        }
    }
}

pub(crate) fn render_service_detail(service: &Service, deploys: &[Deploy]) {
    println!("name: {}", service.name);
    println!("id: {}", service.id);
    println!("type: {}", service_kind_label(&service.kind));
    println!("status: {}", service.status.as_str());
    println!("region: {}", service.region.as_deref().unwrap_or(NA));
    println!("plan: {}", service.plan.as_deref().unwrap_or(NA));
    println!(
        "url: {}",
        service_url(service).unwrap_or_else(|| NA.to_string())
    );
    if let Some(repo) = &service.repo {
        match &service.branch {
            Some(branch) => println!("repo: {repo} ({branch})"),
            None => println!("repo: {repo}"),
        }
    }
    println!("auto deploy: {}", if service.auto_deploy { "yes" } else { "no" });
    println!("created: {}", format_time(service.created_at));

    if !deploys.is_empty() {
        println!();
        println!("recent deploys:");
        render_deploy_rows(deploys, "  ");
    }
}

pub(crate) fn render_deploy_list(deploys: &[Deploy]) {
    render_deploy_rows(deploys, "");
}

fn render_deploy_rows(deploys: &[Deploy], indent: &str) {
    println!(
        "{indent}{:<20} {:<20} {:<20} {:>10} {:<8} MESSAGE",
        "ID", "STATUS", "STARTED", "DURATION", "COMMIT"
    );
    for deploy in deploys {
        let commit = deploy
            .commit_id
            .as_deref()
            .map(|c| truncate(c, 8))
            .unwrap_or_else(|| NA.to_string());
        let message = deploy
            .commit_message
            .as_deref()
            .and_then(|m| m.lines().next())
            .map(|m| truncate(m, 40))
            .unwrap_or_default();
        println!(
            "{indent}{:<20} {:<20} {:<20} {:>10} {:<8} {}",
            truncate(&deploy.id, 20),
            deploy.status,
            format_time(deploy.created_at),
            deploy.duration().map(format_duration).unwrap_or_else(|| NA.to_string()),
            commit,
            message
        );
    }
}

pub(crate) fn render_job_list(jobs: &[Job]) {
    println!(
        "{:<20} {:<30} {:<10} {:<20} {:>10}",
        "ID", "COMMAND", "STATUS", "CREATED", "DURATION"
    );
    for job in jobs {
        println!(
            "{:<20} {:<30} {:<10} {:<20} {:>10}",
            truncate(&job.id, 20),
            truncate(&job.start_command, 30),
            job.status,
            format_time(job.created_at),
            job_duration(job, Utc::now())
                .map(format_duration)
                .unwrap_or_else(|| NA.to_string())
        );
    }
}

pub(crate) fn render_job_detail(job: &Job) {
    println!("id: {}", job.id);
    if !job.service_id.is_empty() {
        println!("service: {}", job.service_id);
    }
    println!("command: {}", job.start_command);
    println!("status: {}", job.status);
    println!("created: {}", format_time(job.created_at));
    println!("finished: {}", format_time(job.finished_at));
    if let Some(duration) = job_duration(job, Utc::now()) {
        println!("duration: {}", format_duration(duration));
    }
}

pub(crate) fn render_owner(owner: &Owner, key_hint: &str, login_time: Option<DateTime<Utc>>, services: usize) {
    println!("user: {}", owner.name);
    println!("email: {}", owner.email.as_deref().unwrap_or(NA));
    println!("api key: {key_hint}");
    println!("logged in: {}", format_time(login_time));
    println!("services: {services}");
}

/// Service URL from the payload, or the default onrender.com host
pub(crate) fn service_url(service: &Service) -> Option<String> {
    service
        .url
        .clone()
        .or_else(|| service.slug.as_ref().map(|slug| format!("https://{slug}.onrender.com")))
}

/// `web_service` → `Web Service`
pub(crate) fn service_kind_label(kind: &str) -> String {
    kind.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// First eight characters followed by an ellipsis
pub(crate) fn mask_key(key: &str) -> String {
    let visible: String = key.chars().take(8).collect();
    format!("{visible}...")
}

pub(crate) fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| NA.to_string())
}

/// `H:MM:SS`, or `MM:SS` under an hour
pub(crate) fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// Finished jobs report their run time; running ones report time so far
pub(crate) fn job_duration(job: &Job, now: DateTime<Utc>) -> Option<Duration> {
    let start = job.created_at?;
    let end = match job.finished_at {
        Some(end) => end,
        None if !job.is_finished() => now,
        None => return None,
    };
    (end >= start).then(|| end - start)
}

pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{keep}...")
}
