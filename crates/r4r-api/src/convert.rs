//! Conversions from Render JSON payloads into r4r types

use serde_json::Value;

use r4r_types::{Deploy, Job, Owner, Service, ServiceStatus, parse_timestamp};

/// Pull resource items out of a list response
///
/// List endpoints return `[{ "<key>": {...}, "cursor": "..." }, ...]`; some
/// return a bare array of items or an object keyed by the plural name.
pub(crate) fn extract_items<'a>(data: &'a Value, key: &str) -> Vec<&'a Value> {
    match data {
        Value::Array(items) => items
            .iter()
            .filter(|item| item.get(key).is_some() || item.get("id").is_some())
            .map(|item| item.get(key).unwrap_or(item))
            .collect(),
        Value::Object(map) => map
            .get(&format!("{key}s"))
            .and_then(Value::as_array)
            .map(|items| items.iter().collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn str_field(data: &Value, key: &str) -> Option<String> {
    data.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn time_field(data: &Value, key: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    data.get(key).and_then(Value::as_str).and_then(parse_timestamp)
}

/// `repo` is either a plain URL string or an object with a `url` field
fn repo_url(data: &Value) -> Option<String> {
    match data.get("repo")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(_) => data.get("repo").and_then(|r| str_field(r, "url")),
        _ => None,
    }
}

pub(crate) fn service_from_json(data: &Value) -> Service {
    let mut service = Service::new(
        str_field(data, "id").unwrap_or_default(),
        str_field(data, "name").unwrap_or_default(),
    );

    if let Some(kind) = str_field(data, "type") {
        service.kind = kind;
    }
    service.status = data
        .get("suspended")
        .and_then(Value::as_str)
        .map(ServiceStatus::from)
        .unwrap_or(ServiceStatus::Unknown);
    service.auto_deploy = match data.get("autoDeploy") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "yes",
        _ => false,
    };
    service.branch = str_field(data, "branch");
    service.repo = repo_url(data);
    service.slug = str_field(data, "slug");
    service.url = str_field(data, "url").or_else(|| {
        data.get("serviceDetails")
            .and_then(|details| str_field(details, "url"))
    });
    service.region = str_field(data, "region").or_else(|| {
        data.get("serviceDetails")
            .and_then(|details| str_field(details, "region"))
    });
    service.plan = str_field(data, "plan").or_else(|| {
        data.get("serviceDetails")
            .and_then(|details| str_field(details, "plan"))
    });
    service.created_at = time_field(data, "createdAt");
    service.updated_at = time_field(data, "updatedAt");

    service
}

pub(crate) fn deploy_from_json(data: &Value) -> Deploy {
    let mut deploy = Deploy::new(
        str_field(data, "id").unwrap_or_default(),
        str_field(data, "status").unwrap_or_else(|| "unknown".to_string()),
    );

    if let Some(commit) = data.get("commit").filter(|c| c.is_object()) {
        deploy.commit_id = str_field(commit, "id");
        deploy.commit_message = str_field(commit, "message");
    }
    deploy.created_at = time_field(data, "createdAt");
    deploy.finished_at = time_field(data, "finishedAt");

    deploy
}

pub(crate) fn job_from_json(data: &Value) -> Job {
    let mut job = Job::new(
        str_field(data, "id").unwrap_or_default(),
        str_field(data, "serviceId").unwrap_or_default(),
        str_field(data, "startCommand").unwrap_or_default(),
    );

    if let Some(status) = str_field(data, "status") {
        job.status = status;
    }
    job.created_at = time_field(data, "createdAt");
    job.finished_at = time_field(data, "finishedAt");

    job
}

pub(crate) fn owner_from_json(data: &Value) -> Owner {
    Owner {
        id: str_field(data, "id").unwrap_or_default(),
        name: str_field(data, "name").unwrap_or_default(),
        email: str_field(data, "email"),
        kind: str_field(data, "type").unwrap_or_else(|| "user".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_items_envelope() {
        let data = json!([
            { "service": { "id": "srv-1" }, "cursor": "a" },
            { "service": { "id": "srv-2" }, "cursor": "b" }
        ]);
        let items = extract_items(&data, "service");
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["id"], "srv-2");
    }

    #[test]
    fn test_extract_items_plural_key() {
        let data = json!({ "deploys": [{ "id": "dep-1" }] });
        let items = extract_items(&data, "deploy");
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_service_status_and_repo() {
        let service = service_from_json(&json!({
            "id": "srv-1",
            "name": "api",
            "type": "web_service",
            "suspended": "not_suspended",
            "autoDeploy": "yes",
            "repo": { "url": "https://github.com/acme/api" },
            "createdAt": "2024-03-01T10:00:00Z"
        }));
        assert_eq!(service.status, ServiceStatus::Active);
        assert!(service.auto_deploy);
        assert_eq!(service.repo.as_deref(), Some("https://github.com/acme/api"));
        assert!(service.created_at.is_some());

        let suspended = service_from_json(&json!({ "id": "srv-2", "suspended": "suspended", "autoDeploy": true, "repo": "git@x" }));
        assert_eq!(suspended.status, ServiceStatus::Suspended);
        assert!(suspended.auto_deploy);
        assert_eq!(suspended.repo.as_deref(), Some("git@x"));

        let unknown = service_from_json(&json!({ "id": "srv-3" }));
        assert_eq!(unknown.status, ServiceStatus::Unknown);
    }

    #[test]
    fn test_deploy_commit() {
        let deploy = deploy_from_json(&json!({
            "id": "dep-1",
            "status": "live",
            "commit": { "id": "abc123", "message": "fix" },
            "createdAt": "2024-03-01T10:00:00Z",
            "finishedAt": "2024-03-01T10:03:00Z"
        }));
        assert_eq!(deploy.commit_id.as_deref(), Some("abc123"));
        assert_eq!(deploy.duration().map(|d| d.num_seconds()), Some(180));
    }
}
