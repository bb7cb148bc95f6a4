//! Text rendering for shell output.

use agent_cli_jobs::{Job, JobState};
use serde_json::Value;

const PROMPT_PREVIEW: usize = 48;
const RESULT_PREVIEW: usize = 120;

/// Truncate on a char boundary, appending `…` when shortened.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{cut}…")
}

/// One row of `/jobs`.
pub fn job_line(job: &Job) -> String {
    let summary = &job.request_summary;
    let replica = if summary.replication > 1 {
        format!(" [{}/{}]", summary.replica, summary.replication)
    } else {
        String::new()
    };
    format!(
        "#{:<4} {:<10} {:<16} {:<12} {}{}",
        job.id,
        job.state.as_str(),
        summary.profile,
        job.remote.name,
        preview(&summary.prompt, PROMPT_PREVIEW),
        replica,
    )
}

pub fn jobs_table(jobs: &[Job]) -> String {
    if jobs.is_empty() {
        return "No jobs.".to_string();
    }
    let mut out = format!(
        "{:<5} {:<10} {:<16} {:<12} {}",
        "ID", "STATE", "PROFILE", "REMOTE", "PROMPT"
    );
    for job in jobs {
        out.push('\n');
        out.push_str(&job_line(job));
    }
    out
}

/// `/requests`: a remote's request ledger, newest first.
pub fn requests_table(records: &[Value]) -> String {
    if records.is_empty() {
        return "No requests.".to_string();
    }
    let mut out = format!(
        "{:<6} {:<20} {:<16} {:<10} {:<12} {:<12} {}",
        "ID", "TIMESTAMP", "METHOD", "STATUS", "ORG", "REPO", "PROMPT"
    );
    for record in records.iter().rev() {
        out.push('\n');
        out.push_str(&format!(
            "{:<6} {:<20} {:<16} {:<10} {:<12} {:<12} {}",
            field(record, "id"),
            field(record, "timestamp"),
            field(record, "method"),
            field(record, "status"),
            field(record, "org"),
            field(record, "repo"),
            preview(&field(record, "prompt"), PROMPT_PREVIEW),
        ));
    }
    out
}

fn field(record: &Value, key: &str) -> String {
    match record.get(key) {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Full detail for `/job <id>`.
pub fn job_detail(job: &Job) -> String {
    serde_json::to_string_pretty(job).unwrap_or_else(|e| format!("{job:?} ({e})"))
}

/// One-line notice for a job that reached a terminal state.
pub fn outcome(job: &Job) -> String {
    let head = format!("[job {}] {}", job.id, job.state);
    match (job.state, &job.error, &job.result) {
        (JobState::Succeeded, _, Some(result)) => {
            format!("{head}: {}", preview(result, RESULT_PREVIEW))
        }
        (_, Some(error), _) => format!("{head}: {error}"),
        _ => head,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_cli_core::RemoteEndpoint;
    use agent_cli_jobs::{ErrorInfo, ErrorKind, RequestSummary};

    fn job(id: u64, state: JobState) -> Job {
        Job {
            id,
            request_summary: RequestSummary {
                profile: "open_hands".into(),
                model: "gpt-4".into(),
                prompt: "add retries to the\nupload client".into(),
                org: None,
                repo: None,
                replica: 2,
                replication: 3,
            },
            remote: RemoteEndpoint::new("gpu-box", "10.0.0.5", 8000),
            state,
            created_at: "2026-03-01T09:30:00Z".parse().unwrap(),
            started_at: None,
            last_polled_at: None,
            finished_at: None,
            external_token: None,
            result: None,
            error: None,
            retry_count: 0,
        }
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("one\ntwo   three", 20), "one two three");
        assert_eq!(preview("abcdefghij", 5), "abcd…");
    }

    #[test]
    fn test_job_line() {
        let line = job_line(&job(3, JobState::Running));
        assert!(line.starts_with("#3    running"));
        assert!(line.contains("open_hands"));
        assert!(line.contains("gpu-box"));
        assert!(line.ends_with("add retries to the upload client [2/3]"));
    }

    #[test]
    fn test_empty_table() {
        assert_eq!(jobs_table(&[]), "No jobs.");
    }

    #[test]
    fn test_requests_table_newest_first() {
        let records = vec![
            serde_json::json!({
                "id": 1,
                "timestamp": "2026-03-01T09:00:00",
                "method": "aider",
                "status": "completed",
                "prompt": "bump deps",
                "org": "acme",
                "repo": null,
            }),
            serde_json::json!({"id": 2, "status": "running", "prompt": "fix CI"}),
        ];
        let table = requests_table(&records);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("ID"));
        assert!(lines[1].starts_with("2 "));
        assert!(lines[1].contains("running"));
        assert!(lines[1].ends_with("fix CI"));
        assert!(lines[2].starts_with("1 "));
        assert!(lines[2].contains("aider"));
        assert!(lines[2].contains("acme"));
        assert!(lines[2].ends_with("bump deps"));
        assert_eq!(requests_table(&[]), "No requests.");
    }

    #[test]
    fn test_outcome_success() {
        let mut done = job(4, JobState::Succeeded);
        done.result = Some("opened PR #19".into());
        assert_eq!(outcome(&done), "[job 4] succeeded: opened PR #19");
    }

    #[test]
    fn test_outcome_failure() {
        let mut failed = job(5, JobState::Failed);
        failed.error = Some(ErrorInfo::new(ErrorKind::SubmissionFailure, "HTTP 503"));
        assert_eq!(outcome(&failed), "[job 5] failed: SubmissionFailure: HTTP 503");
    }
}
