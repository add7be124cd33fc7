use std::time::Duration;

use async_trait::async_trait;
use octocrab::service::middleware::retry::RetryConfig as OctocrabRetry;
use serde::Deserialize;
use speccheck_core::{GitHubConfig, SpecCheckError};

use crate::retry::{AttemptError, RetryPolicy};
use crate::tracker::{Issue, IssueTracker, PullRequest, ReviewDisposition};

const DEFAULT_API_BASE: &str = "https://api.github.com";

const CONVERT_TO_DRAFT: &str = "\
mutation($id: ID!) {
  convertPullRequestToDraft(input: { pullRequestId: $id }) {
    pullRequest { isDraft }
  }
}";

#[derive(Deserialize)]
struct IssueResponse {
    number: u64,
    body: Option<String>,
}

#[derive(Deserialize)]
struct PullResponse {
    number: u64,
    node_id: String,
    body: Option<String>,
    user: UserResponse,
}

#[derive(Deserialize)]
struct UserResponse {
    login: String,
}

/// GitHub client for fetching issues, pull requests and diffs, and for
/// taking review actions.
///
/// REST calls go through `octocrab`; the diff is fetched with a plain
/// `reqwest` request because it needs a non-JSON `Accept` header. Every call
/// is wrapped in the configured [`RetryPolicy`].
pub struct GitHubClient {
    octocrab: octocrab::Octocrab,
    http: reqwest::Client,
    token: String,
    api_base: String,
    retry: RetryPolicy,
}

impl GitHubClient {
    /// Create a client from configuration, falling back to the `GITHUB_TOKEN`
    /// or `GH_TOKEN` environment variables for the token.
    ///
    /// # Errors
    ///
    /// Returns [`SpecCheckError::Config`] if no token is available, or
    /// [`SpecCheckError::GitHub`] if the client cannot be built.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use speccheck_core::GitHubConfig;
    /// use speccheck_review::github::GitHubClient;
    /// use speccheck_review::retry::RetryPolicy;
    ///
    /// let config = GitHubConfig { token: Some("ghp_xxxx".into()), ..GitHubConfig::default() };
    /// let client = GitHubClient::new(&config, RetryPolicy::no_retry()).unwrap();
    /// ```
    pub fn new(config: &GitHubConfig, retry: RetryPolicy) -> Result<Self, SpecCheckError> {
        let token = match &config.token {
            Some(t) => t.clone(),
            None => std::env::var("GITHUB_TOKEN")
                .or_else(|_| std::env::var("GH_TOKEN"))
                .map_err(|_| {
                    SpecCheckError::Config(
                        "GITHUB_TOKEN not set. Set GITHUB_TOKEN or github.token in .speccheck.toml"
                            .into(),
                    )
                })?,
        };
        let api_base = config
            .api_base
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/')
            .to_string();
        let timeout = Duration::from_secs(config.timeout_secs);

        let octocrab = octocrab::Octocrab::builder()
            .personal_token(token.clone())
            .base_uri(api_base.as_str())
            .map_err(|e| SpecCheckError::GitHub(format!("invalid GitHub API base: {e}")))?
            .set_read_timeout(Some(timeout))
            .add_retry_config(OctocrabRetry::None)
            .build()
            .map_err(|e| SpecCheckError::GitHub(format!("failed to create GitHub client: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SpecCheckError::GitHub(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            octocrab,
            http,
            token,
            api_base,
            retry,
        })
    }

    async fn get_json<R>(&self, route: &str) -> Result<R, SpecCheckError>
    where
        R: serde::de::DeserializeOwned,
    {
        let octocrab = &self.octocrab;
        self.retry
            .run(route, move || async move {
                let response: Result<R, octocrab::Error> = octocrab.get(route, None::<&()>).await;
                response.map_err(|e| classify(e, route, Access::Read))
            })
            .await
    }

    async fn post_json(&self, route: &str, body: &serde_json::Value) -> Result<(), SpecCheckError> {
        let octocrab = &self.octocrab;
        self.retry
            .run(route, move || async move {
                let response: Result<serde_json::Value, octocrab::Error> =
                    octocrab.post(route, Some(body)).await;
                response
                    .map(|_| ())
                    .map_err(|e| classify(e, route, Access::Write))
            })
            .await
    }

    async fn diff_once(&self, url: &str) -> Result<String, AttemptError> {
        let response = self
            .http
            .get(url)
            .header("Accept", "application/vnd.github.v3.diff")
            .header("User-Agent", "speccheck")
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| {
                AttemptError::transient(SpecCheckError::GitHub(format!(
                    "failed to fetch PR diff: {e}"
                )))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::from_status(
                status.as_u16(),
                SpecCheckError::GitHub(format!("GitHub API error {status}: {body}")),
            ));
        }

        response.text().await.map_err(|e| {
            AttemptError::transient(SpecCheckError::GitHub(format!(
                "failed to read diff response: {e}"
            )))
        })
    }
}

/// Whether a request may be repeated without side effects.
#[derive(Clone, Copy)]
enum Access {
    Read,
    Write,
}

/// Map an octocrab failure to an attempt outcome.
///
/// A write that timed out or lost its connection may already have been
/// applied, so only a 429 on a write is retried.
fn classify(error: octocrab::Error, route: &str, access: Access) -> AttemptError {
    match &error {
        octocrab::Error::GitHub { source, .. } => {
            let status = source.status_code.as_u16();
            let error = SpecCheckError::GitHub(format!(
                "{route}: {} ({})",
                source.message, source.status_code
            ));
            match access {
                Access::Read => AttemptError::from_status(status, error),
                Access::Write => AttemptError::from_write_status(status, error),
            }
        }
        _ => {
            let error = SpecCheckError::GitHub(format!("{route}: {error}"));
            match access {
                Access::Read => AttemptError::transient(error),
                Access::Write => AttemptError::permanent(error),
            }
        }
    }
}

#[async_trait]
impl IssueTracker for GitHubClient {
    async fn fetch_issue(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Issue, SpecCheckError> {
        let route = format!("/repos/{owner}/{repo}/issues/{number}");
        let issue: IssueResponse = self.get_json(&route).await?;
        Ok(Issue {
            number: issue.number,
            body: issue.body,
        })
    }

    async fn fetch_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PullRequest, SpecCheckError> {
        let route = format!("/repos/{owner}/{repo}/pulls/{number}");
        let pull: PullResponse = self.get_json(&route).await?;
        Ok(PullRequest {
            number: pull.number,
            node_id: pull.node_id,
            body: pull.body,
            author: pull.user.login,
        })
    }

    async fn fetch_diff(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<String, SpecCheckError> {
        let url = format!("{}/repos/{owner}/{repo}/pulls/{number}", self.api_base);
        let this = self;
        let url = url.as_str();
        self.retry
            .run("pull request diff", move || async move {
                this.diff_once(url).await
            })
            .await
    }

    async fn post_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<(), SpecCheckError> {
        let route = format!("/repos/{owner}/{repo}/issues/{number}/comments");
        self.post_json(&route, &serde_json::json!({ "body": body }))
            .await
    }

    async fn set_draft(&self, node_id: &str) -> Result<(), SpecCheckError> {
        let payload = serde_json::json!({
            "query": CONVERT_TO_DRAFT,
            "variables": { "id": node_id },
        });
        let octocrab = &self.octocrab;
        let payload = &payload;
        let response: serde_json::Value = self
            .retry
            .run("convert to draft", move || async move {
                let response: Result<serde_json::Value, octocrab::Error> =
                    octocrab.graphql(payload).await;
                response.map_err(|e| classify(e, "/graphql", Access::Write))
            })
            .await?;

        if let Some(errors) = response.get("errors") {
            return Err(SpecCheckError::GitHub(format!(
                "failed to convert pull request to draft: {errors}"
            )));
        }
        Ok(())
    }

    async fn submit_review(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        disposition: ReviewDisposition,
        body: Option<&str>,
    ) -> Result<(), SpecCheckError> {
        let route = format!("/repos/{owner}/{repo}/pulls/{number}/reviews");
        let mut payload = serde_json::json!({ "event": disposition.as_event() });
        if let Some(body) = body {
            payload["body"] = serde_json::Value::String(body.to_string());
        }
        self.post_json(&route, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use speccheck_core::RetryConfig;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GitHubClient {
        client_with(server, 5, 2)
    }

    fn client_with(server: &MockServer, timeout_secs: u64, max_attempts: u32) -> GitHubClient {
        let config = GitHubConfig {
            token: Some("ghp_test".into()),
            api_base: Some(server.uri()),
            timeout_secs,
        };
        let retry = RetryPolicy::from_config(&RetryConfig {
            max_attempts,
            initial_backoff_ms: 1,
        });
        GitHubClient::new(&config, retry).unwrap()
    }

    fn github_error(message: &str) -> serde_json::Value {
        serde_json::json!({
            "message": message,
            "documentation_url": "https://docs.github.com/rest"
        })
    }

    #[tokio::test]
    async fn fetch_issue_reads_number_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/api/issues/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "number": 42,
                "title": "Health endpoint",
                "body": "Add a health endpoint"
            })))
            .mount(&server)
            .await;

        let issue = client_for(&server)
            .fetch_issue("acme", "api", 42)
            .await
            .unwrap();
        assert_eq!(issue.number, 42);
        assert_eq!(issue.body.as_deref(), Some("Add a health endpoint"));
    }

    #[tokio::test]
    async fn fetch_issue_not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/api/issues/9"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "message": "Not Found",
                "documentation_url": "https://docs.github.com/rest"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_issue("acme", "api", 9)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Not Found"));
    }

    #[tokio::test]
    async fn fetch_pull_request_reads_author() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/api/pulls/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "number": 7,
                "node_id": "PR_kwDO7",
                "body": "Resolves #42",
                "user": { "login": "octocat" }
            })))
            .mount(&server)
            .await;

        let pull = client_for(&server)
            .fetch_pull_request("acme", "api", 7)
            .await
            .unwrap();
        assert_eq!(pull.author, "octocat");
        assert_eq!(pull.node_id, "PR_kwDO7");
        assert_eq!(pull.body.as_deref(), Some("Resolves #42"));
    }

    #[tokio::test]
    async fn fetch_diff_requests_diff_media_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/api/pulls/7"))
            .and(header("accept", "application/vnd.github.v3.diff"))
            .and(header("authorization", "Bearer ghp_test"))
            .respond_with(ResponseTemplate::new(200).set_body_string("diff --git a/x b/x\n"))
            .mount(&server)
            .await;

        let diff = client_for(&server)
            .fetch_diff("acme", "api", 7)
            .await
            .unwrap();
        assert!(diff.starts_with("diff --git"));
    }

    #[tokio::test]
    async fn fetch_diff_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("+line\n"))
            .mount(&server)
            .await;

        let diff = client_for(&server)
            .fetch_diff("acme", "api", 7)
            .await
            .unwrap();
        assert_eq!(diff, "+line\n");
    }

    #[tokio::test]
    async fn submit_review_sends_event_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/api/pulls/7/reviews"))
            .and(body_json(serde_json::json!({
                "event": "REQUEST_CHANGES",
                "body": "### Spec not achieved"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1})))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .submit_review(
                "acme",
                "api",
                7,
                ReviewDisposition::RequestChanges,
                Some("### Spec not achieved"),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn post_comment_targets_issue_comments() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/api/issues/7/comments"))
            .and(body_json(serde_json::json!({ "body": "hello" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 2})))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .post_comment("acme", "api", 7, "hello")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn set_draft_surfaces_graphql_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": null,
                "errors": [{"message": "Could not resolve to a node"}]
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).set_draft("PR_bad").await.unwrap_err();
        assert!(err.to_string().contains("Could not resolve"));
    }

    #[tokio::test]
    async fn set_draft_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"convertPullRequestToDraft": {"pullRequest": {"isDraft": true}}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server).set_draft("PR_kwDO7").await.unwrap();
    }

    #[tokio::test]
    async fn fetch_issue_server_error_is_retried_exactly_per_policy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/api/issues/42"))
            .respond_with(ResponseTemplate::new(503).set_body_json(github_error("Unavailable")))
            .expect(3)
            .mount(&server)
            .await;

        let result = client_with(&server, 5, 3).fetch_issue("acme", "api", 42).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn slow_comment_is_posted_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/api/issues/7/comments"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({"id": 3}))
                    .set_delay(Duration::from_millis(1500)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result = client_with(&server, 1, 3)
            .post_comment("acme", "api", 7, "### Spec not achieved")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn review_server_error_is_not_resubmitted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/api/pulls/7/reviews"))
            .respond_with(ResponseTemplate::new(502).set_body_json(github_error("Bad Gateway")))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_with(&server, 5, 3)
            .submit_review("acme", "api", 7, ReviewDisposition::Comment, Some("ok"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn rate_limited_comment_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/api/issues/7/comments"))
            .respond_with(
                ResponseTemplate::new(429).set_body_json(github_error("API rate limit exceeded")),
            )
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/api/issues/7/comments"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 4})))
            .expect(1)
            .mount(&server)
            .await;

        client_with(&server, 5, 3)
            .post_comment("acme", "api", 7, "hello")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn slow_draft_conversion_is_sent_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"data": null}))
                    .set_delay(Duration::from_millis(1500)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result = client_with(&server, 1, 3).set_draft("PR_kwDO7").await;
        assert!(result.is_err());
    }
}
