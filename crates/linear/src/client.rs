use std::time::Duration;

use async_trait::async_trait;
use ema_core::config::LinearConfig;
use ema_core::{IssueTracker, TrackerError};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::types::{GraphqlResponse, Team, TeamsPage};

const TEAMS_QUERY: &str = r#"
query ($cursor: String) {
  teams(first: 50, after: $cursor) {
    nodes { id name key }
    pageInfo { hasNextPage endCursor }
  }
}
"#;

const ISSUE_QUERY: &str = r#"
query ($identifier: String!) {
  issue(id: $identifier) {
    id
    identifier
    title
    description
    url
    priority
    priorityLabel
    estimate
    createdAt
    updatedAt
    completedAt
    state { name }
    assignee { displayName name }
    creator { displayName name }
    team { name key }
    project { name }
    labels { nodes { name } }
  }
}
"#;

pub struct LinearClient {
    http: Client,
    api_url: String,
    api_key: SecretString,
}

impl LinearClient {
    pub fn new(config: &LinearConfig) -> Result<Self, TrackerError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.expose_secret().trim().is_empty())
            .ok_or_else(|| TrackerError::new("linear.api_key is required for the linear client"))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| {
                TrackerError::new(format!("linear http client setup failed: {error}"))
            })?;

        Ok(Self { http, api_url: config.api_url.clone(), api_key })
    }

    /// Sends one GraphQL document and returns its `data` member.
    pub async fn request(
        &self,
        query: &str,
        variables: Option<Value>,
    ) -> Result<Value, TrackerError> {
        let response = self
            .http
            .post(&self.api_url)
            .header("Authorization", self.api_key.expose_secret())
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|error| TrackerError::new(format!("linear request failed: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| TrackerError::new(format!("linear response read failed: {error}")))?;
        let envelope = match serde_json::from_str::<GraphqlResponse>(&body) {
            Ok(envelope) => envelope,
            // Error pages on failed statuses are reported by status below.
            Err(_) if !status.is_success() => GraphqlResponse::default(),
            Err(error) => {
                warn!(
                    event_name = "linear.request.decode_failed",
                    status = status.as_u16(),
                    error = %error,
                    "linear response body is not a graphql envelope"
                );
                return Err(TrackerError::new(format!("linear response decode failed: {error}")));
            }
        };

        if let Some(errors) = envelope.errors.filter(|errors| !errors.is_empty()) {
            let message =
                errors.into_iter().map(|error| error.message).collect::<Vec<_>>().join("; ");
            warn!(
                event_name = "linear.request.graphql_errors",
                status = status.as_u16(),
                error = %message,
                "linear graphql request returned errors"
            );
            return Err(TrackerError::new(message));
        }

        if !status.is_success() {
            warn!(
                event_name = "linear.request.http_error",
                status = status.as_u16(),
                "linear api returned non-success status"
            );
            return Err(TrackerError::new(format!("linear api returned {status}")));
        }

        debug!(
            event_name = "linear.request.ok",
            status = status.as_u16(),
            "linear request succeeded"
        );
        Ok(envelope.data.unwrap_or(Value::Null))
    }

    pub async fn teams(&self) -> Result<Vec<Team>, TrackerError> {
        let mut teams = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let data = self.request(TEAMS_QUERY, Some(json!({ "cursor": cursor }))).await?;
            let page = serde_json::from_value::<TeamsPage>(data).map_err(|error| {
                TrackerError::new(format!("unexpected teams response shape: {error}"))
            })?;

            teams.extend(page.teams.nodes);
            if !page.teams.page_info.has_next_page {
                break;
            }
            match page.teams.page_info.end_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(teams)
    }

    pub async fn find_team(&self, value: &str) -> Result<Team, TrackerError> {
        self.teams()
            .await?
            .into_iter()
            .find(|team| team.matches(value))
            .ok_or_else(|| TrackerError::new(format!("team not found: {value}")))
    }

    pub async fn issue(&self, identifier: &str) -> Result<Value, TrackerError> {
        let data = self.request(ISSUE_QUERY, Some(json!({ "identifier": identifier }))).await?;
        match data.get("issue") {
            Some(issue) if !issue.is_null() => Ok(issue.clone()),
            _ => Err(TrackerError::new(format!("issue not found: {identifier}"))),
        }
    }
}

#[async_trait]
impl IssueTracker for LinearClient {
    async fn execute(&self, query: &str) -> Result<Value, TrackerError> {
        self.request(query, None).await
    }
}

#[cfg(test)]
mod tests {
    use ema_core::config::LinearConfig;

    use super::LinearClient;

    #[test]
    fn missing_api_key_is_rejected() {
        let config = LinearConfig {
            api_url: "https://api.linear.app/graphql".to_string(),
            api_key: None,
            team_keys: Vec::new(),
            timeout_secs: 30,
        };

        let error = LinearClient::new(&config).err().map(|error| error.message);
        assert_eq!(error.as_deref(), Some("linear.api_key is required for the linear client"));
    }
}
