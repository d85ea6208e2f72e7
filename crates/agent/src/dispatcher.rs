use std::sync::Arc;

use ema_core::{IssueTracker, SqlExecutor, SqlRow};
use tracing::{debug, info, warn};

use crate::action::Action;

pub const DEFAULT_FEEDBACK: &str = "continue with the next step";

const VERIFY_RESULTS_NOTE: &str = "[SYSTEM]: Before moving on, check that these rows really \
answer the question and that the query logic is correct. If anything looks off, fix the query \
and run it again.";

/// What one assistant turn resolved to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// A `result`/`answer` tag ended the run.
    Terminal(String),
    /// Text to append as the next user message.
    Feedback(String),
}

/// Executes the actions of one assistant turn against the collaborators.
#[derive(Clone)]
pub struct ActionDispatcher {
    tracker: Arc<dyn IssueTracker>,
    sql: Arc<dyn SqlExecutor>,
}

impl ActionDispatcher {
    pub fn new(tracker: Arc<dyn IssueTracker>, sql: Arc<dyn SqlExecutor>) -> Self {
        Self { tracker, sql }
    }

    /// Processes `actions` in order. The first terminal action wins and
    /// nothing after it runs; otherwise the last non-`think` action decides
    /// the feedback text.
    pub async fn dispatch(&self, actions: &[Action]) -> Dispatch {
        let mut feedback = DEFAULT_FEEDBACK.to_string();

        for action in actions {
            match action {
                Action::Think(thought) => {
                    debug!(
                        event_name = "agent.action.think",
                        chars = thought.len(),
                        "model reasoning step"
                    );
                }
                Action::Answer(answer) => {
                    info!(event_name = "agent.action.answer", "terminal tag received");
                    return Dispatch::Terminal(answer.clone());
                }
                Action::TrackerQuery(query) => {
                    feedback = self.run_tracker_query(query).await;
                }
                Action::SqlQuery(query) => {
                    feedback = self.run_sql_query(query).await;
                }
                Action::Unsupported { tag, .. } => {
                    warn!(
                        event_name = "agent.action.unsupported_tag",
                        tag = %tag,
                        "model used an unsupported action tag"
                    );
                    feedback = unsupported_tag_feedback(tag);
                }
            }
        }

        Dispatch::Feedback(feedback)
    }

    async fn run_tracker_query(&self, query: &str) -> String {
        match self.tracker.execute(query).await {
            Ok(data) => {
                info!(event_name = "agent.action.tracker_query", "tracker query succeeded");
                data.to_string()
            }
            Err(error) => {
                warn!(
                    event_name = "agent.action.tracker_failed",
                    error = %error,
                    "tracker query failed"
                );
                error.to_string()
            }
        }
    }

    async fn run_sql_query(&self, query: &str) -> String {
        match self.sql.execute(query).await {
            Ok(rows) => {
                info!(
                    event_name = "agent.action.sql_query",
                    row_count = rows.len(),
                    "sql query succeeded"
                );
                format_sql_rows(&rows)
            }
            Err(error) => {
                warn!(event_name = "agent.action.sql_failed", error = %error, "sql query failed");
                format!("SQL Error: {error}")
            }
        }
    }
}

pub fn unsupported_tag_feedback(tag: &str) -> String {
    format!(
        "unsupported action tag: {tag}. Use only the action tags described in your instructions."
    )
}

pub fn format_sql_rows(rows: &[SqlRow]) -> String {
    if rows.is_empty() {
        return format!("SQL query returned no rows.\n\n{VERIFY_RESULTS_NOTE}");
    }

    let listing = rows
        .iter()
        .map(|row| serde_json::Value::Object(row.clone()).to_string())
        .collect::<Vec<_>>()
        .join("\n");

    format!("SQL query returned {} row(s):\n{listing}\n\n{VERIFY_RESULTS_NOTE}", rows.len())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use ema_core::{IssueTracker, SqlError, SqlExecutor, SqlRow, TrackerError};
    use serde_json::{json, Value};

    use super::{format_sql_rows, ActionDispatcher, Dispatch, DEFAULT_FEEDBACK};
    use crate::action::parse_actions;

    #[derive(Default)]
    struct RecordingTracker {
        queries: Mutex<Vec<String>>,
        fail_with: Option<String>,
    }

    #[async_trait]
    impl IssueTracker for RecordingTracker {
        async fn execute(&self, query: &str) -> Result<Value, TrackerError> {
            self.queries.lock().map_err(|_| TrackerError::new("poisoned"))?.push(query.to_string());
            match &self.fail_with {
                Some(message) => Err(TrackerError::new(message.clone())),
                None => Ok(json!({ "issues": { "nodes": [{ "identifier": "ENG-1" }] } })),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSql {
        queries: Mutex<Vec<String>>,
        fail_with: Option<String>,
    }

    #[async_trait]
    impl SqlExecutor for RecordingSql {
        async fn execute(&self, query: &str) -> Result<Vec<SqlRow>, SqlError> {
            self.queries.lock().map_err(|_| SqlError::new("poisoned"))?.push(query.to_string());
            match &self.fail_with {
                Some(message) => Err(SqlError::new(message.clone())),
                None => {
                    let mut row = SqlRow::new();
                    row.insert("total".to_string(), json!(3));
                    Ok(vec![row])
                }
            }
        }
    }

    fn dispatcher(tracker: Arc<RecordingTracker>, sql: Arc<RecordingSql>) -> ActionDispatcher {
        ActionDispatcher::new(tracker, sql)
    }

    #[tokio::test]
    async fn think_then_result_is_terminal() {
        let dispatcher =
            dispatcher(Arc::new(RecordingTracker::default()), Arc::new(RecordingSql::default()));

        let outcome =
            dispatcher.dispatch(&parse_actions("<think>checking</think><result>42</result>")).await;

        assert_eq!(outcome, Dispatch::Terminal("42".to_string()));
    }

    #[tokio::test]
    async fn result_first_stops_later_actions() {
        let sql = Arc::new(RecordingSql::default());
        let tracker = Arc::new(RecordingTracker::default());
        let dispatcher = dispatcher(tracker.clone(), sql.clone());

        let outcome = dispatcher
            .dispatch(&parse_actions(
                "<result>early</result><sql>SELECT 1</sql>\
                 <linear_gql>{ viewer { id } }</linear_gql>",
            ))
            .await;

        assert_eq!(outcome, Dispatch::Terminal("early".to_string()));
        assert!(sql.queries.lock().expect("lock").is_empty());
        assert!(tracker.queries.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn no_tags_yields_default_feedback() {
        let dispatcher =
            dispatcher(Arc::new(RecordingTracker::default()), Arc::new(RecordingSql::default()));

        assert_eq!(
            dispatcher.dispatch(&parse_actions("I am not sure what to do.")).await,
            Dispatch::Feedback(DEFAULT_FEEDBACK.to_string())
        );
    }

    #[tokio::test]
    async fn think_only_keeps_default_feedback() {
        let dispatcher =
            dispatcher(Arc::new(RecordingTracker::default()), Arc::new(RecordingSql::default()));

        assert_eq!(
            dispatcher.dispatch(&parse_actions("<think>hmm</think>")).await,
            Dispatch::Feedback(DEFAULT_FEEDBACK.to_string())
        );
    }

    #[tokio::test]
    async fn sql_error_becomes_feedback() {
        let sql = Arc::new(RecordingSql {
            fail_with: Some("syntax error".to_string()),
            ..RecordingSql::default()
        });
        let dispatcher = dispatcher(Arc::new(RecordingTracker::default()), sql);

        assert_eq!(
            dispatcher.dispatch(&parse_actions("<sql>SELECT 1</sql>")).await,
            Dispatch::Feedback("SQL Error: syntax error".to_string())
        );
    }

    #[tokio::test]
    async fn tracker_error_message_is_fed_back_verbatim() {
        let tracker = Arc::new(RecordingTracker {
            fail_with: Some("Cannot query field \"foo\"".to_string()),
            ..RecordingTracker::default()
        });
        let dispatcher = dispatcher(tracker, Arc::new(RecordingSql::default()));

        assert_eq!(
            dispatcher.dispatch(&parse_actions("<linear_gql>{ foo }</linear_gql>")).await,
            Dispatch::Feedback("Cannot query field \"foo\"".to_string())
        );
    }

    #[tokio::test]
    async fn tracker_success_is_serialized_json() {
        let tracker = Arc::new(RecordingTracker::default());
        let dispatcher = dispatcher(tracker.clone(), Arc::new(RecordingSql::default()));

        let actions = parse_actions("<linear_gql>{ issues { nodes { identifier } } }</linear_gql>");
        let outcome = dispatcher.dispatch(&actions).await;

        let Dispatch::Feedback(text) = outcome else {
            panic!("expected feedback");
        };
        let parsed: Value = serde_json::from_str(&text).expect("feedback is json");
        assert_eq!(parsed["issues"]["nodes"][0]["identifier"], "ENG-1");
        assert_eq!(
            tracker.queries.lock().expect("lock").as_slice(),
            ["{ issues { nodes { identifier } } }".to_string()]
        );
    }

    #[tokio::test]
    async fn unsupported_tag_is_reported_and_processing_continues() {
        let sql = Arc::new(RecordingSql::default());
        let dispatcher = dispatcher(Arc::new(RecordingTracker::default()), sql.clone());

        let only_unknown = dispatcher.dispatch(&parse_actions("<foo>bar</foo>")).await;
        let Dispatch::Feedback(text) = only_unknown else {
            panic!("expected feedback");
        };
        assert!(text.starts_with("unsupported action tag: foo"));

        let unknown_then_sql =
            dispatcher.dispatch(&parse_actions("<foo>bar</foo><sql>SELECT 1</sql>")).await;
        let Dispatch::Feedback(text) = unknown_then_sql else {
            panic!("expected feedback");
        };
        assert!(text.starts_with("SQL query returned 1 row(s):"));
        assert_eq!(sql.queries.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn last_action_before_exhaustion_decides_feedback() {
        let sql = Arc::new(RecordingSql::default());
        let tracker = Arc::new(RecordingTracker::default());
        let dispatcher = dispatcher(tracker.clone(), sql.clone());

        let outcome = dispatcher
            .dispatch(&parse_actions(
                "<sql>SELECT 1</sql><linear_gql>{ viewer { id } }</linear_gql><think>ok</think>",
            ))
            .await;

        let Dispatch::Feedback(text) = outcome else {
            panic!("expected feedback");
        };
        assert!(text.contains("ENG-1"), "tracker output should win over earlier sql output");
        assert_eq!(sql.queries.lock().expect("lock").len(), 1);
        assert_eq!(tracker.queries.lock().expect("lock").len(), 1);
    }

    #[test]
    fn row_listing_includes_count_rows_and_verification_note() {
        let mut row = SqlRow::new();
        row.insert("state".to_string(), json!("Todo"));
        let text = format_sql_rows(&[row.clone(), row]);

        let expected = "SQL query returned 2 row(s):\n{\"state\":\"Todo\"}\n{\"state\":\"Todo\"}";
        assert!(text.starts_with(expected));
        assert!(text.contains("check that these rows really answer the question"));
        assert!(format_sql_rows(&[]).starts_with("SQL query returned no rows."));
    }
}
