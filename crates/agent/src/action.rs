use crate::tags::{parse_tags, Tag};

pub const THINK_TAG: &str = "think";
pub const RESULT_TAG: &str = "result";
pub const ANSWER_TAG: &str = "answer";
pub const TRACKER_QUERY_TAG: &str = "linear_gql";
pub const SQL_QUERY_TAG: &str = "sql";

/// One directive extracted from an assistant turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Think(String),
    Answer(String),
    TrackerQuery(String),
    SqlQuery(String),
    Unsupported { tag: String, content: String },
}

impl Action {
    pub fn tag(&self) -> &str {
        match self {
            Self::Think(_) => THINK_TAG,
            Self::Answer(_) => RESULT_TAG,
            Self::TrackerQuery(_) => TRACKER_QUERY_TAG,
            Self::SqlQuery(_) => SQL_QUERY_TAG,
            Self::Unsupported { tag, .. } => tag,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Answer(_))
    }
}

impl From<Tag> for Action {
    fn from(tag: Tag) -> Self {
        match tag.name.as_str() {
            THINK_TAG => Self::Think(tag.content),
            RESULT_TAG | ANSWER_TAG => Self::Answer(tag.content),
            TRACKER_QUERY_TAG => Self::TrackerQuery(tag.content),
            SQL_QUERY_TAG => Self::SqlQuery(tag.content),
            _ => Self::Unsupported { tag: tag.name, content: tag.content },
        }
    }
}

pub fn parse_actions(text: &str) -> Vec<Action> {
    parse_tags(text).into_iter().map(Action::from).collect()
}

#[cfg(test)]
mod tests {
    use super::{parse_actions, Action};

    #[test]
    fn known_tags_map_to_variants() {
        let actions = parse_actions(
            "<think>plan</think><linear_gql>{ teams { nodes { id } } }</linear_gql>\
             <sql>SELECT 1</sql><answer>done</answer>",
        );

        assert_eq!(
            actions,
            vec![
                Action::Think("plan".to_string()),
                Action::TrackerQuery("{ teams { nodes { id } } }".to_string()),
                Action::SqlQuery("SELECT 1".to_string()),
                Action::Answer("done".to_string()),
            ]
        );
    }

    #[test]
    fn result_and_answer_are_both_terminal() {
        let actions = parse_actions("<result>a</result><answer>b</answer>");
        assert!(actions.iter().all(Action::is_terminal));
        assert_eq!(actions[1].tag(), "result");
    }

    #[test]
    fn unknown_tag_keeps_its_name() {
        let actions = parse_actions("<foo>bar</foo>");
        assert_eq!(
            actions,
            vec![Action::Unsupported { tag: "foo".to_string(), content: "bar".to_string() }]
        );
        assert_eq!(actions[0].tag(), "foo");
        assert!(!actions[0].is_terminal());
    }

    #[test]
    fn tag_names_are_case_sensitive() {
        assert!(matches!(
            parse_actions("<SQL>SELECT 1</SQL>").as_slice(),
            [Action::Unsupported { tag, .. }] if tag == "SQL"
        ));
    }
}
