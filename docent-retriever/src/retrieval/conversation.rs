//! Conversation-aware query and prompt construction.
//!
//! Two different texts come out of one question: the *retrieval query* used
//! to rank chunks, and the *conversational question* handed to the generator
//! together with the retrieved context. By default retrieval is keyed on the
//! latest question only while generation sees the whole transcript.

use crate::storage::ScoredChunk;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Role {
    User,
    Assistant,
}

impl From<String> for Role {
    /// Anything other than `"user"` is treated as the assistant.
    fn from(role: String) -> Self {
        if role.eq_ignore_ascii_case("user") {
            Role::User
        } else {
            Role::Assistant
        }
    }
}

impl Role {
    fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// One prior message, in the `{role, content}` wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<i64>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp_ms: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp_ms: None,
        }
    }
}

/// Which text is embedded to rank chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetrievalQueryMode {
    /// The current question alone
    #[default]
    LatestQuestion,
    /// The last `turns` user messages followed by the current question
    RecentUserTurns { turns: usize },
    /// The full conversational question, transcript included
    FullTranscript,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConversationFormatter {
    mode: RetrievalQueryMode,
}

impl ConversationFormatter {
    pub fn new(mode: RetrievalQueryMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> RetrievalQueryMode {
        self.mode
    }

    /// `"User: ..."` / `"Assistant: ..."` lines in chronological order.
    pub fn render_transcript(&self, history: &[ConversationTurn]) -> String {
        history
            .iter()
            .map(|turn| format!("{}: {}", turn.role.label(), turn.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Text used to rank index entries.
    pub fn retrieval_query(&self, question: &str, history: &[ConversationTurn]) -> String {
        match self.mode {
            RetrievalQueryMode::LatestQuestion => question.to_string(),
            RetrievalQueryMode::RecentUserTurns { turns } => {
                let mut recent: Vec<&str> = history
                    .iter()
                    .rev()
                    .filter(|turn| turn.role == Role::User)
                    .take(turns)
                    .map(|turn| turn.content.as_str())
                    .collect();
                recent.reverse();
                recent.push(question);
                recent.join("\n")
            }
            RetrievalQueryMode::FullTranscript => self.conversational_question(question, history),
        }
    }

    /// The question as the generator sees it; the bare question without history.
    pub fn conversational_question(&self, question: &str, history: &[ConversationTurn]) -> String {
        if history.is_empty() {
            return question.to_string();
        }
        format!(
            "Previous conversation:\n{}\n\nCurrent question: {}\n\nPlease answer the current question while considering the conversation history above.",
            self.render_transcript(history),
            question
        )
    }

    /// Retrieved chunks, each annotated with its source, in ranking order.
    pub fn render_context(&self, results: &[ScoredChunk]) -> String {
        results
            .iter()
            .map(|hit| {
                format!(
                    "Category: {}\nFilename: {}\n{}",
                    hit.chunk.metadata.category, hit.chunk.metadata.filename, hit.chunk.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docent_context::{ChunkMetadata, DocumentChunk};

    fn history() -> Vec<ConversationTurn> {
        vec![
            ConversationTurn::user("What do cats eat?"),
            ConversationTurn::assistant("Cats eat meat."),
            ConversationTurn::user("Are they mammals?"),
        ]
    }

    #[test]
    fn test_empty_history_is_bare_question() {
        let formatter = ConversationFormatter::default();
        assert_eq!(formatter.conversational_question("Do cats purr?", &[]), "Do cats purr?");
        assert_eq!(formatter.retrieval_query("Do cats purr?", &[]), "Do cats purr?");
    }

    #[test]
    fn test_conversational_question_with_history() {
        let formatter = ConversationFormatter::default();
        let prompt = formatter.conversational_question("Do they purr?", &history());
        assert_eq!(
            prompt,
            "Previous conversation:\nUser: What do cats eat?\nAssistant: Cats eat meat.\nUser: Are they mammals?\n\nCurrent question: Do they purr?\n\nPlease answer the current question while considering the conversation history above."
        );
        // Default retrieval ignores history
        assert_eq!(formatter.retrieval_query("Do they purr?", &history()), "Do they purr?");
    }

    #[test]
    fn test_recent_user_turns() {
        let formatter = ConversationFormatter::new(RetrievalQueryMode::RecentUserTurns { turns: 1 });
        assert_eq!(
            formatter.retrieval_query("Do they purr?", &history()),
            "Are they mammals?\nDo they purr?"
        );

        let formatter = ConversationFormatter::new(RetrievalQueryMode::RecentUserTurns { turns: 5 });
        assert_eq!(
            formatter.retrieval_query("Do they purr?", &history()),
            "What do cats eat?\nAre they mammals?\nDo they purr?"
        );
    }

    #[test]
    fn test_full_transcript_mode() {
        let formatter = ConversationFormatter::new(RetrievalQueryMode::FullTranscript);
        let query = formatter.retrieval_query("Do they purr?", &history());
        assert!(query.starts_with("Previous conversation:"));
        assert!(query.contains("Current question: Do they purr?"));
    }

    #[test]
    fn test_role_wire_shape() {
        let turns: Vec<ConversationTurn> = serde_json::from_str(
            r#"[{"role": "user", "content": "hi"}, {"role": "system", "content": "x"}]"#,
        )
        .unwrap();
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].role, Role::Assistant);

        let json = serde_json::to_value(&turns[0]).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn test_render_context() {
        let hit = ScoredChunk {
            chunk: DocumentChunk {
                text: "Cats are mammals.".to_string(),
                metadata: ChunkMetadata {
                    category: "animals".to_string(),
                    filename: "cats.txt".to_string(),
                    source_path: "animals/cats.txt".to_string(),
                    chunk_index: 0,
                    page: None,
                    start_offset: 0,
                },
            },
            score: 0.9,
        };
        let formatter = ConversationFormatter::default();
        assert_eq!(
            formatter.render_context(&[hit.clone(), hit]),
            "Category: animals\nFilename: cats.txt\nCats are mammals.\n\nCategory: animals\nFilename: cats.txt\nCats are mammals."
        );
    }
}
