//! Transcript reconciliation.
//!
//! Maintains the ordered turn list for one session. The in-progress
//! assistant turn is tracked by an explicit handle held here, not by
//! re-matching the last element of the list, so info turns appended while an
//! answer streams can never hijack or orphan the accumulating text.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::error::{SessionError, SessionResult};

/// Who a transcript turn belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    /// Ephemeral progress or lifecycle notice.
    Info,
}

/// One entry in the transcript.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// True once the turn can no longer change.
    pub sealed: bool,
}

impl Turn {
    fn new(role: Role, text: String, sealed: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text,
            created_at: Utc::now(),
            sealed,
        }
    }
}

/// Handle to the assistant turn currently receiving fragments.
///
/// The turn id is allocated when the query is submitted, but the turn only
/// enters the list once the first fragment arrives. A query that dies before
/// producing any content leaves no empty assistant turn behind.
#[derive(Debug)]
struct OpenTurn {
    id: Uuid,
    index: Option<usize>,
}

/// Ordered turn list plus the open-assistant-turn handle.
#[derive(Debug, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
    open: Option<OpenTurn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a user turn. The text is trimmed; blank input is rejected
    /// before it can reach the network.
    pub fn append_user(&mut self, text: &str) -> SessionResult<&Turn> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyQuery);
        }
        self.turns.push(Turn::new(Role::User, text.to_string(), true));
        Ok(self.turns.last().expect("just pushed"))
    }

    /// Allocate the handle for this query's assistant turn.
    ///
    /// Calling this while a turn is still open is a controller bug, not a
    /// recoverable condition.
    pub fn begin_assistant_turn(&mut self) -> Uuid {
        assert!(
            self.open.is_none(),
            "begin_assistant_turn called while a turn is open"
        );
        let id = Uuid::new_v4();
        self.open = Some(OpenTurn { id, index: None });
        id
    }

    /// Concatenate a fragment onto the open assistant turn, materializing it
    /// on first use. Fragments are joined in arrival order with no separator;
    /// the server owns fragment boundaries.
    pub fn append_fragment(&mut self, text: &str) -> SessionResult<&Turn> {
        let open = self.open.as_mut().ok_or(SessionError::NoOpenTurn)?;
        let index = match open.index {
            Some(index) => index,
            None => {
                let mut turn = Turn::new(Role::Assistant, String::new(), false);
                turn.id = open.id;
                self.turns.push(turn);
                let index = self.turns.len() - 1;
                open.index = Some(index);
                index
            }
        };
        self.turns[index].text.push_str(text);
        Ok(&self.turns[index])
    }

    /// Append an informational notice. Does not touch the open turn.
    pub fn append_info(&mut self, text: &str) -> &Turn {
        self.turns.push(Turn::new(Role::Info, text.to_string(), true));
        self.turns.last().expect("just pushed")
    }

    /// Seal the open assistant turn, if any. Idempotent.
    pub fn finalize(&mut self) -> Option<Uuid> {
        let open = self.open.take()?;
        if let Some(index) = open.index {
            self.turns[index].sealed = true;
            Some(open.id)
        } else {
            // never materialized; nothing to seal
            None
        }
    }

    /// True while an assistant turn is accepting fragments.
    pub fn has_open_turn(&self) -> bool {
        self.open.is_some()
    }

    /// Ordered turn sequence.
    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_user_input_is_rejected() {
        let mut transcript = Transcript::new();
        assert!(matches!(
            transcript.append_user("   \n\t "),
            Err(SessionError::EmptyQuery)
        ));
        assert!(transcript.snapshot().is_empty());
    }

    #[test]
    fn test_user_input_is_trimmed() {
        let mut transcript = Transcript::new();
        let turn = transcript.append_user("  What is X?  ").unwrap();
        assert_eq!(turn.text, "What is X?");
        assert_eq!(turn.role, Role::User);
        assert!(turn.sealed);
    }

    #[test]
    fn test_fragments_concatenate_in_arrival_order() {
        let mut transcript = Transcript::new();
        let id = transcript.begin_assistant_turn();
        transcript.append_fragment("The ").unwrap();
        transcript.append_fragment("answer").unwrap();
        let turn = transcript.append_fragment(" is 42.").unwrap();
        assert_eq!(turn.id, id);
        assert_eq!(turn.text, "The answer is 42.");
        assert!(!turn.sealed);

        transcript.finalize();
        assert!(transcript.snapshot()[0].sealed);
    }

    #[test]
    fn test_fragment_without_open_turn_fails() {
        let mut transcript = Transcript::new();
        assert!(matches!(
            transcript.append_fragment("stray"),
            Err(SessionError::NoOpenTurn)
        ));
    }

    #[test]
    fn test_unmaterialized_turn_leaves_no_trace() {
        let mut transcript = Transcript::new();
        transcript.append_user("q").unwrap();
        transcript.begin_assistant_turn();
        // terminal event before any fragment
        assert_eq!(transcript.finalize(), None);
        assert_eq!(transcript.snapshot().len(), 1);
        assert!(!transcript.has_open_turn());
    }

    #[test]
    fn test_info_does_not_disturb_open_turn() {
        let mut transcript = Transcript::new();
        transcript.begin_assistant_turn();
        transcript.append_fragment("The ").unwrap();
        transcript.append_info("exiting retrieval");
        let turn = transcript.append_fragment("answer").unwrap();
        assert_eq!(turn.text, "The answer");

        let roles: Vec<Role> = transcript.snapshot().iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::Assistant, Role::Info]);
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut transcript = Transcript::new();
        transcript.begin_assistant_turn();
        transcript.append_fragment("x").unwrap();
        assert!(transcript.finalize().is_some());
        assert!(transcript.finalize().is_none());
    }

    #[test]
    #[should_panic(expected = "begin_assistant_turn")]
    fn test_double_begin_panics() {
        let mut transcript = Transcript::new();
        transcript.begin_assistant_turn();
        transcript.begin_assistant_turn();
    }
}
