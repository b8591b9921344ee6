use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};
use thiserror::Error;

/// Processing stage of a [`Script`](super::Script).
///
/// The discriminant is the ordinal persisted by the store and exposed over
/// the API, so the numbering must never change.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(into = "i64", try_from = "i64")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ScriptState {
    Generating = 1,
    Generated = 2,
    Producing = 3,
    Produced = 4,
    Uploading = 5,
    Uploaded = 6,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown script state ordinal {0}")]
pub struct UnknownState(pub i64);

impl ScriptState {
    pub fn ordinal(self) -> i64 {
        self as i64
    }

    /// Parse either an ordinal (`"2"`) or a symbolic name (`"generated"`).
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match raw.parse::<i64>() {
            Ok(n) => Self::try_from(n).ok(),
            Err(_) => raw.parse().ok(),
        }
    }

    /// Apply `transition`, rejecting it unless `self` is its predecessor.
    pub fn apply(self, transition: Transition) -> Result<Self, InvalidTransition> {
        if self == transition.predecessor() {
            Ok(transition.successor())
        } else {
            Err(InvalidTransition {
                transition,
                actual: self,
            })
        }
    }

    /// Whether an administrative edit may move a script from `self` to `next`.
    ///
    /// Staying put is always allowed; otherwise `next` must be reachable
    /// through exactly one [`Transition`].
    pub fn can_transition_to(self, next: Self) -> bool {
        self == next
            || Transition::iter().any(|t| t.predecessor() == self && t.successor() == next)
    }
}

impl From<ScriptState> for i64 {
    fn from(state: ScriptState) -> Self {
        state.ordinal()
    }
}

impl TryFrom<i64> for ScriptState {
    type Error = UnknownState;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        ScriptState::iter()
            .find(|s| s.ordinal() == value)
            .ok_or(UnknownState(value))
    }
}

/// A legal edge of the script lifecycle.
///
/// Every transition has exactly one predecessor state; failure edges move
/// back one stage so the script stays retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Transition {
    FinishGeneration,
    BeginProduction,
    FinishProduction,
    FailProduction,
    BeginUpload,
    FinishUpload,
    FailUpload,
}

impl Transition {
    pub fn predecessor(self) -> ScriptState {
        use ScriptState::*;
        match self {
            Transition::FinishGeneration => Generating,
            Transition::BeginProduction => Generated,
            Transition::FinishProduction | Transition::FailProduction => Producing,
            Transition::BeginUpload => Produced,
            Transition::FinishUpload | Transition::FailUpload => Uploading,
        }
    }

    pub fn successor(self) -> ScriptState {
        use ScriptState::*;
        match self {
            Transition::FinishGeneration => Generated,
            Transition::BeginProduction => Producing,
            Transition::FinishProduction => Produced,
            Transition::FailProduction => Generated,
            Transition::BeginUpload => Uploading,
            Transition::FinishUpload => Uploaded,
            Transition::FailUpload => Produced,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {transition} a script in state {actual} (requires {})", .transition.predecessor())]
pub struct InvalidTransition {
    pub transition: Transition,
    pub actual: ScriptState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_match_persisted_values() {
        let ordinals: Vec<i64> = ScriptState::iter().map(ScriptState::ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(ScriptState::try_from(4), Ok(ScriptState::Produced));
        assert_eq!(ScriptState::try_from(7), Err(UnknownState(7)));
    }

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!(ScriptState::Uploaded.to_string(), "UPLOADED");
        assert_eq!(ScriptState::parse_lenient("generated"), Some(ScriptState::Generated));
        assert_eq!(ScriptState::parse_lenient(" 3 "), Some(ScriptState::Producing));
        assert_eq!(ScriptState::parse_lenient("published"), None);
        assert_eq!(ScriptState::parse_lenient("0"), None);
    }

    #[test]
    fn serde_uses_ordinal() {
        let json = serde_json::to_string(&ScriptState::Producing).unwrap();
        assert_eq!(json, "3");
        let back: ScriptState = serde_json::from_str("5").unwrap();
        assert_eq!(back, ScriptState::Uploading);
        assert!(serde_json::from_str::<ScriptState>("9").is_err());
    }

    #[test]
    fn forward_edges_advance_one_stage() {
        for t in Transition::iter() {
            let (from, to) = (t.predecessor().ordinal(), t.successor().ordinal());
            assert_eq!((to - from).abs(), 1, "{t} must move exactly one stage");
        }
    }

    #[test]
    fn apply_rejects_wrong_predecessor() {
        assert_eq!(
            ScriptState::Generated.apply(Transition::BeginProduction),
            Ok(ScriptState::Producing)
        );
        let err = ScriptState::Uploaded
            .apply(Transition::BeginProduction)
            .unwrap_err();
        assert_eq!(err.actual, ScriptState::Uploaded);
        assert!(err.to_string().contains("GENERATED"));
    }

    #[test]
    fn admin_edits_follow_the_graph() {
        assert!(ScriptState::Producing.can_transition_to(ScriptState::Generated));
        assert!(ScriptState::Generated.can_transition_to(ScriptState::Generated));
        assert!(!ScriptState::Uploaded.can_transition_to(ScriptState::Generating));
        assert!(!ScriptState::Generating.can_transition_to(ScriptState::Produced));
        // Generation has no failure edge back to an earlier stage.
        assert!(!ScriptState::Generated.can_transition_to(ScriptState::Generating));
    }
}
