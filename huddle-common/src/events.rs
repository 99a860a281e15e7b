//! SSE event names and payload types
//!
//! Every message pushed to clients is one named event with a JSON
//! payload. Event names are string constants so the server and tests
//! agree on the wire vocabulary.

use serde::{Deserialize, Serialize};

/// Event names pushed over the client stream
pub mod name {
    /// Number of submissions in the current run
    pub const SUBMISSION_COUNT: &str = "submission_count";
    /// Number of joined participants
    pub const PARTICIPANT_COUNT: &str = "participant_count";
    /// Full similarity graph for the current run
    pub const GRAPH: &str = "graph";
    /// A single newly ingested statement
    pub const LINE: &str = "line";
    /// Thematic summary snapshot
    pub const SUMMARY: &str = "summary";
    /// Pairing snapshot
    pub const MATCHES: &str = "matches";
    /// Private snapshot of recent statements for a newly joined client
    pub const RECENT_LINES: &str = "recent_lines";
}

/// Simple counter payload for `submission_count` / `participant_count`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountPayload {
    pub count: i64,
}

/// One participant node in the similarity graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: i64,
    /// Participant display name
    pub label: String,
    /// Latest statement text (empty when the participant has none)
    pub text: String,
}

/// One undirected weighted edge; `source < target` canonically
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: i64,
    pub target: i64,
    pub weight: f64,
}

/// Payload of the `graph` event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphPayload {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Payload of the `line` event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinePayload {
    pub submission_id: i64,
    pub participant_id: i64,
    pub text: String,
}

/// One entry of the private `recent_lines` snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentLine {
    pub submission_id: i64,
    pub participant_id: i64,
    pub text: String,
}

/// One pairing group (pair, trio, or a last-resort singleton)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub members: Vec<i64>,
    pub score: f64,
    /// Display names in `members` order, for rendering
    #[serde(default)]
    pub names: Vec<String>,
}

/// Payload of the `matches` event; persisted on the run as a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pairing {
    pub pairs: Vec<Group>,
}

/// One thematic cluster in a summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub why: Option<String>,
    pub members: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quotes: Vec<String>,
}

/// A pair of participants whose statements pull in opposite directions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contradiction {
    pub a: i64,
    pub b: i64,
    pub explain: String,
}

/// A statement that fits none of the themes well
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outlier {
    pub participant_id: i64,
    pub explain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryStats {
    pub count: i64,
}

/// Payload of the `summary` event; persisted on the run as a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub themes: Vec<Theme>,
    pub contradictions: Vec<Contradiction>,
    pub outliers: Vec<Outlier>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agenda: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    pub stats: SummaryStats,
}
