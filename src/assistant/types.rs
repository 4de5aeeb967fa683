//! Domain types shared across the assistant pipeline.
//!
//! [`Sender`] and [`PreferenceSource`] mirror the CHECK constraints of the
//! assistant store; [`Intent`] is the closed label set of the query agent;
//! [`Recommendation`], [`QueryOutcome`], [`FeedbackReport`] and
//! [`SyncSummary`] are the results the pipeline stages hand to each other and
//! to the HTTP layer.

use serde::{Deserialize, Serialize};

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    /// Point-of-sale staff member asking the question.
    Requester,
    Assistant,
}

impl Sender {
    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requester => "requester",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Sender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requester" => Ok(Self::Requester),
            "assistant" => Ok(Self::Assistant),
            _ => Err(format!("unknown sender: {s}")),
        }
    }
}

/// A conversation message, matching the `chat_messages` table.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: i64,
    pub session_id: String,
    pub seller_id: i64,
    pub sender: Sender,
    pub text: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub created_at: String,
}

/// Where a preference signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceSource {
    /// Extracted heuristically from generated text.
    Inferred,
    System,
    Operator,
}

impl PreferenceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inferred => "inferred",
            Self::System => "system",
            Self::Operator => "operator",
        }
    }
}

impl std::fmt::Display for PreferenceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of question intents the query agent classifies into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CustomerData,
    CustomerPurchases,
    CustomerAddress,
    CustomerPhones,
    CustomerProducts,
    OrderStatus,
}

impl Intent {
    pub const ALL: [Intent; 6] = [
        Self::CustomerData,
        Self::CustomerPurchases,
        Self::CustomerAddress,
        Self::CustomerPhones,
        Self::CustomerProducts,
        Self::OrderStatus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CustomerData => "customer_data",
            Self::CustomerPurchases => "customer_purchases",
            Self::CustomerAddress => "customer_address",
            Self::CustomerPhones => "customer_phones",
            Self::CustomerProducts => "customer_products",
            Self::OrderStatus => "order_status",
        }
    }

    /// Parse a raw model reply: trims whitespace, quotes and trailing punctuation,
    /// lowercases, then matches against the closed set.
    pub fn parse_label(raw: &str) -> Option<Self> {
        let label = raw
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.' || c.is_whitespace())
            .to_lowercase();
        label.parse().ok()
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| format!("unknown intent: {s}"))
    }
}

/// Uniform result of the query agent. `success == false` means "no factual grounding".
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryOutcome {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Which fallback tier produced a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecommendationReason {
    #[serde(rename = "embedding similarity")]
    EmbeddingSimilarity,
    #[serde(rename = "popularity")]
    Popularity,
}

impl RecommendationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmbeddingSimilarity => "embedding similarity",
            Self::Popularity => "popularity",
        }
    }
}

impl std::fmt::Display for RecommendationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ranked product suggestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub product_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: Option<f64>,
    /// Cosine similarity for the similarity tier, total quantity sold for popularity.
    pub score: Option<f64>,
    pub reason: RecommendationReason,
}

/// Nearest-neighbor hit from the mirrored catalog or customer profiles.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityHit {
    pub id: i64,
    pub similarity: f64,
}

/// What the feedback stage managed to write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedbackReport {
    pub interaction_logged: bool,
    pub preference_recorded: bool,
    pub recommendations_recorded: usize,
}

/// Row counts from a mirror resynchronization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub customers: usize,
    pub products: usize,
    /// Products whose embedding was (re)computed in this run.
    pub embedded: usize,
}
