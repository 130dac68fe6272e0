use crate::error::InterestError;
use crate::utils;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-user running summary of content affinity.
///
/// `interest_vector` is always the component-wise quotient of
/// `weighted_sum_vector` by `total_weight`; it is recomputed on every
/// mutation and never written independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestProfile {
    pub user_id: Uuid,
    pub weighted_sum_vector: Vec<f64>,
    pub total_weight: f64,
    /// `None` while `total_weight == 0` (cold start)
    pub interest_vector: Option<Vec<f32>>,
    pub interaction_count: u64,
    pub updated_at: DateTime<Utc>,
}

impl InterestProfile {
    /// Cold profile: zero vector, zero weight
    pub fn new(user_id: Uuid, dimension: usize) -> Self {
        Self {
            user_id,
            weighted_sum_vector: vec![0.0; dimension],
            total_weight: 0.0,
            interest_vector: None,
            interaction_count: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.weighted_sum_vector.len()
    }

    pub fn is_cold(&self) -> bool {
        self.interest_vector.is_none()
    }

    /// Fold one weighted embedding into the running sums.
    ///
    /// Leaves the profile untouched when the embedding has the wrong length.
    pub fn apply(&mut self, embedding: &[f32], weight: f64) -> Result<(), InterestError> {
        if embedding.len() != self.dimension() {
            return Err(InterestError::DimensionMismatch {
                expected: self.dimension(),
                actual: embedding.len(),
            });
        }

        utils::scaled_add(&mut self.weighted_sum_vector, embedding, weight);
        self.total_weight += weight;
        self.interest_vector = utils::mean(&self.weighted_sum_vector, self.total_weight);
        self.interaction_count += 1;
        self.updated_at = Utc::now();

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    Topic,
    Comment,
    Community,
}

impl OwnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerKind::Topic => "topic",
            OwnerKind::Comment => "comment",
            OwnerKind::Community => "community",
        }
    }
}

/// Embedding of one topic, comment or community, fixed at creation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentEmbedding {
    pub content_id: Uuid,
    pub owner_kind: OwnerKind,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

impl ContentEmbedding {
    pub fn new(content_id: Uuid, owner_kind: OwnerKind, embedding: Vec<f32>) -> Self {
        Self {
            content_id,
            owner_kind,
            embedding,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteValue {
    Up,
    Down,
}

impl VoteValue {
    pub fn signed(&self) -> i8 {
        match self {
            VoteValue::Up => 1,
            VoteValue::Down => -1,
        }
    }
}

impl TryFrom<i64> for VoteValue {
    type Error = InterestError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(VoteValue::Up),
            -1 => Ok(VoteValue::Down),
            other => Err(InterestError::InvalidEvent(format!(
                "vote value must be 1 or -1, got {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InteractionKind {
    /// Up or down vote on a topic or comment
    Vote(VoteValue),
    /// Topic view
    ContentClick,
    /// Community view
    CommunityClick,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Vote(_) => "vote",
            InteractionKind::ContentClick => "content_click",
            InteractionKind::CommunityClick => "community_click",
        }
    }
}

/// Validated interaction, ready for dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionEvent {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub content_id: Uuid,
    pub kind: InteractionKind,
    pub timestamp: DateTime<Utc>,
}

impl InteractionEvent {
    pub fn new(user_id: Uuid, content_id: Uuid, kind: InteractionKind) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            user_id,
            content_id,
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// Interaction as it arrives from the event source; nothing is trusted yet
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionEventPayload {
    pub event_id: Option<String>,
    pub user_id: Option<String>,
    pub content_id: Option<String>,
    pub kind: Option<String>,
    pub value: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl TryFrom<InteractionEventPayload> for InteractionEvent {
    type Error = InterestError;

    fn try_from(payload: InteractionEventPayload) -> Result<Self, Self::Error> {
        let user_id = parse_uuid("user_id", payload.user_id.as_deref())?;
        let content_id = parse_uuid("content_id", payload.content_id.as_deref())?;

        let kind = match payload.kind.as_deref() {
            Some("topic_vote") | Some("comment_vote") => {
                let value = payload.value.ok_or_else(|| {
                    InterestError::InvalidEvent("vote without value".to_string())
                })?;
                InteractionKind::Vote(VoteValue::try_from(value)?)
            }
            Some("topic_click") => InteractionKind::ContentClick,
            Some("community_click") => InteractionKind::CommunityClick,
            Some(other) => {
                return Err(InterestError::InvalidEvent(format!(
                    "unknown interaction kind: {}",
                    other
                )))
            }
            None => {
                return Err(InterestError::InvalidEvent(
                    "missing interaction kind".to_string(),
                ))
            }
        };

        let event_id = match payload.event_id.as_deref() {
            Some(raw) => Uuid::parse_str(raw)
                .map_err(|_| InterestError::InvalidEvent(format!("invalid event_id: {}", raw)))?,
            None => Uuid::new_v4(),
        };

        Ok(InteractionEvent {
            event_id,
            user_id,
            content_id,
            kind,
            timestamp: payload.timestamp.unwrap_or_else(Utc::now),
        })
    }
}

fn parse_uuid(field: &str, raw: Option<&str>) -> Result<Uuid, InterestError> {
    let raw = raw.ok_or_else(|| InterestError::InvalidEvent(format!("missing {}", field)))?;
    Uuid::parse_str(raw)
        .map_err(|_| InterestError::InvalidEvent(format!("invalid {}: {}", field, raw)))
}
