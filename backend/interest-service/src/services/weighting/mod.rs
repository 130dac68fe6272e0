// ============================================
// Interaction Weighting
// ============================================
//
// Single place where weight policy lives:
// - Vote on topic/comment: 3 * value (+3 up, -3 down)
// - Topic view:            1.0
// - Community view:        0.5
//
// Explicit signals count more than implicit ones, and community-level
// views are weaker evidence of topical interest than content views.

use crate::models::InteractionKind;

const VOTE_MULTIPLIER: f64 = 3.0;
const CONTENT_CLICK_WEIGHT: f64 = 1.0;
const COMMUNITY_CLICK_WEIGHT: f64 = 0.5;

pub fn weight_for(kind: InteractionKind) -> f64 {
    match kind {
        InteractionKind::Vote(value) => VOTE_MULTIPLIER * value.signed() as f64,
        InteractionKind::ContentClick => CONTENT_CLICK_WEIGHT,
        InteractionKind::CommunityClick => COMMUNITY_CLICK_WEIGHT,
    }
}
