//! Tier classification
//!
//! Pure function of (impact, kind, last_accessed, created_at, now).
//! Re-run during backfill; tiers can also be promoted indirectly by the
//! N2 impact-bump rule.

use chrono::{DateTime, Utc};

use super::{Impact, MemoryKind, MemoryTier};

/// Days since last access under which a memory stays ACTIVE.
const ACTIVE_ACCESS_DAYS: i64 = 7;

/// Days since creation under which a memory stays CONTEXTUAL.
const CONTEXTUAL_AGE_DAYS: i64 = 30;

/// Classify a memory into a loading tier.
///
/// Rules:
/// - CORE: CRITICAL emotional memories (always loaded)
/// - ACTIVE: accessed within the last 7 days
/// - CONTEXTUAL: created within 30 days, or HIGH/CRITICAL impact
/// - DEEP: everything else (on-demand via semantic search)
pub fn classify_tier(
    impact: Impact,
    kind: MemoryKind,
    last_accessed: DateTime<Utc>,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> MemoryTier {
    if impact == Impact::Critical && kind == MemoryKind::Emotional {
        return MemoryTier::Core;
    }

    if (now - last_accessed).num_days() <= ACTIVE_ACCESS_DAYS {
        return MemoryTier::Active;
    }

    if (now - created_at).num_days() <= CONTEXTUAL_AGE_DAYS
        || matches!(impact, Impact::High | Impact::Critical)
    {
        return MemoryTier::Contextual;
    }

    MemoryTier::Deep
}
