//! Time-overlap computation between conferences.
//!
//! Confirming a seat makes a waitlisted spot for a time-conflicting conference
//! worthless to the user; the admission engine uses this module to find those
//! conflicts and withdraw the user from the competing waitlists.

use crate::types::{Conference, ConferenceId};

/// Whether two conferences' `[start, end]` intervals intersect.
///
/// Intervals are closed: conferences that merely touch (one ends exactly when
/// the other starts) count as overlapping.
#[must_use]
pub fn overlaps(a: &Conference, b: &Conference) -> bool {
    a.start_time <= b.end_time && b.start_time <= a.end_time
}

/// Conferences from `candidates` that overlap `target`, excluding `target`
/// itself.
pub fn overlapping<'a, I>(target: &'a Conference, candidates: I) -> impl Iterator<Item = &'a Conference>
where
    I: IntoIterator<Item = &'a Conference>,
{
    candidates
        .into_iter()
        .filter(|c| c.id != target.id && overlaps(target, c))
}

/// Ids of the conferences from `candidates` that overlap `target`.
#[must_use]
pub fn overlapping_ids(target: &Conference, candidates: &[Conference]) -> Vec<ConferenceId> {
    overlapping(target, candidates).map(|c| c.id).collect()
}
