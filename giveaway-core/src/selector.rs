//! Uniform winner draw.

use crate::entities::UserId;
use rand::Rng;
use rand::seq::index;

/// Draw `want` distinct winners from `entrants`.
///
/// Returns every entrant when there are not more than `want` of them;
/// otherwise each `want`-sized subset is equally likely. Entrants are
/// expected to be deduplicated already.
pub fn select_winners<R: Rng + ?Sized>(entrants: &[UserId], want: usize, rng: &mut R) -> Vec<UserId> {
    if entrants.len() <= want {
        return entrants.to_vec();
    }
    index::sample(rng, entrants.len(), want)
        .into_iter()
        .map(|i| entrants[i])
        .collect()
}
