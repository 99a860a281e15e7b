//! Greedy disjoint pairing
//!
//! Greedy maximum-weight-ish matching over participants' mean
//! embeddings. Deterministic end to end: candidate edges sort by score
//! descending with ties broken by ascending id pair, leftovers are
//! handled in ascending id order, and the trio tie-break takes the
//! first qualifying pair.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use huddle_common::db;
use huddle_common::events::{name, Group, Pairing};
use huddle_common::vecmath::cosine;
use huddle_common::{Error, Result};

use super::{participant_vectors, round4};
use crate::state::AppState;

/// Compute the pairing for the current run, persist it as the run's
/// saved snapshot and broadcast it under the `matches` event.
pub async fn run_matching(state: &AppState) -> Result<Pairing> {
    let run_id = state.runs.current_run_id(&state.db).await?;

    let people = db::list_participants(&state.db).await?;
    if people.is_empty() {
        return Err(Error::InvalidInput("no participants have joined".to_string()));
    }
    let submissions = db::submissions_for_run(&state.db, run_id).await?;
    if submissions.is_empty() {
        return Err(Error::InvalidInput(
            "no submissions for the current run".to_string(),
        ));
    }
    let embeddings = db::embeddings_for_run(&state.db, run_id).await?;

    let vectors = participant_vectors(&submissions, &embeddings);
    let ids: Vec<i64> = people.iter().map(|p| p.id).collect();

    let mut groups = greedy_groups(&ids, &vectors);

    // Decorate with display names for rendering
    let name_by_id: HashMap<i64, &str> =
        people.iter().map(|p| (p.id, p.display_name.as_str())).collect();
    for group in &mut groups {
        group.names = group
            .members
            .iter()
            .map(|id| {
                name_by_id
                    .get(id)
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| format!("#{}", id))
            })
            .collect();
    }

    let pairing = Pairing { pairs: groups };
    let json = serde_json::to_string(&pairing).map_err(|e| Error::Internal(e.to_string()))?;
    db::save_run_pairing(&state.db, run_id, &json).await?;
    state.bus.publish(name::MATCHES, &pairing);

    Ok(pairing)
}

/// Greedy disjoint grouping.
///
/// `ids` must be in ascending order (they come from an `ORDER BY id`
/// query). Participants missing from `vectors` skip the scored pass and
/// land in the leftover handling.
pub(crate) fn greedy_groups(ids: &[i64], vectors: &HashMap<i64, Vec<f64>>) -> Vec<Group> {
    let with_vec: Vec<i64> = ids.iter().copied().filter(|id| vectors.contains_key(id)).collect();

    // All-pairs candidates, scores rounded to 4 decimals
    let mut candidates: Vec<(i64, i64, f64)> = Vec::new();
    for (i, &u) in with_vec.iter().enumerate() {
        for &v in &with_vec[i + 1..] {
            candidates.push((u, v, round4(cosine(&vectors[&u], &vectors[&v]))));
        }
    }
    candidates.sort_by(|a, b| {
        b.2.partial_cmp(&a.2)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
            .then_with(|| a.1.cmp(&b.1))
    });

    // Greedy walk: accept an edge only when both endpoints are free
    let mut used: HashSet<i64> = HashSet::new();
    let mut groups: Vec<Group> = Vec::new();
    for (u, v, score) in candidates {
        if used.contains(&u) || used.contains(&v) {
            continue;
        }
        used.insert(u);
        used.insert(v);
        groups.push(Group {
            members: vec![u, v],
            score,
            names: Vec::new(),
        });
    }

    // Leftovers in ascending id order: unmatched plus vector-less
    let mut leftover: Vec<i64> = ids.iter().copied().filter(|id| !used.contains(id)).collect();

    // Odd leftover count with at least one pair: absorb one into the
    // pair with the highest average similarity, first pair wins ties.
    if leftover.len() % 2 == 1 && !groups.is_empty() {
        if let Some(solo) = leftover.pop() {
            let mut best_idx = 0;
            let mut best_score = f64::NEG_INFINITY;
            for (idx, group) in groups.iter().enumerate() {
                let avg = match vectors.get(&solo) {
                    Some(sv) => {
                        group
                            .members
                            .iter()
                            .map(|m| vectors.get(m).map(|mv| cosine(mv, sv)).unwrap_or(0.0))
                            .sum::<f64>()
                            / group.members.len() as f64
                    }
                    None => 0.0,
                };
                if avg > best_score {
                    best_score = avg;
                    best_idx = idx;
                }
            }
            groups[best_idx].members.push(solo);
        }
    }

    // Pair remaining leftovers consecutively; a final odd one becomes a
    // singleton group (only possible when no scored pair existed).
    for chunk in leftover.chunks(2) {
        groups.push(Group {
            members: chunk.to_vec(),
            score: 0.0,
            names: Vec::new(),
        });
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vectors(entries: &[(i64, &[f64])]) -> HashMap<i64, Vec<f64>> {
        entries.iter().map(|(id, v)| (*id, v.to_vec())).collect()
    }

    #[test]
    fn no_participant_appears_twice() {
        let ids = vec![1, 2, 3, 4, 5, 6, 7];
        let vectors = vectors(&[
            (1, &[1.0, 0.0]),
            (2, &[0.9, 0.1]),
            (3, &[0.0, 1.0]),
            (4, &[0.1, 0.9]),
            (5, &[0.7, 0.7]),
        ]);

        let groups = greedy_groups(&ids, &vectors);

        let mut seen = HashSet::new();
        for group in &groups {
            for member in &group.members {
                assert!(seen.insert(*member), "participant {} duplicated", member);
            }
        }
        let total: usize = groups.iter().map(|g| g.members.len()).sum();
        assert_eq!(total, ids.len());
    }

    #[test]
    fn two_best_pairs_plus_trio_absorbing_vectorless_leftover() {
        // 1 and 2 identical, 3 and 4 identical, 5 has no vector.
        let ids = vec![1, 2, 3, 4, 5];
        let vectors = vectors(&[
            (1, &[1.0, 0.0]),
            (2, &[1.0, 0.0]),
            (3, &[0.0, 1.0]),
            (4, &[0.0, 1.0]),
        ]);

        let groups = greedy_groups(&ids, &vectors);

        assert_eq!(groups.len(), 2);
        // 5 has no vector: every pair averages 0, first pair wins the tie
        assert_eq!(groups[0].members, vec![1, 2, 5]);
        assert_eq!(groups[0].score, 1.0);
        assert_eq!(groups[1].members, vec![3, 4]);
        assert_eq!(groups[1].score, 1.0);
    }

    #[test]
    fn trio_attaches_to_most_similar_pair() {
        let ids = vec![1, 2, 3, 4, 5];
        let vectors = vectors(&[
            (1, &[1.0, 0.0]),
            (2, &[1.0, 0.0]),
            (3, &[0.0, 1.0]),
            (4, &[0.0, 1.0]),
            (5, &[0.0, 0.9]),
        ]);

        let groups = greedy_groups(&ids, &vectors);

        // 5 is close to the {3,4} pair, not the {1,2} pair
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members, vec![1, 2]);
        assert_eq!(groups[1].members, vec![3, 4, 5]);
    }

    #[test]
    fn vectorless_participants_pair_by_id_order_with_zero_score() {
        let ids = vec![1, 2, 3, 4];
        let groups = greedy_groups(&ids, &HashMap::new());

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members, vec![1, 2]);
        assert_eq!(groups[1].members, vec![3, 4]);
        assert!(groups.iter().all(|g| g.score == 0.0));
    }

    #[test]
    fn singleton_emitted_only_when_no_pair_can_absorb() {
        let ids = vec![1, 2, 3];
        let groups = greedy_groups(&ids, &HashMap::new());

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members, vec![1, 2]);
        assert_eq!(groups[1].members, vec![3]);
        assert_eq!(groups[1].score, 0.0);
    }

    #[test]
    fn tie_break_is_lexicographic_on_id_pair() {
        // All pairs score identically; greedy must take (1,2) then (3,4).
        let ids = vec![1, 2, 3, 4];
        let vectors = vectors(&[
            (1, &[1.0, 0.0]),
            (2, &[1.0, 0.0]),
            (3, &[1.0, 0.0]),
            (4, &[1.0, 0.0]),
        ]);

        let groups = greedy_groups(&ids, &vectors);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members, vec![1, 2]);
        assert_eq!(groups[1].members, vec![3, 4]);
    }

    #[test]
    fn single_participant_with_vector_is_singleton() {
        let ids = vec![1];
        let vectors = vectors(&[(1, &[1.0, 0.0])]);
        let groups = greedy_groups(&ids, &vectors);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members, vec![1]);
        assert_eq!(groups[0].score, 0.0);
    }
}
