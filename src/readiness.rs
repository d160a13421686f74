use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::models::{PrerequisiteStanding, ReadinessReport};

/// Weighted-score level the UI presents as "ready"; informational only,
/// the unlocking gate is the required-prerequisite check.
pub const READINESS_THRESHOLD: f64 = 70.0;

/// Importance-weighted readiness over a lecture's declared prerequisites.
///
/// score = 100 x satisfied importance mass / total importance mass, 100 when
/// there are no prerequisites. `satisfied` is true iff every *required*
/// prerequisite is mastered, independent of the score; `meets_threshold`
/// reports the separate 70% score check.
pub fn compute_readiness(standings: &[PrerequisiteStanding]) -> ReadinessReport {
    if standings.is_empty() {
        return ReadinessReport {
            score: 100.0,
            satisfied: true,
            meets_threshold: true,
        };
    }

    let total: i32 = standings.iter().map(|s| s.importance).sum();
    let satisfied_mass: i32 = standings
        .iter()
        .filter(|s| s.satisfied)
        .map(|s| s.importance)
        .sum();
    let score = if total > 0 {
        100.0 * satisfied_mass as f64 / total as f64
    } else {
        100.0
    };

    let satisfied = standings
        .iter()
        .filter(|s| s.required)
        .all(|s| s.satisfied);

    ReadinessReport {
        score,
        satisfied,
        meets_threshold: score >= READINESS_THRESHOLD,
    }
}

/// Would adding the edge lecture -> prerequisite close a cycle in the
/// declared prerequisite graph? A self-edge always does. Edges are
/// (lecture, prerequisite) pairs; the new edge cycles iff `lecture` is
/// already reachable from `prerequisite`.
pub fn creates_cycle(edges: &[(Uuid, Uuid)], lecture: Uuid, prerequisite: Uuid) -> bool {
    if lecture == prerequisite {
        return true;
    }

    let mut adjacency: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (from, to) in edges {
        adjacency.entry(*from).or_default().push(*to);
    }

    let mut stack = vec![prerequisite];
    let mut seen: HashSet<Uuid> = HashSet::new();
    while let Some(node) = stack.pop() {
        if node == lecture {
            return true;
        }
        if !seen.insert(node) {
            continue;
        }
        if let Some(next) = adjacency.get(&node) {
            stack.extend(next.iter().copied());
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standing(required: bool, importance: i32, satisfied: bool) -> PrerequisiteStanding {
        PrerequisiteStanding {
            prerequisite_slug: "plato-forms".to_string(),
            required,
            importance,
            satisfied,
        }
    }

    #[test]
    fn no_prerequisites_is_fully_ready() {
        let report = compute_readiness(&[]);
        assert_eq!(report.score, 100.0);
        assert!(report.satisfied);
        assert!(report.meets_threshold);
    }

    #[test]
    fn weighted_score_matches_worked_example() {
        // required importance 3 satisfied + required importance 2 unsatisfied
        let report = compute_readiness(&[standing(true, 3, true), standing(true, 2, false)]);
        assert!((report.score - 60.0).abs() < 0.001);
        assert!(!report.satisfied);
        assert!(!report.meets_threshold);
    }

    #[test]
    fn any_unsatisfied_required_blocks_regardless_of_score() {
        let report = compute_readiness(&[
            standing(false, 5, true),
            standing(false, 5, true),
            standing(true, 1, false),
        ]);
        assert!(report.score > 90.0);
        assert!(report.meets_threshold);
        assert!(!report.satisfied);
    }

    #[test]
    fn recommended_only_is_satisfied_even_when_unwatched() {
        let report = compute_readiness(&[standing(false, 4, false), standing(false, 2, false)]);
        assert_eq!(report.score, 0.0);
        assert!(report.satisfied);
        assert!(!report.meets_threshold);
    }

    #[test]
    fn score_is_monotonic_in_satisfied_mass() {
        let none = compute_readiness(&[standing(true, 3, false), standing(false, 2, false)]);
        let some = compute_readiness(&[standing(true, 3, true), standing(false, 2, false)]);
        let all = compute_readiness(&[standing(true, 3, true), standing(false, 2, true)]);
        assert!(none.score < some.score);
        assert!(some.score < all.score);
        assert_eq!(all.score, 100.0);
    }

    #[test]
    fn self_edge_is_a_cycle() {
        let id = Uuid::new_v4();
        assert!(creates_cycle(&[], id, id));
    }

    #[test]
    fn closing_a_chain_is_a_cycle() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        // a requires b, b requires c; making c require a closes the loop
        let edges = vec![(a, b), (b, c)];
        assert!(creates_cycle(&edges, c, a));
        assert!(!creates_cycle(&edges, a, c));
    }

    #[test]
    fn diamond_dependencies_are_not_cycles() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let d = Uuid::new_v4();
        let edges = vec![(a, b), (a, c), (b, d)];
        assert!(!creates_cycle(&edges, c, d));
    }
}
