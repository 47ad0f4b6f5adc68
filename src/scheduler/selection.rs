//! Weighted choice of the process an event is scheduled from.
//!
//! A candidate's weight grows with:
//! - being a template rather than a plain process
//! - the share of its steps already completed
//! - being owned by the requesting user
//! - keyword hits against the requester's role tag

use crate::Result;
use crate::models::{MeetingKind, Process};
use crate::storage::Storage;
use rand::Rng;
use rand::seq::IndexedRandom;

const BASE_WEIGHT: f64 = 1.0;
const TEMPLATE_BONUS: f64 = 2.0;
const COMPLETION_BONUS: f64 = 2.0;
const OWNERSHIP_BONUS: f64 = 1.5;
const KEYWORD_BONUS: f64 = 1.0;

/// Keywords that mark a process as relevant to a role.
const ROLE_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "dev",
        &["code", "review", "deploy", "release", "sprint", "bug", "architecture", "api", "test"],
    ),
    (
        "design",
        &["design", "critique", "prototype", "user research", "usability", "style"],
    ),
    (
        "pm",
        &["roadmap", "planning", "stakeholder", "launch", "requirements", "prioritization"],
    ),
    (
        "ops",
        &["incident", "on-call", "deploy", "capacity", "postmortem", "maintenance"],
    ),
    (
        "sales",
        &["pipeline", "demo", "prospect", "forecast", "account", "quarterly"],
    ),
    (
        "support",
        &["ticket", "escalation", "customer", "triage", "knowledge base"],
    ),
];

/// Keywords for a role tag. Unknown roles match on the tag's own words.
pub fn role_keywords(role_tag: &str) -> Vec<String> {
    let role = role_tag.trim().to_lowercase();
    ROLE_KEYWORDS
        .iter()
        .find(|(name, _)| *name == role)
        .map(|(_, words)| words.iter().map(|w| w.to_string()).collect())
        .unwrap_or_else(|| {
            role.split_whitespace()
                .filter(|w| w.len() > 2)
                .map(str::to_string)
                .collect()
        })
}

/// A process eligible to be scheduled, with its selection weight.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub process: Process,
    pub completion_ratio: f64,
    pub weight: f64,
}

impl Candidate {
    pub fn kind(&self) -> MeetingKind {
        MeetingKind::infer(&self.process.title)
    }
}

/// Selection weight of one process.
pub fn weigh(process: &Process, completion_ratio: f64, requester: &str, keywords: &[String]) -> f64 {
    let mut weight = BASE_WEIGHT;
    if process.is_template {
        weight += TEMPLATE_BONUS;
    }
    weight += COMPLETION_BONUS * completion_ratio.clamp(0.0, 1.0);
    if process.owner == requester {
        weight += OWNERSHIP_BONUS;
    }

    let haystack = format!(
        "{} {} {}",
        process.title,
        process.category.as_deref().unwrap_or_default(),
        process.description.as_deref().unwrap_or_default()
    )
    .to_lowercase();
    let hits = keywords.iter().filter(|k| haystack.contains(k.as_str())).count();
    weight + KEYWORD_BONUS * hits as f64
}

/// Resolve the candidate pool for `requester`.
///
/// An empty `pool` means every template in the store plus the requester's
/// own plain processes. Instances are never candidates, and plain processes
/// owned by someone else are dropped since they cannot be linked.
pub fn build_pool(
    storage: &Storage,
    requester: &str,
    role_tag: Option<&str>,
    pool: &[i64],
) -> Result<Vec<Candidate>> {
    let processes = if pool.is_empty() {
        let mut all = storage.list_processes(None, Some(true))?;
        all.extend(storage.list_processes(Some(requester), Some(false))?);
        all
    } else {
        let mut found = Vec::new();
        for &id in pool {
            match storage.get_process(id)? {
                Some(p) => found.push(p),
                None => tracing::debug!(process_id = id, "pool entry not found, skipping"),
            }
        }
        found
    };

    let keywords = role_tag.map(role_keywords).unwrap_or_default();
    let mut candidates = Vec::new();
    for process in processes {
        if process.is_instance() {
            continue;
        }
        if !process.is_template && process.owner != requester {
            tracing::debug!(process_id = process.id, "plain process of another owner, skipping");
            continue;
        }
        let ratio = storage.process_progress(process.id)?.ratio();
        let weight = weigh(&process, ratio, requester, &keywords);
        candidates.push(Candidate {
            process,
            completion_ratio: ratio,
            weight,
        });
    }

    candidates.sort_by_key(|c| c.process.id);
    candidates.dedup_by_key(|c| c.process.id);
    Ok(candidates)
}

/// Weighted random pick.
pub fn choose<'a, R: Rng + ?Sized>(candidates: &[&'a Candidate], rng: &mut R) -> Option<&'a Candidate> {
    candidates.choose_weighted(rng, |c| c.weight).ok().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestEnv;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_weights_favor_templates_and_ownership() {
        let keywords = role_keywords("dev");
        let template = Process::template("alice", "Lunch");
        let plain = Process::new("alice", "Lunch");
        let foreign = Process::template("bob", "Lunch");

        let w_template = weigh(&template, 0.0, "alice", &keywords);
        let w_plain = weigh(&plain, 0.0, "alice", &keywords);
        let w_foreign = weigh(&foreign, 0.0, "alice", &keywords);
        assert!(w_template > w_plain);
        assert!(w_template > w_foreign);
    }

    #[test]
    fn test_weights_favor_progress_and_keywords() {
        let keywords = role_keywords("dev");
        let process = Process::template("bob", "Code review");
        let other = Process::template("bob", "Lunch");
        assert!(weigh(&process, 0.0, "alice", &keywords) > weigh(&other, 0.0, "alice", &keywords));
        assert!(weigh(&other, 1.0, "alice", &keywords) > weigh(&other, 0.0, "alice", &keywords));
    }

    #[test]
    fn test_unknown_role_uses_its_own_words() {
        assert_eq!(role_keywords("data science"), vec!["data", "science"]);
        assert!(role_keywords("DEV").contains(&"deploy".to_string()));
    }

    #[test]
    fn test_pool_skips_instances_and_foreign_plain_processes() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        let template = storage.insert_process(&Process::template("bob", "Retro")).unwrap();
        storage.insert_process(&Process::new("bob", "Bob's errands")).unwrap();
        let own = storage.insert_process(&Process::new("alice", "Alice's errands")).unwrap();
        let mut instance = Process::new("alice", "Retro");
        instance.template_id = Some(template);
        storage.insert_process(&instance).unwrap();

        let ids: Vec<i64> = build_pool(&storage, "alice", None, &[])
            .unwrap()
            .iter()
            .map(|c| c.process.id)
            .collect();
        assert_eq!(ids, vec![template, own]);
    }

    #[test]
    fn test_explicit_pool_ignores_missing_ids() {
        let env = TestEnv::new();
        let storage = env.init_storage();
        let template = storage.insert_process(&Process::template("bob", "Retro")).unwrap();
        let pool = build_pool(&storage, "alice", Some("dev"), &[template, 999]).unwrap();
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_choose_is_deterministic_for_a_seed() {
        let a = Candidate {
            process: Process::template("alice", "A"),
            completion_ratio: 0.0,
            weight: 1.0,
        };
        let b = Candidate {
            process: Process::template("alice", "B"),
            completion_ratio: 0.0,
            weight: 3.0,
        };
        let refs = vec![&a, &b];
        let first = choose(&refs, &mut StdRng::seed_from_u64(7)).unwrap().process.title.clone();
        let second = choose(&refs, &mut StdRng::seed_from_u64(7)).unwrap().process.title.clone();
        assert_eq!(first, second);
        assert!(choose(&[], &mut StdRng::seed_from_u64(7)).is_none());
    }
}
