// src/routing/pool.rs
// Consultant Pool: per-department consultant queues and load counters (spec §4.7).

use crate::config::AssignmentStrategy;
use crate::domain::Department;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct Consultant {
    pub id: String,
    pub active_load: u32,
    pub skills: HashSet<String>,
}

impl Consultant {
    pub fn new(id: impl Into<String>, skills: impl IntoIterator<Item = String>) -> Self {
        Self {
            id: id.into(),
            active_load: 0,
            skills: skills.into_iter().collect(),
        }
    }
}

/// One department's consultant roster plus its round-robin cursor. All
/// mutation happens under this struct's own lock, never a pool-wide one
/// (spec §4.7: "mutation of per-department state is serialized
/// per-department").
struct DepartmentState {
    consultants: Vec<Consultant>,
    round_robin_cursor: usize,
}

/// Process-local consultant directory (spec §3: "ConsultantPool... not
/// persisted by the core", see DESIGN.md for the resolved Open Question).
/// Locking is fine-grained: one `Mutex` per department, so assignment for
/// `finance` never blocks assignment for `technical_support`.
pub struct ConsultantPool {
    departments: HashMap<Department, Mutex<DepartmentState>>,
}

impl ConsultantPool {
    pub fn new() -> Self {
        Self {
            departments: HashMap::new(),
        }
    }

    /// Registers a consultant under a department, creating the department's
    /// roster on first use.
    pub fn add_consultant(&mut self, department: Department, consultant: Consultant) {
        self.departments
            .entry(department)
            .or_insert_with(|| {
                Mutex::new(DepartmentState {
                    consultants: Vec::new(),
                    round_robin_cursor: 0,
                })
            })
            .lock()
            .consultants
            .push(consultant);
    }

    /// Assigns a consultant for `department` per `strategy`, incrementing
    /// that consultant's `active_load` on success. Returns `None` (not an
    /// error) if the department has no registered consultants (spec §4.6:
    /// "on empty pool: consultant = null").
    pub fn assign(
        &self,
        department: Department,
        strategy: AssignmentStrategy,
        skill_tags: &HashSet<String>,
    ) -> Option<String> {
        let state_lock = self.departments.get(&department)?;
        let mut state = state_lock.lock();
        if state.consultants.is_empty() {
            return None;
        }

        let index = match strategy {
            AssignmentStrategy::RoundRobin => {
                let idx = state.round_robin_cursor % state.consultants.len();
                state.round_robin_cursor = (state.round_robin_cursor + 1) % state.consultants.len();
                idx
            }
            AssignmentStrategy::SkillMatch => {
                let candidates: Vec<usize> = state
                    .consultants
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| skill_tags.is_subset(&c.skills))
                    .map(|(i, _)| i)
                    .collect();
                if candidates.is_empty() {
                    // No skill match: fall back to least-loaded over the whole roster
                    // rather than refusing assignment outright.
                    least_loaded_index(&state.consultants)
                } else {
                    least_loaded_among(&state.consultants, &candidates)
                }
            }
            AssignmentStrategy::LeastLoaded => least_loaded_index(&state.consultants),
        };

        state.consultants[index].active_load += 1;
        Some(state.consultants[index].id.clone())
    }
}

impl Default for ConsultantPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Least loaded consultant over the whole roster, ties broken by
/// round-robin order (i.e. lowest index, spec §4.7).
fn least_loaded_index(consultants: &[Consultant]) -> usize {
    consultants
        .iter()
        .enumerate()
        .min_by_key(|(i, c)| (c.active_load, *i))
        .map(|(i, _)| i)
        .expect("caller checked consultants is non-empty")
}

/// Least loaded among a subset, ties broken lexicographically by
/// consultant id (spec §4.7's `skill_match` tie-break).
fn least_loaded_among(consultants: &[Consultant], candidates: &[usize]) -> usize {
    *candidates
        .iter()
        .min_by(|&&a, &&b| {
            let ca = &consultants[a];
            let cb = &consultants[b];
            ca.active_load
                .cmp(&cb.active_load)
                .then_with(|| ca.id.cmp(&cb.id))
        })
        .expect("caller checked candidates is non-empty")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pool() -> ConsultantPool {
        let mut pool = ConsultantPool::new();
        pool.add_consultant(
            Department::TechnicalSupport,
            Consultant::new("alice", ["networking".to_string()]),
        );
        pool.add_consultant(
            Department::TechnicalSupport,
            Consultant::new("bob", ["security".to_string()]),
        );
        pool
    }

    #[test]
    fn round_robin_cycles_through_consultants() {
        let pool = sample_pool();
        let tags = HashSet::new();
        let first = pool
            .assign(Department::TechnicalSupport, AssignmentStrategy::RoundRobin, &tags)
            .unwrap();
        let second = pool
            .assign(Department::TechnicalSupport, AssignmentStrategy::RoundRobin, &tags)
            .unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn skill_match_prefers_matching_consultant() {
        let pool = sample_pool();
        let tags: HashSet<String> = ["security".to_string()].into_iter().collect();
        let chosen = pool
            .assign(Department::TechnicalSupport, AssignmentStrategy::SkillMatch, &tags)
            .unwrap();
        assert_eq!(chosen, "bob");
    }

    #[test]
    fn least_loaded_picks_lower_load() {
        let pool = sample_pool();
        let tags = HashSet::new();
        // load alice up first
        pool.assign(Department::TechnicalSupport, AssignmentStrategy::RoundRobin, &tags);
        let chosen = pool
            .assign(Department::TechnicalSupport, AssignmentStrategy::LeastLoaded, &tags)
            .unwrap();
        assert_eq!(chosen, "bob");
    }

    #[test]
    fn empty_department_returns_none() {
        let pool = ConsultantPool::new();
        let tags = HashSet::new();
        assert!(pool
            .assign(Department::Legal, AssignmentStrategy::RoundRobin, &tags)
            .is_none());
    }

    #[test]
    fn assignment_increments_active_load() {
        let pool = sample_pool();
        let tags = HashSet::new();
        pool.assign(Department::TechnicalSupport, AssignmentStrategy::RoundRobin, &tags);
        // round robin already advanced; assign again to inspect load via least_loaded
        pool.assign(Department::TechnicalSupport, AssignmentStrategy::RoundRobin, &tags);
        let state = pool.departments.get(&Department::TechnicalSupport).unwrap().lock();
        assert!(state.consultants.iter().all(|c| c.active_load >= 1));
    }
}
