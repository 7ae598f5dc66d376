//! # User selection: proportional fair and max-weight
//!
//! Candidates are the users the rate estimator reports feasible plus any
//! user holding an abeyant fragment whose rate is nonzero. Candidates are
//! scored in ascending user-id order and the first strictly greater score
//! wins, so ties always go to the lowest user id regardless of the order
//! the estimator reported them in.
//!
//! Under proportional fair a user whose mean achieved rate is zero scores
//! `+∞`. That beats any finite ratio, however large, which a big finite
//! sentinel would not.

use tracing::warn;

use crate::config::SelectionRule;
use crate::net::interface::{PacketUnit, UserId};
use crate::scheduler::users::UserTable;

/// One user's inputs to a selection, frozen for the current tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub user: UserId,
    pub instantaneous_rate: f64,
    pub mean_achieved_rate: f64,
    /// Abeyant fragment bytes plus queued bytes.
    pub effective_backlog: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct UserSelector {
    rule: SelectionRule,
    alpha: f64,
}

impl UserSelector {
    pub fn new(rule: SelectionRule, alpha: f64) -> Self {
        Self { rule, alpha }
    }

    pub fn rule(&self) -> SelectionRule {
        self.rule
    }

    /// Score of a candidate under the configured rule. Higher is better.
    pub fn score(&self, c: &Candidate) -> f64 {
        match self.rule {
            SelectionRule::ProportionalFair => {
                if c.mean_achieved_rate != 0.0 {
                    c.instantaneous_rate / c.mean_achieved_rate
                } else {
                    f64::INFINITY
                }
            }
            SelectionRule::MaxWeight => {
                c.instantaneous_rate * (c.effective_backlog as f64).powf(self.alpha)
            }
        }
    }

    /// Picks the best candidate, `None` if there are none.
    ///
    /// `candidates` must be in ascending user-id order for the lowest-id
    /// tie-break to hold; [`collect_candidates`] produces that order.
    pub fn pick(&self, candidates: &[Candidate]) -> Option<UserId> {
        let mut best: Option<(UserId, f64)> = None;
        for c in candidates {
            let score = self.score(c);
            if score.is_nan() {
                continue;
            }
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((c.user, score)),
            }
        }
        best.map(|(user, _)| user)
    }
}

/// Builds the candidate set for one tick.
///
/// `feasible` may contain duplicates, arrive in any order, or name users
/// the table does not know; those are dropped with a warning.
pub fn collect_candidates<P: PacketUnit>(
    feasible: &[UserId],
    users: &UserTable<P>,
    rates: &[f64],
    queue_backlog: impl Fn(UserId) -> usize,
) -> Vec<Candidate> {
    let mut ids: Vec<UserId> = Vec::with_capacity(feasible.len() + 1);
    for &user in feasible {
        if users.contains(user) {
            ids.push(user);
        } else {
            warn!(user, num_users = users.len(), "estimator reported unknown user");
        }
    }
    ids.extend(
        users
            .abeyant_users()
            .filter(|&u| rates.get(u).copied().unwrap_or(0.0) != 0.0),
    );
    ids.sort_unstable();
    ids.dedup();

    ids.into_iter()
        .map(|user| Candidate {
            user,
            instantaneous_rate: rates.get(user).copied().unwrap_or(0.0),
            mean_achieved_rate: users.mean_achieved_rate(user).unwrap_or(0.0),
            effective_backlog: users.abeyant_bytes(user) + queue_backlog(user),
        })
        .collect()
}
