use serde::{Deserialize, Serialize};

use crate::net::interface::UserId;
use crate::scheduler::users::UserRecord;

/// Per-user snapshot for JSON serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStatsSnapshot {
    pub user: UserId,
    pub mean_achieved_rate: f64,
    pub abeyant_bytes: usize,
    pub head_of_line_ts: f64,
    /// Smoothed delay of completed units, 0.0 before the first one.
    pub delay_estimate: f64,
    pub delay_samples: u64,
    pub slots_won: u64,
    pub units_sent: u64,
    pub slices: u64,
    pub bytes_dispatched: u64,
}

impl UserStatsSnapshot {
    pub fn from_record<P>(user: UserId, rec: &UserRecord<P>, abeyant_bytes: usize) -> Self {
        let counters = rec.counters();
        Self {
            user,
            mean_achieved_rate: rec.mean_achieved_rate(),
            abeyant_bytes,
            head_of_line_ts: rec.head_of_line_timestamp(),
            delay_estimate: rec.delay_estimate(),
            delay_samples: rec.delay_samples(),
            slots_won: counters.slots_won,
            units_sent: counters.units_sent,
            slices: counters.slices,
            bytes_dispatched: counters.bytes_dispatched,
        }
    }
}

/// Scheduler-wide snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatsSnapshot {
    pub now: f64,
    pub rule: String,
    pub slot_start: f64,
    pub ticks: u64,
    pub idle_ticks: u64,
    pub link_down: u64,
    pub empty: u64,
    pub zero_delay_retries: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chosen_user: Option<UserId>,
    pub users: Vec<UserStatsSnapshot>,
}

/// Jain's fairness index: `1.0` when all values are equal, `1/n` when one
/// value holds everything. Returns `1.0` for all-zero or empty input.
pub fn jain_index(values: impl IntoIterator<Item = f64>) -> f64 {
    let (mut n, mut sum, mut sum_sq) = (0usize, 0.0, 0.0);
    for v in values {
        n += 1;
        sum += v;
        sum_sq += v * v;
    }
    if sum_sq == 0.0 {
        return 1.0;
    }
    sum * sum / (n as f64 * sum_sq)
}

impl SchedulerStatsSnapshot {
    /// Jain's fairness index over the users' mean achieved rates.
    pub fn jain_fairness(&self) -> f64 {
        jain_index(self.users.iter().map(|u| u.mean_achieved_rate))
    }

    pub fn total_abeyant_bytes(&self) -> usize {
        self.users.iter().map(|u| u.abeyant_bytes).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: UserId, mean: f64) -> UserStatsSnapshot {
        UserStatsSnapshot {
            user: id,
            mean_achieved_rate: mean,
            abeyant_bytes: 10 * id,
            head_of_line_ts: 0.0,
            delay_estimate: 0.0,
            delay_samples: 0,
            slots_won: 0,
            units_sent: 0,
            slices: 0,
            bytes_dispatched: 0,
        }
    }

    fn snapshot(users: Vec<UserStatsSnapshot>) -> SchedulerStatsSnapshot {
        SchedulerStatsSnapshot {
            now: 1.0,
            rule: "max_weight".into(),
            slot_start: 1.0,
            ticks: 3,
            idle_ticks: 0,
            link_down: 0,
            empty: 0,
            zero_delay_retries: 0,
            chosen_user: None,
            users,
        }
    }

    #[test]
    fn jain_index_bounds() {
        let equal = snapshot(vec![user(0, 5.0), user(1, 5.0)]);
        assert!((equal.jain_fairness() - 1.0).abs() < 1e-12);

        let hog = snapshot(vec![user(0, 5.0), user(1, 0.0), user(2, 0.0), user(3, 0.0)]);
        assert!((hog.jain_fairness() - 0.25).abs() < 1e-12);

        let idle = snapshot(vec![user(0, 0.0), user(1, 0.0)]);
        assert!((idle.jain_fairness() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn json_round_trip_skips_missing_choice() {
        let snap = snapshot(vec![user(0, 1.0), user(1, 2.0)]);
        let json = serde_json::to_string(&snap).unwrap();
        assert!(!json.contains("chosen_user"));
        let back: SchedulerStatsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
        assert_eq!(back.total_abeyant_bytes(), 10);
    }
}
