use crate::net::interface::UserId;
use crate::scheduler::ewma::SlotEwma;
use crate::scheduler::users::UserTable;

/// Per-user EWMA of the rate each user was actually granted.
///
/// Updated exactly once per slot tick for every user: the selected user's
/// mean is blended with its instantaneous rate, everyone else decays.
#[derive(Debug, Clone, Copy)]
pub struct RateHistory {
    ewma: SlotEwma,
}

impl RateHistory {
    pub fn new(ewma_window: u32) -> Self {
        Self {
            ewma: SlotEwma::new(ewma_window),
        }
    }

    /// Applies one slot's update. `rates[i]` is user `i`'s instantaneous
    /// rate; only the selected user's entry is read. `selected == None`
    /// decays every user.
    pub fn update<P>(&self, users: &mut UserTable<P>, selected: Option<UserId>, rates: &[f64]) {
        for (id, rec) in users.iter_mut() {
            rec.mean_achieved_rate = if Some(id) == selected {
                let granted = rates.get(id).copied().unwrap_or(0.0);
                self.ewma.blend(rec.mean_achieved_rate, granted)
            } else {
                self.ewma.decay(rec.mean_achieved_rate)
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn means(table: &UserTable<u32>) -> Vec<f64> {
        table.iter().map(|(_, r)| r.mean_achieved_rate()).collect()
    }

    #[test]
    fn first_tick_sets_quarter_of_rate() {
        let history = RateHistory::new(4);
        let mut table: UserTable<u32> = UserTable::new(2, 1.0);
        history.update(&mut table, Some(0), &[10.0, 5.0]);
        let m = means(&table);
        assert!((m[0] - 2.5).abs() < f64::EPSILON);
        assert!((m[1] - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn non_selected_users_decay() {
        let history = RateHistory::new(4);
        let mut table: UserTable<u32> = UserTable::new(2, 1.0);
        history.update(&mut table, Some(0), &[8.0, 8.0]);
        history.update(&mut table, Some(1), &[8.0, 8.0]);
        let m = means(&table);
        // user 0: 2.0 then decayed to 1.5; user 1: 0 then blended to 2.0
        assert!((m[0] - 1.5).abs() < f64::EPSILON);
        assert!((m[1] - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn no_selection_decays_everyone() {
        let history = RateHistory::new(2);
        let mut table: UserTable<u32> = UserTable::new(2, 1.0);
        history.update(&mut table, Some(0), &[4.0, 0.0]);
        history.update(&mut table, None, &[4.0, 0.0]);
        let m = means(&table);
        assert!((m[0] - 1.0).abs() < f64::EPSILON);
        assert!((m[1] - 0.0).abs() < f64::EPSILON);
    }

    proptest! {
        /// The sum of means moves only by the documented EWMA step:
        /// Σ' = (1 − 1/W)·Σ + (1/W)·rate[selected].
        #[test]
        fn mean_mass_follows_ewma(
            window in 1u32..64,
            rates in proptest::collection::vec(0.0f64..1e7, 1..8),
            picks in proptest::collection::vec(any::<usize>(), 1..40),
        ) {
            let history = RateHistory::new(window);
            let mut table: UserTable<u32> = UserTable::new(rates.len(), 1.0);
            let gain = 1.0 / f64::from(window);
            for pick in picks {
                let selected = pick % (rates.len() + 1);
                let selected = (selected < rates.len()).then_some(selected);
                let before: f64 = means(&table).iter().sum();
                history.update(&mut table, selected, &rates);
                let after: f64 = means(&table).iter().sum();
                let injected = selected.map_or(0.0, |s| rates[s]);
                let expected = (1.0 - gain) * before + gain * injected;
                prop_assert!((after - expected).abs() <= 1e-6 * expected.abs().max(1.0));
            }
        }
    }
}
