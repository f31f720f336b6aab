//! Row selection: an inclusive date window, or stratified Bernoulli sampling with
//! one independent random stream per calendar month.

use crate::date::{format_date, YearMonth};
use crate::record::Transaction;
use ahash::AHashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use time::Date;

/// The single selection policy of a run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Selection {
    /// Keep rows with `start <= t_dat <= end`; an unset bound is open.
    Range { start: Option<Date>, end: Option<Date> },
    /// Keep each row with probability `frac`, drawn per month stratum.
    Fraction { frac: f64, seed: u64 },
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |d: &Option<Date>| d.map(format_date).unwrap_or_else(|| "..".to_string());
        match self {
            Selection::Range { start, end } => write!(f, "range [{}, {}]", bound(start), bound(end)),
            Selection::Fraction { frac, seed } => write!(f, "fraction {frac} (seed {seed})"),
        }
    }
}

/// Seed of a month's stream: the run seed mixed with the month ordinal
/// through the splitmix64 finalizer.
fn period_seed(seed: u64, period: YearMonth) -> u64 {
    let mut z = seed ^ period.ordinal().wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

pub struct Selector {
    selection: Selection,
    // Created on first sight of a month, then kept for the whole run.
    streams: AHashMap<YearMonth, StdRng>,
}

impl Selector {
    pub fn new(selection: Selection) -> Self {
        Self { selection, streams: AHashMap::new() }
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Filter one batch in place, preserving the relative order of kept rows.
    ///
    /// In fraction mode each row consumes exactly one draw from its month's stream,
    /// in streaming order. The n-th row of a month therefore always sees the n-th
    /// draw of that stream, whatever the batch size.
    pub fn select(&mut self, mut batch: Vec<Transaction>) -> Vec<Transaction> {
        match self.selection {
            Selection::Range { start, end } => {
                batch.retain(|row| start.map_or(true, |s| row.t_dat >= s) && end.map_or(true, |e| row.t_dat <= e));
            }
            Selection::Fraction { frac, seed } => {
                let streams = &mut self.streams;
                batch.retain(|row| {
                    let period = row.period();
                    let rng = streams
                        .entry(period)
                        .or_insert_with(|| StdRng::seed_from_u64(period_seed(seed, period)));
                    rng.gen::<f64>() < frac
                });
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn row(t_dat: Date) -> Transaction {
        Transaction { t_dat, customer_id: "c".into(), article_id: 1, price: 0.1, sales_channel_id: 1 }
    }

    #[test]
    fn period_seeds_differ_by_month_and_seed() {
        let a = YearMonth::new(2020, 1);
        let b = YearMonth::new(2020, 2);
        assert_ne!(period_seed(42, a), period_seed(42, b));
        assert_ne!(period_seed(42, a), period_seed(43, a));
        assert_eq!(period_seed(42, a), period_seed(42, a));
    }

    /// Interleaving months inside a batch does not change any month's draws.
    #[test]
    fn months_draw_from_independent_streams() {
        let jan: Vec<_> = (0..200).map(|_| row(date!(2020 - 01 - 10))).collect();
        let feb: Vec<_> = (0..200).map(|_| row(date!(2020 - 02 - 10))).collect();
        let sel = Selection::Fraction { frac: 0.3, seed: 9 };

        let mut separate = Selector::new(sel);
        let kept_jan = separate.select(jan.clone()).len();
        let kept_feb = separate.select(feb.clone()).len();

        let mixed: Vec<_> = jan.into_iter().zip(feb).flat_map(|(a, b)| [a, b]).collect();
        let kept = Selector::new(sel).select(mixed);
        let mixed_jan = kept.iter().filter(|r| r.t_dat.month() == time::Month::January).count();
        assert_eq!(mixed_jan, kept_jan);
        assert_eq!(kept.len() - mixed_jan, kept_feb);
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let batch = vec![row(date!(2020 - 02 - 29)), row(date!(2020 - 03 - 01)), row(date!(2020 - 03 - 02))];
        let mut s = Selector::new(Selection::Range { start: Some(date!(2020 - 03 - 01)), end: None });
        assert_eq!(s.select(batch.clone()).len(), 2);
        let mut s = Selector::new(Selection::Range { start: None, end: Some(date!(2020 - 03 - 01)) });
        assert_eq!(s.select(batch).len(), 2);
    }
}
