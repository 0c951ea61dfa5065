//! Aggregate kinds and running aggregate operators.

use super::unary;
use crate::dataflow::DifferenceStream;
use crate::multiset::{Entry, Multiplicity, Multiset};
use core::cell::{Cell, RefCell};
use core::cmp::Ordering;
use std::collections::BTreeMap;

/// The aggregate functions supported over numeric fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// An `f64` ordered with `total_cmp`, usable as a map key.
#[derive(Clone, Copy, Debug)]
pub struct OrderedValue(pub f64);

impl PartialEq for OrderedValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderedValue {}

impl PartialOrd for OrderedValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Running state of one aggregate.
///
/// Values are folded in with a signed multiplicity, so retractions undo
/// earlier insertions exactly. An empty accumulator evaluates to zero.
#[derive(Clone, Debug, PartialEq)]
pub enum Accumulator {
    Count { count: i64 },
    Sum { sum: f64 },
    Avg { sum: f64, count: i64 },
    Min { values: BTreeMap<OrderedValue, Multiplicity> },
    Max { values: BTreeMap<OrderedValue, Multiplicity> },
}

impl Accumulator {
    /// Creates an empty accumulator for `kind`.
    pub fn new(kind: AggregateKind) -> Self {
        match kind {
            AggregateKind::Count => Accumulator::Count { count: 0 },
            AggregateKind::Sum => Accumulator::Sum { sum: 0.0 },
            AggregateKind::Avg => Accumulator::Avg { sum: 0.0, count: 0 },
            AggregateKind::Min => Accumulator::Min {
                values: BTreeMap::new(),
            },
            AggregateKind::Max => Accumulator::Max {
                values: BTreeMap::new(),
            },
        }
    }

    pub fn kind(&self) -> AggregateKind {
        match self {
            Accumulator::Count { .. } => AggregateKind::Count,
            Accumulator::Sum { .. } => AggregateKind::Sum,
            Accumulator::Avg { .. } => AggregateKind::Avg,
            Accumulator::Min { .. } => AggregateKind::Min,
            Accumulator::Max { .. } => AggregateKind::Max,
        }
    }

    /// Folds `value` in `multiplicity` times.
    pub fn add(&mut self, value: f64, multiplicity: Multiplicity) {
        match self {
            Accumulator::Count { count } => *count += multiplicity,
            Accumulator::Sum { sum } => *sum += value * multiplicity as f64,
            Accumulator::Avg { sum, count } => {
                *sum += value * multiplicity as f64;
                *count += multiplicity;
            }
            Accumulator::Min { values } | Accumulator::Max { values } => {
                if multiplicity == 0 {
                    return;
                }
                let slot = values.entry(OrderedValue(value)).or_insert(0);
                *slot += multiplicity;
                if *slot <= 0 {
                    values.remove(&OrderedValue(value));
                }
            }
        }
    }

    /// Returns the current aggregate value.
    pub fn value(&self) -> f64 {
        match self {
            Accumulator::Count { count } => *count as f64,
            Accumulator::Sum { sum } => *sum,
            Accumulator::Avg { sum, count } => {
                if *count == 0 {
                    0.0
                } else {
                    sum / *count as f64
                }
            }
            Accumulator::Min { values } => values.keys().next().map_or(0.0, |v| v.0),
            Accumulator::Max { values } => values.keys().next_back().map_or(0.0, |v| v.0),
        }
    }
}

/// Aggregates `field` over `values`, each counted once.
///
/// Used by group-by reducers, which see a group's full membership.
pub fn aggregate_values<'a, T, I, F>(kind: AggregateKind, values: I, field: F) -> f64
where
    T: 'a,
    I: IntoIterator<Item = &'a T>,
    F: Fn(&T) -> f64,
{
    let mut acc = Accumulator::new(kind);
    for value in values {
        acc.add(field(value), 1);
    }
    acc.value()
}

struct RunningState<T, U> {
    acc: Accumulator,
    last_row: Option<T>,
    last_output: Option<U>,
}

impl<T: Clone + 'static> DifferenceStream<T> {
    /// Maintains one aggregate over the whole stream.
    ///
    /// Every push folds its entries into the accumulator, then `output` builds
    /// the emitted row from the last row received and the aggregate value.
    /// The previous row is retracted before the new one is inserted, except
    /// on the first emission.
    #[must_use]
    pub fn aggregate<U, F, O>(&self, kind: AggregateKind, field: F, output: O) -> DifferenceStream<U>
    where
        U: Clone + 'static,
        F: Fn(&T) -> f64 + 'static,
        O: Fn(&T, f64) -> U + 'static,
    {
        let state = RefCell::new(RunningState {
            acc: Accumulator::new(kind),
            last_row: None,
            last_output: None,
        });

        unary(self, move |_, data| {
            let mut guard = state.borrow_mut();
            let state = &mut *guard;
            for entry in data.iter() {
                state.acc.add(field(&entry.value), entry.multiplicity);
                state.last_row = Some(entry.value);
            }
            let Some(row) = state.last_row.as_ref() else {
                return Ok(None);
            };

            let next = output(row, state.acc.value());
            let mut out = Vec::with_capacity(2);
            if let Some(previous) = state.last_output.replace(next.clone()) {
                out.push(Entry::retract(previous));
            }
            out.push(Entry::insert(next));
            Ok(Some(Multiset::new(out)))
        })
    }

    /// Running count of multiplicities. `output` receives the count.
    #[must_use]
    pub fn count<U, O>(&self, output: O) -> DifferenceStream<U>
    where
        U: Clone + 'static,
        O: Fn(&T, i64) -> U + 'static,
    {
        self.aggregate(AggregateKind::Count, |_| 0.0, move |row, n| output(row, n as i64))
    }

    #[must_use]
    pub fn sum<U, F, O>(&self, field: F, output: O) -> DifferenceStream<U>
    where
        U: Clone + 'static,
        F: Fn(&T) -> f64 + 'static,
        O: Fn(&T, f64) -> U + 'static,
    {
        self.aggregate(AggregateKind::Sum, field, output)
    }

    #[must_use]
    pub fn average<U, F, O>(&self, field: F, output: O) -> DifferenceStream<U>
    where
        U: Clone + 'static,
        F: Fn(&T) -> f64 + 'static,
        O: Fn(&T, f64) -> U + 'static,
    {
        self.aggregate(AggregateKind::Avg, field, output)
    }

    #[must_use]
    pub fn min<U, F, O>(&self, field: F, output: O) -> DifferenceStream<U>
    where
        U: Clone + 'static,
        F: Fn(&T) -> f64 + 'static,
        O: Fn(&T, f64) -> U + 'static,
    {
        self.aggregate(AggregateKind::Min, field, output)
    }

    #[must_use]
    pub fn max<U, F, O>(&self, field: F, output: O) -> DifferenceStream<U>
    where
        U: Clone + 'static,
        F: Fn(&T) -> f64 + 'static,
        O: Fn(&T, f64) -> U + 'static,
    {
        self.aggregate(AggregateKind::Max, field, output)
    }
}

impl<T: 'static> DifferenceStream<T> {
    /// Running total of all multiplicities seen.
    ///
    /// Each push emits only the new total at multiplicity 1, without
    /// retracting the previous total. The output is a replace-the-value
    /// signal and must only be consumed as the final result of a query.
    #[must_use]
    pub fn linear_count(&self) -> DifferenceStream<i64> {
        let total = Cell::new(0i64);
        unary(self, move |_, data| {
            total.set(total.get() + data.net_multiplicity());
            Ok(Some(Multiset::single(total.get(), 1)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materialite::Materialite;
    use crate::types::Version;
    use std::rc::Rc;

    #[derive(Clone, Debug, PartialEq)]
    struct Row {
        x: f64,
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Counted {
        x: &'static str,
        count: i64,
    }

    fn row(x: f64) -> Row {
        Row { x }
    }

    fn rows(pairs: &[(f64, i64)]) -> Multiset<Row> {
        Multiset::from_pairs(pairs.iter().map(|&(x, m)| (row(x), m)).collect::<Vec<_>>())
    }

    fn capture<U: Clone + 'static>(
        stream: &DifferenceStream<U>,
    ) -> (DifferenceStream<U>, Rc<RefCell<Vec<(Version, Vec<Entry<U>>)>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let out = stream.debug(move |v, d| sink.borrow_mut().push((v, d.to_vec())));
        (out, log)
    }

    #[test]
    fn test_accumulator_empty_is_zero() {
        for kind in [
            AggregateKind::Count,
            AggregateKind::Sum,
            AggregateKind::Avg,
            AggregateKind::Min,
            AggregateKind::Max,
        ] {
            let acc = Accumulator::new(kind);
            assert_eq!(acc.kind(), kind);
            assert_eq!(acc.value(), 0.0);
        }
    }

    #[test]
    fn test_accumulator_min_max_follow_retractions() {
        let mut min = Accumulator::new(AggregateKind::Min);
        let mut max = Accumulator::new(AggregateKind::Max);
        for (v, m) in [(3.0, 1), (1.0, 2), (7.0, 1)] {
            min.add(v, m);
            max.add(v, m);
        }
        assert_eq!(min.value(), 1.0);
        assert_eq!(max.value(), 7.0);

        min.add(1.0, -1);
        assert_eq!(min.value(), 1.0);
        min.add(1.0, -1);
        assert_eq!(min.value(), 3.0);

        max.add(7.0, -1);
        assert_eq!(max.value(), 3.0);
    }

    #[test]
    fn test_aggregate_values() {
        let values = [row(1.0), row(2.0), row(6.0)];
        assert_eq!(aggregate_values(AggregateKind::Count, &values, |r| r.x), 3.0);
        assert_eq!(aggregate_values(AggregateKind::Sum, &values, |r| r.x), 9.0);
        assert_eq!(aggregate_values(AggregateKind::Avg, &values, |r| r.x), 3.0);
        assert_eq!(aggregate_values(AggregateKind::Min, &values, |r| r.x), 1.0);
        assert_eq!(aggregate_values(AggregateKind::Max, &values, |r| r.x), 6.0);
        assert_eq!(aggregate_values(AggregateKind::Avg, &[] as &[Row], |r| r.x), 0.0);
    }

    #[test]
    fn test_running_count() {
        let m = Materialite::new();
        let input = m.new_stream::<&'static str>();
        let (_out, log) = capture(&input.count(|x: &&'static str, count| Counted { x: *x, count }));

        let c = |count| Counted { x: "foo", count };
        input.new_data(1, Multiset::single("foo", 0)).unwrap();
        input.new_data(2, Multiset::single("foo", 1)).unwrap();
        input.new_data(3, Multiset::single("foo", -1)).unwrap();
        input.new_data(4, Multiset::single("foo", 2)).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                (1, vec![Entry::insert(c(0))]),
                (2, vec![Entry::retract(c(0)), Entry::insert(c(1))]),
                (3, vec![Entry::retract(c(1)), Entry::insert(c(0))]),
                (4, vec![Entry::retract(c(0)), Entry::insert(c(2))]),
            ]
        );
    }

    #[test]
    fn test_running_average() {
        let m = Materialite::new();
        let input = m.new_stream::<Row>();
        let (_out, log) = capture(&input.average(|r| r.x, |_, avg| row(avg)));

        input.new_data(1, rows(&[(1.0, 0)])).unwrap();
        input
            .new_data(2, rows(&[(1.0, 1), (2.0, 1), (3.0, 1)]))
            .unwrap();
        input.new_data(3, rows(&[(4.0, 1), (5.0, 1)])).unwrap();
        input.new_data(4, rows(&[(4.0, -1), (5.0, -1)])).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                (1, vec![Entry::insert(row(0.0))]),
                (2, vec![Entry::retract(row(0.0)), Entry::insert(row(2.0))]),
                (3, vec![Entry::retract(row(2.0)), Entry::insert(row(3.0))]),
                (4, vec![Entry::retract(row(3.0)), Entry::insert(row(2.0))]),
            ]
        );
    }

    #[test]
    fn test_running_sum() {
        let m = Materialite::new();
        let input = m.new_stream::<Row>();
        let (_out, log) = capture(&input.sum(|r| r.x, |_, sum| row(sum)));

        input.new_data(1, rows(&[(1.0, 0)])).unwrap();
        input
            .new_data(2, rows(&[(1.0, 1), (2.0, 1), (3.0, 1)]))
            .unwrap();
        input.new_data(3, rows(&[(4.0, 1), (5.0, 1)])).unwrap();
        input.new_data(4, rows(&[(4.0, -1), (5.0, -1)])).unwrap();

        let emitted: Vec<f64> = log
            .borrow()
            .iter()
            .map(|(_, d)| d.last().map_or(f64::NAN, |e| e.value.x))
            .collect();
        assert_eq!(emitted, vec![0.0, 6.0, 15.0, 6.0]);
    }

    #[test]
    fn test_running_min_max() {
        let m = Materialite::new();
        let input = m.new_stream::<Row>();
        let (_min, min_log) = capture(&input.min(|r| r.x, |_, v| row(v)));
        let (_max, max_log) = capture(&input.max(|r| r.x, |_, v| row(v)));

        input
            .new_data(1, rows(&[(4.0, 1), (2.0, 1), (9.0, 1)]))
            .unwrap();
        input.new_data(2, rows(&[(2.0, -1), (9.0, -1)])).unwrap();

        let last = |log: &Rc<RefCell<Vec<(Version, Vec<Entry<Row>>)>>>| {
            log.borrow().last().and_then(|(_, d)| d.last().cloned())
        };
        assert_eq!(last(&min_log), Some(Entry::insert(row(4.0))));
        assert_eq!(last(&max_log), Some(Entry::insert(row(4.0))));
    }

    #[test]
    fn test_linear_count_emits_only_totals() {
        let m = Materialite::new();
        let input = m.new_stream::<i32>();
        let (_out, log) = capture(&input.linear_count());

        input
            .new_data(1, Multiset::from_pairs(vec![(1, 1), (2, 1)]))
            .unwrap();
        input.new_data(2, Multiset::single(1, -1)).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![(1, vec![Entry::insert(2)]), (2, vec![Entry::insert(1)])]
        );
    }
}
