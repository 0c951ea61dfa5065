//! Property-based tests for incremental maintenance.
//!
//! Random batches of writes are committed one transaction at a time; after
//! every commit the maintained result must equal the result recomputed from
//! the current source contents.

use materia_incremental::{JoinResult, Materialite};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug, PartialEq)]
struct Row {
    id: i64,
    key: i64,
    amount: i64,
}

#[derive(Clone, Debug)]
enum Write {
    Add(Row),
    Delete(i64),
}

fn write_strategy() -> impl Strategy<Value = Write> {
    prop_oneof![
        3 => (0i64..12, 0i64..4, -50i64..50)
            .prop_map(|(id, key, amount)| Write::Add(Row { id, key, amount })),
        1 => (0i64..12).prop_map(Write::Delete),
    ]
}

/// Batches of writes for two relations; each batch is one transaction.
fn batches_strategy() -> impl Strategy<Value = Vec<(Vec<Write>, Vec<Write>)>> {
    prop::collection::vec(
        (
            prop::collection::vec(write_strategy(), 0..6),
            prop::collection::vec(write_strategy(), 0..6),
        ),
        1..12,
    )
}

fn by_id(a: &Row, b: &Row) -> std::cmp::Ordering {
    a.id.cmp(&b.id)
}

fn apply(source: &materia_incremental::Source<Row>, writes: &[Write]) -> materia_incremental::Result<()> {
    for write in writes {
        match write {
            Write::Add(row) => source.add(row.clone())?,
            Write::Delete(id) => source.delete(Row {
                id: *id,
                key: 0,
                amount: 0,
            })?,
        }
    }
    Ok(())
}

fn expected_join(left: &[Row], right: &[Row]) -> BTreeSet<(i64, i64, i64)> {
    left.iter()
        .flat_map(|l| {
            right
                .iter()
                .filter(move |r| r.key == l.key)
                .map(move |r| (l.id, r.id, l.key))
        })
        .collect()
}

fn expected_sums(rows: &[Row]) -> Vec<(i64, i64)> {
    let mut sums: BTreeMap<i64, i64> = BTreeMap::new();
    for row in rows {
        *sums.entry(row.key).or_default() += row.amount;
    }
    sums.into_iter().collect()
}

proptest! {
    /// Property: an incrementally maintained join equals the join of the
    /// current inputs.
    #[test]
    fn join_matches_recomputation(batches in batches_strategy()) {
        let m = Materialite::new();
        let left = m.new_source(by_id);
        let right = m.new_source(by_id);
        let view = left
            .stream()
            .join(&right.stream())
            .a_join_key(|r: &Row| r.key)
            .a_primary_key(|r: &Row| r.id)
            .b_join_key(|r: &Row| r.key)
            .b_primary_key(|r: &Row| r.id)
            .build()
            .unwrap()
            .materialize(|a: &JoinResult<Row, Row>, b: &JoinResult<Row, Row>| a.id.cmp(&b.id));

        for (left_writes, right_writes) in &batches {
            m.tx(|| {
                apply(&left, left_writes)?;
                apply(&right, right_writes)
            })
            .unwrap();

            let maintained: BTreeSet<(i64, i64, i64)> = view
                .value()
                .iter()
                .map(|r| {
                    assert_eq!(r.a.key, r.b.key);
                    (r.a.id, r.b.id, r.a.key)
                })
                .collect();
            prop_assert_eq!(view.len(), maintained.len());
            prop_assert_eq!(maintained, expected_join(&left.value(), &right.value()));
        }
    }

    /// Property: a grouped sum maintained by reduce equals the sums of the
    /// current input.
    #[test]
    fn reduce_matches_recomputation(batches in batches_strategy()) {
        let m = Materialite::new();
        let source = m.new_source(by_id);
        let view = source
            .stream()
            .reduce(
                |r: &Row| r.key,
                |r: &Row| r.id,
                |members| {
                    let mut members = members.peekable();
                    let key = members.peek().map(|r| r.key).unwrap_or_default();
                    (key, members.map(|r| r.amount).sum::<i64>())
                },
            )
            .materialize(|a: &(i64, i64), b: &(i64, i64)| a.0.cmp(&b.0));

        for (writes, more) in &batches {
            m.tx(|| {
                apply(&source, writes)?;
                apply(&source, more)
            })
            .unwrap();
            prop_assert_eq!(view.value(), expected_sums(&source.value()));
        }
    }

    /// Property: the running count tracks the number of rows in the source.
    #[test]
    fn linear_count_tracks_size(batches in batches_strategy()) {
        let m = Materialite::new();
        let source = m.new_source(by_id);
        let latest = std::rc::Rc::new(std::cell::Cell::new(0i64));
        let sink = std::rc::Rc::clone(&latest);
        let _count = source
            .stream()
            .linear_count()
            .effect(move |total, _| sink.set(*total));

        for (writes, more) in &batches {
            m.tx(|| {
                apply(&source, writes)?;
                apply(&source, more)
            })
            .unwrap();
            prop_assert_eq!(latest.get(), source.len() as i64);
        }
    }
}
