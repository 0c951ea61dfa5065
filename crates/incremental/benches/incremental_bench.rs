//! Benchmarks for materia-incremental.
//!
//! Target: single row propagation through a small graph < 100μs

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use materia_incremental::{Entry, Materialite, Multiset};
use std::cmp::Ordering;

#[derive(Clone, Debug, PartialEq)]
struct Employee {
    id: i64,
    age: i64,
    dept_id: i64,
}

#[derive(Clone, Debug, PartialEq)]
struct Department {
    id: i64,
    name: String,
}

fn by_id(a: &Employee, b: &Employee) -> Ordering {
    a.id.cmp(&b.id)
}

fn employee(id: i64) -> Employee {
    Employee {
        id,
        age: id % 60,
        dept_id: id % 10,
    }
}

fn bench_multiset(c: &mut Criterion) {
    let mut group = c.benchmark_group("multiset");

    for size in [10, 100, 1000] {
        let data: Multiset<i64> = (0..size).map(|i| Entry::new(i % 7, 1)).collect();
        group.bench_with_input(BenchmarkId::new("consolidated", size), &data, |b, data| {
            b.iter(|| black_box(data.consolidated()))
        });
        group.bench_with_input(BenchmarkId::new("map_filter", size), &data, |b, data| {
            b.iter(|| black_box(data.map(|x| x * 2).filter(|x| *x > 4).to_vec()))
        });
    }

    group.finish();
}

fn bench_source(c: &mut Criterion) {
    let mut group = c.benchmark_group("source");

    group.bench_function("single_insert_autocommit", |b| {
        let m = Materialite::new();
        let source = m.new_source(by_id);
        let mut next = 0;
        b.iter(|| {
            next += 1;
            source.add(black_box(employee(next)))
        })
    });

    for size in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("batch_tx", size), &size, |b, &size| {
            let m = Materialite::new();
            let source = m.new_source(by_id);
            let mut offset = 0;
            b.iter(|| {
                offset += size;
                m.tx(|| {
                    for i in 0..size {
                        source.add(employee(offset + i))?;
                    }
                    Ok(())
                })
            })
        });
    }

    group.finish();
}

fn bench_view(c: &mut Criterion) {
    let mut group = c.benchmark_group("materialized_view");

    group.bench_function("filter_single_update", |b| {
        let m = Materialite::new();
        let source = m.new_source(by_id);
        let view = source
            .stream()
            .filter(|e: &Employee| e.age > 18)
            .materialize(by_id);
        let mut age = 0;
        b.iter(|| {
            age = (age + 1) % 60;
            source
                .add(black_box(Employee {
                    id: 1,
                    age,
                    dept_id: 0,
                }))
                .map(|_| view.len())
        })
    });

    group.finish();
}

fn bench_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("join");

    group.bench_function("single_left_insert", |b| {
        let m = Materialite::new();
        let employees = m.new_source(by_id);
        let departments = m.new_source(|a: &Department, b: &Department| a.id.cmp(&b.id));
        let joined = employees
            .stream()
            .join(&departments.stream())
            .a_as("employee")
            .a_join_key(|e: &Employee| e.dept_id)
            .a_primary_key(|e: &Employee| e.id)
            .b_as("department")
            .b_join_key(|d: &Department| d.id)
            .b_primary_key(|d: &Department| d.id)
            .build()
            .unwrap();
        let view = joined.materialize(|a, b| a.id.cmp(&b.id));
        m.tx(|| {
            for i in 0..10 {
                departments.add(Department {
                    id: i,
                    name: format!("Dept{}", i),
                })?;
            }
            Ok(())
        })
        .unwrap();

        let mut next = 0;
        b.iter(|| {
            next += 1;
            employees.add(black_box(employee(next))).map(|_| view.len())
        })
    });

    group.finish();
}

fn bench_reduce(c: &mut Criterion) {
    let mut group = c.benchmark_group("reduce");

    for groups in [1, 10, 100] {
        group.bench_with_input(
            BenchmarkId::new("avg_age_by_group", groups),
            &groups,
            |b, &groups| {
                let m = Materialite::new();
                let source = m.new_source(by_id);
                let _out = source
                    .stream()
                    .reduce(
                        move |e: &Employee| e.id % groups,
                        |e: &Employee| e.id,
                        |members| {
                            materia_incremental::aggregate_values(
                                materia_incremental::AggregateKind::Avg,
                                members,
                                |e: &Employee| e.age as f64,
                            )
                        },
                    )
                    .linear_count();
                let mut next = 0;
                b.iter(|| {
                    next += 1;
                    source.add(black_box(employee(next)))
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_multiset,
    bench_source,
    bench_view,
    bench_join,
    bench_reduce,
);

criterion_main!(benches);
