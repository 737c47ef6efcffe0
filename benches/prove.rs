//! Benchmarks for proof search over representative goals

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use entail::{parse_term, Context, InferenceCoordinator};

fn transitive_context(depth: usize) -> String {
    let mut out = String::from("Linked(n0,n1)\n");
    for i in 1..depth {
        out.push_str(&format!("Linked(n{},n{})\n", i, i + 1));
    }
    out.push_str("forall X. forall Y. Linked(X,Y) -> Reaches(X,Y)\n");
    out.push_str("forall X. forall Y. forall Z. Reaches(X,Y) & Linked(Y,Z) -> Reaches(X,Z)\n");
    out
}

fn parse_benchmark(c: &mut Criterion) {
    let formulas = [
        "CanGoTo(john,home)",
        "forall X. At(X,home) -> CanGoTo(X,home)",
        "[](p -> q) -> ([]p -> []q)",
        "in_range(X,1,10) & all_different(X,Y) & lt(X,Y)",
    ];

    c.bench_function("parse_formula", |b| {
        b.iter(|| {
            for f in &formulas {
                black_box(parse_term(f).unwrap());
            }
        });
    });
}

fn resolution_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");

    for depth in [2usize, 5, 10] {
        let premises = transitive_context(depth);
        let goal = format!("Reaches(n0,n{})", depth);

        group.bench_with_input(
            BenchmarkId::new("chain", depth),
            &(premises, goal),
            |b, (premises, goal)| {
                let context = Context::parse(premises).unwrap();
                let goal = parse_term(goal).unwrap();
                b.iter(|| {
                    let mut coordinator = InferenceCoordinator::new();
                    black_box(coordinator.submit_goal(&goal, &context).unwrap())
                });
            },
        );
    }

    group.finish();
}

fn tableau_benchmark(c: &mut Criterion) {
    let axioms = [
        ("k_distribution", "[](p -> q) -> ([]p -> []q)"),
        ("s4_transitivity", "[]p -> [][]p"),
        ("s5_symmetry", "<>p -> []<>p"),
    ];

    let mut group = c.benchmark_group("tableau");
    let context = Context::new();

    for (name, formula) in axioms {
        let goal = parse_term(formula).unwrap();
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut coordinator = InferenceCoordinator::new();
                black_box(coordinator.submit_goal(&goal, &context).unwrap())
            });
        });
    }

    group.finish();
}

fn clp_benchmark(c: &mut Criterion) {
    let context = Context::new();
    let goal = parse_term(
        "in_range(X,1,9) & in_range(Y,1,9) & in_range(Z,1,9) \
         & all_different(X,Y,Z) & sum(X,Y,Z) & lt(X,Y)",
    )
    .unwrap();

    c.bench_function("clp_labeling", |b| {
        b.iter(|| {
            let mut coordinator = InferenceCoordinator::new();
            black_box(coordinator.submit_goal(&goal, &context).unwrap())
        });
    });
}

criterion_group!(
    benches,
    parse_benchmark,
    resolution_benchmark,
    tableau_benchmark,
    clp_benchmark
);
criterion_main!(benches);
