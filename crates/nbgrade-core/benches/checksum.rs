use criterion::{black_box, criterion_group, criterion_main, Criterion};

use nbgrade_core::checksum::{notebook_digest, ChecksumMode};
use nbgrade_core::grade::grade;
use nbgrade_core::model::{Cell, GradingRecord, Notebook, Output};
use nbgrade_core::validate::validate;

fn make_notebook(graded: usize) -> Notebook {
    let mut cells = Vec::with_capacity(graded * 3);
    for i in 0..graded {
        cells.push(Cell::markdown(format!("## Question {i}\nImplement `f{i}`.")));
        cells.push(
            Cell::code(format!("def f{i}(x):\n    return x + {i}"))
                .with_grading(GradingRecord::solution(format!("answer-{i}"))),
        );
        cells.push(
            Cell::code(format!("assert f{i}(1) == {}\nassert f{i}(2) == {}", i + 1, i + 2))
                .with_grading(GradingRecord::autograded(format!("test-{i}"), 2.5))
                .with_outputs(i as u64, vec![Output::stdout("ok\n")]),
        );
    }
    Notebook::new(cells)
}

fn bench_digest(c: &mut Criterion) {
    let mut group = c.benchmark_group("digest");

    for size in [10, 100] {
        let nb = make_notebook(size);
        group.bench_function(format!("aggregate/{size}"), |b| {
            b.iter(|| notebook_digest(black_box(&nb), ChecksumMode::Aggregate))
        });
        group.bench_function(format!("per_cell/{size}"), |b| {
            b.iter(|| notebook_digest(black_box(&nb), ChecksumMode::PerCell))
        });
    }

    group.finish();
}

fn bench_validate_and_grade(c: &mut Criterion) {
    let nb = make_notebook(100);
    let baseline = notebook_digest(&nb, ChecksumMode::PerCell).expect("well-formed notebook");

    c.bench_function("validate/per_cell/100", |b| {
        b.iter(|| validate(black_box(&nb), black_box(&baseline)))
    });
    c.bench_function("grade/100", |b| b.iter(|| grade(black_box(&nb))));
}

criterion_group!(benches, bench_digest, bench_validate_and_grade);
criterion_main!(benches);
