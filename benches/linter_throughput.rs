use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use ipgre::linter;

const PARAGRAPH: &str = "The rain came down in sheets, and Mara pressed her coat tighter against the cold. \
She had walked this road a hundred times before, but tonight it felt unfamiliar, each streetlamp a small \
island of orange against the dark. \"I should have left before the storm,\" she muttered, though no one was \
there to hear it. The utterly amazing and incredible truth was that she had known this would happen all along.\n\n";

fn corpus_of(paragraphs: usize) -> String {
    PARAGRAPH.repeat(paragraphs)
}

fn lint_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("linter_lint");

    for &paragraphs in &[10usize, 50, 200] {
        let text = corpus_of(paragraphs);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(paragraphs), &text, |b, text| {
            b.iter(|| linter::lint(text));
        });
    }

    group.finish();
}

criterion_group!(benches, lint_throughput);
criterion_main!(benches);
