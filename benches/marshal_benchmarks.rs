use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use duckdb_postal::batch::{ComponentList, RowResponse, StringList};
use duckdb_postal::{process_batch, InputBatch, ListBatch, Result, Transform};
use std::borrow::Cow;
use std::hint::black_box;

/// Whitespace tokens labelled by position, standing in for libpostal.
struct Tokens(Vec<String>);

impl RowResponse for Tokens {
    fn len(&self) -> usize {
        self.0.len()
    }
}

impl ComponentList for Tokens {
    fn label(&self, index: usize) -> Cow<'_, str> {
        Cow::Owned(format!("token_{index}"))
    }

    fn value(&self, index: usize) -> Cow<'_, str> {
        Cow::Borrowed(&self.0[index])
    }
}

impl StringList for Tokens {
    fn get(&self, index: usize) -> Cow<'_, str> {
        Cow::Borrowed(&self.0[index])
    }
}

struct Tokenizer;

impl Transform for Tokenizer {
    type Response = Tokens;

    fn transform(&self, input: &str) -> Result<Tokens> {
        Ok(Tokens(input.split_whitespace().map(str::to_lowercase).collect()))
    }
}

fn addresses(rows: usize) -> Vec<Option<String>> {
    let samples = [
        "123 Main St, Springfield",
        "Apt 5B, 123 Main Street, Suite 100, New York, NY 10001-1234",
        "Quatre-vingt-douze Ave des Champs-Élysées",
    ];
    (0..rows)
        .map(|row| {
            // every tenth row is NULL
            (row % 10 != 9).then(|| samples[row % samples.len()].to_string())
        })
        .collect()
}

fn bench_marshal(c: &mut Criterion) {
    let mut group = c.benchmark_group("marshal");

    for rows in [1, 256, 2048] {
        let values = addresses(rows);

        group.bench_with_input(
            BenchmarkId::new("components", rows),
            &values,
            |b, values| {
                b.iter(|| {
                    let mut output: ListBatch<(String, String)> =
                        ListBatch::with_rows(values.len());
                    process_batch(
                        &InputBatch::flat(black_box(values.as_slice())),
                        &Tokenizer,
                        &mut output,
                    )
                    .unwrap();
                    black_box(output)
                })
            },
        );

        group.bench_with_input(BenchmarkId::new("strings", rows), &values, |b, values| {
            b.iter(|| {
                let mut output: ListBatch<String> = ListBatch::with_rows(values.len());
                process_batch(
                    &InputBatch::flat(black_box(values.as_slice())),
                    &Tokenizer,
                    &mut output,
                )
                .unwrap();
                black_box(output)
            })
        });
    }

    let constant = Some("123 Main St, Springfield".to_string());
    group.bench_function("constant_2048", |b| {
        b.iter(|| {
            let mut output: ListBatch<String> = ListBatch::with_rows(2048);
            process_batch(
                &InputBatch::constant(&constant, 2048),
                &Tokenizer,
                &mut output,
            )
            .unwrap();
            black_box(output)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_marshal);
criterion_main!(benches);
