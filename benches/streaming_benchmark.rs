use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dsvstream::{format_rows, DsvReader, DsvWriter, FormatDetector, ParseOptions, WriteOptions};
use tempfile::{Builder, NamedTempFile};

fn sample_rows(size: usize) -> Vec<Vec<String>> {
    let mut rows = Vec::with_capacity(size + 1);
    rows.push(vec![
        "id".to_string(),
        "sequence".to_string(),
        "note".to_string(),
    ]);
    for i in 0..size {
        rows.push(vec![
            format!("read_{}", i),
            "ACGTTGCAACGTNNGGCC".repeat(4),
            if i % 10 == 0 {
                "quoted, with \"escapes\"".to_string()
            } else {
                format!("sample {}", i % 7)
            },
        ]);
    }
    rows
}

fn benchmark_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("write");

    for size in [1000, 10000, 100000].iter() {
        let rows = sample_rows(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let temp = NamedTempFile::new().unwrap();
                let mut writer = DsvWriter::new(temp.path()).unwrap();
                writer.write_rows_batch(&rows).unwrap();
                writer.save().unwrap();
            });
        });
    }

    group.finish();
}

fn benchmark_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");

    for size in [1000, 10000, 100000].iter() {
        // Prepare test file
        let temp = NamedTempFile::new().unwrap();
        {
            let mut writer = DsvWriter::new(temp.path()).unwrap();
            writer.write_rows_batch(sample_rows(*size)).unwrap();
            writer.save().unwrap();
        }

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut reader = DsvReader::open(temp.path(), ParseOptions::default()).unwrap();
                for record in reader.records() {
                    black_box(record.unwrap());
                }
            });
        });
    }

    group.finish();
}

fn benchmark_read_gzip_with_stats(c: &mut Criterion) {
    let temp = Builder::new().suffix(".csv.gz").tempfile().unwrap();
    {
        let mut writer = DsvWriter::new(temp.path()).unwrap();
        writer.write_rows_batch(sample_rows(10000)).unwrap();
        writer.save().unwrap();
    }

    c.bench_function("read_gzip_stats_10000_rows", |b| {
        b.iter(|| {
            let options = ParseOptions::default().compute_stats(true);
            let mut reader = DsvReader::open(temp.path(), options).unwrap();
            for record in reader.records() {
                black_box(record.unwrap());
            }
        });
    });
}

fn benchmark_detect(c: &mut Criterion) {
    let text = format_rows(&sample_rows(200), &WriteOptions::tsv());
    let detector = FormatDetector::new();

    c.bench_function("sniff_text_200_rows", |b| {
        b.iter(|| black_box(detector.sniff_text(black_box(&text))));
    });
}

criterion_group!(
    benches,
    benchmark_write,
    benchmark_read,
    benchmark_read_gzip_with_stats,
    benchmark_detect
);
criterion_main!(benches);
