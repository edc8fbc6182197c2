use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use paste::paste;
use rand::{distributions::Standard, prelude::Distribution, rngs::StdRng, Rng, SeedableRng};
use vsort::{
    network::{sort, NetworkSummary},
    TargetFeatures,
};
use vsort_benchmarks::{Bitonic16, Bitonic32, Bitonic8};

const CHUNKS: usize = 16 * 1024;

pub fn create_uniform_data<T>(size: usize) -> Vec<T>
where
    Standard: Distribution<T>,
{
    let mut rng = StdRng::seed_from_u64(42);
    let vals: Vec<T> = (0..size).map(|_| rng.gen::<T>()).collect();
    vals
}

macro_rules! network_sort {
    ($c: ident, $ty: ident, $n: literal, $network: ident) => {
        paste! {
            {
                let data = create_uniform_data::<$ty>($n * CHUNKS);
                let mut sorted = data.clone();
                for chunk in sorted.chunks_exact_mut($n) {
                    sort::<$ty, $n, $network>(chunk).unwrap();
                    assert!(chunk.windows(2).all(|w| w[0] <= w[1]));
                }

                let data_t = data.clone();
                $c.bench_function(stringify!([<network_ $ty _ $n>]), move |b| {
                    // This will avoid timing the to_vec call.
                    b.iter_batched(
                        || data_t.clone(),
                        |mut data| {
                            for chunk in data.chunks_exact_mut($n) {
                                sort::<$ty, $n, $network>(chunk).unwrap();
                            }
                            black_box(data);
                        },
                        BatchSize::LargeInput,
                    )
                });

                let data_t = data.clone();
                $c.bench_function(stringify!([<std_unstable_ $ty _ $n>]), move |b| {
                    b.iter_batched(
                        || data_t.clone(),
                        |mut data| {
                            for chunk in data.chunks_exact_mut($n) {
                                chunk.sort_unstable();
                            }
                            black_box(data);
                        },
                        BatchSize::LargeInput,
                    )
                });
            }
        }
    };
}

pub fn criterion_benchmark(c: &mut Criterion) {
    match NetworkSummary::compiled::<u8, 32, Bitonic32>() {
        Ok(summary) => println!("compiled: {summary}"),
        Err(e) => println!("compiled: {e}"),
    }
    let detected = TargetFeatures::detect();
    if detected != TargetFeatures::COMPILED {
        match NetworkSummary::of::<u8, 32, Bitonic32>(detected) {
            Ok(summary) => println!("this cpu, with a native build: {summary}"),
            Err(e) => println!("this cpu, with a native build: {e}"),
        }
    }

    network_sort!(c, i64, 8, Bitonic8);
    network_sort!(c, u32, 16, Bitonic16);
    network_sort!(c, i16, 32, Bitonic32);
    network_sort!(c, u8, 32, Bitonic32);
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
