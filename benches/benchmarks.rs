//! Performance benchmarks for the cipher primitives

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use num_bigint::BigUint;

use ciphercraft::{DgkKeyPair, DgkParams, PaillierKeyPair, PaillierParams};

fn benchmark_paillier_key_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("paillier_key_generation");
    group.sample_size(10);

    for bits in [512u32, 1024].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(bits), bits, |b, &bits| {
            b.iter(|| {
                PaillierKeyPair::generate(&PaillierParams {
                    key_size: bits,
                    use_fast_variant: false,
                })
                .expect("Failed to generate keys")
            });
        });
    }

    group.finish();
}

fn benchmark_dgk_key_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("dgk_key_generation");
    group.sample_size(10);

    group.bench_function("l8_t80_k512", |b| {
        b.iter(|| {
            DgkKeyPair::generate(&DgkParams { l: 8, t: 80, k: 512 })
                .expect("Failed to generate keys")
        });
    });

    group.finish();
}

fn benchmark_encryption(c: &mut Criterion) {
    let mut group = c.benchmark_group("encryption");

    let paillier = PaillierKeyPair::generate_for_testing().expect("Failed to generate keys");
    let dgk = DgkKeyPair::generate_for_testing().expect("Failed to generate keys");

    let m = BigUint::from(1000u32);
    group.bench_function("paillier", |b| {
        b.iter(|| paillier.public_key.encrypt(black_box(&m)).expect("Encryption failed"));
    });

    let m = BigUint::from(200u32);
    group.bench_function("dgk", |b| {
        b.iter(|| dgk.public_key.encrypt(black_box(&m)).expect("Encryption failed"));
    });

    group.finish();
}

fn benchmark_decryption(c: &mut Criterion) {
    let mut group = c.benchmark_group("decryption");

    let paillier = PaillierKeyPair::generate_for_testing().expect("Failed to generate keys");
    let dgk = DgkKeyPair::generate_for_testing().expect("Failed to generate keys");

    let cp = paillier
        .public_key
        .encrypt(&BigUint::from(1000u32))
        .expect("Encryption failed");
    group.bench_function("paillier", |b| {
        b.iter(|| paillier.private_key.decrypt(black_box(&cp)).expect("Decryption failed"));
    });
    group.bench_function("paillier_fast", |b| {
        b.iter(|| {
            paillier
                .private_key
                .decrypt_fast(black_box(&cp))
                .expect("Decryption failed")
        });
    });

    let cd = dgk
        .public_key
        .encrypt(&BigUint::from(200u32))
        .expect("Encryption failed");
    group.bench_function("dgk", |b| {
        b.iter(|| dgk.private_key.decrypt(black_box(&cd)).expect("Decryption failed"));
    });

    group.finish();
}

fn benchmark_homomorphic_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("homomorphic_operations");

    let paillier = PaillierKeyPair::generate_for_testing().expect("Failed to generate keys");
    let pk = &paillier.public_key;
    let c1 = pk.encrypt(&BigUint::from(1000u32)).expect("Encryption failed");
    let c2 = pk.encrypt(&BigUint::from(234u32)).expect("Encryption failed");
    let scalar = BigUint::from(50u32);

    group.bench_function("paillier_add", |b| {
        b.iter(|| pk.add(black_box(&c1), black_box(&c2)));
    });
    group.bench_function("paillier_scalar_mul", |b| {
        b.iter(|| pk.scalar_mul(black_box(&c1), black_box(&scalar)));
    });
    group.bench_function("paillier_rerandomize", |b| {
        b.iter(|| pk.rerandomize(black_box(&c1)));
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_paillier_key_generation,
    benchmark_dgk_key_generation,
    benchmark_encryption,
    benchmark_decryption,
    benchmark_homomorphic_operations
);
criterion_main!(benches);
