//! Cryptographic operation benchmarks.
//!
//! The record layer sits on every relayed byte; seal/open throughput is the
//! ceiling on tunnel goodput. Key derivation is deliberately slow (memory
//! hard) but happens once per session — the benchmark tracks that cost too.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use veiltun::crypto::{derive_key, RecordCipher, RecordNonce, SALT_SIZE};

fn bench_key_derivation(c: &mut Criterion) {
    let salt = [0x42u8; SALT_SIZE];

    let mut group = c.benchmark_group("argon2id_derive");
    group.sample_size(10);
    group.bench_function("64MiB_t1_p4", |b| {
        b.iter(|| black_box(derive_key("hunter2hunter2!!", &salt).unwrap()))
    });
    group.finish();
}

fn bench_record_seal(c: &mut Criterion) {
    let key = derive_key("bench password", &[0x01u8; SALT_SIZE]).unwrap();
    let cipher = RecordCipher::new(&key);
    let plaintext = vec![0u8; 16 * 1024]; // one relay copy chunk

    let mut group = c.benchmark_group("record_seal");
    group.throughput(Throughput::Bytes(plaintext.len() as u64));
    group.bench_function("16KiB", |b| {
        let mut counter = 0u64;
        b.iter(|| {
            let nonce = RecordNonce::from_counter(counter);
            counter += 1;
            black_box(cipher.seal(&nonce, &plaintext).unwrap())
        })
    });
    group.finish();
}

fn bench_record_open(c: &mut Criterion) {
    let key = derive_key("bench password", &[0x01u8; SALT_SIZE]).unwrap();
    let cipher = RecordCipher::new(&key);
    let plaintext = vec![0u8; 16 * 1024];
    let nonce = RecordNonce::from_counter(0);
    let ciphertext = cipher.seal(&nonce, &plaintext).unwrap();

    let mut group = c.benchmark_group("record_open");
    group.throughput(Throughput::Bytes(plaintext.len() as u64));
    group.bench_function("16KiB", |b| {
        b.iter(|| black_box(cipher.open(&nonce, &ciphertext).unwrap()))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_key_derivation,
    bench_record_seal,
    bench_record_open
);
criterion_main!(benches);
