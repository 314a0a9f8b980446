use chrono::Utc;
use criterion::{criterion_group, criterion_main, Criterion};
use sorikama_hub::services::signature::SignedIdentity;
use sorikama_hub::services::{HeaderSigner, IdentityCipher};
use std::hint::black_box;

const SECRET: &str = "benchmark-secret-that-is-at-least-32-bytes-long";

fn benchmark_identity(c: &mut Criterion) {
    let cipher = IdentityCipher::new(SECRET).expect("Failed to build cipher");
    let encrypted = cipher
        .encrypt_user_id("user-1234567890", "svc-masebuy")
        .expect("Failed to encrypt");
    let token = cipher.generate_session_token("user-1234567890", "svc-masebuy", 3600);

    let mut group = c.benchmark_group("identity");

    group.bench_function("encrypt_user_id", |b| {
        b.iter(|| cipher.encrypt_user_id(black_box("user-1234567890"), black_box("svc-masebuy")))
    });

    group.bench_function("decrypt_user_id", |b| {
        b.iter(|| cipher.decrypt_user_id(black_box(&encrypted), black_box("svc-masebuy")))
    });

    group.bench_function("hash_user_id", |b| {
        b.iter(|| cipher.hash_user_id(black_box("user-1234567890"), black_box("svc-masebuy")))
    });

    group.bench_function("verify_session_token", |b| {
        b.iter(|| cipher.verify_session_token(black_box(&token), black_box("svc-masebuy")))
    });

    group.finish();
}

fn benchmark_signature(c: &mut Criterion) {
    let signer = HeaderSigner::new(SECRET).expect("Failed to build signer");
    let now_ms = Utc::now().timestamp_millis();
    let identity = SignedIdentity {
        user_id: "encrypted-user-id",
        role: "user",
        service_id: "svc-masebuy",
        timestamp_ms: now_ms,
    };
    let signature = signer.sign(&identity);

    c.bench_function("sign_forwarded_identity", |b| {
        b.iter(|| signer.sign(black_box(&identity)))
    });

    c.bench_function("verify_forwarded_identity", |b| {
        b.iter(|| signer.verify(black_box(&signature), black_box(&identity), now_ms))
    });
}

criterion_group!(benches, benchmark_identity, benchmark_signature);
criterion_main!(benches);
