//! Criterion microbenchmarks for the join event hot path.
//!
//! Run with:
//!   cargo bench -p haven-rooms

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use haven_common::{RoomId, ServerName, UserId};
use haven_federation::{RoomVersionId, ServerKeyPair};
use haven_rooms::{
    builder::{MembershipDraft, join_content},
    candidates::resolve_candidates,
    capabilities::Profile,
};
use serde_json::json;

fn draft() -> MembershipDraft {
    let profile = Profile {
        display_name: "Alice".into(),
        avatar_url: "mxc://haven.example.com/alice".into(),
    };
    let content = json!({"reason": "saying hello"});
    MembershipDraft::new(
        &UserId::parse("@alice:haven.example.com").unwrap(),
        &RoomId::parse("!abc:example.org").unwrap(),
        &join_content(content.as_object().unwrap(), &profile),
    )
}

// ── Event build + sign ────────────────────────────────────────────────────────

fn bench_build_and_sign(c: &mut Criterion) {
    let key = ServerKeyPair::generate();
    let draft = draft();
    let mut group = c.benchmark_group("join_event/build_sign");
    for version in ["1", "3", "6"] {
        let version = RoomVersionId::new(version);
        group.bench_with_input(BenchmarkId::from_parameter(&version), &version, |b, v| {
            b.iter(|| {
                let mut template = draft.template();
                template.prev_events = json!(["$prev:example.org"]);
                template.depth = 12;
                template.build(black_box(1_700_000_000_000), "haven.example.com", &key, v).unwrap()
            })
        });
    }
    group.finish();
}

// ── Candidate resolution ──────────────────────────────────────────────────────

fn bench_candidates(c: &mut Criterion) {
    let inviters: Vec<UserId> = (0..32)
        .map(|i| UserId::parse(format!("@u{}:server{}.example", i, i % 8)).unwrap())
        .collect();
    let room = RoomId::parse("!abc:example.org").unwrap();
    let local = ServerName::from("haven.example.com");

    c.bench_function("candidates/resolve_32_inviters", |b| {
        b.iter(|| resolve_candidates(black_box(&inviters), &room, &local))
    });
}

criterion_group!(benches, bench_build_and_sign, bench_candidates);
criterion_main!(benches);
