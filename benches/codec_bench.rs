//! Criterion benchmark for the codec passes
//!
//! Run with: cargo bench

use std::ffi::{c_char, c_int, c_void};
use std::mem::offset_of;

use cerial::core::{ObjList, System};
use cerial::protocol::decode_raw;
use cerial::{decode, encode, encode_into, free_object, measure, Field, Model, Reflect};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};

#[repr(C)]
struct Member {
    name: *const c_char,
    score: *mut c_int,
}

unsafe impl Reflect for Member {
    const MODEL: Model = &[
        Field::string("name", offset_of!(Member, name)),
        Field::int_ptr("score", offset_of!(Member, score)),
        Field::object::<Member>(),
    ];
}

#[repr(C)]
struct Team {
    id: c_int,
    title: *const c_char,
    members: ObjList,
}

unsafe impl Reflect for Team {
    const MODEL: Model = &[
        Field::int("id", offset_of!(Team, id)),
        Field::string("title", offset_of!(Team, title)),
        Field::list("members", offset_of!(Team, members), Member::MODEL),
        Field::object::<Team>(),
    ];
}

/// Owns the source graph for one benchmark size
struct Fixture {
    _scores: Box<[c_int]>,
    _members: Box<[Member]>,
    team: Team,
}

impl Fixture {
    fn new(n: usize) -> Self {
        let mut scores: Box<[c_int]> = (0..n as c_int).collect();
        let mut members: Box<[Member]> = scores
            .iter_mut()
            .map(|score| Member {
                name: c"benchmark member".as_ptr(),
                score,
            })
            .collect();

        let mut team = Team {
            id: n as c_int,
            title: c"criterion".as_ptr(),
            members: ObjList::new(),
        };
        for member in members.iter_mut() {
            team.members
                .push((member as *mut Member).cast::<c_void>(), &System)
                .unwrap();
        }

        Self {
            _scores: scores,
            _members: members,
            team,
        }
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        unsafe { self.team.members.clear(&System) };
    }
}

fn bench_passes(c: &mut Criterion) {
    for n in [1usize, 16, 256] {
        let fixture = Fixture::new(n);
        let team = &fixture.team;
        let encoded = unsafe { encode(team, &System) }.unwrap();

        let mut group = c.benchmark_group(format!("team_{}", n));
        group.throughput(Throughput::Bytes(encoded.len() as u64));

        group.bench_function("measure", |b| {
            b.iter(|| unsafe { measure(black_box(team)) });
        });

        group.bench_function("encode", |b| {
            b.iter(|| unsafe { encode(black_box(team), &System) }.unwrap());
        });

        group.bench_function("encode_into", |b| {
            let mut dst = vec![0u8; encoded.len()];
            b.iter(|| unsafe { encode_into(black_box(team), &mut dst) });
        });

        group.bench_function("decode", |b| {
            b.iter(|| decode::<Team, _>(black_box(&encoded), &System).unwrap());
        });

        group.bench_function("free", |b| {
            b.iter_batched(
                || unsafe { decode_raw(&encoded, Team::MODEL, &System) }.unwrap(),
                |root| unsafe { free_object(root, Team::MODEL, true, &System) },
                BatchSize::SmallInput,
            );
        });

        group.finish();
    }
}

criterion_group!(benches, bench_passes);
criterion_main!(benches);
