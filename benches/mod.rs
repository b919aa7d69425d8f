use criterion::{criterion_group, criterion_main};


criterion_group!(
    benches,
    codec::bench_varint,
    codec::bench_encode_publish,
    codec::bench_decode_publish,
    client::bench_publish,
    client::bench_receive_publish
);
criterion_main!(benches);
