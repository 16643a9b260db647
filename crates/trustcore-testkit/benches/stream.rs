use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::executor::block_on;
use futures::{stream, StreamExt};

use trustcore_protect::{make_resource, EncryptorStream, ProtectError, StreamConfig};

fn encrypt_stream(data: &Bytes, config: StreamConfig) -> usize {
    let input = stream::iter(
        data.chunks(64 * 1024)
            .map(|piece| Ok::<_, ProtectError>(data.slice_ref(piece)))
            .collect::<Vec<_>>(),
    );
    let encryptor = EncryptorStream::new(input, make_resource(), config).unwrap();
    block_on(encryptor.map(|chunk| chunk.unwrap().len()).fold(0, |acc, n| async move { acc + n }))
}

fn bench_stream_encryption(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_encrypt");
    for size in [64 * 1024usize, 1024 * 1024, 8 * 1024 * 1024] {
        let data = Bytes::from(vec![0x42u8; size]);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| encrypt_stream(black_box(data), StreamConfig::default()))
        });
    }
    group.finish();
}

fn bench_simple_encryption(c: &mut Criterion) {
    let resource = make_resource();
    let data = vec![0x42u8; 1024 * 1024];
    c.bench_function("simple_encrypt_1mib", |b| {
        b.iter(|| {
            trustcore_protect::format::simple_encryption()
                .encrypt(&resource.key, &resource.resource_id, black_box(&data))
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_stream_encryption, bench_simple_encryption);
criterion_main!(benches);
