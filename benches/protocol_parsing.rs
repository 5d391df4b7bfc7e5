/// Benchmark: API word codec
///
/// Length prefix encoding across the size classes and decoding of a typical
/// multi-row reply from an in-memory buffer.
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rospool::protocol::{encode_length, read_sentence, write_sentence, Sentence};

fn bench_encode_length(c: &mut Criterion) {
    c.bench_function("encode_length_all_classes", |b| {
        b.iter(|| {
            for len in [0x10usize, 0x1000, 0x10_0000, 0x1000_0000, 0x2000_0000] {
                black_box(encode_length(black_box(len)).ok());
            }
        });
    });
}

fn interface_reply() -> Vec<u8> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");

    rt.block_on(async {
        let mut buf = Vec::new();
        for i in 0..32 {
            let sentence = Sentence::from_words([
                "!re".to_string(),
                format!("=name=ether{}", i),
                format!("=rx-byte={}", i * 1_000_003),
                format!("=tx-byte={}", i * 7_000_001),
                "=running=true".to_string(),
                ".tag=7".to_string(),
            ]);
            write_sentence(&mut buf, &sentence).await.expect("encode");
        }
        write_sentence(&mut buf, &Sentence::from_words(["!done", ".tag=7"]))
            .await
            .expect("encode");
        buf
    })
}

fn bench_read_reply(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    let reply = interface_reply();

    c.bench_function("read_interface_reply", |b| {
        b.to_async(&rt).iter(|| async {
            let mut cursor = reply.as_slice();
            let mut rows = 0;
            loop {
                let sentence = read_sentence(&mut cursor).await.expect("decode");
                if sentence.words().first().map(String::as_str) == Some("!done") {
                    break;
                }
                rows += 1;
            }
            black_box(rows)
        });
    });
}

criterion_group!(benches, bench_encode_length, bench_read_reply);
criterion_main!(benches);
