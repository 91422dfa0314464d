use std::hint::black_box;

use bytes::BytesMut;
use criterion::{Criterion, criterion_group, criterion_main};
use micro_hypertext::codec::RequestDecoder;
use tokio_util::codec::Decoder;

const SIMPLE_REQUEST: &[u8] = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";

const BROWSER_REQUEST: &[u8] = b"GET /index/?a=1&b=2&a=3 HTTP/1.1\r\n\
Host: 127.0.0.1:8080\r\n\
Connection: keep-alive\r\n\
Cache-Control: max-age=0\r\n\
Upgrade-Insecure-Requests: 1\r\n\
User-Agent: Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0 Safari/537.36\r\n\
Accept: text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8\r\n\
Accept-Encoding: gzip, deflate, br\r\n\
Accept-Language: zh-CN,zh;q=0.9,en-US;q=0.8,en;q=0.7\r\n\r\n";

fn drain(input: &[u8], split: usize) -> usize {
    let mut decoder = RequestDecoder::default();
    let mut buffer = BytesMut::with_capacity(input.len());
    let mut events = 0;
    for chunk in input.chunks(split) {
        buffer.extend_from_slice(chunk);
        while let Some(event) = decoder.decode(&mut buffer).unwrap() {
            black_box(event);
            events += 1;
        }
    }
    events
}

fn bench_request_decoder(c: &mut Criterion) {
    c.bench_function("decode_simple_request", |b| {
        b.iter(|| drain(black_box(SIMPLE_REQUEST), SIMPLE_REQUEST.len()));
    });

    c.bench_function("decode_browser_request", |b| {
        b.iter(|| drain(black_box(BROWSER_REQUEST), BROWSER_REQUEST.len()));
    });

    c.bench_function("decode_browser_request_split_64", |b| {
        b.iter(|| drain(black_box(BROWSER_REQUEST), 64));
    });
}

fn bench_chunked_body(c: &mut Criterion) {
    let mut request = b"POST /upload HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
    for _ in 0..64 {
        request.extend_from_slice(b"400\r\n");
        request.extend_from_slice(&[b'x'; 0x400]);
        request.extend_from_slice(b"\r\n");
    }
    request.extend_from_slice(b"0\r\n\r\n");

    c.bench_function("decode_chunked_64k", |b| {
        b.iter(|| drain(black_box(&request), 16 * 1024));
    });
}

criterion_group!(benches, bench_request_decoder, bench_chunked_body);
criterion_main!(benches);
