use futures::TryStreamExt as _;
use weft_ir::FinishReason;

use super::*;
use crate::{from_chunks, ops};

// The delta→accumulated scenario: Hello / " World" / done becomes the same
// chunks with "Hello" / "Hello World" accumulated, done untouched.
#[tokio::test]
async fn delta_to_accumulated_conversion() {
    let stream = from_chunks(vec![
        StreamChunk::content(0, "Hello"),
        StreamChunk::content(1, " World"),
        StreamChunk::done(2, FinishReason::Stop),
    ]);

    let out: Vec<_> = convert_stream(stream, ConvertOptions::new(StreamMode::Accumulated))
        .try_collect()
        .await
        .unwrap();

    assert_eq!(out, vec![
        StreamChunk::Content {
            sequence: 0,
            delta: "Hello".into(),
            accumulated: Some("Hello".into()),
            role: None,
        },
        StreamChunk::Content {
            sequence: 1,
            delta: " World".into(),
            accumulated: Some("Hello World".into()),
            role: None,
        },
        StreamChunk::done(2, FinishReason::Stop),
    ]);
}

#[tokio::test]
async fn add_then_strip_restores_deltas_exactly() {
    let chunks = vec![
        StreamChunk::content(0, "a"),
        StreamChunk::content(1, "b"),
        StreamChunk::done(2, FinishReason::Stop),
    ];

    let out: Vec<_> = strip_accumulated(add_accumulated(from_chunks(chunks.clone())))
        .try_collect()
        .await
        .unwrap();

    assert_eq!(out, chunks);
    assert!(out.iter().all(|c| c.accumulated().is_none()));
}

#[tokio::test]
async fn conversion_preserves_text() {
    let chunks = vec![
        StreamChunk::content(0, "Hel"),
        StreamChunk::content(1, "lo"),
        StreamChunk::done(2, FinishReason::Stop),
    ];

    let direct = ops::stream_to_text(from_chunks(chunks.clone())).await.unwrap();
    let converted = ops::stream_to_text(convert_stream(
        from_chunks(chunks),
        ConvertOptions::new(StreamMode::Accumulated),
    ))
    .await
    .unwrap();

    assert_eq!(direct, converted);
    assert_eq!(direct, "Hello");
}

#[tokio::test]
async fn accumulated_input_is_authoritative() {
    // An upstream already in accumulated mode, with an empty delta: still a
    // valid content chunk, and its accumulated value seeds the total.
    let stream = from_chunks(vec![
        StreamChunk::Content {
            sequence: 0,
            delta: String::new(),
            accumulated: Some("Hi".into()),
            role: None,
        },
        StreamChunk::content(1, "!"),
    ]);

    let out: Vec<_> = add_accumulated(stream).try_collect().await.unwrap();
    assert_eq!(out[0].accumulated(), Some("Hi"));
    assert_eq!(out[1].accumulated(), Some("Hi!"));
}

#[tokio::test]
async fn transform_applies_to_the_visible_accumulation() {
    let stream = from_chunks(vec![
        StreamChunk::content(0, "hello"),
        StreamChunk::content(1, " world"),
    ]);

    let options = ConvertOptions::new(StreamMode::Accumulated)
        .with_transform(std::sync::Arc::new(|text: &str| text.to_uppercase()));

    let out: Vec<_> = convert_stream(stream, options).try_collect().await.unwrap();
    assert_eq!(out[0].accumulated(), Some("HELLO"));
    assert_eq!(out[1].accumulated(), Some("HELLO WORLD"));
    // Deltas stay in wire form.
    assert_eq!(out[1].delta(), Some(" world"));
}
