//! Extraction Benchmarks
//!
//! Price parsing over the separator variants seen on live listings, the
//! full fallback pipeline, LLM reply parsing and locator chain probing
//! against the mock DOM.
//!
//! Run with: `cargo bench --bench extraction_ops`

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use storeprobe::locator::probe;
use storeprobe::mock::{MockBrowser, MockElement};
use storeprobe::observability::safe_parse_json;
use storeprobe::pages::selectors;
use storeprobe::price::parse_tile_price;
use storeprobe::prelude::*;

fn bench_price_text(c: &mut Criterion) {
    let mut group = c.benchmark_group("price_text");
    let extractor = PriceExtractor::default();

    let inputs = vec![
        ("comma", "₹1,23,999"),
        ("nbsp", "₹\u{a0}1\u{a0}234\u{a0}567"),
        ("narrow_nbsp", "₹1\u{202f}234\u{202f}567"),
        ("unmarked", "Special price 74999 only today"),
        ("digit_scan", "Deal of the day 12 offers 4599 left 3"),
        ("missing", "Currently unavailable"),
    ];

    for (name, text) in inputs {
        group.bench_with_input(BenchmarkId::from_parameter(name), &text, |bench, text| {
            bench.iter(|| black_box(extractor.from_text(black_box(text))));
        });
    }

    group.finish();
}

fn bench_tile_prices(c: &mut Criterion) {
    let tiles: Vec<String> = (0..40)
        .map(|i| format!("Samsung Galaxy M{i} 5G (Blue, 128 GB)\n4.2★\n₹{},999\n₹{},999\n18% off", 10 + i, 14 + i))
        .collect();

    c.bench_function("tile_prices_40", |bench| {
        bench.iter(|| {
            let prices: Vec<_> = tiles.iter().filter_map(|t| parse_tile_price(t)).collect();
            black_box(prices)
        });
    });
}

fn bench_fallback_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("price_pipeline");
    let extractor = PriceExtractor::default();
    let structured = vec![
        r#"{"@type":"BreadcrumbList"}"#.to_string(),
        r#"{"@type":"Product","offers":{"@type":"Offer","price":"74999","priceCurrency":"INR"}}"#.to_string(),
    ];
    let mut dom_texts: Vec<String> = (0..500).map(|i| format!("Menu entry {i}")).collect();
    dom_texts.push("₹74,999".to_string());

    group.bench_function("structured_data", |bench| {
        bench.iter(|| black_box(extractor.extract("", black_box(&structured), &[] as &[&str])));
    });
    group.bench_function("dom_scan", |bench| {
        bench.iter(|| black_box(extractor.extract("", &[] as &[&str], black_box(&dom_texts))));
    });

    group.finish();
}

fn bench_llm_reply_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("llm_reply");

    let replies = vec![
        ("bare", r#"{"relevant": true, "reason": "all tiles are phones"}"#),
        ("fenced", "```json\n{\"ascending\": true, \"reason\": \"sorted\"}\n```"),
        ("prose", "Sure! Here is my verdict: {\"sensible\": false, \"reason\": \"price is 0\"} Hope it helps."),
        ("garbage", "I cannot determine that from the page."),
    ];

    for (name, reply) in replies {
        group.bench_with_input(BenchmarkId::from_parameter(name), &reply, |bench, reply| {
            bench.iter(|| black_box(safe_parse_json(black_box(reply))));
        });
    }

    group.finish();
}

fn bench_chain_probe(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();

    // Only the last candidate of the title chain matches
    let browser = MockBrowser::new();
    let page = browser.open_page("https://shop.test/samsung-galaxy-s24/p/itm1");
    for i in 0..200 {
        page.append(None, MockElement::new("div").class("_1AtVbE").text(&format!("row {i}")));
    }
    page.append(
        None,
        MockElement::new("div")
            .role(AriaRole::Heading)
            .text("Samsung Galaxy S24 5G (Onyx Black, 256 GB)"),
    );
    let title = selectors::product::title();
    let price = selectors::product::price_block();

    let mut group = c.benchmark_group("chain_probe");
    group.bench_function("last_candidate", |bench| {
        bench.iter(|| rt.block_on(async { black_box(probe(page.as_ref(), &title).await) }));
    });
    group.bench_function("no_match", |bench| {
        bench.iter(|| rt.block_on(async { black_box(probe(page.as_ref(), &price).await) }));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_price_text,
    bench_tile_prices,
    bench_fallback_pipeline,
    bench_llm_reply_parsing,
    bench_chain_probe,
);
criterion_main!(benches);
