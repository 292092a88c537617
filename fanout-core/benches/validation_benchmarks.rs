use criterion::{Criterion, black_box, criterion_group, criterion_main};
use fanout_core::geo::schema::fan_out_result_shape;
use fanout_core::prompts::truncate_content;
use fanout_core::{AnswerBlockCandidate, FanOutCandidate, validate_block, validate_result};

fn block(query: &str) -> AnswerBlockCandidate {
    AnswerBlockCandidate {
        intent_category: "Comparison".to_string(),
        target_query: query.to_string(),
        heading: "Jotform vs Typeform pricing".to_string(),
        content: "Jotform costs less than Typeform for high-volume teams because its Bronze plan \
                  includes 1,000 monthly submissions for $34, which means a team collecting \
                  event registrations pays about three cents per response. Typeform caps its \
                  Basic plan at 100 responses, therefore Jotform suits form-heavy workflows \
                  that need predictable monthly costs."
            .to_string(),
        relevance_score: 91,
        source_quality_score: Some(75),
    }
}

fn bench_validate_block(c: &mut Criterion) {
    let valid = block("jotform vs typeform pricing");
    c.bench_function("validate_block_valid", |b| {
        b.iter(|| validate_block(black_box(&valid)))
    });

    let mut pronoun = block("jotform vs typeform pricing");
    pronoun.content = format!("It {}", pronoun.content);
    c.bench_function("validate_block_pronoun_start", |b| {
        b.iter(|| validate_block(black_box(&pronoun)))
    });

    let mut long = block("jotform vs typeform pricing");
    long.content = "word ".repeat(5000);
    c.bench_function("validate_block_long_content", |b| {
        b.iter(|| validate_block(black_box(&long)))
    });
}

fn bench_validate_result(c: &mut Criterion) {
    let candidate = FanOutCandidate {
        main_keyword: "jotform".to_string(),
        analysis_summary: "Buyers compare pricing and limits.".to_string(),
        blocks: (0..5).map(|i| block(&format!("jotform question {i}"))).collect(),
    };
    c.bench_function("validate_result_five_blocks", |b| {
        b.iter(|| validate_result(black_box(&candidate)))
    });

    let mut duplicated = candidate.clone();
    duplicated.blocks[4].target_query = "JOTFORM QUESTION 0".to_string();
    c.bench_function("validate_result_duplicate_query", |b| {
        b.iter(|| validate_result(black_box(&duplicated)))
    });
}

fn bench_prompt_helpers(c: &mut Criterion) {
    let content = "Jotform résumé builder ".repeat(1000);
    c.bench_function("truncate_content_4000", |b| {
        b.iter(|| truncate_content(black_box(&content), 4000))
    });

    c.bench_function("fan_out_result_shape", |b| {
        b.iter(|| fan_out_result_shape(black_box(true)))
    });
}

criterion_group!(
    benches,
    bench_validate_block,
    bench_validate_result,
    bench_prompt_helpers
);
criterion_main!(benches);
