//! Prompt rendering for one chunk of topics.

use rand::Rng;

use crate::config::PromptTemplates;
use crate::domain::{Chunk, Prompt};
use crate::util::fill_template;

/// `count` option numbers drawn uniformly from 1..=4, joined with ", ".
/// Embedded in the prompt so correct answers are spread across options.
pub fn answer_key<R: Rng + ?Sized>(count: usize, rng: &mut R) -> String {
    (0..count)
        .map(|_| rng.gen_range(1..=4u8).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Topics as a 1-based numbered list, one per line.
pub fn numbered_topics(topics: &[String]) -> String {
    topics
        .iter()
        .enumerate()
        .map(|(i, t)| format!("{}. {}", i + 1, t))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render the template for `chunk.question_type`. Unknown codes render an empty prompt.
pub fn build_prompt<R: Rng + ?Sized>(
    templates: &PromptTemplates,
    chunk: &Chunk,
    count: usize,
    exam: &str,
    rng: &mut R,
) -> Prompt {
    let key = answer_key(count, rng);
    let topics = numbered_topics(&chunk.topics);
    let num = count.to_string();
    let text = fill_template(
        templates.template(&chunk.question_type),
        &[("topics", &topics), ("answer_key", &key), ("num", &num), ("exam", exam)],
    );
    Prompt { question_type: chunk.question_type.clone(), text, answer_key: key }
}
