//! Topic pool: capacity validation and disjoint chunk assignment.
//!
//! Capacity is checked in whole chunks, not raw topics: trailing topics that
//! cannot fill a full chunk are never used.

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::domain::{Chunk, QuestionPlan};
use crate::error::{GenerationError, GenerationResult};

/// Fails when Σ floor(count / chunk_size) exceeds floor(len(topics) / chunk_size).
pub fn validate_capacity(plan: &QuestionPlan, topics: &[String], chunk_size: usize) -> GenerationResult<()> {
    if chunk_size == 0 {
        return Err(GenerationError::InvalidChunkSize);
    }
    let requested_chunks = plan.total_chunks(chunk_size);
    let available_chunks = topics.len() / chunk_size;
    if requested_chunks > available_chunks {
        return Err(GenerationError::Capacity {
            available: topics.len(),
            requested: plan.total_requested(),
        });
    }
    Ok(())
}

/// Shuffled working copy of the topic list, consumed strictly front to back.
#[derive(Debug)]
pub struct TopicPool {
    topics: Vec<String>,
    cursor: usize,
    chunk_size: usize,
}

impl TopicPool {
    /// Validate the plan against the topics, then shuffle a private copy.
    pub fn prepare<R: Rng + ?Sized>(
        plan: &QuestionPlan,
        topics: &[String],
        chunk_size: usize,
        rng: &mut R,
    ) -> GenerationResult<Self> {
        validate_capacity(plan, topics, chunk_size)?;
        let mut shuffled = topics.to_vec();
        shuffled.shuffle(rng);
        debug!(target: "generation", topics = shuffled.len(), chunk_size, "Topic pool prepared");
        Ok(Self { topics: shuffled, cursor: 0, chunk_size })
    }

    pub fn remaining(&self) -> usize {
        self.topics.len() - self.cursor
    }

    /// Take the next `chunk_size` unused topics.
    pub fn take_chunk(&mut self, question_type: &str) -> GenerationResult<Chunk> {
        let end = self.cursor + self.chunk_size;
        if end > self.topics.len() {
            return Err(GenerationError::TopicCursorOverrun {
                cursor: self.cursor,
                chunk_size: self.chunk_size,
                len: self.topics.len(),
            });
        }
        let topics = self.topics[self.cursor..end].to_vec();
        self.cursor = end;
        Ok(Chunk { question_type: question_type.to_string(), topics })
    }

    /// Every chunk the plan asks for, in plan order then sub-chunk order.
    pub fn assign(&mut self, plan: &QuestionPlan) -> GenerationResult<Vec<Chunk>> {
        let mut chunks = Vec::with_capacity(plan.total_chunks(self.chunk_size));
        for (code, count) in plan.iter() {
            for _ in 0..QuestionPlan::chunks_for(count, self.chunk_size) {
                chunks.push(self.take_chunk(code)?);
            }
        }
        debug!(target: "generation", chunks = chunks.len(), unused_topics = self.remaining(), "Topics assigned");
        Ok(chunks)
    }
}
