//! Question generation
//!
//! Only the host generates questions; clients adopt whatever the host
//! publishes. The default source produces arithmetic questions from a seeded
//! ChaCha stream so a given seed always yields the same match.

use duelsync_core::Question;
use rand_chacha::ChaCha8Rng;
use rand_core::{RngCore, SeedableRng};

/// Number of answers offered per question
pub const ANSWERS_PER_QUESTION: usize = 4;

/// Supplies the content of each question
pub trait QuestionSource {
    fn next_question(&mut self, question_index: u32) -> Question;
}

/// Seeded arithmetic questions with four distinct answers
pub struct ArithmeticQuestions {
    rng: ChaCha8Rng,
}

impl ArithmeticQuestions {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    fn below(&mut self, bound: u32) -> u32 {
        self.rng.next_u32() % bound
    }
}

impl QuestionSource for ArithmeticQuestions {
    fn next_question(&mut self, question_index: u32) -> Question {
        let a = 2 + self.below(19) as i32;
        let b = 2 + self.below(19) as i32;
        let (symbol, result) = match self.below(3) {
            0 => ('+', a + b),
            1 => ('-', a - b),
            _ => ('x', a * b),
        };

        let mut values = vec![result];
        let mut offset = 1;
        while values.len() < ANSWERS_PER_QUESTION {
            let sign = if self.below(2) == 0 { 1 } else { -1 };
            let candidate = result + sign * (offset + self.below(3) as i32);
            if !values.contains(&candidate) {
                values.push(candidate);
            }
            offset += 1;
        }

        let correct_answer = self.below(ANSWERS_PER_QUESTION as u32) as usize;
        values.swap(0, correct_answer);

        Question {
            prompt: format!("Q{question_index}: what is {a} {symbol} {b}?"),
            answers: values.iter().map(i32::to_string).collect(),
            correct_answer: correct_answer as u8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answers_are_distinct_and_correct_is_in_range() {
        let mut source = ArithmeticQuestions::new(42);
        for index in 1..50 {
            let question = source.next_question(index);
            assert_eq!(question.answers.len(), ANSWERS_PER_QUESTION);
            assert!((question.correct_answer as usize) < ANSWERS_PER_QUESTION);
            let mut sorted = question.answers.clone();
            sorted.sort();
            sorted.dedup();
            assert_eq!(sorted.len(), ANSWERS_PER_QUESTION);
        }
    }

    #[test]
    fn test_same_seed_same_questions() {
        let mut first = ArithmeticQuestions::new(7);
        let mut second = ArithmeticQuestions::new(7);
        for index in 1..10 {
            assert_eq!(first.next_question(index), second.next_question(index));
        }
    }
}
