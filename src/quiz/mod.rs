pub mod builder;
pub mod runner;

use crate::error::{Error, Result};

/// Fewest options a question may have.
pub const MIN_OPTIONS: usize = 2;
/// Telegram refuses polls with more than ten options.
pub const MAX_OPTIONS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Quiz {
    title: String,
    description: Option<String>,
    questions: Vec<Question>,
}

impl Quiz {
    pub fn new(title: String, description: Option<String>, questions: Vec<Question>) -> Self {
        Self {
            title,
            description,
            questions,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// A single multiple-choice question. Once built it cannot be changed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Question {
    text: String,
    options: Vec<String>,
    correct: usize,
}

impl Question {
    pub fn new(text: String, options: Vec<String>, correct: usize) -> Result<Self> {
        if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&options.len()) {
            return Err(Error::InvalidOptions(options.len()));
        }
        if correct >= options.len() {
            return Err(Error::CorrectOptionOutOfRange(correct));
        }

        Ok(Self {
            text,
            options,
            correct,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn correct(&self) -> usize {
        self.correct
    }

    pub fn is_correct(&self, choice: usize) -> bool {
        choice == self.correct
    }
}
