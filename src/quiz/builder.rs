use teloxide::types::UserId;

use crate::error::{Error, Result};
use crate::quiz::{Question, Quiz};

/// Where the author is in the creation dialogue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Phase {
    #[default]
    AwaitingTitle,
    AwaitingDescription,
    CollectingQuestions,
}

impl Phase {
    /// What the author should send next.
    pub fn hint(&self) -> &'static str {
        match self {
            Phase::AwaitingTitle => "Send the quiz title (e.g. NEET Biology 2026).",
            Phase::AwaitingDescription => "Send a description for the quiz, or /skip.",
            Phase::CollectingQuestions => "Send a quiz poll to add a question, or /done to finish.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollKind {
    Quiz,
    Regular,
}

/// A poll the author sent while collecting questions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSubmission {
    pub question: String,
    pub options: Vec<String>,
    pub correct: Option<usize>,
    pub kind: PollKind,
}

/// What changed after a builder step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    TitleSet(String),
    DescriptionSet,
    DescriptionSkipped,
    /// Carries the number of questions collected so far.
    QuestionAdded(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BuilderSession {
    /// The author of the draft.
    user: UserId,
    phase: Phase,
    title: Option<String>,
    description: Option<String>,
    questions: Vec<Question>,
}

impl BuilderSession {
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            phase: Phase::default(),
            title: None,
            description: None,
            questions: Vec::new(),
        }
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn on_text(&mut self, text: &str) -> Result<Progress> {
        let text = text.trim();
        match self.phase {
            Phase::AwaitingTitle => {
                if text.is_empty() {
                    return Err(Error::EmptyTitle);
                }
                self.title = Some(text.to_owned());
                self.phase = Phase::AwaitingDescription;
                Ok(Progress::TitleSet(text.to_owned()))
            }
            Phase::AwaitingDescription => {
                // Some clients send "/skip" as plain text instead of a command
                if is_skip(text) {
                    return self.on_skip();
                }
                if text.is_empty() {
                    return Err(Error::UnexpectedInput(self.phase));
                }
                self.description = Some(text.to_owned());
                self.phase = Phase::CollectingQuestions;
                Ok(Progress::DescriptionSet)
            }
            Phase::CollectingQuestions => Err(Error::UnexpectedInput(self.phase)),
        }
    }

    pub fn on_skip(&mut self) -> Result<Progress> {
        if self.phase != Phase::AwaitingDescription {
            return Err(Error::UnexpectedInput(self.phase));
        }
        self.description = None;
        self.phase = Phase::CollectingQuestions;
        Ok(Progress::DescriptionSkipped)
    }

    /// Validates the poll and appends it as the next question. A rejected
    /// poll leaves the draft untouched.
    pub fn on_poll(&mut self, poll: PollSubmission) -> Result<Progress> {
        if self.phase != Phase::CollectingQuestions {
            return Err(Error::UnexpectedInput(self.phase));
        }
        if poll.kind != PollKind::Quiz {
            return Err(Error::NotQuizPoll);
        }
        let correct = poll.correct.ok_or(Error::MissingCorrectOption)?;
        let question = Question::new(poll.question, poll.options, correct)?;

        self.questions.push(question);
        Ok(Progress::QuestionAdded(self.questions.len()))
    }

    /// Turns the draft into a [`Quiz`]. On success the draft is emptied and
    /// the session should be dropped.
    pub fn finalize(&mut self) -> Result<Quiz> {
        if self.phase != Phase::CollectingQuestions {
            return Err(Error::UnexpectedInput(self.phase));
        }
        if self.questions.is_empty() {
            return Err(Error::NoQuestions);
        }
        let title = self.title.take().ok_or(Error::UnexpectedInput(Phase::AwaitingTitle))?;

        Ok(Quiz::new(
            title,
            self.description.take(),
            std::mem::take(&mut self.questions),
        ))
    }
}

fn is_skip(text: &str) -> bool {
    text.eq_ignore_ascii_case("/skip") || text.eq_ignore_ascii_case("skip")
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUTHOR: UserId = UserId(9);

    fn quiz_poll(question: &str, correct: Option<usize>) -> PollSubmission {
        PollSubmission {
            question: question.to_owned(),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct,
            kind: PollKind::Quiz,
        }
    }

    fn collecting() -> BuilderSession {
        let mut session = BuilderSession::new(AUTHOR);
        session.on_text("Bio").unwrap();
        session.on_skip().unwrap();
        session
    }

    #[test]
    fn walks_through_every_phase() {
        let mut session = BuilderSession::new(AUTHOR);
        assert_eq!(session.user(), AUTHOR);
        assert_eq!(session.phase(), Phase::AwaitingTitle);

        assert_eq!(session.on_text("  Bio  "), Ok(Progress::TitleSet("Bio".into())));
        assert_eq!(session.phase(), Phase::AwaitingDescription);

        assert_eq!(session.on_text("Cells and stuff"), Ok(Progress::DescriptionSet));
        assert_eq!(session.phase(), Phase::CollectingQuestions);
        assert_eq!(session.description(), Some("Cells and stuff"));
    }

    #[test]
    fn empty_title_keeps_phase() {
        let mut session = BuilderSession::new(AUTHOR);
        assert_eq!(session.on_text("   "), Err(Error::EmptyTitle));
        assert_eq!(session.phase(), Phase::AwaitingTitle);
        assert_eq!(session.title(), None);
    }

    #[test]
    fn skip_as_text_clears_description() {
        let mut session = BuilderSession::new(AUTHOR);
        session.on_text("Bio").unwrap();
        assert_eq!(session.on_text("/SKIP"), Ok(Progress::DescriptionSkipped));
        assert_eq!(session.description(), None);
        assert_eq!(session.phase(), Phase::CollectingQuestions);
    }

    #[test]
    fn skip_outside_description_is_a_hint() {
        let mut session = BuilderSession::new(AUTHOR);
        assert_eq!(
            session.on_skip(),
            Err(Error::UnexpectedInput(Phase::AwaitingTitle))
        );
    }

    #[test]
    fn text_while_collecting_is_a_hint() {
        let mut session = collecting();
        let err = session.on_text("what now?").unwrap_err();
        assert_eq!(err, Error::UnexpectedInput(Phase::CollectingQuestions));
        assert_eq!(err.to_string(), Phase::CollectingQuestions.hint());
    }

    #[test]
    fn rejects_regular_polls() {
        let mut session = collecting();
        let mut poll = quiz_poll("q", Some(0));
        poll.kind = PollKind::Regular;
        assert_eq!(session.on_poll(poll), Err(Error::NotQuizPoll));
        assert!(session.questions().is_empty());
    }

    #[test]
    fn rejects_poll_without_correct_option() {
        let mut session = collecting();
        session.on_poll(quiz_poll("first", Some(1))).unwrap();
        assert_eq!(
            session.on_poll(quiz_poll("second", None)),
            Err(Error::MissingCorrectOption)
        );
        assert_eq!(session.questions().len(), 1);
    }

    #[test]
    fn polls_before_collecting_are_refused() {
        let mut session = BuilderSession::new(AUTHOR);
        assert_eq!(
            session.on_poll(quiz_poll("early", Some(0))),
            Err(Error::UnexpectedInput(Phase::AwaitingTitle))
        );
    }

    #[test]
    fn questions_keep_arrival_order() {
        let mut session = collecting();
        for (i, text) in ["one", "two", "three"].iter().enumerate() {
            assert_eq!(
                session.on_poll(quiz_poll(text, Some(i))),
                Ok(Progress::QuestionAdded(i + 1))
            );
        }

        let quiz = session.finalize().unwrap();
        let texts: Vec<_> = quiz.questions().iter().map(|q| q.text()).collect();
        assert_eq!(texts, ["one", "two", "three"]);
        assert_eq!(quiz.questions()[2].correct(), 2);
    }

    #[test]
    fn finalize_without_questions_fails() {
        let mut session = collecting();
        assert_eq!(session.finalize(), Err(Error::NoQuestions));
        assert_eq!(session.phase(), Phase::CollectingQuestions);
        assert_eq!(session.title(), Some("Bio"));
    }

    #[test]
    fn finalize_carries_metadata() {
        let mut session = BuilderSession::new(AUTHOR);
        session.on_text("Chemistry").unwrap();
        session.on_text("Organic basics").unwrap();
        session.on_poll(quiz_poll("q", Some(0))).unwrap();

        let quiz = session.finalize().unwrap();
        assert_eq!(quiz.title(), "Chemistry");
        assert_eq!(quiz.description(), Some("Organic basics"));
        assert_eq!(quiz.len(), 1);
    }
}
