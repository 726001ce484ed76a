use crate::quiz::builder::Phase;
use crate::quiz::{MAX_OPTIONS, MIN_OPTIONS};

pub type Result<T> = std::result::Result<T, Error>;

/// Everything the quiz core can refuse. The `Display` text is what the user
/// gets to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("The title can't be empty. Send the quiz title as a text message.")]
    EmptyTitle,

    #[error("Only Quiz type polls can be added. Create the poll with the type set to Quiz.")]
    NotQuizPoll,

    #[error("You forgot to mark the correct option in the poll!")]
    MissingCorrectOption,

    #[error(
        "A question needs between {min} and {max} options, this poll has {0}.",
        min = MIN_OPTIONS,
        max = MAX_OPTIONS
    )]
    InvalidOptions(usize),

    #[error("The correct option #{0} is not one of the poll options.")]
    CorrectOptionOutOfRange(usize),

    #[error("{}", .0.hint())]
    UnexpectedInput(Phase),

    #[error("No questions added yet! Send a quiz poll first.")]
    NoQuestions,

    #[error("Create a quiz first with /create!")]
    NoSession,

    #[error("Finish your quiz with /done before starting it.")]
    StillBuilding,

    #[error("A quiz is already running. Use /next to move on or /cancel to stop it.")]
    AlreadyRunning,

    #[error("No quiz is running right now. Start one with /startquiz.")]
    NotRunning,

    #[error("This quiz has no questions, so there is nothing to run.")]
    EmptyQuiz,

    #[error("event refers to a question that is no longer open")]
    Stale,
}

/// Coarse classes of [`Error`], deciding how the router reacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing user input. Reported, phase unchanged.
    Validation,
    /// Action not valid in the current phase. Reported, phase unchanged.
    Sequence,
    /// Tried to run a quiz without questions. Reported, no session created.
    EmptyQuiz,
    /// Late answer or timer for something that has moved on. Never reported.
    Stale,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyTitle
            | Self::NotQuizPoll
            | Self::MissingCorrectOption
            | Self::InvalidOptions(_)
            | Self::CorrectOptionOutOfRange(_)
            | Self::UnexpectedInput(_) => ErrorKind::Validation,
            Self::NoQuestions
            | Self::NoSession
            | Self::StillBuilding
            | Self::AlreadyRunning
            | Self::NotRunning => ErrorKind::Sequence,
            Self::EmptyQuiz => ErrorKind::EmptyQuiz,
            Self::Stale => ErrorKind::Stale,
        }
    }
}
