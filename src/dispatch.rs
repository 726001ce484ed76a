//! Routes inbound chat events to the builder or the run engine of the
//! sender's session and turns the result into outbound instructions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, info, warn};
use teloxide::types::{ChatId, UserId};

use crate::error::{Error, ErrorKind, Result};
use crate::quiz::builder::{BuilderSession, PollSubmission, Progress};
use crate::quiz::runner::{Advance, AnswerPolicy, Participant, QuizPoll, RunSession, Summary};
use crate::session::{Session, SessionGuard, SessionStore};

pub const WELCOME_TEXT: &str = "Welcome to the Quiz Builder Bot! 🚀\n\
Commands:\n\
/create - build a new quiz\n\
/startquiz - run your latest quiz here (DM or group)\n\
/next - move on to the next question\n\
/cancel - stop building or running a quiz";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Create,
    Skip,
    Done,
    StartQuiz,
    Next,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Command {
        command: Command,
        user: UserId,
        chat: ChatId,
    },
    Text {
        user: UserId,
        chat: ChatId,
        text: String,
    },
    QuizPoll {
        user: UserId,
        chat: ChatId,
        poll: PollSubmission,
    },
    PollAnswer {
        participant: Participant,
        poll: String,
        /// `None` when the vote was retracted.
        choice: Option<usize>,
    },
    /// The answer window of a posted question ran out.
    QuestionTimeout(PollTag),
}

/// Identifies which question of which run a posted poll belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PollTag {
    pub owner: UserId,
    pub run: u64,
    pub question: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text { chat: ChatId, text: String },
    QuizPoll { chat: ChatId, poll: QuizPoll, tag: PollTag },
    Summary { chat: ChatId, summary: Summary },
}

impl Outbound {
    pub fn chat(&self) -> ChatId {
        match self {
            Outbound::Text { chat, .. }
            | Outbound::QuizPoll { chat, .. }
            | Outbound::Summary { chat, .. } => *chat,
        }
    }

    fn text(chat: ChatId, text: impl Into<String>) -> Self {
        Outbound::Text {
            chat,
            text: text.into(),
        }
    }
}

pub struct Router {
    store: Arc<SessionStore>,
    /// Telegram poll id to the question it was posted for.
    polls: DashMap<String, PollTag>,
    policy: AnswerPolicy,
    next_run: AtomicU64,
}

impl Router {
    pub fn new(store: Arc<SessionStore>, policy: AnswerPolicy) -> Self {
        Self {
            store,
            polls: DashMap::new(),
            policy,
            next_run: AtomicU64::new(1),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Whether the question a tag points at is still waiting for answers.
    pub async fn is_open(&self, tag: PollTag) -> bool {
        let mut session = self.store.lock(tag.owner).await;
        open_question(&mut session, tag).is_ok()
    }

    /// Remembers which question a freshly posted poll belongs to, so that
    /// answers to it can be scored. Returns `false` and binds nothing when the
    /// question closed while the poll was on its way.
    pub async fn bind_poll(&self, poll: String, tag: PollTag) -> bool {
        // Bind under the owner's lock so a run ending concurrently cannot
        // forget its polls before this one is inserted.
        let mut session = self.store.lock(tag.owner).await;
        if open_question(&mut session, tag).is_err() {
            debug!("Poll {} arrived after question {} of run {} closed", poll, tag.question, tag.run);
            return false;
        }
        debug!("Poll {} bound to question {} of run {}", poll, tag.question, tag.run);
        self.polls.insert(poll, tag);
        true
    }

    /// Handles one event. Recoverable errors become replies to the sender,
    /// stale events produce nothing.
    pub async fn handle(&self, event: Event) -> Vec<Outbound> {
        let reply_chat = match &event {
            Event::Command { chat, .. } | Event::Text { chat, .. } | Event::QuizPoll { chat, .. } => {
                Some(*chat)
            }
            Event::PollAnswer { .. } | Event::QuestionTimeout(_) => None,
        };

        let result = match event {
            Event::Command {
                command,
                user,
                chat,
            } => self.on_command(command, user, chat).await,
            Event::Text { user, chat, text } => self.on_text(user, chat, &text).await,
            Event::QuizPoll { user, chat, poll } => self.on_poll(user, chat, poll).await,
            Event::PollAnswer {
                participant,
                poll,
                choice,
            } => self.on_answer(participant, &poll, choice).await,
            Event::QuestionTimeout(tag) => self.on_timeout(tag).await,
        };

        match result {
            Ok(outbound) => outbound,
            Err(err) if err.kind() == ErrorKind::Stale => {
                debug!("Ignoring stale event");
                Vec::new()
            }
            Err(err) => match reply_chat {
                Some(chat) => vec![Outbound::text(chat, err.to_string())],
                None => {
                    warn!("Dropping error without a chat to report to: {}", err);
                    Vec::new()
                }
            },
        }
    }

    async fn on_command(&self, command: Command, user: UserId, chat: ChatId) -> Result<Vec<Outbound>> {
        match command {
            Command::Start | Command::Help => Ok(vec![Outbound::text(chat, WELCOME_TEXT)]),
            Command::Create => {
                let mut session = self.store.lock(user).await;
                match session.get() {
                    Some(Session::Run(run)) => {
                        info!("User {} abandons run {}", user, run.id());
                        self.forget_polls(run.id());
                    }
                    Some(Session::Builder(_)) => info!("User {} discards their draft", user),
                    None => {}
                }
                session.put(Session::Builder(BuilderSession::new(user)));
                info!("User {} started building a quiz", user);
                Ok(vec![Outbound::text(
                    chat,
                    "Send the quiz title (e.g. NEET Biology 2026):",
                )])
            }
            Command::Skip => {
                let mut session = self.store.lock(user).await;
                let progress = builder(&mut session)?.on_skip()?;
                Ok(vec![Outbound::text(chat, progress_text(&progress))])
            }
            Command::Done => self.finalize(user, chat).await,
            Command::StartQuiz => self.start_run(user, chat).await,
            Command::Next => {
                let mut session = self.store.lock(user).await;
                let advance = match session.get_mut() {
                    Some(Session::Run(run)) => run.advance()?,
                    Some(Session::Builder(_)) => return Err(Error::StillBuilding),
                    None => return Err(Error::NotRunning),
                };
                Ok(self.after_advance(&mut session, advance))
            }
            Command::Cancel => {
                let mut session = self.store.lock(user).await;
                match session.take() {
                    Some(Session::Builder(_)) => {
                        info!("User {} cancelled their draft", user);
                        Ok(vec![Outbound::text(chat, "Quiz creation cancelled.")])
                    }
                    Some(Session::Run(mut run)) => {
                        info!("User {} stopped run {}", user, run.id());
                        self.forget_polls(run.id());
                        Ok(vec![Outbound::Summary {
                            chat: run.chat(),
                            summary: run.finish(),
                        }])
                    }
                    None => Err(Error::NoSession),
                }
            }
        }
    }

    async fn on_text(&self, user: UserId, chat: ChatId, text: &str) -> Result<Vec<Outbound>> {
        let mut session = self.store.lock(user).await;
        match session.get_mut() {
            Some(Session::Builder(draft)) => {
                let progress = draft.on_text(text)?;
                Ok(vec![Outbound::text(chat, progress_text(&progress))])
            }
            Some(Session::Run(_)) => Err(Error::AlreadyRunning),
            None => Err(self.no_session_error(user)),
        }
    }

    async fn on_poll(&self, user: UserId, chat: ChatId, poll: PollSubmission) -> Result<Vec<Outbound>> {
        let mut session = self.store.lock(user).await;
        let progress = builder(&mut session)?.on_poll(poll)?;
        debug!("User {} added question: {:?}", user, progress);
        Ok(vec![Outbound::text(chat, progress_text(&progress))])
    }

    async fn finalize(&self, user: UserId, chat: ChatId) -> Result<Vec<Outbound>> {
        let mut session = self.store.lock(user).await;
        let quiz = builder(&mut session)?.finalize()?;
        session.remove();

        info!("User {} finalized \"{}\" with {} questions", user, quiz.title(), quiz.len());
        let text = format!(
            "Quiz ready! Title: {}\nQuestions: {}\nRun it with /startquiz (DM or group).",
            quiz.title(),
            quiz.len()
        );
        self.store.shelve(user, Arc::new(quiz));
        Ok(vec![Outbound::text(chat, text)])
    }

    async fn start_run(&self, user: UserId, chat: ChatId) -> Result<Vec<Outbound>> {
        let mut session = self.store.lock(user).await;
        match session.get() {
            Some(Session::Builder(_)) => return Err(Error::StillBuilding),
            Some(Session::Run(_)) => return Err(Error::AlreadyRunning),
            None => {}
        }
        let quiz = self.store.shelved(user).ok_or(Error::NoSession)?;

        let id = self.next_run.fetch_add(1, Ordering::Relaxed);
        let (run, poll) = RunSession::start(id, quiz, chat, self.policy)?;
        info!("User {} started run {} of \"{}\" in chat {}", user, id, run.quiz().title(), chat);

        let mut intro = format!("Starting {}... Good luck! 🔥", run.quiz().title());
        if let Some(description) = run.quiz().description() {
            intro.push_str("\n\n");
            intro.push_str(description);
        }
        let tag = PollTag {
            owner: user,
            run: id,
            question: poll.question,
        };
        session.put(Session::Run(run));

        Ok(vec![
            Outbound::text(chat, intro),
            Outbound::QuizPoll { chat, poll, tag },
        ])
    }

    async fn on_answer(
        &self,
        participant: Participant,
        poll: &str,
        choice: Option<usize>,
    ) -> Result<Vec<Outbound>> {
        let tag = *self.polls.get(poll).ok_or(Error::Stale)?.value();
        let mut session = self.store.lock(tag.owner).await;
        let run = active_run(&mut session, tag)?;

        let who = participant.id;
        let outcome = run.on_answer(tag.question, participant, choice)?;
        debug!("Run {}: user {} answered question {}: {:?}", tag.run, who, tag.question, outcome);
        Ok(Vec::new())
    }

    async fn on_timeout(&self, tag: PollTag) -> Result<Vec<Outbound>> {
        let mut session = self.store.lock(tag.owner).await;
        let run = open_question(&mut session, tag)?;

        info!("Run {}: question {} timed out", tag.run, tag.question);
        let advance = run.advance()?;
        Ok(self.after_advance(&mut session, advance))
    }

    fn after_advance(&self, session: &mut SessionGuard, advance: Advance) -> Vec<Outbound> {
        let Some(Session::Run(run)) = session.get() else {
            return Vec::new();
        };
        let (chat, id) = (run.chat(), run.id());

        match advance {
            Advance::Next(poll) => {
                let tag = PollTag {
                    owner: session.user(),
                    run: id,
                    question: poll.question,
                };
                vec![Outbound::QuizPoll { chat, poll, tag }]
            }
            Advance::Finished(summary) => {
                info!("Run {} finished", id);
                session.remove();
                self.forget_polls(id);
                vec![Outbound::Summary { chat, summary }]
            }
        }
    }

    fn forget_polls(&self, run: u64) {
        self.polls.retain(|_, tag| tag.run != run);
    }

    fn no_session_error(&self, user: UserId) -> Error {
        match self.store.shelved(user) {
            Some(_) => Error::NotRunning,
            None => Error::NoSession,
        }
    }
}

fn builder(session: &mut SessionGuard) -> Result<&mut BuilderSession> {
    match session.get_mut() {
        Some(Session::Builder(draft)) => Ok(draft),
        Some(Session::Run(_)) => Err(Error::AlreadyRunning),
        None => Err(Error::NoSession),
    }
}

/// The run a poll tag points at, provided it is still the same run.
fn active_run(session: &mut SessionGuard, tag: PollTag) -> Result<&mut RunSession> {
    match session.get_mut() {
        Some(Session::Run(run)) if run.id() == tag.run && !run.is_finished() => Ok(run),
        _ => Err(Error::Stale),
    }
}

/// Like [`active_run`], but only while the tagged question is the current one.
fn open_question(session: &mut SessionGuard, tag: PollTag) -> Result<&mut RunSession> {
    let run = active_run(session, tag)?;
    if run.current() != tag.question {
        return Err(Error::Stale);
    }
    Ok(run)
}

fn progress_text(progress: &Progress) -> String {
    match progress {
        Progress::TitleSet(title) => {
            format!("Title set: {}\n\nNow send a description (optional) or /skip", title)
        }
        Progress::DescriptionSet | Progress::DescriptionSkipped => "Good! Now send one poll per question:\n\
            - Poll type: Quiz\n\
            - Mark the correct option\n\
            - Question text + options (4 is typical)\n\
            Send /done when you are finished."
            .to_owned(),
        Progress::QuestionAdded(count) => {
            format!("Question added! ({} total)\nSend the next poll or /done", count)
        }
    }
}
