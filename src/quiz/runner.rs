use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use teloxide::types::{ChatId, UserId};

use crate::error::{Error, Result};
use crate::quiz::Quiz;

/// How repeated answers from the same participant to the same question are
/// treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AnswerPolicy {
    /// The first answer counts, later ones and retractions are ignored.
    #[default]
    FirstWriteWins,
    /// The latest answer replaces the earlier one, a retraction clears it.
    LastWriteWins,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: UserId,
    pub name: String,
}

/// A question ready to be posted as a non-anonymous quiz poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizPoll {
    pub question: usize,
    pub text: String,
    pub options: Vec<String>,
    pub correct: usize,
    pub is_anonymous: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    Recorded { correct: bool },
    Retracted,
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    Next(QuizPoll),
    Finished(Summary),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    pub user: UserId,
    pub name: String,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub title: String,
    pub total: usize,
    /// Best score first.
    pub standings: Vec<Standing>,
}

#[derive(Debug, Clone, Copy)]
struct RecordedAnswer {
    choice: usize,
    at: SystemTime,
}

#[derive(Debug, Clone)]
struct Tally {
    name: String,
    score: u32,
    /// Order in which the participant first answered, used to break ties.
    joined: usize,
}

#[derive(Debug, Clone)]
pub struct RunSession {
    id: u64,
    quiz: Arc<Quiz>,
    chat: ChatId,
    policy: AnswerPolicy,
    current: usize,
    finished: bool,
    /// Answers to the currently open question only.
    answers: HashMap<UserId, RecordedAnswer>,
    tallies: HashMap<UserId, Tally>,
}

impl RunSession {
    /// Opens a run and hands back the first question to post.
    pub fn start(
        id: u64,
        quiz: Arc<Quiz>,
        chat: ChatId,
        policy: AnswerPolicy,
    ) -> Result<(Self, QuizPoll)> {
        if quiz.is_empty() {
            return Err(Error::EmptyQuiz);
        }

        let session = Self {
            id,
            quiz,
            chat,
            policy,
            current: 0,
            finished: false,
            answers: HashMap::new(),
            tallies: HashMap::new(),
        };
        let poll = session.poll(0).ok_or(Error::EmptyQuiz)?;
        Ok((session, poll))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn quiz(&self) -> &Arc<Quiz> {
        &self.quiz
    }

    pub fn chat(&self) -> ChatId {
        self.chat
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The recorded answer to the open question and when it arrived.
    pub fn answer(&self, user: UserId) -> Option<(usize, SystemTime)> {
        self.answers.get(&user).map(|a| (a.choice, a.at))
    }

    pub fn score(&self, user: UserId) -> u32 {
        self.tallies.get(&user).map_or(0, |t| t.score)
    }

    fn poll(&self, index: usize) -> Option<QuizPoll> {
        let question = self.quiz.question(index)?;
        Some(QuizPoll {
            question: index,
            text: question.text().to_owned(),
            options: question.options().to_vec(),
            correct: question.correct(),
            is_anonymous: false,
        })
    }

    /// Records an answer to question `question`. `choice == None` means the
    /// participant retracted their vote.
    ///
    /// Answers to anything but the open question are [`Error::Stale`] and
    /// leave the session untouched. A participant's contribution to the
    /// score for one question is 1 exactly when their recorded answer is
    /// correct, however many times they answer.
    pub fn on_answer(
        &mut self,
        question: usize,
        participant: Participant,
        choice: Option<usize>,
    ) -> Result<AnswerOutcome> {
        if self.finished || question != self.current {
            return Err(Error::Stale);
        }
        let open = self.quiz.question(self.current).ok_or(Error::Stale)?;
        if choice.is_some_and(|c| c >= open.options().len()) {
            return Err(Error::Stale);
        }

        let previous = self.answers.get(&participant.id).map(|a| a.choice);
        // Nothing to retract, and a participant who never answered stays out of the tally.
        if previous.is_none() && choice.is_none() {
            return Ok(AnswerOutcome::Ignored);
        }
        if self.policy == AnswerPolicy::FirstWriteWins && previous.is_some() {
            return Ok(AnswerOutcome::Ignored);
        }

        let was_correct = previous.is_some_and(|c| open.is_correct(c));
        let now_correct = choice.is_some_and(|c| open.is_correct(c));

        match choice {
            Some(choice) => {
                self.answers.insert(
                    participant.id,
                    RecordedAnswer {
                        choice,
                        at: SystemTime::now(),
                    },
                );
            }
            None => {
                self.answers.remove(&participant.id);
            }
        }

        let joined = self.tallies.len();
        let tally = self.tallies.entry(participant.id).or_insert_with(|| Tally {
            name: participant.name.clone(),
            score: 0,
            joined,
        });
        tally.name = participant.name;
        match (was_correct, now_correct) {
            (false, true) => tally.score += 1,
            (true, false) => tally.score -= 1,
            _ => {}
        }

        Ok(match choice {
            Some(_) => AnswerOutcome::Recorded {
                correct: now_correct,
            },
            None => AnswerOutcome::Retracted,
        })
    }

    /// Closes the open question and moves on. Participants who never
    /// answered it simply get no credit.
    pub fn advance(&mut self) -> Result<Advance> {
        if self.finished {
            return Err(Error::Stale);
        }

        self.answers.clear();
        self.current += 1;
        match self.poll(self.current) {
            Some(poll) => Ok(Advance::Next(poll)),
            None => Ok(Advance::Finished(self.finish())),
        }
    }

    /// Ends the run where it stands.
    pub fn finish(&mut self) -> Summary {
        self.finished = true;
        self.answers.clear();
        self.summary()
    }

    pub fn summary(&self) -> Summary {
        let mut ranked: Vec<_> = self.tallies.iter().collect();
        ranked.sort_by(|(a_id, a), (b_id, b)| {
            b.score
                .cmp(&a.score)
                .then(a.joined.cmp(&b.joined))
                .then(a_id.0.cmp(&b_id.0))
        });

        Summary {
            title: self.quiz.title().to_owned(),
            total: self.quiz.len(),
            standings: ranked
                .into_iter()
                .map(|(id, tally)| Standing {
                    user: *id,
                    name: tally.name.clone(),
                    score: tally.score,
                })
                .collect(),
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "🏁 {} is over!", self.title)?;
        if self.standings.is_empty() {
            return write!(f, "Nobody answered this time.");
        }
        for (place, standing) in self.standings.iter().enumerate() {
            write!(
                f,
                "\n{}. {}: {}/{}",
                place + 1,
                standing.name,
                standing.score,
                self.total
            )?;
        }
        Ok(())
    }
}
