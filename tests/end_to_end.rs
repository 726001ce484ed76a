use std::sync::Arc;

use quiz_builder_bot::{
    dispatch::{Command, Event, Outbound, PollTag, Router},
    quiz::{
        builder::{PollKind, PollSubmission},
        runner::{AnswerPolicy, Participant},
    },
    session::{Session, SessionStore},
};
use teloxide::types::{ChatId, UserId};

const AUTHOR: UserId = UserId(42);
const DM: ChatId = ChatId(42);
const GROUP: ChatId = ChatId(-1001);
const PLAYER: UserId = UserId(7);

fn command(command: Command, chat: ChatId) -> Event {
    Event::Command {
        command,
        user: AUTHOR,
        chat,
    }
}

fn quiz_poll(question: &str, correct: usize) -> Event {
    Event::QuizPoll {
        user: AUTHOR,
        chat: DM,
        poll: PollSubmission {
            question: question.to_owned(),
            options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            correct: Some(correct),
            kind: PollKind::Quiz,
        },
    }
}

fn answer(poll: &str, choice: usize) -> Event {
    Event::PollAnswer {
        participant: Participant {
            id: PLAYER,
            name: "Player".into(),
        },
        poll: poll.to_owned(),
        choice: Some(choice),
    }
}

/// Pulls the single quiz poll out of a batch and binds it the way delivery
/// would once Telegram returned its id.
async fn bind_single_poll(router: &Router, out: &[Outbound], poll_id: &str) -> (String, PollTag) {
    let polls: Vec<_> = out
        .iter()
        .filter_map(|o| match o {
            Outbound::QuizPoll { poll, tag, .. } => Some((poll.text.clone(), *tag)),
            _ => None,
        })
        .collect();
    assert_eq!(polls.len(), 1, "expected exactly one poll in {out:?}");
    let (text, tag) = polls[0].clone();
    assert!(router.bind_poll(poll_id.to_owned(), tag).await);
    (text, tag)
}

async fn player_score(router: &Router) -> u32 {
    match router.store().get(AUTHOR).await {
        Some(Session::Run(run)) => run.score(PLAYER),
        other => panic!("expected a running quiz, got {other:?}"),
    }
}

#[tokio::test]
async fn build_and_run_bio_quiz() {
    let router = Router::new(Arc::new(SessionStore::new()), AnswerPolicy::default());

    router.handle(command(Command::Create, DM)).await;
    router
        .handle(Event::Text {
            user: AUTHOR,
            chat: DM,
            text: "Bio".into(),
        })
        .await;
    router.handle(command(Command::Skip, DM)).await;
    router.handle(quiz_poll("Q1", 0)).await;
    router.handle(quiz_poll("Q2", 2)).await;
    router.handle(command(Command::Done, DM)).await;

    let quiz = router.store().shelved(AUTHOR).expect("quiz was finalized");
    let texts: Vec<_> = quiz.questions().iter().map(|q| q.text()).collect();
    assert_eq!(texts, ["Q1", "Q2"]);
    assert_eq!(quiz.description(), None);

    let out = router.handle(command(Command::StartQuiz, GROUP)).await;
    let (text, _) = bind_single_poll(&router, &out, "poll-1").await;
    assert_eq!(text, "Q1");

    router.handle(answer("poll-1", 0)).await;
    assert_eq!(player_score(&router).await, 1);

    let out = router.handle(command(Command::Next, DM)).await;
    let (text, _) = bind_single_poll(&router, &out, "poll-2").await;
    assert_eq!(text, "Q2");

    router.handle(answer("poll-2", 1)).await;
    assert_eq!(player_score(&router).await, 1);

    let out = router.handle(command(Command::Next, DM)).await;
    let summary = match out.as_slice() {
        [Outbound::Summary { chat, summary }] => {
            assert_eq!(*chat, GROUP);
            summary.clone()
        }
        other => panic!("expected a summary, got {other:?}"),
    };
    assert_eq!(summary.title, "Bio");
    assert_eq!(summary.total, 2);
    assert_eq!(summary.standings.len(), 1);
    assert_eq!(summary.standings[0].user, PLAYER);
    assert_eq!(summary.standings[0].score, 1);
    assert!(summary.to_string().contains("Player: 1/2"));

    assert!(router.store().get(AUTHOR).await.is_none());

    // Late answers after the run ended are dropped quietly.
    assert!(router.handle(answer("poll-2", 2)).await.is_empty());
    assert!(router.handle(answer("poll-1", 0)).await.is_empty());
}

#[tokio::test]
async fn quiz_can_be_run_again() {
    let router = Router::new(Arc::new(SessionStore::new()), AnswerPolicy::default());

    router.handle(command(Command::Create, DM)).await;
    router
        .handle(Event::Text {
            user: AUTHOR,
            chat: DM,
            text: "Once more".into(),
        })
        .await;
    router.handle(command(Command::Skip, DM)).await;
    router.handle(quiz_poll("Only", 3)).await;
    router.handle(command(Command::Done, DM)).await;

    for round in 0..2 {
        let out = router.handle(command(Command::StartQuiz, GROUP)).await;
        let poll_id = format!("round-{round}");
        bind_single_poll(&router, &out, &poll_id).await;
        router.handle(answer(&poll_id, 3)).await;

        let out = router.handle(command(Command::Next, DM)).await;
        match out.as_slice() {
            [Outbound::Summary { summary, .. }] => assert_eq!(summary.standings[0].score, 1),
            other => panic!("expected a summary, got {other:?}"),
        }
    }
}
