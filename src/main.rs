use std::sync::Arc;

use log::{error, info, warn};
use quiz_builder_bot::{
    config::Config,
    delivery::{Courier, DeliveryFailure},
    dispatch::{Command, Event, Router},
    quiz::{
        builder::{PollKind, PollSubmission},
        runner::Participant,
    },
    session::SessionStore,
};
use teloxide::{
    prelude::*,
    types::{PollAnswer, PollType},
    utils::command::BotCommands,
};
use tokio::sync::mpsc;

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
enum BotCommand {
    #[command(description = "show the welcome message")]
    Start,
    #[command(description = "show this text")]
    Help,
    #[command(description = "build a new quiz")]
    Create,
    #[command(description = "leave the quiz description empty")]
    Skip,
    #[command(description = "finish adding questions")]
    Done,
    #[command(description = "run your latest quiz in this chat")]
    StartQuiz,
    #[command(description = "close the current question and post the next one")]
    Next,
    #[command(description = "stop building or running a quiz")]
    Cancel,
}

impl From<BotCommand> for Command {
    fn from(command: BotCommand) -> Self {
        match command {
            BotCommand::Start => Command::Start,
            BotCommand::Help => Command::Help,
            BotCommand::Create => Command::Create,
            BotCommand::Skip => Command::Skip,
            BotCommand::Done => Command::Done,
            BotCommand::StartQuiz => Command::StartQuiz,
            BotCommand::Next => Command::Next,
            BotCommand::Cancel => Command::Cancel,
        }
    }
}

#[tokio::main]
async fn main() {
    pretty_env_logger::init();
    info!("Starting quiz builder bot...");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("{}", err);
            std::process::exit(1);
        }
    };
    match config.question_timeout {
        Some(timeout) => info!("Questions close after {}s", timeout.as_secs()),
        None => info!("Question timer disabled, runs advance with /next"),
    }
    info!("Duplicate answers: {:?}", config.answer_policy);

    let bot = Bot::new(config.bot_token.clone());
    if let Err(err) = bot.set_my_commands(BotCommand::bot_commands()).await {
        warn!("Could not register the command list: {}", err);
    }

    let router = Arc::new(Router::new(
        Arc::new(SessionStore::new()),
        config.answer_policy,
    ));

    let (failures, mut failed) = mpsc::unbounded_channel::<DeliveryFailure>();
    tokio::spawn(async move {
        while let Some(failure) = failed.recv().await {
            error!("Delivery to chat {} failed: {}", failure.chat, failure.error);
        }
    });
    let courier = Courier::new(
        bot.clone(),
        Arc::clone(&router),
        config.question_timeout,
        failures,
    );

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .branch(dptree::entry().filter_command::<BotCommand>().endpoint(on_command))
                .branch(dptree::filter(|msg: Message| msg.poll().is_some()).endpoint(on_poll))
                .branch(
                    // Unknown commands are not dialogue input.
                    dptree::filter(|msg: Message| msg.text().is_some_and(|t| !t.starts_with('/')))
                        .endpoint(on_text),
                ),
        )
        .branch(Update::filter_poll_answer().endpoint(on_poll_answer));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![router, courier])
        .error_handler(LoggingErrorHandler::with_custom_text(
            "An error has occurred in the dispatcher",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn on_command(
    router: Arc<Router>,
    courier: Courier,
    msg: Message,
    command: BotCommand,
) -> HandlerResult {
    let Some(user) = msg.from() else {
        return Ok(());
    };

    let event = Event::Command {
        command: command.into(),
        user: user.id,
        chat: msg.chat.id,
    };
    courier.deliver(router.handle(event).await);
    Ok(())
}

async fn on_text(router: Arc<Router>, courier: Courier, msg: Message) -> HandlerResult {
    let (Some(user), Some(text)) = (msg.from(), msg.text()) else {
        return Ok(());
    };

    let event = Event::Text {
        user: user.id,
        chat: msg.chat.id,
        text: text.to_owned(),
    };
    courier.deliver(router.handle(event).await);
    Ok(())
}

async fn on_poll(router: Arc<Router>, courier: Courier, msg: Message) -> HandlerResult {
    let (Some(user), Some(poll)) = (msg.from(), msg.poll()) else {
        return Ok(());
    };

    let submission = PollSubmission {
        question: poll.question.clone(),
        options: poll.options.iter().map(|o| o.text.clone()).collect(),
        correct: poll.correct_option_id.map(usize::from),
        kind: match poll.poll_type {
            PollType::Quiz => PollKind::Quiz,
            _ => PollKind::Regular,
        },
    };
    let event = Event::QuizPoll {
        user: user.id,
        chat: msg.chat.id,
        poll: submission,
    };
    courier.deliver(router.handle(event).await);
    Ok(())
}

async fn on_poll_answer(router: Arc<Router>, courier: Courier, answer: PollAnswer) -> HandlerResult {
    let choice = answer
        .option_ids
        .first()
        .and_then(|&id| usize::try_from(id).ok());

    let event = Event::PollAnswer {
        participant: Participant {
            id: answer.user.id,
            name: answer.user.full_name(),
        },
        poll: answer.poll_id,
        choice,
    };
    courier.deliver(router.handle(event).await);
    Ok(())
}
