use std::sync::Arc;
use std::time::Duration;

use log::{debug, error};
use teloxide::prelude::*;
use teloxide::types::PollType;
use teloxide::RequestError;
use tokio::sync::mpsc;

use crate::dispatch::{Event, Outbound, PollTag, Router};

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Telegram request failed: {0}")]
    Request(#[from] RequestError),

    #[error("Telegram did not return the poll it created")]
    MissingPoll,

    #[error("value does not fit a Telegram poll: {0}")]
    OutOfRange(#[from] std::num::TryFromIntError),
}

#[derive(Debug)]
pub struct DeliveryFailure {
    pub chat: ChatId,
    pub error: DeliveryError,
}

/// Sends outbound instructions to Telegram without making the caller wait.
/// Batches go out one after another in the order they were queued, and
/// anything that fails to go out is reported on the failure channel.
#[derive(Clone)]
pub struct Courier {
    queue: mpsc::UnboundedSender<Vec<Outbound>>,
}

/// Owns the Telegram side of delivery. There is exactly one per [`Courier`].
struct Worker {
    bot: Bot,
    router: Arc<Router>,
    question_timeout: Option<Duration>,
    failures: mpsc::UnboundedSender<DeliveryFailure>,
    courier: Courier,
}

impl Courier {
    /// Spawns the delivery worker. Must be called inside a Tokio runtime.
    pub fn new(
        bot: Bot,
        router: Arc<Router>,
        question_timeout: Option<Duration>,
        failures: mpsc::UnboundedSender<DeliveryFailure>,
    ) -> Self {
        let (courier, batches) = Self::channel();
        let worker = Worker {
            bot,
            router,
            question_timeout,
            failures,
            courier: courier.clone(),
        };
        tokio::spawn(worker.run(batches));
        courier
    }

    fn channel() -> (Self, mpsc::UnboundedReceiver<Vec<Outbound>>) {
        let (queue, batches) = mpsc::unbounded_channel();
        (Self { queue }, batches)
    }

    /// Queues a batch for delivery behind everything queued before it.
    pub fn deliver(&self, batch: Vec<Outbound>) {
        if batch.is_empty() {
            return;
        }
        if let Err(mpsc::error::SendError(batch)) = self.queue.send(batch) {
            error!("Delivery worker is gone, dropping {} outbound", batch.len());
        }
    }
}

impl Worker {
    async fn run(self, mut batches: mpsc::UnboundedReceiver<Vec<Outbound>>) {
        while let Some(batch) = batches.recv().await {
            for outbound in batch {
                let chat = outbound.chat();
                if let Err(error) = self.send(outbound).await {
                    if let Err(mpsc::error::SendError(failure)) =
                        self.failures.send(DeliveryFailure { chat, error })
                    {
                        error!("Failure channel closed, dropping: {:?}", failure);
                    }
                }
            }
        }
        debug!("Delivery queue closed");
    }

    async fn send(&self, outbound: Outbound) -> Result<(), DeliveryError> {
        match outbound {
            Outbound::Text { chat, text } => {
                self.bot.send_message(chat, text).await?;
            }
            Outbound::Summary { chat, summary } => {
                self.bot.send_message(chat, summary.to_string()).await?;
            }
            Outbound::QuizPoll { chat, poll, tag } => {
                // The run may have moved on while this poll sat in the queue.
                if !self.router.is_open(tag).await {
                    debug!("Question {} of run {} closed before posting", tag.question, tag.run);
                    return Ok(());
                }

                let mut request = self
                    .bot
                    .send_poll(chat, poll.text, poll.options)
                    .type_(PollType::Quiz)
                    .correct_option_id(u8::try_from(poll.correct)?)
                    .is_anonymous(poll.is_anonymous);
                if let Some(timeout) = self.question_timeout {
                    request = request.open_period(u16::try_from(timeout.as_secs())?);
                }

                let message = request.await?;
                let posted = message.poll().ok_or(DeliveryError::MissingPoll)?;
                if self.router.bind_poll(posted.id.clone(), tag).await {
                    self.schedule_timeout(tag);
                }
            }
        }
        Ok(())
    }

    fn schedule_timeout(&self, tag: PollTag) {
        let Some(timeout) = self.question_timeout else {
            return;
        };

        let router = Arc::clone(&self.router);
        let courier = self.courier.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            debug!("Timer for question {} of run {} fired", tag.question, tag.run);
            courier.deliver(router.handle(Event::QuestionTimeout(tag)).await);
        });
    }
}
