//! Update handlers: routes bot commands into the media pipeline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::MessageId;
use teloxide::utils::command::BotCommands;
use tokio_util::sync::CancellationToken;

use crate::core::error::AppError;
use crate::download::delivery::Destination;
use crate::download::events::EventSink;
use crate::download::pipeline::MediaPipeline;
use crate::download::request::{CeilingPolicy, MediaKind, MediaRequest};
use crate::download::source::{MediaSource, SourceRegistry};
use crate::telegram::bot::{parse_media_args, Command, MediaArgs};
use crate::telegram::destination::TelegramDestination;
use crate::telegram::status::StatusView;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// One running download per chat, with its cancellation token.
#[derive(Debug, Clone, Default)]
pub struct ActiveJobs {
    jobs: Arc<Mutex<HashMap<ChatId, CancellationToken>>>,
}

impl ActiveJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a job for the chat. `None` while another one is still running.
    ///
    /// The chat is free again once the returned slot is dropped.
    pub fn try_start(&self, chat_id: ChatId) -> Option<JobSlot> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        if jobs.contains_key(&chat_id) {
            return None;
        }
        let token = CancellationToken::new();
        jobs.insert(chat_id, token.clone());
        Some(JobSlot {
            jobs: self.clone(),
            chat_id,
            token,
        })
    }

    fn finish(&self, chat_id: ChatId) {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).remove(&chat_id);
    }

    /// Signals the chat's running job. Returns false when there is none.
    pub fn cancel(&self, chat_id: ChatId) -> bool {
        match self.jobs.lock().unwrap_or_else(|e| e.into_inner()).get(&chat_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A chat's claim on running one job. Released on drop, including when the job panics.
#[derive(Debug)]
pub struct JobSlot {
    jobs: ActiveJobs,
    chat_id: ChatId,
    token: CancellationToken,
}

impl JobSlot {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for JobSlot {
    fn drop(&mut self) {
        self.jobs.finish(self.chat_id);
    }
}

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub pipeline: Arc<MediaPipeline>,
    pub registry: Arc<SourceRegistry>,
    pub policy: CeilingPolicy,
    pub jobs: ActiveJobs,
}

impl HandlerDeps {
    pub fn new(pipeline: MediaPipeline, registry: SourceRegistry) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            registry: Arc::new(registry),
            policy: CeilingPolicy::default(),
            jobs: ActiveJobs::new(),
        }
    }
}

/// Dispatcher schema: bot commands only, everything else is ignored.
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message().branch(dptree::entry().filter_command::<Command>().endpoint(
        move |bot: Bot, msg: Message, cmd: Command| {
            let deps = deps.clone();
            async move {
                log::info!("🎯 Received command: {:?} from chat {}", cmd, msg.chat.id);
                handle_command(bot, msg, cmd, deps).await
            }
        },
    ))
}

async fn handle_command(bot: Bot, msg: Message, cmd: Command, deps: HandlerDeps) -> Result<(), HandlerError> {
    let chat_id = msg.chat.id;

    match cmd.media_target() {
        Some((platform, kind, args)) => match parse_media_args(args, platform) {
            Ok(args) => start_media_job(&bot, chat_id, args, kind, &deps).await?,
            Err(e) => {
                bot.send_message(chat_id, format!("❌ {}", validation_text(&e))).await?;
            }
        },
        None => match cmd {
            Command::Cancel => {
                let text = if deps.jobs.cancel(chat_id) {
                    "⏹ Stopping the download…"
                } else {
                    "Nothing to cancel."
                };
                bot.send_message(chat_id, text).await?;
            }
            _ => {
                bot.send_message(chat_id, Command::descriptions().to_string()).await?;
            }
        },
    }

    Ok(())
}

fn validation_text(err: &AppError) -> String {
    match err {
        AppError::Validation(message) => message.clone(),
        other => other.to_string(),
    }
}

/// Platform commands use their own adapter; /audio has none and is routed by URL.
fn pick_source(registry: &SourceRegistry, args: &MediaArgs, kind: MediaKind) -> Option<Arc<dyn MediaSource>> {
    match kind {
        MediaKind::Video => registry.for_platform(args.platform),
        MediaKind::Audio => registry.resolve(&args.url),
    }
}

async fn start_media_job(
    bot: &Bot,
    chat_id: ChatId,
    args: MediaArgs,
    kind: MediaKind,
    deps: &HandlerDeps,
) -> Result<(), HandlerError> {
    let Some(source) = pick_source(&deps.registry, &args, kind) else {
        bot.send_message(chat_id, format!("❌ {} is not available right now.", args.platform))
            .await?;
        return Ok(());
    };

    let Some(slot) = deps.jobs.try_start(chat_id) else {
        bot.send_message(chat_id, "⏳ A download is already running here. Send /cancel to stop it.")
            .await?;
        return Ok(());
    };

    let status = bot.send_message(chat_id, "🔎 Looking up the link…").await?;

    let job = MediaJob {
        bot: bot.clone(),
        chat_id,
        status_id: status.id,
        source,
        args,
        kind,
        slot,
        deps: deps.clone(),
    };
    tokio::spawn(job.run());
    Ok(())
}

/// One download started from a chat command.
struct MediaJob {
    bot: Bot,
    chat_id: ChatId,
    status_id: MessageId,
    source: Arc<dyn MediaSource>,
    args: MediaArgs,
    kind: MediaKind,
    slot: JobSlot,
    deps: HandlerDeps,
}

impl MediaJob {
    async fn run(self) {
        let MediaJob {
            bot,
            chat_id,
            status_id,
            source,
            args,
            kind,
            slot,
            deps,
        } = self;

        let destination = TelegramDestination::new(bot.clone(), chat_id);
        let request = MediaRequest::for_channel(
            args.url,
            kind,
            args.tier,
            destination.max_payload_bytes(),
            &deps.policy,
        );
        log::info!(
            "[{}] chat {} asked for {} {} (platform {})",
            request.short_id(),
            chat_id,
            kind,
            request.url(),
            args.platform
        );

        let (events, mut rx) = EventSink::channel();
        let status_bot = bot.clone();
        let renderer = tokio::spawn(async move {
            let mut view = StatusView::new();
            while let Some(event) = rx.recv().await {
                if let Some(text) = view.apply(&event) {
                    if let Err(e) = status_bot.edit_message_text(chat_id, status_id, text).await {
                        log::debug!("Failed to update status message in chat {}: {}", chat_id, e);
                    }
                }
            }
        });

        let result = deps
            .pipeline
            .run(source.as_ref(), &destination, &request, slot.token(), &events)
            .await;
        drop(events);
        let _ = renderer.await;
        drop(slot);

        let final_text = match &result {
            Ok(report) => report.summary(),
            Err(e) => e.user_message(),
        };
        if let Err(e) = bot.edit_message_text(chat_id, status_id, final_text).await {
            log::warn!("Failed to post the result in chat {}: {}", chat_id, e);
        }
    }
}
