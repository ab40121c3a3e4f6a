//! `/dongzhuo`: a three-panel meme of two characters.
//!
//! The command is a short conversation. The first photo is character A
//! (吕布), the second character B (董卓); either may already be attached to
//! the command message. Once both are in, the [`MemeJob`] runs through the
//! pipeline in [`stages`] and the finished page is sent back.
//!
//! The `meme` config section:
//!
//! ```toml
//! [meme]
//! size = ""            # empty uses image_api.size
//! deadline_secs = 300
//! panel_attempts = 3   # /dokaku draws per panel
//! font_path = "assets/fonts/NotoSansSC-Regular.ttf"
//! ```
//!
//! The font letters the speech bubbles. When it is unset or cannot be loaded
//! the bubbles stay blank and the dialogue goes into the caption instead.

pub mod stages;

use std::path::Path;
use std::time::Duration;

use ab_glyph::FontArc;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use memebot_core::{
    Attachment, BoxedFetcher, BoxedImageGenerator, ConfigError, Response, Update,
};
use memebot_framework::{
    Handler, HandlerContext, HandlerError, HandlerOptions, HandlerResult, ParsedCommand, Pipeline,
    PipelineError, RetryPolicy,
};

pub use stages::{MemeJob, ObjectStorage, meme_pipeline};

use crate::compose::load_font;
use crate::template::caption;

const COMPONENT: &str = "meme";

pub const DESCRIPTION: &str = "董卓表情包（需两张图片）";
pub const ASK_FOR_PHOTOS: &str = "350234已就位. 请提供[董卓]和[吕布]的图片. \n请先提供[吕布]的图片.\n请最好截图为该人物的半身像, 否则大模型处理可能有点问题. \n随时可 /cancel 退出.";
pub const FIRST_RECEIVED: &str = "已收到[吕布]. 请发送[董卓]图片.";
pub const NEED_FIRST_PHOTO: &str = "请提供吕布的[图片]. \n随时可 /cancel 退出。";
pub const NEED_SECOND_PHOTO: &str = "还差董卓的[图片]. \n随时可 /cancel 退出。";
pub const RENDERING: &str = "往日种种, 你说的可是往日...(合成中)";
pub const FILE_NAME: &str = "dongzhuo_final.jpg";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemeConfig {
    /// Generated page size; empty uses the image API's configured size.
    pub size: String,
    /// Deadline for one meme command, in seconds.
    pub deadline_secs: u64,
    /// `/dokaku` attempts per panel.
    pub panel_attempts: u32,
    /// Font for the bubble text; empty leaves the bubbles blank.
    pub font_path: String,
}

impl Default for MemeConfig {
    fn default() -> Self {
        Self {
            size: String::new(),
            deadline_secs: 300,
            panel_attempts: 3,
            font_path: "assets/fonts/NotoSansSC-Regular.ttf".into(),
        }
    }
}

impl MemeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.deadline_secs == 0 {
            return Err(ConfigError::new(COMPONENT, "deadline_secs must be greater than 0"));
        }
        if self.panel_attempts < 1 {
            return Err(ConfigError::new(COMPONENT, "panel_attempts must be at least 1"));
        }
        Ok(())
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    /// The bubble font, or `None` if it is unset or unusable.
    pub fn load_font(&self) -> Option<FontArc> {
        if self.font_path.is_empty() {
            return None;
        }
        match load_font(Path::new(&self.font_path)) {
            Ok(font) => {
                info!(path = %self.font_path, "Bubble font loaded");
                Some(font)
            }
            Err(e) => {
                warn!(path = %self.font_path, error = %e, "Bubble font unavailable, dialogue goes into the caption");
                None
            }
        }
    }
}

/// `true` for an update that carries a slash command, as opposed to a photo
/// or plain text continuing a conversation.
pub(crate) fn is_command(update: &Update) -> bool {
    update
        .text()
        .is_some_and(|text| text.trim_start().starts_with('/'))
}

/// `/dongzhuo`
pub struct MemeHandler {
    pipeline: Pipeline<MemeJob>,
    deadline: Duration,
    lettered: bool,
}

impl MemeHandler {
    pub fn new(
        fetcher: BoxedFetcher,
        storage: ObjectStorage,
        generator: BoxedImageGenerator,
        config: &MemeConfig,
        policy: RetryPolicy,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        policy.validate()?;
        let font = config.load_font();
        let lettered = font.is_some();
        Ok(Self {
            pipeline: meme_pipeline(fetcher, storage, generator, config.size.clone(), font, policy),
            deadline: config.deadline(),
            lettered,
        })
    }

    async fn render(&self, ctx: &HandlerContext, sources: Vec<Attachment>) -> HandlerResult<Response> {
        ctx.notify(RENDERING).await;

        let job = self.pipeline.run(MemeJob::new(sources), ctx.cancellation()).await?;
        let rendered = job
            .rendered
            .ok_or_else(|| HandlerError::internal("pipeline finished without an image"))?;
        info!(bytes = rendered.len(), "Meme rendered");
        Ok(Response::photo(rendered, FILE_NAME).with_caption(caption(self.lettered)))
    }
}

#[async_trait]
impl Handler for MemeHandler {
    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn options(&self) -> HandlerOptions {
        HandlerOptions::new()
            .serialized()
            .idempotent()
            .with_deadline(self.deadline)
    }

    async fn execute(&self, ctx: &HandlerContext, command: ParsedCommand) -> HandlerResult<Response> {
        let photos = command.attachments;
        if is_command(ctx.update()) {
            ctx.begin_conversation(photos.clone()).map_err(|busy| {
                HandlerError::validation(format!("本群正在进行 /{}，请稍后再试。", busy.token))
            })?;
        } else if ctx.update().attachments().is_empty() {
            // Text from the holder; the conversation is unchanged.
            let prompt = if photos.is_empty() {
                NEED_FIRST_PHOTO
            } else {
                NEED_SECOND_PHOTO
            };
            return Ok(Response::text(prompt));
        }

        match photos.len() {
            0 => Ok(Response::text(ASK_FOR_PHOTOS)),
            1 => Ok(Response::text(FIRST_RECEIVED)),
            _ => {
                // The pipeline owns the photos now; later ones start over.
                ctx.end_conversation();
                self.render(ctx, photos.into_iter().take(2).collect()).await
            }
        }
    }

    fn apology(&self, error: &HandlerError) -> Option<String> {
        match error {
            HandlerError::Pipeline(PipelineError::StageFailed { stage, .. }) => {
                Some(format!("吃大份去吧. \n渲染出错：{stage}"))
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for MemeHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemeHandler")
            .field("stages", &self.pipeline.stage_names())
            .field("deadline", &self.deadline)
            .field("lettered", &self.lettered)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use bytes::Bytes;
    use memebot_core::{
        ChatId, RecordingDelivery, Reply, Sender, SequenceMarker, UserId,
    };
    use memebot_framework::{DispatchOutcome, Dispatcher, RegistryBuilder};

    use crate::compose::decode_gray;
    use crate::template::CAPTION;
    use crate::testing::{FakeFetcher, FakeGenerator, FakeStore};

    const CHAT: ChatId = ChatId(9);

    struct Harness {
        dispatcher: Dispatcher,
        delivery: Arc<RecordingDelivery>,
        store: Arc<FakeStore>,
        generator: Arc<FakeGenerator>,
    }

    fn harness(generator: FakeGenerator) -> Harness {
        let store = Arc::new(FakeStore::new());
        let generator = Arc::new(generator);
        let handler = MemeHandler::new(
            Arc::new(FakeFetcher),
            ObjectStorage {
                store: store.clone(),
                key_prefix: "dongzhuo".into(),
            },
            generator.clone(),
            &MemeConfig::default(),
            RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(1)),
        )
        .unwrap();

        let mut builder = RegistryBuilder::new();
        builder.register("dongzhuo", handler).unwrap();
        let delivery = Arc::new(RecordingDelivery::new());
        Harness {
            dispatcher: Dispatcher::new(builder.build(), delivery.clone()),
            delivery,
            store,
            generator,
        }
    }

    fn from(seq: u64, user: i64) -> Update {
        Update::new(SequenceMarker(seq), CHAT, Sender::new(UserId(user), "u"))
    }

    fn photos(delivery: &RecordingDelivery) -> Vec<memebot_core::Photo> {
        delivery
            .sent()
            .into_iter()
            .flat_map(|(_, response)| response.replies)
            .filter_map(|reply| match reply {
                Reply::Photo(photo) => Some(photo),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_conversation_renders_meme() {
        let h = harness(FakeGenerator::new());

        h.dispatcher.dispatch(from(1, 1).with_text("/dongzhuo")).await;
        h.dispatcher
            .dispatch(from(2, 1).with_attachment(Attachment::photo("lvbu")))
            .await;
        let outcome = h
            .dispatcher
            .dispatch(from(3, 1).with_attachment(Attachment::photo("dongzhuo")))
            .await;

        assert_eq!(outcome, DispatchOutcome::Completed);
        assert_eq!(
            h.delivery.texts_for(CHAT),
            vec![ASK_FOR_PHOTOS, FIRST_RECEIVED, RENDERING]
        );

        let sent = photos(&h.delivery);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].file_name, FILE_NAME);
        assert!(sent[0].caption.as_deref().unwrap().starts_with(CAPTION));
        assert_eq!(decode_gray(&sent[0].data).unwrap().dimensions(), (518, 518));

        assert_eq!(h.generator.requests()[0].reference_urls.len(), 2);
        assert_eq!(h.store.deletes(), h.store.puts());
        assert!(h.dispatcher.conversations().get(CHAT).is_none());
    }

    #[tokio::test]
    async fn test_failed_stage_is_named_in_apology() {
        let h = harness(FakeGenerator::failing_permanently());

        let update = from(1, 1)
            .with_text("/dongzhuo")
            .with_attachment(Attachment::photo("a"))
            .with_attachment(Attachment::photo("b"));
        let outcome = h.dispatcher.dispatch(update).await;

        assert_eq!(outcome, DispatchOutcome::Failed("pipeline"));
        assert_eq!(
            h.delivery.texts_for(CHAT),
            vec![RENDERING, "吃大份去吧. \n渲染出错：generate"]
        );
        assert_eq!(h.store.deletes(), h.store.puts());
        assert!(h.dispatcher.conversations().get(CHAT).is_none());
    }

    #[tokio::test]
    async fn test_transient_generation_failure_is_retried() {
        let h = harness(FakeGenerator::failing_transiently(1));

        let update = from(1, 1)
            .with_text("/dongzhuo")
            .with_attachment(Attachment::photo("a"))
            .with_attachment(Attachment::photo("b"));
        let outcome = h.dispatcher.dispatch(update).await;

        assert_eq!(outcome, DispatchOutcome::Completed);
        assert_eq!(h.generator.requests().len(), 2);
        assert_eq!(photos(&h.delivery).len(), 1);
    }

    #[tokio::test]
    async fn test_other_user_is_told_chat_is_busy() {
        let h = harness(FakeGenerator::new());

        h.dispatcher.dispatch(from(1, 1).with_text("/dongzhuo")).await;
        let outcome = h.dispatcher.dispatch(from(2, 2).with_text("/dongzhuo")).await;

        assert_eq!(outcome, DispatchOutcome::Failed("validation"));
        assert_eq!(
            h.delivery.texts_for(CHAT)[1],
            "本群正在进行 /dongzhuo，请稍后再试。"
        );
    }

    #[tokio::test]
    async fn test_redelivered_update_uploads_once() {
        let h = harness(FakeGenerator::new());
        let update = from(5, 1)
            .with_text("/dongzhuo")
            .with_attachment(Attachment::photo("a"))
            .with_attachment(Attachment::photo("b"));

        assert_eq!(
            h.dispatcher.dispatch(update.clone()).await,
            DispatchOutcome::Completed
        );
        assert_eq!(
            h.dispatcher.dispatch(update).await,
            DispatchOutcome::Duplicate
        );
        assert_eq!(h.store.puts().len(), 2);
        assert_eq!(h.generator.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_redelivered_photo_is_not_collected_twice() {
        let h = harness(FakeGenerator::new());
        let lvbu = from(2, 1).with_attachment(Attachment::photo("lvbu"));

        h.dispatcher.dispatch(from(1, 1).with_text("/dongzhuo")).await;
        assert_eq!(
            h.dispatcher.dispatch(lvbu.clone()).await,
            DispatchOutcome::Completed
        );
        assert_eq!(h.dispatcher.dispatch(lvbu).await, DispatchOutcome::Duplicate);

        let held = h.dispatcher.conversations().get(CHAT).unwrap();
        assert_eq!(held.attachments, vec![Attachment::photo("lvbu")]);

        let outcome = h
            .dispatcher
            .dispatch(from(3, 1).with_attachment(Attachment::photo("dongzhuo")))
            .await;
        assert_eq!(outcome, DispatchOutcome::Completed);
        assert_eq!(
            h.store.bodies(),
            vec![Bytes::from_static(b"lvbu"), Bytes::from_static(b"dongzhuo")]
        );
        assert_eq!(
            h.delivery.texts_for(CHAT),
            vec![ASK_FOR_PHOTOS, FIRST_RECEIVED, RENDERING]
        );
    }

    #[tokio::test]
    async fn test_text_during_conversation_asks_for_photo() {
        let h = harness(FakeGenerator::new());

        h.dispatcher.dispatch(from(1, 1).with_text("/dongzhuo")).await;
        h.dispatcher.dispatch(from(2, 1).with_text("hello?")).await;
        h.dispatcher
            .dispatch(from(3, 1).with_attachment(Attachment::photo("lvbu")))
            .await;
        h.dispatcher.dispatch(from(4, 1).with_text("and now?")).await;
        // Text from someone else is not part of the conversation.
        let outcome = h.dispatcher.dispatch(from(5, 2).with_text("hi")).await;

        assert_eq!(outcome, DispatchOutcome::Ignored);
        assert_eq!(
            h.delivery.texts_for(CHAT),
            vec![ASK_FOR_PHOTOS, NEED_FIRST_PHOTO, FIRST_RECEIVED, NEED_SECOND_PHOTO]
        );
        let held = h.dispatcher.conversations().get(CHAT).unwrap();
        assert_eq!(held.attachments.len(), 1);
        assert!(h.store.puts().is_empty());
    }

    #[test]
    fn test_unusable_font_leaves_bubbles_blank() {
        let unset = MemeConfig {
            font_path: String::new(),
            ..Default::default()
        };
        assert!(unset.load_font().is_none());

        let missing = MemeConfig {
            font_path: "/nonexistent/NotoSansSC-Regular.ttf".into(),
            ..Default::default()
        };
        assert!(missing.load_font().is_none());
        assert!(caption(false).contains("你…你可有何话说？"));
    }

    #[test]
    fn test_config_validation() {
        assert!(MemeConfig::default().validate().is_ok());
        let config = MemeConfig {
            panel_attempts: 0,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().component, "meme");
    }
}
