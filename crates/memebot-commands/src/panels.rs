//! `/dokaku`: the text-only three-panel variant.
//!
//! Each panel is generated on its own from a fixed prompt. A panel is kept
//! once the service returns a decodable, non-empty image; otherwise it is
//! drawn again, up to `meme.panel_attempts` times. The three panels are
//! letterboxed into the template canvas, framed and sent as one page.

use std::sync::Arc;
use std::time::Duration;

use ab_glyph::FontArc;
use async_trait::async_trait;
use image::GrayImage;
use tracing::{debug, info};

use memebot_core::{AdapterError, BoxedImageGenerator, ConfigError, GenerationRequest, Response};
use memebot_framework::{
    CancellationToken, Handler, HandlerContext, HandlerError, HandlerOptions, HandlerResult,
    ParsedCommand, RetryPolicy, generate_async,
};

use crate::compose::{ComposeError, assemble_panels, decode_gray, encode_jpeg, fit_within};
use crate::meme::MemeConfig;
use crate::template::{DOKAKU_BUBBLES, DOKAKU_PROMPTS, PanelLayout, caption};

pub const DESCRIPTION: &str = "纯文字三格漫画";
pub const RENDERING: &str = "开始AI渲染（约数秒）…";
pub const FILE_NAME: &str = "dokaku.jpg";

/// Longest side of the page that is sent.
const MAX_SIDE: u32 = 1600;

#[derive(Debug)]
enum PanelError {
    Adapter(AdapterError),
    Undecodable(ComposeError),
    Cancelled,
}

/// `/dokaku`
pub struct PanelsHandler {
    generator: BoxedImageGenerator,
    attempts: u32,
    backoff: RetryPolicy,
    deadline: Duration,
    font: Option<FontArc>,
}

impl PanelsHandler {
    pub fn new(
        generator: BoxedImageGenerator,
        config: &MemeConfig,
        backoff: RetryPolicy,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        backoff.validate()?;
        Ok(Self {
            generator,
            attempts: config.panel_attempts,
            backoff,
            deadline: config.deadline(),
            font: config.load_font(),
        })
    }

    async fn draw_panel(
        &self,
        index: usize,
        prompt: &str,
        size: (u32, u32),
        cancel: &CancellationToken,
    ) -> HandlerResult<GrayImage> {
        let outcome = generate_async(
            self.attempts,
            |attempt| {
                let generator = Arc::clone(&self.generator);
                let request = GenerationRequest::new(prompt, format!("{}x{}", size.0, size.1));
                let delay = self.backoff.delay_after(attempt - 1);
                let cancel = cancel.clone();
                async move {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(PanelError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    let image = generator.invoke(request).await.map_err(PanelError::Adapter)?;
                    decode_gray(&image.data).map_err(PanelError::Undecodable)
                }
            },
            |result| result.is_ok(),
        )
        .await?;

        debug!(panel = index, attempts = outcome.attempts(), "Panel drawn");
        match outcome.into_value() {
            Ok(panel) => Ok(panel),
            Err(PanelError::Adapter(e)) => Err(e.into()),
            Err(PanelError::Undecodable(e)) => Err(HandlerError::internal(format!(
                "panel {index} is not an image: {e}"
            ))),
            Err(PanelError::Cancelled) => Err(HandlerError::Cancelled),
        }
    }
}

#[async_trait]
impl Handler for PanelsHandler {
    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn options(&self) -> HandlerOptions {
        HandlerOptions::new()
            .serialized()
            .idempotent()
            .with_deadline(self.deadline)
    }

    async fn execute(&self, ctx: &HandlerContext, _command: ParsedCommand) -> HandlerResult<Response> {
        ctx.notify(RENDERING).await;

        let layout = PanelLayout::DOKAKU;
        let sizes = [layout.top, layout.bottom, layout.bottom];
        let mut panels = Vec::with_capacity(3);
        for (index, (prompt, size)) in DOKAKU_PROMPTS.iter().zip(sizes).enumerate() {
            panels.push(self.draw_panel(index, prompt, size, ctx.cancellation()).await?);
        }
        let panels: [GrayImage; 3] = panels
            .try_into()
            .map_err(|_| HandlerError::internal("expected three panels"))?;

        let font = self.font.clone();
        let lettered = font.is_some();
        let page = tokio::task::spawn_blocking(move || {
            let page = assemble_panels(&panels, &layout, &DOKAKU_BUBBLES, font.as_ref());
            encode_jpeg(&fit_within(page, MAX_SIDE), 88)
        })
        .await
        .map_err(|e| HandlerError::internal(format!("compose task failed: {e}")))?
        .map_err(|e| HandlerError::internal(e.to_string()))?;

        info!(bytes = page.len(), "Panels rendered");
        Ok(Response::photo(page, FILE_NAME).with_caption(caption(lettered)))
    }

    fn apology(&self, error: &HandlerError) -> Option<String> {
        let stage = match error {
            HandlerError::Adapter(_) => "generate",
            HandlerError::Internal(_) => "compose",
            _ => return None,
        };
        Some(format!("吃大份去吧. \n渲染出错：{stage}"))
    }
}

impl std::fmt::Debug for PanelsHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanelsHandler")
            .field("attempts", &self.attempts)
            .field("deadline", &self.deadline)
            .field("lettered", &self.font.is_some())
            .finish_non_exhaustive()
    }
}
