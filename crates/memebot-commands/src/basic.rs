//! `/start`, `/help` and `/cancel`.

use async_trait::async_trait;

use memebot_core::Response;
use memebot_framework::{
    CommandInfo, Handler, HandlerContext, HandlerResult, ParsedCommand, handler_fn,
};

pub const GREETING: &str = "发 /fortune 来抽今日运势（当日保留；若 <10 可重抽一次）。";
pub const CANCELLED: &str = "已取消. 吃大份去吧.";
pub const NOTHING_TO_CANCEL: &str = "当前没有进行中的操作。";

/// `/start`
pub fn start() -> impl Handler {
    handler_fn("开始使用", |_update, _command| async {
        Ok(Response::text(GREETING))
    })
}

/// `/help`, listing the commands registered before it.
#[derive(Debug)]
pub struct HelpHandler {
    text: String,
}

impl HelpHandler {
    pub fn new(commands: &[CommandInfo]) -> Self {
        let mut text = String::from("可用命令：");
        for command in commands {
            text.push_str(&format!("\n/{}", command.token));
            if !command.description.is_empty() {
                text.push_str(&format!(" - {}", command.description));
            }
            if !command.available {
                text.push_str("（暂不可用）");
            }
        }
        text.push_str("\n/help - 查看可用命令");
        Self { text }
    }
}

#[async_trait]
impl Handler for HelpHandler {
    fn description(&self) -> &str {
        "查看可用命令"
    }

    async fn execute(&self, _ctx: &HandlerContext, _command: ParsedCommand) -> HandlerResult<Response> {
        Ok(Response::text(&self.text))
    }
}

/// `/cancel` releases whatever conversation holds the chat.
#[derive(Debug, Default)]
pub struct CancelHandler;

#[async_trait]
impl Handler for CancelHandler {
    fn description(&self) -> &str {
        "退出进行中的操作"
    }

    async fn execute(&self, ctx: &HandlerContext, _command: ParsedCommand) -> HandlerResult<Response> {
        let text = if ctx.end_conversation() {
            CANCELLED
        } else {
            NOTHING_TO_CANCEL
        };
        Ok(Response::text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use memebot_core::{ChatId, RecordingDelivery, Sender, SequenceMarker, Update, UserId};
    use memebot_framework::{Dispatcher, RegistryBuilder};

    fn text(seq: u64, body: &str) -> Update {
        Update::new(SequenceMarker(seq), ChatId(1), Sender::new(UserId(1), "u")).with_text(body)
    }

    #[test]
    fn test_help_marks_unavailable() {
        let help = HelpHandler::new(&[
            CommandInfo {
                token: "fortune".into(),
                description: "抽今日运势".into(),
                available: true,
            },
            CommandInfo {
                token: "dongzhuo".into(),
                description: "董卓表情包".into(),
                available: false,
            },
        ]);
        assert_eq!(
            help.text,
            "可用命令：\n/fortune - 抽今日运势\n/dongzhuo - 董卓表情包（暂不可用）\n/help - 查看可用命令"
        );
    }

    #[tokio::test]
    async fn test_start_and_cancel() {
        let mut builder = RegistryBuilder::new();
        builder.register("start", start()).unwrap();
        builder.register("cancel", CancelHandler).unwrap();
        let delivery = Arc::new(RecordingDelivery::new());
        let dispatcher = Dispatcher::new(builder.build(), delivery.clone());

        dispatcher.dispatch(text(1, "/start")).await;
        dispatcher.dispatch(text(2, "/cancel")).await;
        dispatcher
            .conversations()
            .begin(ChatId(1), UserId(1), "dongzhuo", Vec::new())
            .unwrap();
        dispatcher.dispatch(text(3, "/cancel")).await;

        assert_eq!(
            delivery.texts_for(ChatId(1)),
            vec![GREETING, NOTHING_TO_CANCEL, CANCELLED]
        );
        assert!(dispatcher.conversations().get(ChatId(1)).is_none());
    }
}
