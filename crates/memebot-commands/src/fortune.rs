//! `/fortune` and its reroll button.
//!
//! Every user draws one fortune per local day. A draw below
//! [`REROLL_BELOW`] comes with a button that allows exactly one reroll.
//!
//! ```text
//! /fortune ──▶ FortuneStore::get(user, today)
//!                 ├── stored  → same text again
//!                 └── absent  → draw score → render → get_or_insert
//!
//! REROLL:{user}:{date} ──▶ owner? ──▶ record? ──▶ eligible? ──▶ edit message
//! ```
//!
//! The `fortune` config section:
//!
//! ```toml
//! [fortune]
//! max_attempts = 1        # draws per fortune, first one at or above the threshold wins
//! accept_threshold = 0
//! utc_offset_hours = 8    # when "today" starts
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use memebot_core::{Button, ConfigError, Response, UserId};
use memebot_framework::{
    Handler, HandlerContext, HandlerOptions, HandlerResult, ParsedCommand, generate,
};

const COMPONENT: &str = "fortune";

/// Scores below this may be rerolled once.
pub const REROLL_BELOW: u8 = 10;

pub const REROLL_LABEL: &str = "再抽一次（今日仅一次）";
pub const REROLL_USED_SUFFIX: &str = "\n（已使用今日重抽）";
pub const NOT_OWNER: &str = "只能本人重抽哦～";
pub const NO_RECORD: &str = "今天还没有抽过，先发 /fortune ～";
pub const NOT_ELIGIBLE: &str = "重抽次数已用完，或不满足条件（<10）。";
pub const INVALID_REQUEST: &str = "无效请求。";

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FortuneConfig {
    /// Draws per fortune; the first score at or above the threshold is kept.
    pub max_attempts: u32,
    pub accept_threshold: u8,
    /// Offset from UTC of the day boundary.
    pub utc_offset_hours: i32,
}

impl Default for FortuneConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            accept_threshold: 0,
            utc_offset_hours: 8,
        }
    }
}

impl FortuneConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts < 1 {
            return Err(ConfigError::new(COMPONENT, "max_attempts must be at least 1"));
        }
        if self.accept_threshold > 100 {
            return Err(ConfigError::new(COMPONENT, "accept_threshold must be at most 100"));
        }
        self.offset().map(|_| ())
    }

    pub fn offset(&self) -> Result<FixedOffset, ConfigError> {
        if !(-12..=14).contains(&self.utc_offset_hours) {
            return Err(ConfigError::new(
                COMPONENT,
                format!("utc_offset_hours {} is out of range", self.utc_offset_hours),
            ));
        }
        FixedOffset::east_opt(self.utc_offset_hours * 3600).ok_or_else(|| {
            ConfigError::new(COMPONENT, "utc_offset_hours is not a valid offset")
        })
    }
}

// =============================================================================
// Records
// =============================================================================

/// One user's fortune for one local date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FortuneRecord {
    pub user: UserId,
    pub date: NaiveDate,
    pub score: u8,
    pub text: String,
    pub rerolled: bool,
    pub created_at: DateTime<FixedOffset>,
}

impl FortuneRecord {
    pub fn can_reroll(&self) -> bool {
        self.score < REROLL_BELOW && !self.rerolled
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum RerollRefused {
    #[error("no fortune was drawn on that date")]
    NoRecord,
    #[error("the reroll was used or the score is too high")]
    NotEligible,
}

/// Persistence for fortune records, keyed by user and date.
pub trait FortuneStore: Send + Sync {
    fn get(&self, user: UserId, date: NaiveDate) -> Option<FortuneRecord>;

    /// Stores `record` unless the user already has one for that date, and
    /// returns whichever record is stored.
    fn get_or_insert(&self, record: FortuneRecord) -> FortuneRecord;

    /// Replaces an eligible record's score and text and marks it rerolled.
    fn reroll(
        &self,
        user: UserId,
        date: NaiveDate,
        score: u8,
        text: String,
    ) -> Result<FortuneRecord, RerollRefused>;
}

/// [`FortuneStore`] kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryFortuneStore {
    records: Mutex<HashMap<(UserId, NaiveDate), FortuneRecord>>,
}

impl MemoryFortuneStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl FortuneStore for MemoryFortuneStore {
    fn get(&self, user: UserId, date: NaiveDate) -> Option<FortuneRecord> {
        self.records.lock().get(&(user, date)).cloned()
    }

    fn get_or_insert(&self, record: FortuneRecord) -> FortuneRecord {
        self.records
            .lock()
            .entry((record.user, record.date))
            .or_insert(record)
            .clone()
    }

    fn reroll(
        &self,
        user: UserId,
        date: NaiveDate,
        score: u8,
        text: String,
    ) -> Result<FortuneRecord, RerollRefused> {
        let mut records = self.records.lock();
        let record = records
            .get_mut(&(user, date))
            .ok_or(RerollRefused::NoRecord)?;
        if !record.can_reroll() {
            return Err(RerollRefused::NotEligible);
        }
        record.score = score;
        record.text = text;
        record.rerolled = true;
        Ok(record.clone())
    }
}

// =============================================================================
// Scores
// =============================================================================

/// Source of randomness for draws.
pub trait ScoreSource: Send + Sync {
    /// A score in `0..=100`.
    fn score(&self) -> u8;

    /// An index in `0..len`. `len` is never zero.
    fn pick(&self, len: usize) -> usize;
}

/// [`ScoreSource`] backed by a [`StdRng`].
#[derive(Debug)]
pub struct RandomScores {
    rng: Mutex<StdRng>,
}

impl RandomScores {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible draws.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl ScoreSource for RandomScores {
    fn score(&self) -> u8 {
        self.rng.lock().gen_range(0..=100)
    }

    fn pick(&self, len: usize) -> usize {
        self.rng.lock().gen_range(0..len)
    }
}

// =============================================================================
// Tiers
// =============================================================================

const ADVICE_GOOD: [&str; 3] = [
    "宜：凹高分, 推ap! 下一个舞神就是你~",
    "宜：放松心态, 冲刺学业&事业.",
    "宜：放手一搏, 突破极限.",
];

const ADVICE_NEUTRAL: [&str; 3] = [
    "宜：多运动, 多放松",
    "忌：虚无缥缈为自己定大志向.",
    "吃顿好的吧, 平安即是喜乐.",
];

const ADVICE_BAD: [&str; 3] = [
    "人犟损才, 牛犟损力.",
    "放过自己，早点睡，明天会更好.",
    "如果可以的话, 做点没有意义的事情休息一下吧.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Great,
    Good,
    Fair,
    Poor,
    Dire,
}

impl Tier {
    pub fn from_score(score: u8) -> Self {
        match score {
            90.. => Self::Great,
            70..=89 => Self::Good,
            40..=69 => Self::Fair,
            10..=39 => Self::Poor,
            _ => Self::Dire,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Great => "🎉 大吉",
            Self::Good => "😊 吉",
            Self::Fair => "😐 平",
            Self::Poor => "🥲 凶",
            Self::Dire => "💀 大凶",
        }
    }

    /// Advice pool this tier draws from.
    pub fn advice(self) -> Vec<&'static str> {
        match self {
            Self::Great => ADVICE_GOOD.to_vec(),
            Self::Good => [ADVICE_GOOD, ADVICE_NEUTRAL].concat(),
            Self::Fair => ADVICE_NEUTRAL.to_vec(),
            Self::Poor => [ADVICE_NEUTRAL, ADVICE_BAD].concat(),
            Self::Dire => ADVICE_BAD.to_vec(),
        }
    }
}

/// Renders the message for `score`, picking advice from `scores`.
pub fn render_fortune(score: u8, scores: &dyn ScoreSource) -> String {
    let tier = Tier::from_score(score);
    let advice = tier.advice();
    let pick = scores.pick(advice.len()).min(advice.len() - 1);
    format!(
        "{}\n今天的幸运指数：{}/100\n{}",
        tier.label(),
        score,
        advice[pick]
    )
}

pub fn reroll_data(user: UserId, date: NaiveDate) -> String {
    format!("REROLL:{}:{}", user.0, date)
}

fn parse_reroll(arguments: &[String]) -> Option<(UserId, NaiveDate)> {
    let [user, date] = arguments else {
        return None;
    };
    let user = user.parse().ok().map(UserId)?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Some((user, date))
}

// =============================================================================
// Handlers
// =============================================================================

/// State shared by `/fortune` and the reroll button.
pub struct FortuneTeller {
    store: Arc<dyn FortuneStore>,
    scores: Arc<dyn ScoreSource>,
    config: FortuneConfig,
    offset: FixedOffset,
}

impl FortuneTeller {
    pub fn new(
        config: FortuneConfig,
        store: Arc<dyn FortuneStore>,
        scores: Arc<dyn ScoreSource>,
    ) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        let offset = config.offset()?;
        Ok(Arc::new(Self {
            store,
            scores,
            config,
            offset,
        }))
    }

    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }

    /// Draws a score through the bounded-retry generator.
    ///
    /// An exhausted draw still yields its last score.
    fn draw(&self) -> Result<u8, ConfigError> {
        let threshold = self.config.accept_threshold;
        let outcome = generate(
            self.config.max_attempts,
            || self.scores.score(),
            |score| *score >= threshold,
        )?;
        if !outcome.is_accepted() {
            debug!(
                attempts = outcome.attempts(),
                threshold, "No draw reached the threshold, keeping the last one"
            );
        }
        Ok(outcome.into_value())
    }

    fn render(&self, score: u8) -> String {
        render_fortune(score, self.scores.as_ref())
    }
}

impl std::fmt::Debug for FortuneTeller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FortuneTeller")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// `/fortune`
#[derive(Debug)]
pub struct FortuneHandler {
    teller: Arc<FortuneTeller>,
}

impl FortuneHandler {
    pub fn new(teller: Arc<FortuneTeller>) -> Self {
        Self { teller }
    }
}

#[async_trait]
impl Handler for FortuneHandler {
    fn description(&self) -> &str {
        "抽今日运势"
    }

    async fn execute(&self, ctx: &HandlerContext, _command: ParsedCommand) -> HandlerResult<Response> {
        let teller = &self.teller;
        let user = ctx.sender().id;
        let now = teller.now();
        let date = now.date_naive();

        let record = match teller.store.get(user, date) {
            Some(record) => record,
            None => {
                let score = teller.draw()?;
                let record = teller.store.get_or_insert(FortuneRecord {
                    user,
                    date,
                    score,
                    text: teller.render(score),
                    rerolled: false,
                    created_at: now,
                });
                info!(user = user.0, %date, score = record.score, "Fortune drawn");
                record
            }
        };

        let response = Response::text(&record.text);
        if record.can_reroll() {
            return Ok(response.with_button(Button::new(REROLL_LABEL, reroll_data(user, date))));
        }
        Ok(response)
    }
}

/// The reroll button, `REROLL:{user}:{date}`.
#[derive(Debug)]
pub struct RerollHandler {
    teller: Arc<FortuneTeller>,
}

impl RerollHandler {
    pub fn new(teller: Arc<FortuneTeller>) -> Self {
        Self { teller }
    }
}

#[async_trait]
impl Handler for RerollHandler {
    fn description(&self) -> &str {
        "重抽今日运势（按钮）"
    }

    fn options(&self) -> HandlerOptions {
        HandlerOptions::new().serialized().idempotent()
    }

    async fn execute(&self, ctx: &HandlerContext, command: ParsedCommand) -> HandlerResult<Response> {
        let Some(callback) = ctx.update().callback() else {
            return Ok(Response::text(INVALID_REQUEST));
        };
        // Answers go into the message that carried the button.
        let answer = |text: String| match callback.message_id {
            Some(message_id) => Response::empty().with_edit(message_id, text),
            None => Response::text(text),
        };

        let Some((owner, date)) = parse_reroll(&command.arguments) else {
            return Ok(answer(INVALID_REQUEST.to_string()));
        };
        if ctx.sender().id != owner {
            return Ok(Response::empty().with_callback_ack(&callback.id, Some(NOT_OWNER.to_string())));
        }

        match self.teller.store.get(owner, date) {
            None => return Ok(answer(NO_RECORD.to_string())),
            Some(record) if !record.can_reroll() => return Ok(answer(NOT_ELIGIBLE.to_string())),
            Some(_) => {}
        }

        let score = self.teller.draw()?;
        let text = self.teller.render(score);
        // The store re-checks eligibility under its own lock.
        match self.teller.store.reroll(owner, date, score, text) {
            Ok(record) => {
                info!(user = owner.0, %date, score, "Fortune rerolled");
                Ok(answer(format!("{}{}", record.text, REROLL_USED_SUFFIX)))
            }
            Err(RerollRefused::NoRecord) => Ok(answer(NO_RECORD.to_string())),
            Err(RerollRefused::NotEligible) => Ok(answer(NOT_ELIGIBLE.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use memebot_core::{
        CallbackAction, ChatId, RecordingDelivery, Reply, Sender, SequenceMarker, Update,
    };
    use memebot_framework::{DispatchOutcome, Dispatcher, RegistryBuilder};

    /// Replays scores in order; advice is always the first entry.
    struct Scripted(Mutex<VecDeque<u8>>);

    impl Scripted {
        fn new(scores: &[u8]) -> Arc<Self> {
            Arc::new(Self(Mutex::new(scores.iter().copied().collect())))
        }
    }

    impl ScoreSource for Scripted {
        fn score(&self) -> u8 {
            self.0.lock().pop_front().expect("no scripted score left")
        }

        fn pick(&self, _len: usize) -> usize {
            0
        }
    }

    const CHAT: ChatId = ChatId(42);

    fn setup(config: FortuneConfig, scores: &[u8]) -> (Dispatcher, Arc<RecordingDelivery>) {
        let store = Arc::new(MemoryFortuneStore::new());
        let teller = FortuneTeller::new(config, store, Scripted::new(scores)).unwrap();
        let mut builder = RegistryBuilder::new();
        builder
            .register("fortune", FortuneHandler::new(Arc::clone(&teller)))
            .unwrap();
        builder.register("reroll", RerollHandler::new(teller)).unwrap();

        let delivery = Arc::new(RecordingDelivery::new());
        (Dispatcher::new(builder.build(), delivery.clone()), delivery)
    }

    fn command(seq: u64, user: i64) -> Update {
        Update::new(SequenceMarker(seq), CHAT, Sender::new(UserId(user), "u")).with_text("/fortune")
    }

    fn press(seq: u64, user: i64, data: &str) -> Update {
        Update::new(SequenceMarker(seq), CHAT, Sender::new(UserId(user), "u")).with_callback(
            CallbackAction {
                id: format!("cb-{seq}"),
                data: data.to_string(),
                message_id: Some(77),
            },
        )
    }

    fn last_reply(delivery: &RecordingDelivery) -> Response {
        delivery.sent().pop().map(|(_, r)| r).unwrap()
    }

    fn button_data(response: &Response) -> Option<String> {
        match &response.replies[0] {
            Reply::Text { buttons, .. } => buttons.first().map(|b| b.data.clone()),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn test_tier_boundaries() {
        let labels: Vec<_> = [100, 90, 89, 70, 69, 40, 39, 10, 9, 0]
            .into_iter()
            .map(|s| Tier::from_score(s).label())
            .collect();
        assert_eq!(
            labels,
            vec![
                "🎉 大吉", "🎉 大吉", "😊 吉", "😊 吉", "😐 平", "😐 平", "🥲 凶", "🥲 凶",
                "💀 大凶", "💀 大凶"
            ]
        );
        assert_eq!(Tier::Good.advice().len(), 6);
        assert_eq!(Tier::Poor.advice()[3], ADVICE_BAD[0]);
    }

    #[test]
    fn test_render_format() {
        let text = render_fortune(95, Scripted::new(&[]).as_ref());
        assert_eq!(text, format!("🎉 大吉\n今天的幸运指数：95/100\n{}", ADVICE_GOOD[0]));
    }

    #[test]
    fn test_config_validation() {
        assert!(FortuneConfig::default().validate().is_ok());
        let zero = FortuneConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());
        let far_east = FortuneConfig {
            utc_offset_hours: 20,
            ..Default::default()
        };
        assert_eq!(far_east.validate().unwrap_err().component, "fortune");
    }

    #[test]
    fn test_seeded_scores_repeat() {
        let a = RandomScores::seeded(7);
        let b = RandomScores::seeded(7);
        let first: Vec<u8> = (0..5).map(|_| a.score()).collect();
        let second: Vec<u8> = (0..5).map(|_| b.score()).collect();
        assert_eq!(first, second);
        assert!(first.iter().all(|s| *s <= 100));
    }

    #[tokio::test]
    async fn test_same_day_returns_stored_fortune() {
        let (dispatcher, delivery) = setup(FortuneConfig::default(), &[55, 99]);

        dispatcher.dispatch(command(1, 1)).await;
        dispatcher.dispatch(command(2, 1)).await;

        let texts = delivery.texts_for(CHAT);
        assert_eq!(texts.len(), 2);
        assert_eq!(texts[0], texts[1]);
        assert!(texts[0].starts_with("😐 平\n今天的幸运指数：55/100"));
        assert_eq!(button_data(&last_reply(&delivery)), None);
    }

    #[tokio::test]
    async fn test_reroll_flow() {
        let (dispatcher, delivery) = setup(FortuneConfig::default(), &[3, 95, 40]);

        dispatcher.dispatch(command(1, 1)).await;
        let data = button_data(&last_reply(&delivery)).unwrap();
        assert!(data.starts_with("REROLL:1:"));
        assert!(delivery.texts_for(CHAT)[0].starts_with("💀 大凶"));

        // Somebody else pressing the button only gets a notice.
        dispatcher.dispatch(press(2, 2, &data)).await;
        let reply = last_reply(&delivery);
        assert!(reply.replies.is_empty());
        assert_eq!(reply.callback_ack.unwrap().text.as_deref(), Some(NOT_OWNER));

        dispatcher.dispatch(press(3, 1, &data)).await;
        match &last_reply(&delivery).replies[0] {
            Reply::Edit { message_id, text } => {
                assert_eq!(*message_id, 77);
                assert!(text.starts_with("🎉 大吉\n今天的幸运指数：95/100"));
                assert!(text.ends_with(REROLL_USED_SUFFIX));
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        dispatcher.dispatch(press(4, 1, &data)).await;
        assert_eq!(
            last_reply(&delivery).texts().collect::<Vec<_>>(),
            vec![NOT_ELIGIBLE]
        );

        // The stored record now reflects the reroll.
        dispatcher.dispatch(command(5, 1)).await;
        let text = delivery.texts_for(CHAT).pop().unwrap();
        assert!(text.starts_with("🎉 大吉"));
        assert_eq!(button_data(&last_reply(&delivery)), None);
    }

    #[tokio::test]
    async fn test_reroll_rejects_bad_requests() {
        let (dispatcher, delivery) = setup(FortuneConfig::default(), &[50]);

        dispatcher.dispatch(press(1, 1, "REROLL:x")).await;
        assert_eq!(
            last_reply(&delivery).texts().collect::<Vec<_>>(),
            vec![INVALID_REQUEST]
        );

        dispatcher.dispatch(press(2, 1, "REROLL:1:2001-01-01")).await;
        assert_eq!(
            last_reply(&delivery).texts().collect::<Vec<_>>(),
            vec![NO_RECORD]
        );
    }

    #[tokio::test]
    async fn test_redelivered_press_is_suppressed() {
        let (dispatcher, delivery) = setup(FortuneConfig::default(), &[1, 80]);
        dispatcher.dispatch(command(1, 1)).await;
        let data = button_data(&last_reply(&delivery)).unwrap();

        dispatcher.dispatch(press(2, 1, &data)).await;
        let outcome = dispatcher.dispatch(press(2, 1, &data)).await;

        assert_eq!(outcome, DispatchOutcome::Duplicate);
        assert_eq!(delivery.len(), 2);
    }

    #[tokio::test]
    async fn test_threshold_biases_draw() {
        let config = FortuneConfig {
            max_attempts: 3,
            accept_threshold: 50,
            ..Default::default()
        };
        let (dispatcher, delivery) = setup(config.clone(), &[10, 20, 60]);
        dispatcher.dispatch(command(1, 1)).await;
        assert!(delivery.texts_for(CHAT)[0].contains("60/100"));

        // Exhausted: the last draw is still delivered.
        let (dispatcher, delivery) = setup(config, &[10, 20, 30]);
        dispatcher.dispatch(command(1, 1)).await;
        assert!(delivery.texts_for(CHAT)[0].contains("30/100"));
    }
}
