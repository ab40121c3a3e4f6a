//! Three-panel page templates.
//!
//! Both meme commands render the same page shape: one wide panel on top and
//! two square panels side by side below it.
//!
//! ```text
//! ┌───────────────────────┐
//! │          top          │
//! └───────────────────────┘
//!            gap
//! ┌──────────┐ ┌──────────┐
//! │   left   │ │  right   │
//! └──────────┘ └──────────┘
//! ```

/// An axis-aligned pixel box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The box at fractional offsets of this one.
    pub fn relative(&self, rel: RelativeBox) -> Rect {
        Rect {
            x: self.x + (self.width as f64 * rel.x) as u32,
            y: self.y + (self.height as f64 * rel.y) as u32,
            width: (self.width as f64 * rel.width) as u32,
            height: (self.height as f64 * rel.height) as u32,
        }
    }

    /// Scales both corners, so rounding never shifts the far edge by more
    /// than one pixel.
    fn scaled(&self, sx: f64, sy: f64) -> Rect {
        let x1 = (self.x as f64 * sx) as u32;
        let y1 = (self.y as f64 * sy) as u32;
        let x2 = ((self.x + self.width) as f64 * sx) as u32;
        let y2 = ((self.y + self.height) as f64 * sy) as u32;
        Rect::new(x1, y1, x2.saturating_sub(x1), y2.saturating_sub(y1))
    }
}

/// A box expressed as fractions of its panel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativeBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RelativeBox {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Font-size search range for the line inside a bubble, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextFit {
    pub max_size: u32,
    pub min_size: u32,
    /// Space kept free between the bubble's box and the text.
    pub padding: u32,
}

impl TextFit {
    pub const fn new(max_size: u32, min_size: u32, padding: u32) -> Self {
        Self {
            max_size,
            min_size,
            padding,
        }
    }
}

/// A speech bubble: where it sits in its panel and how its line is sized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bubble {
    pub area: RelativeBox,
    pub fit: TextFit,
}

impl Bubble {
    pub const fn new(area: RelativeBox, fit: TextFit) -> Self {
        Self { area, fit }
    }
}

/// Panel sizes of a three-panel page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelLayout {
    pub top: (u32, u32),
    pub bottom: (u32, u32),
    pub gap: u32,
}

impl PanelLayout {
    pub const DONGZHUO: Self = Self {
        top: (2048, 1024),
        bottom: (1024, 1024),
        gap: 24,
    };

    pub const DOKAKU: Self = Self {
        top: (1536, 1024),
        bottom: (1024, 1024),
        gap: 24,
    };

    pub fn canvas_size(&self) -> (u32, u32) {
        let (top_w, top_h) = self.top;
        let (bot_w, bot_h) = self.bottom;
        (top_w.max(bot_w * 2 + self.gap), top_h + self.gap + bot_h)
    }

    /// Top, left and right panels on the template canvas.
    pub fn panels(&self) -> [Rect; 3] {
        let (canvas_w, _) = self.canvas_size();
        let (top_w, top_h) = self.top;
        let (bot_w, bot_h) = self.bottom;
        let row = top_h + self.gap;
        [
            Rect::new((canvas_w - top_w) / 2, 0, top_w, top_h),
            Rect::new(0, row, bot_w, bot_h),
            Rect::new(bot_w + self.gap, row, bot_w, bot_h),
        ]
    }

    /// The template panels mapped onto a page of `width`×`height`.
    pub fn panels_on(&self, width: u32, height: u32) -> [Rect; 3] {
        let (canvas_w, canvas_h) = self.canvas_size();
        let sx = width as f64 / canvas_w as f64;
        let sy = height as f64 / canvas_h as f64;
        self.panels().map(|panel| panel.scaled(sx, sy))
    }
}

// =============================================================================
// Dialogue
// =============================================================================

/// One line per panel, top first.
pub const DIALOGUE: [&str; 3] = ["……", "你…你可有何话说？", "再无话说，请速速动手！"];

pub const DONGZHUO_BUBBLES: [Bubble; 3] = [
    Bubble::new(RelativeBox::new(0.70, 0.06, 0.24, 0.24), TextFit::new(48, 22, 20)),
    Bubble::new(RelativeBox::new(0.06, 0.06, 0.38, 0.30), TextFit::new(44, 20, 20)),
    Bubble::new(RelativeBox::new(0.52, 0.06, 0.44, 0.30), TextFit::new(44, 20, 20)),
];

pub const DOKAKU_BUBBLES: [Bubble; 3] = [
    Bubble::new(RelativeBox::new(0.60, 0.10, 0.33, 0.22), TextFit::new(56, 26, 22)),
    Bubble::new(RelativeBox::new(0.06, 0.06, 0.45, 0.28), TextFit::new(50, 24, 22)),
    Bubble::new(RelativeBox::new(0.10, 0.08, 0.60, 0.32), TextFit::new(50, 24, 22)),
];

pub const CAPTION: &str = "真是一对苦命鸳鸯啊.";

/// Caption of a finished page. Without lettered bubbles the dialogue is
/// appended, one line per panel.
pub fn caption(lettered: bool) -> String {
    let mut caption = String::from(CAPTION);
    if lettered {
        return caption;
    }
    caption.push('\n');
    for line in DIALOGUE {
        caption.push('\n');
        caption.push_str(line);
    }
    caption
}

// =============================================================================
// Prompts
// =============================================================================

pub const DONGZHUO_PROMPT: &str = concat!(
    "你是一位专业的漫画绘制师，擅长黑白墨线写实风格的漫画创作，请严格按照以下规则生成画面。\n\n",
    "【核心结构要求】\n",
    "整张图片必须且只能包含三个画格：\n",
    "- 第一行：一个横向大画格\n",
    "- 第二行：两个并排的小画格\n",
    "总画格数 = 3。严禁生成四格漫画、多格漫画或任何额外画格。如果出现第四个画格或额外分割，视为完全错误。\n\n",
    "【角色绑定规则 - 极其重要】\n",
    "第一张参考图的角色 = 角色A；第二张参考图的角色 = 角色B。\n",
    "角色A只能出现在第一格与第二格；角色B只能出现在第三格。\n",
    "严禁角色错位、互换、混用外貌特征。\n\n",
    "【分格内容设定】\n\n",
    "第一格（上方大格）：\n",
    "角色A出镜。角色流着眼泪，嘴巴紧闭，带有幽怨的情绪，正面注视镜头，表情压抑而痛苦。\n\n",
    "第二格（左下格）：\n",
    "角色A出镜。角色悔恨地流泪，带有哭泣的表情，情绪明显更加崩溃，似乎正在询问：“你，你可有何话说？”。\n\n",
    "第三格（右下格）：\n",
    "角色B出镜。角色带着决绝的表情，脖子上方有一根绳子垂下并套住其颈部，他闭上双眼，神情庄重，仿佛正在回复到：“再无话说，请速速动手！”。\n\n",
    "【风格要求】\n",
    "黑白墨线漫画风格，写实，线条干净清晰，使用少量网点阴影，高对比度。\n",
    "禁止输出任何的对话框、文字、和标点符号。\n",
    "背景只能为白色或灰色，禁止任何彩色内容。\n\n",
    "【排版补充说明】\n",
    "画面必须严格遵守三格结构：\n",
    "- 不允许在画格内部再次分割\n",
    "- 不允许出现第四格或隐藏格\n",
    "- 不允许额外边框或杂乱线条\n\n",
);

pub const NEGATIVE_PROMPT: &str = "four panels, 4 panels, comic strip, manga page with four frames, \
     extra panel, 2x2 grid, multi-frame layout, extra frame, additional panel, split panel";

/// Text-only prompts for the top, left and right panels.
pub const DOKAKU_PROMPTS: [&str; 3] = [
    "Close-up, head-and-shoulders portrait, misty eyes with subtle tears, \
     mouth gently closed, facing camera; black-and-white manga ink style, \
     clean linework, high contrast, screentone; no text, no speech bubbles.",
    "Close-up, crying expression, mouth slightly open as if asking a question, \
     gazing right; black-and-white manga ink style, screentone, clean lines; \
     no text, no speech bubbles.",
    "Close-up, solemn and resolute expression, eyes gently closed; \
     a ceremonial decorative collar resting on shoulders (fashion accessory); \
     facing left; black-and-white manga ink style, strong contrast, clean linework; \
     no text, no speech bubbles.",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dongzhuo_canvas() {
        let layout = PanelLayout::DONGZHUO;
        assert_eq!(layout.canvas_size(), (2072, 2072));
        assert_eq!(
            layout.panels(),
            [
                Rect::new(12, 0, 2048, 1024),
                Rect::new(0, 1048, 1024, 1024),
                Rect::new(1048, 1048, 1024, 1024),
            ]
        );
    }

    #[test]
    fn test_panels_follow_page_size() {
        let [top, left, right] = PanelLayout::DONGZHUO.panels_on(1036, 1036);
        assert_eq!(top, Rect::new(6, 0, 1024, 512));
        assert_eq!(left, Rect::new(0, 524, 512, 512));
        assert_eq!(right, Rect::new(524, 524, 512, 512));
    }

    #[test]
    fn test_relative_box() {
        let bubble = Rect::new(6, 0, 1024, 512).relative(DONGZHUO_BUBBLES[0].area);
        assert_eq!(bubble, Rect::new(6 + 716, 30, 245, 122));
    }

    #[test]
    fn test_caption_lists_dialogue_only_when_unlettered() {
        let full = caption(false);
        assert!(full.starts_with(CAPTION));
        assert!(full.ends_with("再无话说，请速速动手！"));
        assert_eq!(caption(true), CAPTION);
    }
}
