//! Rewrite passes, one type per step.
//!
//! Passes are not commutative. Each one assumes the passes before it have
//! run: tag regexes expect decoded entities, the generic HTML pass expects
//! every hand-built markdown fragment to be hidden in the vault already.

use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::warn;

use super::html::html_to_markdown;
use super::mention::{rewrite_mentions, MentionTable};
use crate::vault::PlaceholderVault;

/// State shared by the passes over one body.
#[derive(Debug)]
pub struct PassContext<'a> {
    pub vault: &'a mut PlaceholderVault,
    pub mentions: &'a MentionTable,
    /// Topic the body will be posted into, when already known.
    pub topic_id: Option<i64>,
    pub reply_to_post_number: Option<i64>,
}

/// A single rewrite step.
pub trait RewritePass: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn rewrite(&self, text: &str, cx: &mut PassContext<'_>) -> String;
}

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($re).expect(concat!("valid ", stringify!($name), " regex")));
    };
}

pattern!(URL_BARE, r"(?i)<url>(.*?)</url>");
pattern!(URL_LABELLED, r#"(?i)<url url="(.*?)">(.*?)</url>"#);
pattern!(CODE, r"(?is)<c>(.*?)</c>");
pattern!(UNDERLINE, r"<u>(.*?)</u>");
pattern!(YOUTUBE, r"\[youtube\](.*?)\[/youtube\]");
pattern!(SIZE, r#"(?is)<size size="(\d+)">(.*?)</size>"#);
pattern!(COLOR, r#"(?is)<color color="([#a-zA-Z0-9]+)">(.*?)</color>"#);
pattern!(
    ALIGN,
    r#"(?is)<align align="(center|left|right|justify)">(.*?)</align>"#
);
pattern!(QUOTE, r"(?is)<quote>(.+?)</quote>");
pattern!(QUOTE_MARKER, r"(?i)<i>\s*>\s*</i>");
pattern!(LIST_DECIMAL, r#"(?is)<list type="decimal">(.+?)</list>"#);
pattern!(LIST_PLAIN, r"(?is)<list>(.+?)</list>");
pattern!(LIST_ITEM, r"(?is)<li>(.*?)</li>");
pattern!(OUTER_R, r"(?s)<r>(.*)</r>");
pattern!(OUTER_T, r"(?s)<t>(.*)</t>");

// ============================================================================
// 1. Entities
// ============================================================================

#[derive(Debug, Default)]
pub struct DecodeEntities;

impl RewritePass for DecodeEntities {
    fn name(&self) -> &'static str {
        "decode-entities"
    }

    fn rewrite(&self, text: &str, _cx: &mut PassContext<'_>) -> String {
        html_escape::decode_html_entities(text).into_owned()
    }
}

// ============================================================================
// 2. Decorative wrappers
// ============================================================================

/// Removes whole elements that only carry source formatting, such as the
/// `<s>` and `<e>` markers around the original markup characters.
///
/// Tag names match case-sensitively: upper-case `<S>` is real strikethrough.
#[derive(Debug)]
pub struct DropDecorative {
    patterns: Vec<Regex>,
}

impl DropDecorative {
    pub fn new<S: AsRef<str>>(tags: &[S]) -> Self {
        let patterns = tags
            .iter()
            .filter_map(|tag| {
                let tag = regex::escape(tag.as_ref().trim());
                match Regex::new(&format!(r"(?s)<{tag}>.*?</{tag}>")) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        warn!("Skipping decorative tag {}: {}", tag, e);
                        None
                    }
                }
            })
            .collect();
        Self { patterns }
    }
}

impl RewritePass for DropDecorative {
    fn name(&self) -> &'static str {
        "drop-decorative"
    }

    fn rewrite(&self, text: &str, _cx: &mut PassContext<'_>) -> String {
        self.patterns.iter().fold(text.to_string(), |acc, re| {
            re.replace_all(&acc, "").into_owned()
        })
    }
}

// ============================================================================
// 3. Inline tags
// ============================================================================

/// Self-contained inline constructs: links, code, underline, video embeds,
/// size, color and alignment.
#[derive(Debug, Default)]
pub struct InlineTags;

impl RewritePass for InlineTags {
    fn name(&self) -> &'static str {
        "inline-tags"
    }

    fn rewrite(&self, text: &str, cx: &mut PassContext<'_>) -> String {
        let text = URL_BARE.replace_all(text, "$1");
        let text = URL_LABELLED.replace_all(&text, "[$2]($1)");

        let text = CODE.replace_all(&text, |cap: &Captures<'_>| {
            cx.vault.store(format!("```{}```", &cap[1]))
        });

        // No underline in markdown; the target understands the bracket tag.
        let text = UNDERLINE.replace_all(&text, |cap: &Captures<'_>| {
            cx.vault.store(format!("[u]{}[/u]", &cap[1]))
        });

        let text = YOUTUBE.replace_all(&text, "https://www.youtube.com/watch?v=$1");
        let text = SIZE.replace_all(&text, "[size=$1]$2[/size]");
        let text = COLOR.replace_all(&text, "[color=$1]$2[/color]");
        let text = ALIGN.replace_all(&text, |cap: &Captures<'_>| {
            let align = cap[1].to_ascii_lowercase();
            format!("[{align}]{}[/{align}]", &cap[2])
        });

        text.into_owned()
    }
}

// ============================================================================
// 4. Mentions
// ============================================================================

#[derive(Debug, Default)]
pub struct Mentions;

impl RewritePass for Mentions {
    fn name(&self) -> &'static str {
        "mentions"
    }

    fn rewrite(&self, text: &str, cx: &mut PassContext<'_>) -> String {
        let vault = &mut *cx.vault;
        let out = rewrite_mentions(text, cx.mentions, cx.topic_id, |quote| vault.store(quote));
        if out.reply_to_post_number.is_some() {
            cx.reply_to_post_number = out.reply_to_post_number;
        }
        out.text
    }
}

// ============================================================================
// 5. Blocks
// ============================================================================

/// Quotes and lists. Their inner HTML is converted on its own, templated,
/// and the finished block is vaulted whole.
#[derive(Debug, Default)]
pub struct Blocks;

/// Vaulted fragments inside the block are expanded first so every line of
/// them gets the block's prefix or indent.
fn list_items(inner: &str, marker: &str, vault: &mut PlaceholderVault) -> String {
    let mut markdown = LIST_ITEM
        .replace_all(inner, |cap: &Captures<'_>| {
            let item = vault.expand(&html_to_markdown(&cap[1]));
            format!("\n {marker} {}", item.trim().replace('\n', "\n    "))
        })
        .into_owned();
    markdown.push('\n');
    markdown
}

fn quote_lines(content: &str) -> String {
    content
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n> ")
}

impl RewritePass for Blocks {
    fn name(&self) -> &'static str {
        "blocks"
    }

    fn rewrite(&self, text: &str, cx: &mut PassContext<'_>) -> String {
        let text = QUOTE.replace_all(text, |cap: &Captures<'_>| {
            // The source keeps its own "> " marker inside <i>; drop it or it doubles.
            let content = QUOTE_MARKER.replace_all(&cap[1], "");
            let content = cx.vault.expand(&html_to_markdown(&content));
            let block = format!("\n> {}\n", quote_lines(&content));
            cx.vault.store(block)
        });

        let text = LIST_DECIMAL.replace_all(&text, |cap: &Captures<'_>| {
            let block = list_items(&cap[1], "1.", cx.vault);
            cx.vault.store(block)
        });

        let text = LIST_PLAIN.replace_all(&text, |cap: &Captures<'_>| {
            let block = list_items(&cap[1], "-", cx.vault);
            cx.vault.store(block)
        });

        text.into_owned()
    }
}

// ============================================================================
// 6. Generic HTML
// ============================================================================

/// Strips the outer `<r>`/`<t>` document wrappers and converts what is left.
#[derive(Debug, Default)]
pub struct GenericHtml;

impl RewritePass for GenericHtml {
    fn name(&self) -> &'static str {
        "generic-html"
    }

    fn rewrite(&self, text: &str, _cx: &mut PassContext<'_>) -> String {
        let text = OUTER_R.replace_all(text, "$1");
        let text = OUTER_T.replace_all(&text, "$1");
        html_to_markdown(&text)
    }
}
