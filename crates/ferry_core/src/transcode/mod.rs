//! Markup transcoder
//!
//! Converts legacy pseudo-XML/BBCode bodies into target markdown through an
//! ordered list of [`RewritePass`]es, then drains the placeholder vault.
//!
//! Mention resolution needs the identity map, which is async. The caller
//! collects [`Transcoder::mentioned_posts`] first, looks them up, and passes
//! the resulting [`MentionTable`] in; the transcoding itself stays sync.

mod html;
mod mention;
mod passes;

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::target::MAX_TITLE_CHARS;
use crate::vault::{PlaceholderVault, VaultError};

pub use html::html_to_markdown;
pub use mention::{mentioned_post_ids, rewrite_mentions, Mention, MentionRewrite, MentionTable};
pub use passes::{
    Blocks, DecodeEntities, DropDecorative, GenericHtml, InlineTags, Mentions, PassContext,
    RewritePass,
};

static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid blank line regex"));

/// Transcoded body and the metadata pulled out of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodedBody {
    pub text: String,
    pub reply_to_post_number: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeOptions {
    /// Elements removed together with their content before anything else runs.
    pub decorative_tags: Vec<String>,
    /// Fail on orphaned placeholders instead of logging them.
    pub strict: bool,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            decorative_tags: vec!["s".to_string(), "e".to_string()],
            strict: false,
        }
    }
}

#[derive(Debug)]
pub struct Transcoder {
    passes: Vec<Box<dyn RewritePass>>,
    strict: bool,
}

impl Default for Transcoder {
    fn default() -> Self {
        Self::new(&TranscodeOptions::default())
    }
}

impl Transcoder {
    pub fn new(options: &TranscodeOptions) -> Self {
        let passes: Vec<Box<dyn RewritePass>> = vec![
            Box::new(DecodeEntities),
            Box::new(DropDecorative::new(&options.decorative_tags)),
            Box::new(InlineTags),
            Box::new(Mentions),
            Box::new(Blocks),
            Box::new(GenericHtml),
        ];
        Self {
            passes,
            strict: options.strict,
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Pass names in execution order.
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Source ids of posts the body mentions, for building a [`MentionTable`].
    ///
    /// Entities are decoded first so escaped tags are found the same way the
    /// mention pass will see them.
    pub fn mentioned_posts(&self, raw: &str) -> Vec<String> {
        mentioned_post_ids(&html_escape::decode_html_entities(raw))
    }

    /// Transcode one body.
    ///
    /// `topic_id` is the topic the body will land in, if known; only mentions
    /// of posts in that topic set the reply link. Outside strict mode an
    /// orphaned placeholder is logged and the partially restored text kept.
    pub fn transcode(
        &self,
        raw: &str,
        mentions: &MentionTable,
        topic_id: Option<i64>,
    ) -> Result<TranscodedBody, VaultError> {
        let mut vault = PlaceholderVault::new();
        let mut cx = PassContext {
            vault: &mut vault,
            mentions,
            topic_id,
            reply_to_post_number: None,
        };

        let mut text = raw.to_string();
        for pass in &self.passes {
            text = pass.rewrite(&text, &mut cx);
        }
        let reply_to_post_number = cx.reply_to_post_number;

        let text = match vault.apply(&text) {
            Ok(text) => text,
            Err(e) if self.strict => return Err(e),
            Err(VaultError::Orphaned { keys, text }) => {
                warn!(lost = keys.len(), "placeholders lost during transcoding");
                text
            }
        };

        // Restored blocks bring their own leading newlines.
        let text = BLANK_RUNS.replace_all(&text, "\n\n");

        Ok(TranscodedBody {
            text: text.trim().to_string(),
            reply_to_post_number,
        })
    }
}

/// Decode a title and cut it to the target's limit.
///
/// Decoding comes first so an entity at the boundary is never split.
pub fn normalize_title(raw: &str) -> String {
    let decoded = html_escape::decode_html_entities(raw);
    decoded.trim().chars().take(MAX_TITLE_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_db::PostPlacement;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pass_order() {
        let transcoder = Transcoder::default();
        assert_eq!(
            transcoder.pass_names(),
            vec![
                "decode-entities",
                "drop-decorative",
                "inline-tags",
                "mentions",
                "blocks",
                "generic-html"
            ]
        );
    }

    #[test]
    fn test_mention_rewrite() {
        let transcoder = Transcoder::default();
        let raw = r#"Hello <mention id="31" displayname="meg">@meg#31</mention>"#;
        assert_eq!(transcoder.mentioned_posts(raw), vec!["31"]);

        let mut table = MentionTable::new();
        table.insert(
            "31".into(),
            PostPlacement {
                topic_id: 8,
                post_number: 3,
            },
        );

        let body = transcoder.transcode(raw, &table, None).unwrap();
        assert!(body.text.contains("[quote=\"meg, post:3, topic:8\"]"));
        assert!(body.text.starts_with("Hello"));
        assert_eq!(body.reply_to_post_number, Some(3));
    }

    #[test]
    fn test_unresolved_mention_is_left_alone() {
        let transcoder = Transcoder::default();
        let body = transcoder
            .transcode(
                r#"<t>see <mention id="99">@gone</mention></t>"#,
                &MentionTable::new(),
                None,
            )
            .unwrap();
        assert_eq!(body.text, "see @gone");
        assert_eq!(body.reply_to_post_number, None);
    }

    #[test]
    fn test_flarum_document() {
        let transcoder = Transcoder::default();
        let raw = "<r><p>Intro with <STRONG><s>**</s>bold<e>**</e></STRONG> and <U><s>[u]</s>line<e>[/u]</e></U></p>\
            <QUOTE><i>&gt; </i><p>quoted <u>text</u></p></QUOTE>\
            <LIST><LI><s>* </s>one</LI><LI><s>* </s>two</LI></LIST></r>";

        let body = transcoder.transcode(raw, &MentionTable::new(), None).unwrap();
        assert_eq!(
            body.text,
            "Intro with **bold** and line\n\n> quoted [u]text[/u]\n\n - one\n - two"
        );
    }

    #[test]
    fn test_unclosed_tags_keep_their_text() {
        let transcoder = Transcoder::default().strict(true);
        let body = transcoder
            .transcode("<quote>never closed <url>x", &MentionTable::new(), None)
            .unwrap();
        assert_eq!(body.text, "never closed x");
    }

    #[test]
    fn test_mention_in_quote_and_quote_in_list() {
        let transcoder = Transcoder::default().strict(true);
        let raw = r#"<r><QUOTE><i>&gt; </i><p>see <POSTMENTION displayname="meg" id="31">@meg#31</POSTMENTION> and <u>this</u></p></QUOTE><LIST><LI><s>* </s>first</LI><LI><quote>in list</quote></LI></LIST></r>"#;

        let mut table = MentionTable::new();
        table.insert(
            "31".into(),
            PostPlacement {
                topic_id: 8,
                post_number: 3,
            },
        );

        let body = transcoder.transcode(raw, &table, None).unwrap();
        assert_eq!(
            body.text,
            "> see\n> [quote=\"meg, post:3, topic:8\"]\n> @meg#31\n> [/quote]\n>  and [u]this[/u]\n\n - first\n - > in list"
        );
        assert_eq!(body.reply_to_post_number, Some(3));
    }

    #[test]
    fn test_escaped_script_text_survives() {
        let transcoder = Transcoder::default().strict(true);
        let body = transcoder
            .transcode(
                "<t>a &lt;script&gt; tag <u>kept</u> &lt;/script&gt; end</t>",
                &MentionTable::new(),
                None,
            )
            .unwrap();
        assert_eq!(body.text, "a tag [u]kept[/u] end");
    }

    #[test]
    fn test_title_truncated_after_decoding() {
        let mut raw = "a".repeat(250);
        raw.push_str("&amp;&amp;&amp;&amp;&amp;&amp;&amp;&amp;");
        let title = normalize_title(&raw);
        assert_eq!(title.chars().count(), 255);
        assert!(title.ends_with("&&&&&"));

        let long = "é".repeat(300);
        assert_eq!(normalize_title(&long).chars().count(), 255);
        assert_eq!(normalize_title("Fish &amp; Chips"), "Fish & Chips");
    }
}
