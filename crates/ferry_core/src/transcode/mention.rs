//! Cross-post mentions.
//!
//! A mention tag names another post by its source id. Once that post has
//! been imported the tag becomes a quote pointing at its new topic and post
//! number, and the last such mention decides what the body replies to.

use std::collections::HashMap;
use std::sync::LazyLock;

use ferry_db::PostPlacement;
use regex::{Captures, Regex};

static MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:post)?mention\b([^>]*)>(.*?)</(?:post)?mention>")
        .expect("valid mention regex")
});

static ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)([a-z_]+)="([^"]*)""#).expect("valid attribute regex"));

/// Placements of mentioned posts, keyed by source post id.
pub type MentionTable = HashMap<String, PostPlacement>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub post_source_id: String,
    pub display_name: Option<String>,
}

fn parse_attributes(attrs: &str) -> Option<Mention> {
    let mut id = None;
    let mut display_name = None;
    let mut username = None;

    for cap in ATTRIBUTE.captures_iter(attrs) {
        let value = cap[2].trim().to_string();
        match cap[1].to_ascii_lowercase().as_str() {
            "id" => id = Some(value),
            "displayname" => display_name = Some(value),
            "username" => username = Some(value),
            _ => {}
        }
    }

    Some(Mention {
        post_source_id: id.filter(|id| !id.is_empty())?,
        display_name: display_name.or(username).filter(|n| !n.is_empty()),
    })
}

/// Source ids of every post mentioned in `text`, in order of appearance.
pub fn mentioned_post_ids(text: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for cap in MENTION.captures_iter(text) {
        if let Some(mention) = parse_attributes(&cap[1]) {
            if !ids.contains(&mention.post_source_id) {
                ids.push(mention.post_source_id);
            }
        }
    }
    ids
}

/// Result of rewriting the mentions in one body.
#[derive(Debug)]
pub struct MentionRewrite {
    pub text: String,
    pub reply_to_post_number: Option<i64>,
}

/// Rewrite resolvable mentions with `quote`, leaving the rest untouched.
///
/// `quote` receives the rendered quote block and returns what to splice in,
/// so the caller can protect it. When `topic_id` is known, only mentions of
/// posts in that topic count towards the reply link.
pub fn rewrite_mentions(
    text: &str,
    table: &MentionTable,
    topic_id: Option<i64>,
    mut quote: impl FnMut(String) -> String,
) -> MentionRewrite {
    let mut reply_to_post_number = None;

    let rewritten = MENTION.replace_all(text, |cap: &Captures<'_>| {
        let original = cap[0].to_string();
        let Some(mention) = parse_attributes(&cap[1]) else {
            return original;
        };
        let Some(placement) = table.get(&mention.post_source_id) else {
            return original;
        };

        if topic_id.map_or(true, |topic| topic == placement.topic_id) {
            reply_to_post_number = Some(placement.post_number);
        }

        let name = mention.display_name.as_deref().unwrap_or("");
        quote(format!(
            "\n[quote=\"{name}, post:{}, topic:{}\"]\n{}\n[/quote]\n",
            placement.post_number,
            placement.topic_id,
            cap[2].trim()
        ))
    });

    MentionRewrite {
        text: rewritten.into_owned(),
        reply_to_post_number,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> MentionTable {
        let mut table = MentionTable::new();
        table.insert(
            "31".into(),
            PostPlacement {
                topic_id: 8,
                post_number: 3,
            },
        );
        table.insert(
            "40".into(),
            PostPlacement {
                topic_id: 9,
                post_number: 5,
            },
        );
        table
    }

    #[test]
    fn test_collects_ids_once() {
        let text = r#"<POSTMENTION id="31" displayname="meg">@meg</POSTMENTION> and
            <mention id="40">x</mention> <mention id="31">again</mention>"#;
        assert_eq!(mentioned_post_ids(text), vec!["31", "40"]);
    }

    #[test]
    fn test_resolved_mention_becomes_quote() {
        let out = rewrite_mentions(
            r#"Hello <mention id="31" displayname="meg">@meg#31</mention>"#,
            &table(),
            None,
            |q| q,
        );
        assert_eq!(
            out.text,
            "Hello \n[quote=\"meg, post:3, topic:8\"]\n@meg#31\n[/quote]\n"
        );
        assert_eq!(out.reply_to_post_number, Some(3));
    }

    #[test]
    fn test_username_fallback_and_unresolved() {
        let out = rewrite_mentions(
            r#"<mention id="40" username="bob">hi</mention> <mention id="77">gone</mention>"#,
            &table(),
            None,
            |q| q,
        );
        assert!(out.text.contains("[quote=\"bob, post:5, topic:9\"]"));
        assert!(out.text.contains(r#"<mention id="77">gone</mention>"#));
    }

    #[test]
    fn test_last_mention_in_thread_wins() {
        let text = r#"<mention id="31">a</mention><mention id="40">b</mention>"#;

        let any = rewrite_mentions(text, &table(), None, |q| q);
        assert_eq!(any.reply_to_post_number, Some(5));

        let in_topic_8 = rewrite_mentions(text, &table(), Some(8), |q| q);
        assert_eq!(in_topic_8.reply_to_post_number, Some(3));

        let elsewhere = rewrite_mentions(text, &table(), Some(1), |q| q);
        assert_eq!(elsewhere.reply_to_post_number, None);
    }
}
