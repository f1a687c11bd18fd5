//! Generic HTML to markdown conversion.
//!
//! Walks the parsed fragment recursively so inline wrappers can be closed
//! after their children. Anything it does not recognize is unwrapped to its
//! children, which keeps unknown legacy tags as plain text.

use ego_tree::NodeRef;
use scraper::{Html, Node};

/// Convert an HTML fragment to markdown.
pub fn html_to_markdown(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::with_capacity(html.len());
    render_children(*fragment.root_element(), &mut out);
    normalize(&out)
}

fn render_children(node: NodeRef<'_, Node>, out: &mut String) {
    for child in node.children() {
        render(child, out);
    }
}

fn render(node: NodeRef<'_, Node>, out: &mut String) {
    if let Some(text) = node.value().as_text() {
        push_text(out, text);
        return;
    }
    let Some(elem) = node.value().as_element() else {
        return;
    };

    match elem.name() {
        "br" => {
            trim_trailing_spaces(out);
            out.push('\n');
        }
        "p" | "div" | "section" | "article" | "header" | "footer" | "aside" | "table" => {
            block_break(out);
            render_children(node, out);
            block_break(out);
        }
        "tr" => {
            render_children(node, out);
            trim_trailing_spaces(out);
            out.push('\n');
        }
        "td" | "th" => {
            render_children(node, out);
            out.push(' ');
        }
        "b" | "strong" => wrap_inline(node, out, "**"),
        "i" | "em" => wrap_inline(node, out, "*"),
        "s" | "del" | "strike" => wrap_inline(node, out, "~~"),
        "a" => {
            let inner = render_to_string(node);
            let inner = inner.trim();
            match elem.attr("href") {
                Some(href) if inner.is_empty() || inner == href => out.push_str(href),
                Some(href) => {
                    out.push('[');
                    out.push_str(inner);
                    out.push_str("](");
                    out.push_str(href);
                    out.push(')');
                }
                None => out.push_str(inner),
            }
        }
        "img" => {
            if let Some(src) = elem.attr("src") {
                let alt = elem.attr("alt").unwrap_or("");
                out.push_str(&format!("![{alt}]({src})"));
            }
        }
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = elem.name()[1..].parse::<usize>().unwrap_or(1);
            let inner = render_to_string(node);
            block_break(out);
            out.push_str(&"#".repeat(level));
            out.push(' ');
            out.push_str(inner.trim());
            block_break(out);
        }
        "pre" => {
            let code = raw_text(node);
            block_break(out);
            out.push_str("```\n");
            out.push_str(code.trim_matches('\n'));
            out.push_str("\n```");
            block_break(out);
        }
        "code" => {
            out.push('`');
            out.push_str(&raw_text(node));
            out.push('`');
        }
        "blockquote" => {
            let inner = normalize(&render_to_string(node));
            block_break(out);
            for line in inner.lines() {
                if line.is_empty() {
                    out.push_str(">\n");
                } else {
                    out.push_str("> ");
                    out.push_str(line);
                    out.push('\n');
                }
            }
            block_break(out);
        }
        "ul" | "ol" => {
            let ordered = elem.name() == "ol";
            block_break(out);
            let mut index = 0;
            for item in node.children() {
                let is_li = item
                    .value()
                    .as_element()
                    .is_some_and(|e| e.name() == "li");
                if !is_li {
                    continue;
                }
                index += 1;
                let marker = if ordered {
                    format!("{index}. ")
                } else {
                    "- ".to_string()
                };
                push_list_item(out, &marker, &render_to_string(item));
            }
            block_break(out);
        }
        "li" => {
            let inner = render_to_string(node);
            push_list_item(out, "- ", &inner);
        }
        "hr" => {
            block_break(out);
            out.push_str("---");
            block_break(out);
        }
        _ => render_children(node, out),
    }
}

fn render_to_string(node: NodeRef<'_, Node>) -> String {
    let mut buf = String::new();
    render_children(node, &mut buf);
    buf
}

/// Text content with whitespace left alone, for code.
fn raw_text(node: NodeRef<'_, Node>) -> String {
    node.descendants()
        .filter_map(|n| n.value().as_text().map(|t| t.to_string()))
        .collect()
}

fn push_text(out: &mut String, text: &str) {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let leading = text.starts_with(char::is_whitespace);
    if leading && !out.is_empty() && !out.ends_with(['\n', ' ']) {
        out.push(' ');
    }
    if collapsed.is_empty() {
        return;
    }
    out.push_str(&collapsed);
    if text.ends_with(char::is_whitespace) {
        out.push(' ');
    }
}

fn wrap_inline(node: NodeRef<'_, Node>, out: &mut String, marker: &str) {
    let inner = render_to_string(node);
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        out.push_str(&inner);
        return;
    }
    if inner.starts_with(' ') && !out.is_empty() && !out.ends_with(['\n', ' ']) {
        out.push(' ');
    }
    out.push_str(marker);
    out.push_str(trimmed);
    out.push_str(marker);
    if inner.ends_with(' ') {
        out.push(' ');
    }
}

fn push_list_item(out: &mut String, marker: &str, inner: &str) {
    let inner = normalize(inner);
    let indent = " ".repeat(marker.len());
    let mut lines = inner.lines().filter(|l| !l.trim().is_empty());

    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(marker);
    if let Some(first) = lines.next() {
        out.push_str(first);
    }
    out.push('\n');
    for line in lines {
        out.push_str(&indent);
        out.push_str(line);
        out.push('\n');
    }
}

fn trim_trailing_spaces(out: &mut String) {
    let kept = out.trim_end_matches(' ').len();
    out.truncate(kept);
}

/// Make sure what follows starts a new paragraph.
fn block_break(out: &mut String) {
    trim_trailing_spaces(out);
    if out.is_empty() || out.ends_with("\n\n") {
        return;
    }
    if out.ends_with('\n') {
        out.push('\n');
    } else {
        out.push_str("\n\n");
    }
}

/// Trim line ends, collapse runs of blank lines, trim the whole.
fn normalize(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut blank_run = 0;

    for line in text.split('\n') {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            continue;
        }
        if !result.is_empty() {
            result.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        blank_run = 0;
        result.push_str(line);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_paragraphs_and_inline() {
        let md = html_to_markdown("<p>Hello <b>bold</b> and <em>soft</em></p><p>Second</p>");
        assert_eq!(md, "Hello **bold** and *soft*\n\nSecond");
    }

    #[test]
    fn test_links_and_images() {
        assert_eq!(
            html_to_markdown(r#"see <a href="https://x.org">docs</a>"#),
            "see [docs](https://x.org)"
        );
        assert_eq!(
            html_to_markdown(r#"<a href="https://x.org">https://x.org</a>"#),
            "https://x.org"
        );
        assert_eq!(
            html_to_markdown(r#"<img src="/a.png" alt="cat">"#),
            "![cat](/a.png)"
        );
    }

    #[test]
    fn test_lists() {
        let md = html_to_markdown("<ul><li>one</li><li>two</li></ul><ol><li>a</li><li>b</li></ol>");
        assert_eq!(md, "- one\n- two\n\n1. a\n2. b");
    }

    #[test]
    fn test_line_breaks_and_whitespace() {
        let md = html_to_markdown("first   line<br/>second\n   line");
        assert_eq!(md, "first line\nsecond line");
    }

    #[test]
    fn test_code_keeps_whitespace() {
        let md = html_to_markdown("<pre><code>fn main() {\n    x();\n}</code></pre>");
        assert_eq!(md, "```\nfn main() {\n    x();\n}\n```");
    }

    #[test]
    fn test_unknown_tags_unwrap() {
        assert_eq!(html_to_markdown("<r><t>plain <foo>text</foo></t></r>"), "plain text");
    }

    #[test]
    fn test_script_and_style_text_is_kept() {
        assert_eq!(
            html_to_markdown("a <script> tag kept </script> end"),
            "a tag kept end"
        );
        assert_eq!(html_to_markdown("<style>p { x }</style>"), "p { x }");
    }

    #[test]
    fn test_blockquote() {
        let md = html_to_markdown("<blockquote><p>a</p><p>b</p></blockquote>after");
        assert_eq!(md, "> a\n>\n> b\n\nafter");
    }
}
