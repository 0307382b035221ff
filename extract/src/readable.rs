//! Boilerplate-stripping HTML to Markdown conversion.
//!
//! This is not a full readability engine: it prefers the page's declared
//! content root (`<article>`, `<main>`, `[role=main]`), strips chrome
//! (navigation, headers, footers, scripts), and serializes what remains as
//! Markdown so the model sees structure instead of tag soup.

use std::sync::OnceLock;

use scraper::{ElementRef, Html, Selector};

use crate::ExtractError;

/// Tags whose entire subtree is dropped.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "form", "noscript", "iframe", "svg",
    "button", "select", "canvas", "template", "dialog",
];

/// Inline tags folded into the surrounding paragraph.
const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "br", "cite", "code", "em", "i", "img", "mark", "q", "s", "small", "span",
    "strong", "sub", "sup", "time", "u",
];

fn content_root_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| {
        Selector::parse("article, main, [role='main']").expect("static selector parses")
    })
}

fn body_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse("body").expect("static selector parses"))
}

/// Convert a page to readable Markdown.
///
/// Fails with [`ExtractError::EmptyContent`] when nothing readable remains
/// after boilerplate removal; callers must not send an empty prompt.
pub fn readable_markdown(html: &str) -> Result<String, ExtractError> {
    let doc = Html::parse_document(html);

    let root = doc
        .select(content_root_selector())
        .next()
        .or_else(|| doc.select(body_selector()).next());
    let Some(root) = root else {
        return Err(ExtractError::EmptyContent);
    };

    let mut renderer = Renderer::default();
    renderer.block_children(root, 0);
    renderer.flush_paragraph();

    let markdown = collapse_blank_lines(renderer.out.trim());
    if markdown.is_empty() {
        return Err(ExtractError::EmptyContent);
    }
    Ok(markdown)
}

#[derive(Default)]
struct Renderer {
    out: String,
    paragraph: String,
}

impl Renderer {
    /// Render the children of a container element, folding inline runs into
    /// paragraphs and recursing into block children.
    fn block_children(&mut self, el: ElementRef<'_>, list_depth: usize) {
        for child in el.children() {
            match child.value() {
                scraper::Node::Text(text) => self.push_inline(text),
                scraper::Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.block_element(child_el, list_depth);
                    }
                }
                _ => {}
            }
        }
    }

    fn block_element(&mut self, el: ElementRef<'_>, list_depth: usize) {
        let name = el.value().name();
        if SKIP_TAGS.contains(&name) {
            return;
        }
        if INLINE_TAGS.contains(&name) {
            let rendered = inline_markdown(el);
            self.push_inline(&rendered);
            return;
        }

        self.flush_paragraph();
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse::<usize>().unwrap_or(1);
                let text = collapse_ws(&inline_markdown(el));
                if !text.is_empty() {
                    self.out.push('\n');
                    self.out.push_str(&"#".repeat(level));
                    self.out.push(' ');
                    self.out.push_str(&text);
                    self.out.push('\n');
                }
            }
            "p" => {
                let text = collapse_ws(&inline_markdown(el));
                if !text.is_empty() {
                    self.out.push('\n');
                    self.out.push_str(&text);
                    self.out.push('\n');
                }
            }
            "pre" => {
                let code: String = el.text().collect();
                let code = code.trim_matches('\n');
                if !code.trim().is_empty() {
                    self.out.push_str("\n```\n");
                    self.out.push_str(code);
                    self.out.push_str("\n```\n");
                }
            }
            "ul" | "ol" => {
                self.list(el, name == "ol", list_depth);
            }
            "blockquote" => {
                let text = collapse_ws(&inline_markdown(el));
                if !text.is_empty() {
                    self.out.push_str("\n> ");
                    self.out.push_str(&text);
                    self.out.push('\n');
                }
            }
            "hr" => self.out.push_str("\n---\n"),
            "table" => self.table(el),
            // Everything else is treated as a transparent container.
            _ => self.block_children(el, list_depth),
        }
        self.flush_paragraph();
    }

    fn list(&mut self, el: ElementRef<'_>, ordered: bool, depth: usize) {
        self.out.push('\n');
        let mut index = 1usize;
        for child in el.children() {
            let Some(item) = ElementRef::wrap(child) else {
                continue;
            };
            if item.value().name() != "li" {
                continue;
            }
            let text = collapse_ws(&inline_markdown(item));
            if !text.is_empty() {
                self.out.push_str(&"  ".repeat(depth));
                if ordered {
                    self.out.push_str(&format!("{index}. "));
                } else {
                    self.out.push_str("- ");
                }
                self.out.push_str(&text);
                self.out.push('\n');
            }
            // Nested lists inside the item keep their structure.
            for nested in item.children() {
                if let Some(nested_el) = ElementRef::wrap(nested) {
                    let nested_name = nested_el.value().name();
                    if nested_name == "ul" || nested_name == "ol" {
                        self.list(nested_el, nested_name == "ol", depth + 1);
                    }
                }
            }
            index += 1;
        }
    }

    fn table(&mut self, el: ElementRef<'_>) {
        static ROW: OnceLock<Selector> = OnceLock::new();
        static CELL: OnceLock<Selector> = OnceLock::new();
        let row = ROW.get_or_init(|| Selector::parse("tr").expect("static selector parses"));
        let cell = CELL.get_or_init(|| Selector::parse("th, td").expect("static selector parses"));

        self.out.push('\n');
        for tr in el.select(row) {
            let cells: Vec<String> = tr
                .select(cell)
                .map(|c| collapse_ws(&inline_markdown(c)))
                .collect();
            if cells.iter().any(|c| !c.is_empty()) {
                self.out.push_str("| ");
                self.out.push_str(&cells.join(" | "));
                self.out.push_str(" |\n");
            }
        }
    }

    fn push_inline(&mut self, text: &str) {
        if text.trim().is_empty() {
            if !self.paragraph.is_empty() && !self.paragraph.ends_with(' ') {
                self.paragraph.push(' ');
            }
            return;
        }
        self.paragraph.push_str(text);
    }

    fn flush_paragraph(&mut self) {
        let text = collapse_ws(&self.paragraph);
        self.paragraph.clear();
        if !text.is_empty() {
            self.out.push('\n');
            self.out.push_str(&text);
            self.out.push('\n');
        }
    }
}

/// Render an element's subtree as inline Markdown.
fn inline_markdown(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    inline_into(el, &mut out);
    out
}

fn inline_into(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            scraper::Node::Text(text) => out.push_str(text),
            scraper::Node::Element(_) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                let name = child_el.value().name();
                if SKIP_TAGS.contains(&name) {
                    continue;
                }
                match name {
                    "a" => {
                        let text = collapse_ws(&inline_markdown(child_el));
                        match child_el.value().attr("href") {
                            Some(href)
                                if !text.is_empty()
                                    && (href.starts_with("http://")
                                        || href.starts_with("https://")) =>
                            {
                                out.push_str(&format!("[{text}]({href})"));
                            }
                            _ => out.push_str(&text),
                        }
                    }
                    "strong" | "b" => {
                        let text = collapse_ws(&inline_markdown(child_el));
                        if !text.is_empty() {
                            out.push_str(&format!("**{text}**"));
                        }
                    }
                    "em" | "i" => {
                        let text = collapse_ws(&inline_markdown(child_el));
                        if !text.is_empty() {
                            out.push_str(&format!("*{text}*"));
                        }
                    }
                    "code" => {
                        let text: String = child_el.text().collect();
                        let text = text.trim();
                        if !text.is_empty() {
                            out.push_str(&format!("`{text}`"));
                        }
                    }
                    "br" => out.push(' '),
                    "img" => {
                        if let Some(alt) = child_el.value().attr("alt")
                            && !alt.trim().is_empty()
                        {
                            out.push_str(alt.trim());
                        }
                    }
                    _ => inline_into(child_el, out),
                }
            }
            _ => {}
        }
    }
}

fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::readable_markdown;
    use crate::ExtractError;

    #[test]
    fn prefers_article_over_body() {
        let html = r#"
            <html><body>
              <nav>Home | About</nav>
              <article><h1>Title</h1><p>Body text.</p></article>
              <footer>© 2024</footer>
            </body></html>
        "#;
        let md = readable_markdown(html).unwrap();
        assert!(md.contains("# Title"));
        assert!(md.contains("Body text."));
        assert!(!md.contains("Home | About"));
        assert!(!md.contains("© 2024"));
    }

    #[test]
    fn strips_scripts_and_styles() {
        let html = "<body><p>keep</p><script>var x=1;</script><style>p{}</style></body>";
        let md = readable_markdown(html).unwrap();
        assert!(md.contains("keep"));
        assert!(!md.contains("var x"));
        assert!(!md.contains("p{}"));
    }

    #[test]
    fn renders_headings_lists_and_code() {
        let html = r#"
            <article>
              <h2>Section</h2>
              <ul><li>first</li><li>second</li></ul>
              <ol><li>one</li></ol>
              <pre>let x = 1;</pre>
            </article>
        "#;
        let md = readable_markdown(html).unwrap();
        assert!(md.contains("## Section"));
        assert!(md.contains("- first"));
        assert!(md.contains("- second"));
        assert!(md.contains("1. one"));
        assert!(md.contains("```\nlet x = 1;\n```"));
    }

    #[test]
    fn renders_inline_markup() {
        let html = r#"<article><p>a <strong>bold</strong> and <em>soft</em> <a href="https://e.com/x">link</a> and <code>span</code></p></article>"#;
        let md = readable_markdown(html).unwrap();
        assert!(md.contains("**bold**"));
        assert!(md.contains("*soft*"));
        assert!(md.contains("[link](https://e.com/x)"));
        assert!(md.contains("`span`"));
    }

    #[test]
    fn relative_links_keep_text_only() {
        let html = r#"<article><p>see <a href="/docs">the docs</a></p></article>"#;
        let md = readable_markdown(html).unwrap();
        assert!(md.contains("the docs"));
        assert!(!md.contains("(/docs)"));
    }

    #[test]
    fn empty_page_is_rejected() {
        let html = "<body><script>only()</script></body>";
        assert!(matches!(
            readable_markdown(html),
            Err(ExtractError::EmptyContent)
        ));
    }

    #[test]
    fn loose_text_becomes_paragraphs() {
        let html = "<body><div>first run<p>middle</p>second run</div></body>";
        let md = readable_markdown(html).unwrap();
        assert!(md.contains("first run"));
        assert!(md.contains("middle"));
        assert!(md.contains("second run"));
    }
}
