//! HTML to text.
//!
//! Two extractors: [`extract_article`] walks block-level elements under the
//! most specific content root and skips page chrome; [`extract_tag_strip`]
//! is the fallback that takes every text node in the main container.
//! `scraper::Html` is not `Send`, so everything here stays synchronous.

use scraper::{ElementRef, Html, Selector};

use super::clean::collapse_whitespace;

/// Elements whose subtree never contributes article text.
const CHROME_TAGS: &[&str] = &[
    "nav", "header", "footer", "aside", "script", "style", "form", "noscript", "template", "svg",
];

const BLOCK_TAGS: &[&str] = &[
    "p", "li", "blockquote", "pre", "h1", "h2", "h3", "h4", "h5", "h6",
];

/// An article must carry at least one paragraph this long.
const MIN_PARAGRAPH_WORDS: usize = 8;

const MAIN_CONTAINERS: &[&str] = &[
    "main",
    "article",
    "[role=\"main\"]",
    ".content",
    "#content",
    ".post-content",
    ".entry-content",
    ".article-content",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub title: String,
    pub text: String,
}

pub fn parse(html: &str) -> Html {
    Html::parse_document(html)
}

/// `<title>`, falling back to the first `<h1>`.
pub fn title(document: &Html) -> String {
    for sel in ["title", "h1"] {
        if let Some(el) = select_first(document, sel) {
            let text = element_text(&el);
            if !text.is_empty() {
                return text;
            }
        }
    }
    String::new()
}

/// Block-level article extraction. `None` when the page has no paragraph
/// substantial enough to be an article.
pub fn extract_article(document: &Html) -> Option<Extracted> {
    let root = pick_root(document);
    let mut blocks = Vec::new();
    let mut has_paragraph = false;

    for element in root.descendants().filter_map(ElementRef::wrap) {
        let tag = element.value().name();
        if !BLOCK_TAGS.contains(&tag) {
            continue;
        }
        let (in_chrome, in_block) = placement(&element);
        if in_chrome {
            continue;
        }
        let text = element_text(&element);
        if tag == "p" && text.split_whitespace().count() >= MIN_PARAGRAPH_WORDS {
            has_paragraph = true;
        }
        // The enclosing block already carries this text.
        if in_block || text.is_empty() {
            continue;
        }
        blocks.push(text);
    }

    if !has_paragraph {
        return None;
    }
    Some(Extracted { title: title(document), text: blocks.join("\n\n") })
}

/// Strip chrome and take all text in the main container, else `<body>`.
pub fn extract_tag_strip(document: &Html) -> Extracted {
    let container = MAIN_CONTAINERS
        .iter()
        .find_map(|sel| select_first(document, sel))
        .or_else(|| select_first(document, "body"))
        .unwrap_or_else(|| document.root_element());

    let mut raw = String::new();
    for node in container.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let in_chrome = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|el| CHROME_TAGS.contains(&el.value().name()));
        if !in_chrome {
            raw.push_str(text);
            raw.push(' ');
        }
    }
    Extracted { title: title(document), text: collapse_whitespace(&raw) }
}

fn pick_root(document: &Html) -> ElementRef<'_> {
    ["article", "main", "body"]
        .iter()
        .find_map(|sel| select_first(document, sel))
        .unwrap_or_else(|| document.root_element())
}

/// `(inside page chrome, inside another block element)`.
fn placement(element: &ElementRef<'_>) -> (bool, bool) {
    let mut in_block = false;
    for el in element.ancestors().filter_map(ElementRef::wrap) {
        let name = el.value().name();
        if CHROME_TAGS.contains(&name) {
            return (true, in_block);
        }
        in_block |= BLOCK_TAGS.contains(&name);
    }
    (false, in_block)
}

fn select_first<'a>(document: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    document.select(&selector).next()
}

fn element_text(element: &ElementRef<'_>) -> String {
    let raw: String = element.text().collect::<Vec<_>>().join(" ");
    collapse_whitespace(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = r#"<html><head><title>Climate Policy Update</title></head>
        <body>
          <nav><ul><li>Home</li><li>About</li></ul></nav>
          <article>
            <h1>Climate policy in 2024</h1>
            <p>Governments agreed on a new framework for emissions reporting this year.</p>
            <ul><li>Carbon pricing expanded</li></ul>
            <p>Short one.</p>
          </article>
          <footer><p>Copyright notice and many other footer words go here today.</p></footer>
        </body></html>"#;

    #[test]
    fn article_extracts_blocks_and_skips_chrome() {
        let doc = parse(ARTICLE);
        let out = extract_article(&doc).unwrap();
        assert_eq!(out.title, "Climate Policy Update");
        assert!(out.text.starts_with("Climate policy in 2024"));
        assert!(out.text.contains("Carbon pricing expanded"));
        assert!(!out.text.contains("Home"));
        assert!(!out.text.contains("Copyright"));
    }

    #[test]
    fn nested_blocks_are_not_duplicated() {
        let doc = parse(
            "<body><blockquote><p>One quoted paragraph that has more than eight words in it.</p></blockquote></body>",
        );
        let out = extract_article(&doc).unwrap();
        assert_eq!(out.text.matches("quoted").count(), 1);
    }

    #[test]
    fn article_needs_a_real_paragraph() {
        let doc = parse("<body><div>Just a div with some text in it but no paragraph</div></body>");
        assert!(extract_article(&doc).is_none());
    }

    #[test]
    fn tag_strip_prefers_main_container_and_drops_scripts() {
        let doc = parse(
            r#"<body><div>outside</div><div id="content">inside <script>var x = 1;</script><span>text</span></div></body>"#,
        );
        let out = extract_tag_strip(&doc);
        assert_eq!(out.text, "inside text");
    }

    #[test]
    fn tag_strip_falls_back_to_body() {
        let doc = parse("<body><header>Site</header><div>plain body text</div></body>");
        assert_eq!(extract_tag_strip(&doc).text, "plain body text");
    }

    #[test]
    fn title_falls_back_to_h1() {
        let doc = parse("<body><h1>Heading</h1></body>");
        assert_eq!(title(&doc), "Heading");
    }
}
