//! HTML Sanitizer
//!
//! Removes everything that has no place in a text rendition of a content
//! document: scripts, styles, images and figures are dropped with their whole
//! subtree, and only the `href` and `title` attributes survive on the
//! remaining elements.
//!
//! The input is parsed as an HTML5 document, so malformed markup is repaired
//! the same way a browser would repair it. The output is serialized in a form
//! that parses back into the same tree, which makes [sanitize] idempotent.

use log::debug;
use scraper::{ElementRef, Html, Node};

/// Elements removed together with their content
const REMOVED_ELEMENTS: [&str; 5] = ["script", "style", "img", "svg", "figure"];

/// The only attributes kept on surviving elements
const KEPT_ATTRIBUTES: [&str; 2] = ["href", "title"];

const VOID_ELEMENTS: [&str; 16] = [
    "area", "base", "basefont", "bgsound", "br", "col", "embed", "frame", "hr", "img", "input",
    "keygen", "link", "meta", "source", "wbr",
];

/// Elements whose text content is serialized without escaping
const RAW_TEXT_ELEMENTS: [&str; 7] = [
    "script", "style", "xmp", "iframe", "noembed", "noframes", "noscript",
];

/// Sanitizes one HTML document
///
/// # Parameters
/// - `html`: The document markup, as read from the archive
///
/// # Return
/// The serialized sanitized document. Comments and processing instructions
/// are not carried over; the doctype is.
pub fn sanitize(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut output = String::with_capacity(html.len());

    for child in document.tree.root().children() {
        match child.value() {
            Node::Doctype(doctype) => {
                output.push_str("<!DOCTYPE ");
                output.push_str(doctype.name());
                output.push('>');
            }

            Node::Element(_) => {
                if let Some(element) = ElementRef::wrap(child) {
                    write_element(element, &mut output);
                }
            }

            _ => {}
        }
    }

    debug!("Sanitized document: {} bytes in, {} bytes out", html.len(), output.len());
    output
}

fn write_element(element: ElementRef<'_>, output: &mut String) {
    let name = match element.value().name() {
        // nothing after a plaintext start tag is ever parsed as markup again
        "plaintext" => "pre",
        name => name,
    };
    if REMOVED_ELEMENTS.contains(&name) {
        return;
    }

    output.push('<');
    output.push_str(name);
    for key in KEPT_ATTRIBUTES {
        if let Some(value) = element.value().attr(key) {
            output.push(' ');
            output.push_str(key);
            output.push_str("=\"");
            output.push_str(&html_escape::encode_double_quoted_attribute(value));
            output.push('"');
        }
    }
    output.push('>');

    if VOID_ELEMENTS.contains(&name) {
        return;
    }

    // the parser swallows one newline right after these start tags
    if matches!(name, "pre" | "textarea" | "listing") {
        let leading_newline = element
            .children()
            .next()
            .and_then(|child| child.value().as_text())
            .is_some_and(|text| text.starts_with('\n'));
        if leading_newline {
            output.push('\n');
        }
    }

    let raw_text = RAW_TEXT_ELEMENTS.contains(&name);
    for child in element.children() {
        match child.value() {
            Node::Text(text) if raw_text => output.push_str(text),
            Node::Text(text) => output.push_str(&html_escape::encode_text(&**text)),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    write_element(child, output);
                }
            }

            // Comments and processing instructions
            _ => {}
        }
    }

    output.push_str("</");
    output.push_str(name);
    output.push('>');
}

#[cfg(test)]
mod tests {
    use crate::sanitize::sanitize;

    #[test]
    fn test_removes_non_content_elements() {
        let html = r#"<html><head><style>p { color: red }</style><script>alert(1)</script></head>
<body><p>Before</p><img src="cover.jpg" alt="Cover"/><figure><img src="a.png"/><figcaption>Caption</figcaption></figure>
<svg><circle r="1"/></svg><p>After</p></body></html>"#;

        let sanitized = sanitize(html);
        assert!(sanitized.contains("<p>Before</p>"));
        assert!(sanitized.contains("<p>After</p>"));
        for gone in ["style", "script", "alert", "img", "cover.jpg", "figure", "Caption", "svg", "circle"] {
            assert!(!sanitized.contains(gone), "{gone} survived: {sanitized}");
        }
    }

    #[test]
    fn test_strips_attributes() {
        let html = r##"<p class="x" id="p1" style="color:red">Hi <a href="https://example.com/?a=1&amp;b=2" title="Site" class="ext" target="_blank">there</a> <a href="#n1" id="r1">1</a></p>"##;

        let sanitized = sanitize(html);
        assert!(sanitized.contains("<p>Hi "));
        assert!(sanitized.contains(r#"<a href="https://example.com/?a=1&amp;b=2" title="Site">there</a>"#));
        assert!(sanitized.contains(r##"<a href="#n1">1</a>"##));
        assert!(!sanitized.contains("class"));
        assert!(!sanitized.contains("target"));
    }

    #[test]
    fn test_drops_comments_keeps_doctype() {
        let html = "<!DOCTYPE html><html><body><!-- note --><p>Text</p></body></html>";

        let sanitized = sanitize(html);
        assert!(sanitized.starts_with("<!DOCTYPE html>"));
        assert!(!sanitized.contains("note"));
    }

    #[test]
    fn test_keeps_text_escaped() {
        let sanitized = sanitize("<p>1 &lt; 2 &amp;&amp; Война &gt; мир</p>");
        assert!(sanitized.contains("<p>1 &lt; 2 &amp;&amp; Война &gt; мир</p>"));
    }

    #[test]
    fn test_malformed_markup_is_tolerated() {
        let sanitized = sanitize("<p>Unclosed <b>bold<p>Next");
        assert!(sanitized.contains("<b>bold</b>"));
        assert!(sanitized.contains("Next"));
    }

    #[test]
    fn test_plaintext_becomes_preformatted_text() {
        let sanitized = sanitize("<p>a</p><plaintext><b>x</b></plaintext>");
        assert!(sanitized.contains("<pre>&lt;b&gt;x&lt;/b&gt;&lt;/plaintext&gt;</pre>"));
        assert!(sanitized.ends_with("</pre></body></html>"));
    }

    #[test]
    fn test_idempotence() {
        let inputs = [
            "",
            "plain text",
            "<!DOCTYPE html><html lang=\"ru\"><head><title>T &amp; T</title></head><body><p class=\"a\">x</p></body></html>",
            "<p>Unclosed <b>bold<p>Next <img src=a.png>",
            "<table><tr><td>1</td><td>2</td></tr></table><ul><li>a<li>b</ul>",
            "<pre>\n\nindented\n  code</pre><textarea>\nfirst</textarea>",
            "<div><noscript><p>&lt;raw&gt;</p></noscript><br/><hr></div>",
            "<a href=\"x.html\" title='q\"uote'>link</a><!-- c --><?pi x?>",
            "<math><mi>x</mi></math><figure><p>gone</p></figure>",
            "<plaintext><b>x</b>",
            "<p>before</p><plaintext>\n<i>raw</i> & </plaintext> tail",
        ];

        for input in inputs {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "not idempotent for {input:?}");
        }
    }
}
