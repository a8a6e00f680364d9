//! HTML and XML output
//!
//! Each named node becomes an element of the same name, with its attributes
//! rendered as `key="value"`. Anonymous nodes contribute only their children.
//!
//! The two styles differ in how empty elements close:
//!
//! - XML self-closes any element without children: `<img src="a.png"/>`
//! - HTML never closes a void element (`img`, `br`, ...), and writes an
//!   explicit closing tag for every other element, empty or not.

use std::io::Write;

use crate::texpipe::tree::{Child, Node};

use super::{OutputPass, OutputSink, Pass, PassError};

/// Elements that HTML never closes
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "command", "embed", "hr", "img", "input", "keygen", "link",
    "meta", "param", "source", "track", "wbr",
];

pub fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupStyle {
    Html,
    Xml,
}

impl MarkupStyle {
    pub fn pass_name(self) -> &'static str {
        match self {
            MarkupStyle::Html => "HTMLOutputPass",
            MarkupStyle::Xml => "XMLOutputPass",
        }
    }
}

/// Render a subtree as HTML or XML
pub fn render_markup(node: &Node, style: MarkupStyle) -> String {
    let mut out = String::new();
    write_node(&mut out, node, style);
    out
}

fn write_node(out: &mut String, node: &Node, style: MarkupStyle) {
    let kind = node.kind();
    let children = node.children();
    if kind.is_empty() {
        write_children(out, &children, style);
        return;
    }

    out.push('<');
    out.push_str(&kind);
    for (key, value) in node.attributes() {
        out.push(' ');
        out.push_str(&key);
        out.push_str("=\"");
        match style {
            MarkupStyle::Xml => escape_into(out, &value),
            MarkupStyle::Html => out.push_str(&value.replace('"', "&quot;")),
        }
        out.push('"');
    }

    if style == MarkupStyle::Xml && children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    write_children(out, &children, style);
    if style == MarkupStyle::Xml || !is_void_element(&kind) {
        out.push_str("</");
        out.push_str(&kind);
        out.push('>');
    }
}

fn write_children(out: &mut String, children: &[Child], style: MarkupStyle) {
    for child in children {
        match child {
            Child::Text(text) => escape_into(out, text),
            Child::Node(node) => write_node(out, node, style),
        }
    }
}

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

/// Writes the tree as HTML or XML
#[derive(Debug)]
pub struct MarkupOutputPass {
    style: MarkupStyle,
    sink: OutputSink,
}

impl MarkupOutputPass {
    pub fn new(style: MarkupStyle) -> Self {
        Self {
            style,
            sink: OutputSink::default(),
        }
    }

    pub fn html() -> Self {
        Self::new(MarkupStyle::Html)
    }

    pub fn xml() -> Self {
        Self::new(MarkupStyle::Xml)
    }
}

impl Pass for MarkupOutputPass {
    fn name(&self) -> &str {
        self.style.pass_name()
    }

    fn process(&mut self, tree: Node) -> Result<Node, PassError> {
        let rendered = render_markup(&tree, self.style);
        let target = self.sink.describe();
        self.sink
            .write_all(rendered.as_bytes())
            .and_then(|()| self.sink.flush())
            .map_err(|err| PassError::io(format!("writing to {target}"), err))?;
        Ok(tree)
    }

    fn as_output_pass(&mut self) -> Option<&mut dyn OutputPass> {
        Some(self)
    }
}

impl OutputPass for MarkupOutputPass {
    fn sink_mut(&mut self) -> &mut OutputSink {
        &mut self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn image() -> Node {
        let img = Node::with_kind("img");
        img.set_attribute("src", "a.png");
        img
    }

    #[test]
    fn img_is_void_in_html_and_self_closed_in_xml() {
        assert_eq!(render_markup(&image(), MarkupStyle::Html), r#"<img src="a.png">"#);
        assert_eq!(render_markup(&image(), MarkupStyle::Xml), r#"<img src="a.png"/>"#);
    }

    #[rstest]
    #[case("br", true)]
    #[case("wbr", true)]
    #[case("source", true)]
    #[case("p", false)]
    #[case("div", false)]
    fn void_elements(#[case] name: &str, #[case] void: bool) {
        assert_eq!(is_void_element(name), void);
    }

    #[test]
    fn empty_non_void_element_is_closed_in_html() {
        let div = Node::with_kind("div");
        assert_eq!(render_markup(&div, MarkupStyle::Html), "<div></div>");
        assert_eq!(render_markup(&div, MarkupStyle::Xml), "<div/>");
    }

    #[test]
    fn anonymous_nodes_are_transparent() {
        let root = Node::new();
        root.append_text("a < b & c");
        let p = root.new_child();
        p.set_kind("p");
        p.set_attribute("title", r#"say "x" & <y>"#);
        p.append_text("\"q\"");
        insta::assert_snapshot!(render_markup(&root, MarkupStyle::Html), @r#"a &lt; b &amp; c<p title="say &quot;x&quot; & <y>">&quot;q&quot;</p>"#);
        insta::assert_snapshot!(render_markup(&root, MarkupStyle::Xml), @r#"a &lt; b &amp; c<p title="say &quot;x&quot; &amp; &lt;y&gt;">&quot;q&quot;</p>"#);
    }

    #[test]
    fn pass_names_follow_style() {
        assert_eq!(MarkupOutputPass::html().name(), "HTMLOutputPass");
        assert_eq!(MarkupOutputPass::xml().name(), "XMLOutputPass");
    }

    #[test]
    fn pass_writes_to_buffer() {
        let mut pass = MarkupOutputPass::xml();
        pass.output_stderr();
        *pass.sink_mut() = OutputSink::Buffer(Vec::new());
        pass.process(image()).unwrap();
        assert_eq!(pass.sink.buffered(), Some(&br#"<img src="a.png"/>"#[..]));
    }
}
