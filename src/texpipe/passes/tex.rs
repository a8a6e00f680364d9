//! TeX-style output
//!
//! Writes a tree back out in the markup the scanner reads, so that scanning
//! the output of this pass gives back an equivalent tree:
//!
//! - a node renders as `\kind[key=value,...]{body}`
//! - the argument list is left out when there are no attributes
//! - an anonymous node without attributes contributes only its body
//! - text escapes `\`, `}` and `%`
//!
//! Comments and the exact whitespace of the input are not preserved.

use std::io::Write;

use crate::texpipe::tree::{Child, Node};

use super::{OutputPass, OutputSink, Pass, PassError};

/// Render a subtree as markup
pub fn render_tex(node: &Node) -> String {
    let mut out = String::new();
    write_node(&mut out, node);
    out
}

/// Print a subtree to stderr, for debugging
pub fn dump_tree(node: &Node) {
    let mut text = render_tex(node);
    text.push('\n');
    // Debug output only; a closed stderr is not worth failing over.
    let _ = std::io::stderr().lock().write_all(text.as_bytes());
}

fn write_node(out: &mut String, node: &Node) {
    let kind = node.kind();
    let attributes = node.attributes();
    let transparent = kind.is_empty() && attributes.is_empty();
    if !transparent {
        out.push('\\');
        out.push_str(&kind);
        if !attributes.is_empty() {
            out.push('[');
            for (index, (key, value)) in attributes.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(key);
                if !value.is_empty() {
                    out.push('=');
                    write_value(out, value);
                }
            }
            out.push(']');
        }
        out.push('{');
    }
    for child in node.children() {
        match child {
            Child::Text(text) => write_text(out, &text),
            Child::Node(child) => write_node(out, &child),
        }
    }
    if !transparent {
        out.push('}');
    }
}

fn needs_quotes(value: &str) -> bool {
    value.contains([',', ']', '"', '\\']) || value.trim() != value
}

fn write_value(out: &mut String, value: &str) {
    if !needs_quotes(value) {
        out.push_str(value);
        return;
    }
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

fn write_text(out: &mut String, text: &str) {
    for c in text.chars() {
        if matches!(c, '\\' | '}' | '%') {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Writes the tree as markup
#[derive(Debug, Default)]
pub struct TeXOutputPass {
    sink: OutputSink,
}

impl TeXOutputPass {
    pub const NAME: &'static str = "TeXOutputPass";

    pub fn new() -> Self {
        Self::default()
    }
}

impl Pass for TeXOutputPass {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn process(&mut self, tree: Node) -> Result<Node, PassError> {
        let rendered = render_tex(&tree);
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

impl OutputPass for TeXOutputPass {
    fn sink_mut(&mut self) -> &mut OutputSink {
        &mut self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn renders_nested_commands() {
        let root = Node::new();
        root.append_text("see ");
        let a = root.new_child();
        a.set_kind("a");
        a.set_attribute("x", "1");
        a.set_attribute("y", "a,b");
        a.set_attribute("flag", "");
        a.append_text("body");
        let br = a.new_child();
        br.set_kind("br");
        insta::assert_snapshot!(render_tex(&root), @r#"see \a[x=1,y="a,b",flag]{body\br{}}"#);
    }

    #[test]
    fn anonymous_node_with_attributes_keeps_brackets() {
        let node = Node::new();
        node.set_attribute("k", "v");
        node.append_text("x");
        assert_eq!(render_tex(&node), r"\[k=v]{x}");
    }

    #[rstest]
    #[case("plain", "plain")]
    #[case("a,b", r#""a,b""#)]
    #[case("x]y", r#""x]y""#)]
    #[case(" padded", r#"" padded""#)]
    #[case(r#"say "hi""#, r#""say \"hi\"""#)]
    #[case(r"back\slash", r#""back\\slash""#)]
    fn quotes_values_when_needed(#[case] value: &str, #[case] expected: &str) {
        let mut out = String::new();
        write_value(&mut out, value);
        assert_eq!(out, expected);
    }

    #[rstest]
    #[case(r"a\b", r"a\\b")]
    #[case("50%", r"50\%")]
    #[case("}", r"\}")]
    #[case("{ok", "{ok")]
    fn escapes_text(#[case] text: &str, #[case] expected: &str) {
        let mut out = String::new();
        write_text(&mut out, text);
        assert_eq!(out, expected);
    }

    #[test]
    fn pass_writes_to_its_sink() {
        let mut pass = TeXOutputPass::new();
        *pass.sink_mut() = OutputSink::Buffer(Vec::new());
        let tree = Node::with_kind("b");
        tree.append_text("bold");
        let tree = pass.process(tree).unwrap();
        assert_eq!(tree.text(), "bold");
        assert_eq!(pass.sink.buffered(), Some(&br"\b{bold}"[..]));
    }
}
