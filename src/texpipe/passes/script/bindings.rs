//! The Lua face of the tree and the pipeline
//!
//! Globals installed into every script interpreter:
//!
//! - `TextTree.new(kind?)` and `TextTree.create{kind=, attributes=, children=}`
//! - `create_pass(name)`, returning a pass object or nil
//! - `config`, a snapshot of the configuration store
//! - `read_file(path)`, parsing another document into a tree
//! - `print(...)`, redirected to stderr so it never mixes with output
//!
//! Trees are shared, not copied: a node handed to Lua is the same node the
//! pipeline holds, and changes made in Lua are visible on return.

use std::io::Write;
use std::rc::Rc;

use mlua::{
    FromLua, Function, IntoLua, Lua, MetaMethod, Table, UserData, UserDataFields, UserDataMethods,
    UserDataRef, Value, Variadic,
};

use crate::texpipe::config::ConfigValue;
use crate::texpipe::context::PipelineContext;
use crate::texpipe::passes::tex::{dump_tree, render_tex};
use crate::texpipe::passes::{OutputPass, PassError, PassHandle};
use crate::texpipe::scanner::{self, ScanError};
use crate::texpipe::source::Severity;
use crate::texpipe::tree::{Child, Node};

/// Install the globals listed in the module docs
pub fn install(lua: &Lua, ctx: &PipelineContext) -> mlua::Result<()> {
    let globals = lua.globals();

    let text_tree = lua.create_table()?;
    text_tree.set(
        "new",
        lua.create_function(|_, kind: Option<String>| {
            Ok(kind.map_or_else(Node::new, Node::with_kind))
        })?,
    )?;
    text_tree.set("create", lua.create_function(|_, table: Table| create_from_table(table))?)?;
    globals.set("TextTree", text_tree)?;

    globals.set(
        "create_pass",
        lua.create_function(|lua, name: String| {
            let ctx = context(lua)?;
            match ctx.registry.create(&name, &ctx) {
                None => Ok(None),
                Some(Ok(pass)) => Ok(Some(LuaPass(pass))),
                Some(Err(err)) => Err(into_lua_error(err)),
            }
        })?,
    )?;

    let config = lua.create_table()?;
    for (key, value) in ctx.config.iter() {
        match value {
            ConfigValue::Bool(b) => config.set(key, *b)?,
            ConfigValue::Number(n) => config.set(key, *n)?,
            ConfigValue::String(s) => config.set(key, s.as_str())?,
        }
    }
    globals.set("config", config)?;

    globals.set(
        "read_file",
        lua.create_function(|lua, path: String| {
            let ctx = context(lua)?;
            scanner::read_file(&ctx.sources, &path).map_err(scan_error)
        })?,
    )?;

    globals.set(
        "print",
        lua.create_function(|lua, args: Variadic<Value>| {
            let tostring: Function = lua.globals().get("tostring")?;
            let mut line = String::new();
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    line.push('\t');
                }
                let text: mlua::String = tostring.call(arg.clone())?;
                line.push_str(&text.to_string_lossy());
            }
            line.push('\n');
            let _ = std::io::stderr().lock().write_all(line.as_bytes());
            Ok(())
        })?,
    )?;

    Ok(())
}

/// The context this interpreter was created for
fn context(lua: &Lua) -> mlua::Result<Rc<PipelineContext>> {
    lua.app_data_ref::<Rc<PipelineContext>>()
        .map(|ctx| Rc::clone(&ctx))
        .ok_or_else(|| mlua::Error::runtime("interpreter has no pipeline context"))
}

/// Convert a pass failure so that fatal diagnostics stay recognisable
pub(crate) fn into_lua_error(err: PassError) -> mlua::Error {
    match err {
        PassError::Script(err) => err,
        PassError::Fatal(fatal) => mlua::Error::external(fatal),
        other => mlua::Error::external(other),
    }
}

fn scan_error(err: ScanError) -> mlua::Error {
    match err {
        ScanError::Fatal(fatal) => mlua::Error::external(fatal),
        other => mlua::Error::external(other),
    }
}

fn report(lua: &Lua, node: &Node, message: &str, severity: Severity) -> mlua::Result<()> {
    let ctx = context(lua)?;
    ctx.sources
        .report_range(node.source_range(), message, severity)
        .map_err(mlua::Error::external)
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl IntoLua for Child {
    fn into_lua(self, lua: &Lua) -> mlua::Result<Value> {
        match self {
            Child::Text(text) => text.into_lua(lua),
            Child::Node(node) => node.into_lua(lua),
        }
    }
}

impl FromLua for Child {
    fn from_lua(value: Value, _lua: &Lua) -> mlua::Result<Self> {
        match value {
            Value::String(text) => Ok(Child::Text(text.to_str()?.to_string())),
            Value::Integer(i) => Ok(Child::Text(i.to_string())),
            Value::Number(n) => Ok(Child::Text(n.to_string())),
            Value::UserData(ud) => Ok(Child::Node(ud.borrow::<Node>()?.clone())),
            other => Err(mlua::Error::runtime(format!(
                "expected a string or a tree, got {}",
                other.type_name()
            ))),
        }
    }
}

/// What a visitor returned: nil removes the child, a table is a list of
/// replacements, anything else is a single replacement.
fn children_from_lua(lua: &Lua, value: Value) -> mlua::Result<Vec<Child>> {
    match value {
        Value::Nil => Ok(Vec::new()),
        Value::Table(list) => list.sequence_values::<Child>().collect(),
        other => Ok(vec![Child::from_lua(other, lua)?]),
    }
}

fn attribute_text(value: Value) -> mlua::Result<String> {
    match value {
        Value::String(s) => Ok(s.to_str()?.to_string()),
        Value::Integer(i) => Ok(i.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Boolean(b) => Ok(b.to_string()),
        other => Err(mlua::Error::runtime(format!(
            "attribute values must be strings, numbers or booleans, got {}",
            other.type_name()
        ))),
    }
}

/// Build a tree from `{kind=, attributes=, children=}`. A table without a
/// kind yields nil.
fn create_from_table(table: Table) -> mlua::Result<Option<Node>> {
    let Some(kind) = table.get::<Option<String>>("kind")? else {
        return Ok(None);
    };
    let node = Node::with_kind(kind);

    if let Some(attributes) = table.get::<Option<Table>>("attributes")? {
        let mut pairs = attributes
            .pairs::<String, Value>()
            .map(|pair| pair.and_then(|(key, value)| Ok((key, attribute_text(value)?))))
            .collect::<mlua::Result<Vec<_>>>()?;
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, value) in pairs {
            node.set_attribute(key, value);
        }
    }

    if let Some(children) = table.get::<Option<Table>>("children")? {
        for child in children.sequence_values::<Value>() {
            match child? {
                Value::String(text) => node.append_text(&text.to_str()?),
                Value::UserData(ud) => {
                    let child = ud.borrow::<Node>()?.clone();
                    node.append_child(child).map_err(mlua::Error::external)?;
                }
                Value::Table(nested) => {
                    if let Some(child) = create_from_table(nested)? {
                        node.append_child(child).map_err(mlua::Error::external)?;
                    }
                }
                other => {
                    return Err(mlua::Error::runtime(format!(
                        "tree children must be strings, trees or tables, got {}",
                        other.type_name()
                    )))
                }
            }
        }
    }

    Ok(Some(node))
}

// ============================================================================
// NODES
// ============================================================================

impl UserData for Node {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("kind", |_, this| Ok(this.kind()));
        fields.add_field_method_set("kind", |_, this, kind: String| {
            this.set_kind(kind);
            Ok(())
        });
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Eq, |_, this, other: UserDataRef<Node>| {
            Ok(this.ptr_eq(&other))
        });
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| Ok(render_tex(this)));

        // Structure
        methods.add_method("is_empty", |_, this, ()| Ok(this.is_empty()));
        methods.add_method("length", |_, this, ()| Ok(this.length()));
        methods.add_method("text", |_, this, ()| Ok(this.text()));
        methods.add_method("children", |_, this, ()| Ok(this.children()));
        methods.add_method("parent", |_, this, ()| Ok(this.parent()));
        methods.add_method("new_child", |_, this, kind: Option<String>| {
            let child = this.new_child();
            if let Some(kind) = kind {
                child.set_kind(kind);
            }
            Ok(child)
        });
        methods.add_method("append_text", |_, this, text: String| {
            this.append_text(&text);
            Ok(())
        });
        methods.add_method("append_child", |_, this, child: Child| {
            this.append_child(child).map_err(mlua::Error::external)
        });
        methods.add_method("remove_child", |_, this, child: UserDataRef<Node>| {
            Ok(this.remove_child(&child))
        });
        methods.add_method("extract_children", |_, this, ()| Ok(this.extract_children()));
        methods.add_method("take_children", |_, this, other: UserDataRef<Node>| {
            this.take_children(&other).map_err(mlua::Error::external)
        });
        methods.add_method("clear", |_, this, ()| {
            this.clear();
            Ok(())
        });
        methods.add_method("shallow_clone", |_, this, ()| Ok(this.shallow_clone()));
        methods.add_method("deep_clone", |_, this, ()| Ok(this.deep_clone()));

        // Text editing; `insert_text` counts from 1 like Lua strings do
        methods.add_method("insert_text", |_, this, (index, text): (usize, String)| {
            let index = index
                .checked_sub(1)
                .ok_or_else(|| mlua::Error::runtime("insert_text positions start at 1"))?;
            this.insert_text(index, &text).map_err(mlua::Error::external)
        });
        methods.add_method("split_at_byte_index", |_, this, index: usize| {
            this.split_at_byte_index(index).map_err(mlua::Error::external)
        });
        methods.add_method("find_string", |_, this, needle: String| Ok(this.find_string(&needle)));

        // Traversal
        methods.add_method("visit", |lua, this, visitor: Function| {
            this.try_visit(|child| children_from_lua(lua, visitor.call::<Value>(child)?))
        });
        methods.add_method("match", |lua, this, (kind, visitor): (String, Function)| {
            this.try_match_kind(&kind, |node: Node| {
                children_from_lua(lua, visitor.call::<Value>(node)?)
            })
        });
        methods.add_method(
            "match_any",
            |lua, this, (kinds, visitor): (Vec<String>, Function)| {
                let kinds: Vec<&str> = kinds.iter().map(String::as_str).collect();
                this.try_match_any(&kinds, |node: Node| {
                    children_from_lua(lua, visitor.call::<Value>(node)?)
                })
            },
        );

        // Attributes
        methods.add_method("attribute", |_, this, name: String| Ok(this.attribute(&name)));
        methods.add_method("has_attribute", |_, this, name: String| {
            Ok(this.has_attribute(&name))
        });
        methods.add_method("attribute_set", |_, this, (name, value): (String, Value)| {
            this.set_attribute(name, attribute_text(value)?);
            Ok(())
        });
        methods.add_method("attribute_erase", |_, this, name: String| {
            Ok(this.remove_attribute(&name).is_some())
        });
        methods.add_method("attributes", |lua, this, ()| lua.create_table_from(this.attributes()));

        // Sources and diagnostics
        methods.add_method("source_file_name", |lua, this, ()| {
            let ctx = context(lua)?;
            let start = ctx.sources.expand(this.source_range().start);
            Ok(ctx.sources.file_name(start.file_id))
        });
        methods.add_method("source_directory_name", |lua, this, ()| {
            let ctx = context(lua)?;
            Ok(ctx
                .sources
                .directory_of(this.source_range().start)
                .unwrap_or_else(|| ".".to_string()))
        });
        methods.add_method("warning", |lua, this, message: String| {
            report(lua, this, &message, Severity::Warning)
        });
        methods.add_method("error", |lua, this, message: String| {
            report(lua, this, &message, Severity::Error)
        });
        methods.add_method("fatal_error", |lua, this, message: String| {
            report(lua, this, &message, Severity::Fatal)
        });
        methods.add_method("dump", |_, this, ()| {
            dump_tree(this);
            Ok(())
        });
    }
}

// ============================================================================
// PASSES
// ============================================================================

/// A pass created from Lua with `create_pass`
pub struct LuaPass(pub PassHandle);

impl LuaPass {
    fn with_output<R>(&self, f: impl FnOnce(&mut dyn OutputPass) -> R) -> mlua::Result<R> {
        let mut pass = self
            .0
            .try_borrow_mut()
            .map_err(|_| mlua::Error::runtime("pass is already running"))?;
        let name = pass.name().to_string();
        match pass.as_output_pass() {
            Some(output) => Ok(f(output)),
            None => Err(mlua::Error::runtime(format!("{name} is not an output pass"))),
        }
    }
}

impl UserData for LuaPass {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("name", |_, this, ()| {
            let pass = this
                .0
                .try_borrow()
                .map_err(|_| mlua::Error::runtime("pass is already running"))?;
            Ok(pass.name().to_string())
        });
        methods.add_method("process", |_, this, tree: UserDataRef<Node>| {
            let mut pass = this
                .0
                .try_borrow_mut()
                .map_err(|_| mlua::Error::runtime("pass is already running"))?;
            pass.process(Node::clone(&tree)).map_err(into_lua_error)
        });
        methods.add_method("as_output_pass", |_, this, ()| {
            let is_output = this.with_output(|_| ()).is_ok();
            Ok(is_output.then(|| LuaPass(Rc::clone(&this.0))))
        });
        methods.add_method("output_file", |_, this, path: String| {
            this.with_output(|output| output.output_file(path.as_ref()))?
                .map_err(into_lua_error)
        });
        methods.add_method("output_stdout", |_, this, ()| {
            this.with_output(|output| output.output_stdout())
        });
        methods.add_method("output_stderr", |_, this, ()| {
            this.with_output(|output| output.output_stderr())
        });
    }
}
