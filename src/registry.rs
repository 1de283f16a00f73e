//! Named combinator constructors available to layout definitions.
//!
//! A [`Registry`] maps a type name (`Int16ul`, `Struct`, `Bytes`, ...) to a
//! [`Constructor`]. Each constructor declares its parameter kinds, which tells the
//! layout parser whether an argument is a value expression, a nested layout or a list
//! of named members. Leaf constructors always return [`Layout::Tracked`].
//!
//! | Name | Parameters |
//! |------|------------|
//! | `Int{8,16,32,64}{u,s}{b,l}`, `Byte` | none |
//! | `Float{32,64}{b,l}`, `Single`, `Double` | none |
//! | `Flag`, `GreedyBytes` | none |
//! | `Bytes` | length expression |
//! | `PaddedString` | length expression, optional encoding |
//! | `PascalString` | integer layout, optional encoding |
//! | `CString`, `GreedyString` | optional encoding |
//! | `Const` | byte-string literal |
//! | `Struct` | `"name" / Layout` members |
//! | `Sequence` | layouts |
//! | `Array` | count expression, layout |
//! | `Computed` | expression |
//! | `If`, `Conditional` | predicate expression, layout |
//! | `Rebuild` | layout, expression (decodes as the layout) |

use crate::ast::{Expr, Layout, Leaf, Member};
use crate::codec::{Encoding, Endianness, FloatFormat, IntFormat};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// How the parser should lower one argument of a constructor call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Restricted expression evaluated at decode time.
    Expr,
    Layout,
    /// All remaining arguments, each `"name" / Layout`.
    Members,
    /// All remaining arguments, each a layout.
    Layouts,
    /// Optional encoding name literal; defaults to utf8.
    Encoding,
}

impl ParamKind {
    pub fn is_variadic(&self) -> bool {
        matches!(self, ParamKind::Members | ParamKind::Layouts)
    }
}

/// A lowered constructor argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Expr(Expr),
    Layout(Layout),
    Members(Vec<Member>),
    Layouts(Vec<Layout>),
    Encoding(Encoding),
}

impl Arg {
    fn kind(&self) -> ParamKind {
        match self {
            Arg::Expr(_) => ParamKind::Expr,
            Arg::Layout(_) => ParamKind::Layout,
            Arg::Members(_) => ParamKind::Members,
            Arg::Layouts(_) => ParamKind::Layouts,
            Arg::Encoding(_) => ParamKind::Encoding,
        }
    }
}

/// Arguments handed to a build function, already checked against its parameter kinds.
pub struct Args(std::vec::IntoIter<Arg>);

impl Args {
    pub fn expr(&mut self) -> Result<Expr, String> {
        match self.0.next() {
            Some(Arg::Expr(e)) => Ok(e),
            other => Err(format!("expected an expression argument, got {:?}", other.map(|a| a.kind()))),
        }
    }

    pub fn layout(&mut self) -> Result<Layout, String> {
        match self.0.next() {
            Some(Arg::Layout(l)) => Ok(l),
            other => Err(format!("expected a layout argument, got {:?}", other.map(|a| a.kind()))),
        }
    }

    pub fn members(&mut self) -> Result<Vec<Member>, String> {
        match self.0.next() {
            Some(Arg::Members(m)) => Ok(m),
            other => Err(format!("expected named members, got {:?}", other.map(|a| a.kind()))),
        }
    }

    pub fn layouts(&mut self) -> Result<Vec<Layout>, String> {
        match self.0.next() {
            Some(Arg::Layouts(l)) => Ok(l),
            other => Err(format!("expected layouts, got {:?}", other.map(|a| a.kind()))),
        }
    }

    pub fn encoding(&mut self) -> Result<Encoding, String> {
        match self.0.next() {
            Some(Arg::Encoding(e)) => Ok(e),
            other => Err(format!("expected an encoding, got {:?}", other.map(|a| a.kind()))),
        }
    }
}

pub type BuildFn = dyn Fn(&mut Args) -> Result<Layout, String> + Send + Sync;

#[derive(Clone)]
pub struct Constructor {
    params: Vec<ParamKind>,
    build: Arc<BuildFn>,
}

impl Constructor {
    pub fn new<F>(params: Vec<ParamKind>, build: F) -> Self
    where
        F: Fn(&mut Args) -> Result<Layout, String> + Send + Sync + 'static,
    {
        Constructor {
            params,
            build: Arc::new(build),
        }
    }

    /// A parameterless constructor that always yields `layout`.
    pub fn fixed(layout: Layout) -> Self {
        Constructor::new(Vec::new(), move |_| Ok(layout.clone()))
    }

    pub fn params(&self) -> &[ParamKind] {
        &self.params
    }

    /// Parameter kind for the `index`-th call argument, or `None` when there are too many.
    pub fn param_at(&self, index: usize) -> Option<ParamKind> {
        match self.params.get(index) {
            Some(kind) => Some(*kind),
            None => self.params.last().copied().filter(ParamKind::is_variadic),
        }
    }

    /// Check `args` against the declared parameters, fill in defaults and build.
    pub fn call(&self, args: Vec<Arg>) -> Result<Layout, String> {
        let mut given = args.into_iter().peekable();
        let mut checked = Vec::with_capacity(self.params.len());
        for kind in &self.params {
            let next_matches = given.peek().map(|a| a.kind() == *kind).unwrap_or(false);
            if next_matches {
                checked.extend(given.next());
                continue;
            }
            match kind {
                ParamKind::Encoding => checked.push(Arg::Encoding(Encoding::default())),
                ParamKind::Members => checked.push(Arg::Members(Vec::new())),
                ParamKind::Layouts => checked.push(Arg::Layouts(Vec::new())),
                ParamKind::Expr | ParamKind::Layout => {
                    return Err(match given.peek() {
                        Some(a) => format!("expected {:?} argument, got {:?}", kind, a.kind()),
                        None => format!("missing {:?} argument", kind),
                    })
                }
            }
        }
        if given.next().is_some() {
            return Err(format!("takes at most {} argument(s)", self.params.len()));
        }
        (self.build)(&mut Args(checked.into_iter()))
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor").field("params", &self.params).finish()
    }
}

/// Name to constructor table passed explicitly to the layout parser.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: HashMap<String, Constructor>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Registry::default()
    }

    /// Registry with every built-in primitive and structural combinator.
    pub fn standard() -> Self {
        let mut reg = Registry::new();

        for width in [1u8, 2, 4, 8] {
            for signed in [false, true] {
                for endianness in [Endianness::Big, Endianness::Little] {
                    let fmt = IntFormat::new(width, signed, endianness);
                    reg.register(fmt.to_string(), Constructor::fixed(Layout::leaf(Leaf::Int(fmt))));
                }
            }
        }
        for width in [4u8, 8] {
            for endianness in [Endianness::Big, Endianness::Little] {
                let fmt = FloatFormat::new(width, endianness);
                reg.register(fmt.to_string(), Constructor::fixed(Layout::leaf(Leaf::Float(fmt))));
            }
        }
        reg.register("Flag", Constructor::fixed(Layout::leaf(Leaf::Flag)));
        reg.register("GreedyBytes", Constructor::fixed(Layout::leaf(Leaf::GreedyBytes)));

        reg.register(
            "Bytes",
            Constructor::new(vec![ParamKind::Expr], |a| Ok(Layout::leaf(Leaf::Bytes(a.expr()?)))),
        );
        reg.register(
            "PaddedString",
            Constructor::new(vec![ParamKind::Expr, ParamKind::Encoding], |a| {
                let length = a.expr()?;
                let encoding = a.encoding()?;
                Ok(Layout::leaf(Leaf::PaddedString { length, encoding }))
            }),
        );
        reg.register(
            "PascalString",
            Constructor::new(vec![ParamKind::Layout, ParamKind::Encoding], |a| {
                let prefix = match a.layout()? {
                    Layout::Tracked(t) => match t.leaf() {
                        Leaf::Int(fmt) => *fmt,
                        _ => return Err("PascalString length prefix must be an integer type".to_string()),
                    },
                    _ => return Err("PascalString length prefix must be an integer type".to_string()),
                };
                let encoding = a.encoding()?;
                Ok(Layout::leaf(Leaf::PascalString { prefix, encoding }))
            }),
        );
        reg.register(
            "CString",
            Constructor::new(vec![ParamKind::Encoding], |a| {
                Ok(Layout::leaf(Leaf::CString { encoding: a.encoding()? }))
            }),
        );
        reg.register(
            "GreedyString",
            Constructor::new(vec![ParamKind::Encoding], |a| {
                Ok(Layout::leaf(Leaf::GreedyString { encoding: a.encoding()? }))
            }),
        );
        reg.register(
            "Const",
            Constructor::new(vec![ParamKind::Expr], |a| match a.expr()? {
                Expr::Literal(Value::Bytes(b)) => Ok(Layout::leaf(Leaf::Const(b))),
                Expr::Literal(Value::Str(s)) => Ok(Layout::leaf(Leaf::Const(s.into_bytes()))),
                other => Err(format!("Const needs a byte-string literal, got `{}`", other)),
            }),
        );

        reg.register(
            "Struct",
            Constructor::new(vec![ParamKind::Members], |a| Ok(Layout::Struct(a.members()?))),
        );
        reg.register(
            "Sequence",
            Constructor::new(vec![ParamKind::Layouts], |a| Ok(Layout::Sequence(a.layouts()?))),
        );
        reg.register(
            "Array",
            Constructor::new(vec![ParamKind::Expr, ParamKind::Layout], |a| {
                let count = a.expr()?;
                let element = a.layout()?;
                Ok(Layout::array(count, element))
            }),
        );
        reg.register(
            "Computed",
            Constructor::new(vec![ParamKind::Expr], |a| Ok(Layout::computed(a.expr()?))),
        );
        let conditional = Constructor::new(vec![ParamKind::Expr, ParamKind::Layout], |a| {
            let predicate = a.expr()?;
            let inner = a.layout()?;
            Ok(Layout::conditional(predicate, inner))
        });
        reg.register("If", conditional.clone());
        reg.register("Conditional", conditional);
        // The rebuild expression only matters when building; decoding reads the inner layout.
        reg.register(
            "Rebuild",
            Constructor::new(vec![ParamKind::Layout, ParamKind::Expr], |a| {
                let inner = a.layout()?;
                a.expr()?;
                Ok(inner)
            }),
        );

        reg.register(
            "Byte",
            Constructor::fixed(Layout::leaf(Leaf::Int(IntFormat::new(1, false, Endianness::Big)))),
        );
        reg.register(
            "Single",
            Constructor::fixed(Layout::leaf(Leaf::Float(FloatFormat::new(4, Endianness::Big)))),
        );
        reg.register(
            "Double",
            Constructor::fixed(Layout::leaf(Leaf::Float(FloatFormat::new(8, Endianness::Big)))),
        );
        reg
    }

    /// Add or replace a constructor.
    pub fn register(&mut self, name: impl Into<String>, ctor: Constructor) {
        self.entries.insert(name.into(), ctor);
    }

    /// Make `alias` resolve to the constructor currently registered as `target`.
    pub fn alias(&mut self, alias: impl Into<String>, target: &str) -> Result<(), String> {
        let ctor = self
            .lookup(target)
            .cloned()
            .ok_or_else(|| format!("unknown type `{}`", target))?;
        self.register(alias, ctor);
        Ok(())
    }

    /// Alias a whole layout under a new name, e.g. a protocol header reused by several
    /// definitions.
    pub fn define(&mut self, name: impl Into<String>, layout: Layout) {
        self.register(name, Constructor::fixed(layout));
    }

    pub fn lookup(&self, name: &str) -> Option<&Constructor> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Build `name` from already-lowered arguments.
    pub fn construct(&self, name: &str, args: Vec<Arg>) -> Result<Layout, String> {
        let ctor = self
            .lookup(name)
            .ok_or_else(|| format!("unknown type `{}`", name))?;
        ctor.call(args).map_err(|e| format!("{}: {}", name, e))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
