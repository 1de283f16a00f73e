//! Evaluation scopes binding already-decoded sibling fields.

use crate::value::Value;

/// One scope of decoded names. Child scopes fall back to their parent on lookup.
///
/// A scope lives only as long as the struct (or array element) decode that created
/// it; nothing in the result tree keeps a reference to it.
#[derive(Debug, Default)]
pub struct Context<'p> {
    parent: Option<&'p Context<'p>>,
    entries: Vec<(String, Value)>,
    // Array element scopes only carry `_index`; `this._` steps over them.
    element: bool,
}

impl<'p> Context<'p> {
    pub fn root() -> Context<'static> {
        Context::default()
    }

    pub fn child(parent: &'p Context<'p>) -> Context<'p> {
        Context {
            parent: Some(parent),
            entries: Vec::new(),
            element: false,
        }
    }

    /// Scope for array element `index`, binding `_index`.
    pub fn element(parent: &'p Context<'p>, index: usize) -> Context<'p> {
        let mut scope = Context {
            parent: Some(parent),
            entries: Vec::new(),
            element: true,
        };
        scope.bind("_index", Value::I64(index as i64));
        scope
    }

    pub fn parent(&self) -> Option<&'p Context<'p>> {
        self.parent
    }

    /// The scope `this._` refers to: the parent of the enclosing struct scope.
    pub fn outer(&self) -> Option<&Context<'p>> {
        let mut scope: &Context<'p> = self;
        while scope.element {
            scope = scope.parent?;
        }
        let mut outer = scope.parent?;
        while outer.element {
            outer = outer.parent?;
        }
        Some(outer)
    }

    /// Bind `name` in this scope, replacing an earlier binding of the same name.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get_local(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Innermost-first lookup through the scope chain.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        let mut scope = Some(self);
        while let Some(s) = scope {
            if let Some(v) = s.get_local(name) {
                return Some(v);
            }
            scope = s.parent;
        }
        None
    }

    /// This scope's own bindings as a struct value (what a bare `this` evaluates to).
    pub fn to_value(&self) -> Value {
        Value::Struct(self.entries.clone())
    }

    pub fn depth(&self) -> usize {
        let mut n = 0;
        let mut scope = self.parent;
        while let Some(s) = scope {
            n += 1;
            scope = s.parent;
        }
        n
    }
}
