//! Inspection session: owns the buffer and layout, publishes decode snapshots.
//!
//! The session is the only writer. Every successful decode produces a new immutable
//! [`Snapshot`] that observers receive; a failed decode reports the error together
//! with the last good snapshot. That snapshot stays readable, but patching waits
//! until the current buffer decodes again.

use crate::ast::Layout;
use crate::codec::DecodeError;
use crate::config::EngineConfig;
use crate::decode::decode_with;
use crate::flatten::{flatten, FieldIndex, FieldRecord};
use crate::node::ParsedNode;
use crate::parser::parse;
use crate::patch::{apply, patch_path, PatchError, PatchRequest};
use crate::registry::Registry;
use crate::value::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Patch(#[from] PatchError),
    #[error("no layout has been set")]
    NoLayout,
    #[error("no successful decode to patch against")]
    NotDecoded,
}

/// One successful decode: the tree and its flattened fields.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub generation: u64,
    pub tree: Arc<ParsedNode>,
    pub fields: Arc<[FieldRecord]>,
    index: Arc<FieldIndex>,
}

impl Snapshot {
    fn new(generation: u64, tree: ParsedNode) -> Self {
        let fields: Arc<[FieldRecord]> = flatten(&tree).into();
        let index = Arc::new(FieldIndex::build(&fields));
        Snapshot {
            generation,
            tree: Arc::new(tree),
            fields,
            index,
        }
    }

    /// Leaf field whose byte range contains `offset`.
    pub fn field_at(&self, offset: usize) -> Option<&FieldRecord> {
        self.index.lookup(offset).and_then(|i| self.fields.get(i))
    }

    pub fn field(&self, path: &str) -> Option<&FieldRecord> {
        crate::flatten::find(&self.fields, path)
    }
}

#[derive(Debug, Clone)]
pub enum Update {
    Decoded(Snapshot),
    Failed {
        error: DecodeError,
        last_good: Option<Snapshot>,
    },
}

/// Receives every update a session publishes.
pub trait Observer: Send {
    fn on_update(&mut self, update: &Update);
}

impl<F: FnMut(&Update) + Send> Observer for F {
    fn on_update(&mut self, update: &Update) {
        self(update)
    }
}

pub struct Session {
    registry: Registry,
    config: EngineConfig,
    layout_text: Option<String>,
    layout: Option<Layout>,
    data: Option<Vec<u8>>,
    snapshot: Option<Snapshot>,
    // Whether `snapshot` describes the bytes in `data`.
    decoded: bool,
    generation: u64,
    observers: Vec<Box<dyn Observer>>,
}

impl Session {
    pub fn new(config: EngineConfig) -> Self {
        Session::with_registry(Registry::standard(), config)
    }

    pub fn with_registry(registry: Registry, config: EngineConfig) -> Self {
        Session {
            registry,
            config,
            layout_text: None,
            layout: None,
            data: None,
            snapshot: None,
            decoded: false,
            generation: 0,
            observers: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn layout_text(&self) -> Option<&str> {
        self.layout_text.as_deref()
    }

    pub fn layout(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }

    /// Compile and install a layout definition, then re-decode a loaded buffer.
    /// A definition that does not parse leaves the previous layout in place.
    pub fn set_layout(&mut self, text: &str) -> Result<(), SessionError> {
        let layout = parse(text, &self.registry).map_err(|e| {
            warn!(error = %e, "layout rejected");
            e
        })?;
        self.layout_text = Some(text.to_string());
        self.set_compiled_layout(layout)
    }

    /// Install a layout built with the programmatic builders.
    pub fn set_compiled_layout(&mut self, layout: Layout) -> Result<(), SessionError> {
        self.layout = Some(layout);
        self.decoded = false;
        if self.data.is_some() {
            self.redecode()?;
        }
        Ok(())
    }

    /// Replace the buffer and decode it if a layout is set.
    pub fn load(&mut self, bytes: Vec<u8>) -> Result<(), SessionError> {
        debug!(len = bytes.len(), "buffer loaded");
        self.data = Some(bytes);
        self.decoded = false;
        if self.layout.is_some() {
            self.redecode()?;
        }
        Ok(())
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        info!(path = %path.display(), len = bytes.len(), "read target file");
        self.load(bytes)
    }

    /// Full decode of the current buffer; publishes the outcome to observers.
    pub fn redecode(&mut self) -> Result<Snapshot, SessionError> {
        let layout = self.layout.as_ref().ok_or(SessionError::NoLayout)?;
        let buf = self.data.as_deref().unwrap_or_default();
        match decode_with(layout, buf, &self.config) {
            Ok(tree) => {
                self.generation += 1;
                let snapshot = Snapshot::new(self.generation, tree);
                debug!(generation = self.generation, fields = snapshot.fields.len(), "published snapshot");
                self.snapshot = Some(snapshot.clone());
                self.decoded = true;
                self.publish(&Update::Decoded(snapshot.clone()));
                Ok(snapshot)
            }
            Err(error) => {
                self.decoded = false;
                let update = Update::Failed {
                    error: error.clone(),
                    last_good: self.snapshot.clone(),
                };
                self.publish(&update);
                Err(error.into())
            }
        }
    }

    /// Patch the field at `path` in place, then re-decode.
    pub fn patch(&mut self, path: &str, value: &Value) -> Result<Snapshot, SessionError> {
        let fields = self.current_fields()?;
        let buf = self.data.as_deref_mut().ok_or(SessionError::NotDecoded)?;
        patch_path(buf, &fields, path, value, self.config.patch_policy)?;
        self.redecode()
    }

    /// Apply a tree-view edit request, then re-decode.
    pub fn apply(&mut self, request: &PatchRequest) -> Result<Snapshot, SessionError> {
        let fields = self.current_fields()?;
        let buf = self.data.as_deref_mut().ok_or(SessionError::NotDecoded)?;
        apply(buf, &fields, request, self.config.patch_policy)?;
        self.redecode()
    }

    /// Fields of a decode of the buffer as it is now. The last good snapshot of
    /// an earlier buffer does not count: its offsets describe other bytes.
    fn current_fields(&self) -> Result<Arc<[FieldRecord]>, SessionError> {
        self.snapshot
            .as_ref()
            .filter(|_| self.decoded)
            .map(|s| Arc::clone(&s.fields))
            .ok_or(SessionError::NotDecoded)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let path = path.as_ref();
        std::fs::write(path, self.buffer())?;
        info!(path = %path.display(), len = self.buffer().len(), "wrote buffer");
        Ok(())
    }

    pub fn buffer(&self) -> &[u8] {
        self.data.as_deref().unwrap_or_default()
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn subscribe(&mut self, observer: impl Observer + 'static) {
        self.observers.push(Box::new(observer));
    }

    fn publish(&mut self, update: &Update) {
        for observer in &mut self.observers {
            observer.on_update(update);
        }
    }
}
