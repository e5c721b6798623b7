//! Figure modules and the cache that keeps them loaded between jobs.

use anyhow::{Context as _, Result, anyhow};
use log::{debug, info};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::fs::{read_dir, read_to_string};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::JobError;

/// Anything that can produce one sized SVG document.
pub trait FigureModule: Send + Sync {
    /// Produce the serialized document. The module decides its own size via
    /// the root element's `width`/`height`.
    ///
    /// # Errors
    ///
    /// Any failure is reported to the caller as a render error.
    fn produce(&self) -> Result<String>;
}

impl<F> FigureModule for F
where
    F: Fn() -> Result<String> + Send + Sync,
{
    fn produce(&self) -> Result<String> {
        self()
    }
}

/// Resolves figure ids to freshly loaded modules.
pub trait FigureLoader: Send + Sync {
    /// Load the module for `figure_id` from backing storage.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids, `RenderError` if the backing data is unreadable.
    fn load(&self, figure_id: &str) -> Result<Arc<dyn FigureModule>, JobError>;

    /// Every id this loader can resolve, sorted.
    fn list_ids(&self) -> Vec<String>;
}

/// Reject ids that could escape the figure root.
fn validate_id(figure_id: &str) -> Result<(), JobError> {
    let valid = !figure_id.is_empty()
        && !figure_id.starts_with('/')
        && !figure_id.contains('\\')
        && !figure_id.contains(':')
        && figure_id
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if valid {
        Ok(())
    } else {
        Err(JobError::NotFound(figure_id.to_owned()))
    }
}

/// Escape `text` for use as XML character data or an attribute value.
fn escape_markup(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        match character {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// An SVG template with `{{key}}` placeholders filled from companion data.
pub struct TemplateFigure {
    template: String,
    data: Map<String, JsonValue>,
}

impl TemplateFigure {
    #[must_use]
    pub const fn new(template: String, data: Map<String, JsonValue>) -> Self {
        Self { template, data }
    }
}

impl FigureModule for TemplateFigure {
    fn produce(&self) -> Result<String> {
        let mut document = self.template.clone();
        for (key, value) in &self.data {
            let replacement = match value {
                JsonValue::String(text) => escape_markup(text),
                JsonValue::Number(number) => number.to_string(),
                JsonValue::Bool(flag) => flag.to_string(),
                JsonValue::Null => String::new(),
                JsonValue::Array(_) | JsonValue::Object(_) => {
                    return Err(anyhow!("companion value `{key}` is not a scalar"));
                }
            };
            document = document.replace(&format!("{{{{{key}}}}}"), &replacement);
        }
        Ok(document)
    }
}

/// Figures stored on disk as `<root>/<category>/<name>.svg`, with optional
/// companion data in `<root>/<category>/<name>.json`.
pub struct FigureDirectory {
    root: PathBuf,
}

impl FigureDirectory {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_companion(path: &Path) -> Result<Map<String, JsonValue>> {
        let text = match read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == IoErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => return Err(err).with_context(|| format!("reading {}", path.display())),
        };
        let value: JsonValue = serde_json::from_str(&text)
            .with_context(|| format!("parsing companion data {}", path.display()))?;
        match value {
            JsonValue::Object(map) => Ok(map),
            _ => Err(anyhow!(
                "companion data {} must be a JSON object",
                path.display()
            )),
        }
    }

    fn collect_ids(&self, dir: &Path, out: &mut Vec<String>) {
        let Ok(entries) = read_dir(dir) else {
            return;
        };
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            if path.is_dir() {
                self.collect_ids(&path, out);
            } else if path
                .extension()
                .is_some_and(|ext| ext == "svg")
                && let Ok(relative) = path.with_extension("").strip_prefix(&self.root)
            {
                let segments: Vec<String> = relative
                    .components()
                    .map(|part| part.as_os_str().to_string_lossy().into_owned())
                    .collect();
                out.push(segments.join("/"));
            }
        }
    }
}

impl FigureLoader for FigureDirectory {
    fn load(&self, figure_id: &str) -> Result<Arc<dyn FigureModule>, JobError> {
        validate_id(figure_id)?;
        let template_path = self.root.join(format!("{figure_id}.svg"));
        let template = match read_to_string(&template_path) {
            Ok(text) => text,
            Err(err) if err.kind() == IoErrorKind::NotFound => {
                return Err(JobError::NotFound(figure_id.to_owned()));
            }
            Err(err) => {
                return Err(JobError::RenderError(format!(
                    "reading {}: {err}",
                    template_path.display()
                )));
            }
        };
        let data = Self::read_companion(&self.root.join(format!("{figure_id}.json")))
            .map_err(|err| JobError::render(&err))?;
        debug!(
            "[FIGURE] loaded {figure_id} ({} bytes, {} data keys)",
            template.len(),
            data.len()
        );
        Ok(Arc::new(TemplateFigure::new(template, data)))
    }

    fn list_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        self.collect_ids(&self.root, &mut ids);
        ids.sort();
        ids
    }
}

/// Programmatically registered figure modules.
#[derive(Default)]
pub struct FigureRegistry {
    modules: RwLock<HashMap<String, Arc<dyn FigureModule>>>,
}

impl FigureRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the module behind `figure_id`.
    pub fn register<F>(&self, figure_id: impl Into<String>, produce: F)
    where
        F: Fn() -> Result<String> + Send + Sync + 'static,
    {
        self.insert(figure_id, Arc::new(produce));
    }

    pub fn insert(&self, figure_id: impl Into<String>, module: Arc<dyn FigureModule>) {
        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(figure_id.into(), module);
    }
}

impl FigureLoader for FigureRegistry {
    fn load(&self, figure_id: &str) -> Result<Arc<dyn FigureModule>, JobError> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(figure_id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(figure_id.to_owned()))
    }

    fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

/// Loaded modules keyed by figure id.
///
/// A cached module keeps producing what it produced when it was loaded;
/// [`FigureCache::invalidate`] forces the next resolve back to storage.
pub struct FigureCache {
    loader: Arc<dyn FigureLoader>,
    modules: HashMap<String, Arc<dyn FigureModule>>,
}

impl FigureCache {
    #[must_use]
    pub fn new(loader: Arc<dyn FigureLoader>) -> Self {
        Self {
            loader,
            modules: HashMap::new(),
        }
    }

    /// Return the cached module, loading it first if needed. `reload`
    /// invalidates the entry beforehand.
    ///
    /// # Errors
    ///
    /// Propagates the loader's `NotFound`/`RenderError`.
    pub fn resolve(
        &mut self,
        figure_id: &str,
        reload: bool,
    ) -> Result<Arc<dyn FigureModule>, JobError> {
        if reload && self.invalidate(figure_id) {
            info!("[FIGURE] reloading {figure_id}");
        }
        if let Some(module) = self.modules.get(figure_id) {
            return Ok(Arc::clone(module));
        }
        let module = self.loader.load(figure_id)?;
        self.modules
            .insert(figure_id.to_owned(), Arc::clone(&module));
        Ok(module)
    }

    /// Drop the cached entry. Returns whether one existed.
    pub fn invalidate(&mut self, figure_id: &str) -> bool {
        self.modules.remove(figure_id).is_some()
    }

    pub fn clear(&mut self) {
        self.modules.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
