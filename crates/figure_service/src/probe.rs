//! Geometry extraction from the loaded surface.

use anyhow::{Context as _, Result, anyhow};
use figure_layout::LayoutSnapshot;
use figure_worker::WorkerSession;
use serde_json::{Value as JsonValue, from_str, from_value};

/// Attribute that opts an element and its descendants out of overlap and
/// overflow checks.
pub const OPT_OUT_ATTRIBUTE: &str = "data-layout-ignore";

/// Shapes that may visually contain text.
pub const CONTAINER_SELECTOR: &str = "rect, path, circle, ellipse, polygon";

/// Shared helpers for the probe.
const PROBE_SCRIPT_HELPERS: &str = "function optedOut(el) {
    return !!(el.closest && el.closest('[data-layout-ignore]'));
}
function relBox(el, origin) {
    var r = el.getBoundingClientRect();
    return {
        left: r.left - origin.left,
        top: r.top - origin.top,
        right: r.right - origin.left,
        bottom: r.bottom - origin.top
    };
}
function isHidden(el) {
    var cs = window.getComputedStyle(el);
    return !cs || cs.display === 'none' || cs.visibility === 'hidden';
}
function isFilled(el) {
    var cs = window.getComputedStyle(el);
    var fill = String(cs.fill || '').toLowerCase();
    if (!fill || fill === 'none' || fill === 'transparent') return false;
    if (/rgba\\([^)]*,\\s*0\\)$/.test(fill)) return false;
    return Number(cs.fillOpacity || 1) > 0 && Number(cs.opacity || 1) > 0;
}
function labelOf(el, kind, index) {
    var text = String(el.textContent || '').replace(/\\s+/g, ' ').trim();
    if (kind === 'text' && text) return text;
    if (el.id) return '#' + el.id;
    return kind + '[' + index + ']';
}";

/// Main probe body. Read-only: it inspects the surface and mutates nothing.
const PROBE_SCRIPT_MAIN: &str = "var svg = document.querySelector('svg');
if (!svg) return JSON.stringify({ canvas: { width: 0, height: 0 }, texts: [], containers: [] });
var origin = svg.getBoundingClientRect();
var texts = [];
var textNodes = svg.querySelectorAll('text');
for (var i = 0; i < textNodes.length; i++) {
    var el = textNodes[i];
    if (el.closest('defs') || isHidden(el)) continue;
    if (!String(el.textContent || '').trim()) continue;
    texts.push({ label: labelOf(el, 'text', i), box: relBox(el, origin), optOut: optedOut(el) });
}
var containers = [];
var shapes = svg.querySelectorAll(CONTAINER_SELECTOR);
for (var j = 0; j < shapes.length; j++) {
    var shape = shapes[j];
    if (shape.closest('defs') || isHidden(shape)) continue;
    var kind = shape.tagName.toLowerCase();
    var filled = isFilled(shape);
    // Only rects count as containers when unfilled; an open path is a line.
    if (kind !== 'rect' && !filled) continue;
    containers.push({
        label: labelOf(shape, kind, j),
        box: relBox(shape, origin),
        optOut: optedOut(shape),
        filled: filled
    });
}
return JSON.stringify({
    canvas: { width: origin.width, height: origin.height },
    texts: texts,
    containers: containers
});";

fn probe_script() -> String {
    format!(
        "(function() {{ var CONTAINER_SELECTOR = '{CONTAINER_SELECTOR}'; {PROBE_SCRIPT_HELPERS} {PROBE_SCRIPT_MAIN} }})()"
    )
}

/// Decode what the probe returned: a JSON string, or an already decoded value.
///
/// # Errors
///
/// Returns an error if the value does not describe a layout snapshot.
pub fn decode_snapshot(value: JsonValue) -> Result<LayoutSnapshot> {
    match value {
        JsonValue::String(json) => from_str(&json).context("probe returned invalid JSON"),
        JsonValue::Object(_) => from_value(value).context("probe returned an unexpected shape"),
        other => Err(anyhow!("probe returned {other} instead of a snapshot")),
    }
}

/// Run the probe against the document currently loaded in `session`.
///
/// # Errors
///
/// Returns an error if evaluation fails or the result cannot be decoded.
pub async fn collect_snapshot(session: &dyn WorkerSession) -> Result<LayoutSnapshot> {
    let script = probe_script();
    let value = session.evaluate(&script).await?;
    decode_snapshot(value)
}
