//! Visual directive extraction.
//!
//! Tool outputs may carry a UI directive under the reserved [`VISUAL_KEY`].
//! The directive is normalized into a [`VisualConfig`]:
//!
//! - flexible shapes (`layout` + `sections`) pass through unchanged
//! - legacy shapes whose `type` is a reserved legacy name pass through unchanged
//! - anything else is wrapped into a single-section `flow` layout
//!
//! Only the latest directive is live; publishing replaces the previous one.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved key of the visual directive inside a tool output.
pub const VISUAL_KEY: &str = "_visual";

/// Visual types rendered by the legacy renderer.
pub const LEGACY_VISUAL_TYPES: &[&str] = &[
    "product_grid",
    "comparison_table",
    "promo_banner",
    "cart_preview",
];

/// Component used when a hint type is not recognized.
pub const FALLBACK_COMPONENT: &str = "info_callout";

/// Map a simple hint type to its component name.
pub fn component_for(hint_type: &str) -> &'static str {
    match hint_type {
        "product_grid" => "product_grid",
        "product_hero" => "product_hero",
        "plan_cards" => "plan_selector",
        "accessory_grid" => "accessory_grid",
        "price_breakdown" => "price_breakdown",
        "credit_check_status" => "credit_check_status",
        "info_callout" => "info_callout",
        "deal_grid" => "deal_grid",
        "deal_hero" => "deal_hero",
        "deal_detail_page" => "deal_detail_page",
        "deal_comparison" => "deal_comparison",
        "cart_drawer" => "cart_drawer",
        "cart_confirmation" => "cart_confirmation",
        "empty_state" => "empty_state",
        _ => FALLBACK_COMPONENT,
    }
}

// =============================================================================
// Visual Types
// =============================================================================

/// Visual weight of a section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emphasis {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Emphasis {
    pub fn as_str(&self) -> &'static str {
        match self {
            Emphasis::Low => "low",
            Emphasis::Medium => "medium",
            Emphasis::High => "high",
            Emphasis::Critical => "critical",
        }
    }

    /// Parse an emphasis name, falling back to `Medium`.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "low" => Emphasis::Low,
            "high" => Emphasis::High,
            "critical" => Emphasis::Critical,
            _ => Emphasis::Medium,
        }
    }
}

impl fmt::Display for Emphasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One section of a flexible layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualSection {
    /// Component type rendering this section
    #[serde(rename = "type")]
    pub component: String,
    /// Component data
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Raw emphasis, see [`VisualSection::emphasis`]
    #[serde(rename = "emphasis", default, skip_serializing_if = "Option::is_none")]
    pub emphasis_raw: Option<String>,
    /// Fields not modelled here (size, position, style, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VisualSection {
    /// Parsed emphasis, `Medium` when absent.
    pub fn emphasis(&self) -> Emphasis {
        self.emphasis_raw
            .as_deref()
            .map(Emphasis::from_str_or_default)
            .unwrap_or_default()
    }
}

/// Header of a flexible layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualHeader {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Composed layout of sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlexibleVisual {
    /// Layout type (flow, grid, two_column, ...)
    pub layout: String,
    pub sections: Vec<VisualSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<VisualHeader>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cta: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Visual rendered by the legacy renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyVisual {
    #[serde(rename = "type")]
    pub visual_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devices: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A normalized visual directive: exactly one of the two shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VisualConfig {
    Flexible(FlexibleVisual),
    Legacy(LegacyVisual),
}

impl VisualConfig {
    pub fn is_flexible(&self) -> bool {
        matches!(self, VisualConfig::Flexible(_))
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

// =============================================================================
// Extraction
// =============================================================================

/// Loose truthiness check for optional directive fields.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn truthy_field<'a>(raw: &'a Value, key: &str) -> Option<&'a Value> {
    raw.get(key).filter(|v| is_truthy(v))
}

fn string_field(raw: &Value, key: &str) -> Option<String> {
    truthy_field(raw, key).map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Extract and normalize the visual directive of a tool output.
///
/// Returns `None` when the output carries no directive or the directive
/// claims the flexible shape but cannot be decoded.
pub fn extract(output: &Value) -> Option<VisualConfig> {
    let raw = truthy_field(output, VISUAL_KEY)?;
    normalize(raw)
}

/// Normalize a raw visual directive.
pub fn normalize(raw: &Value) -> Option<VisualConfig> {
    if truthy_field(raw, "layout").is_some() && truthy_field(raw, "sections").is_some() {
        return match serde_json::from_value::<FlexibleVisual>(raw.clone()) {
            Ok(visual) => Some(VisualConfig::Flexible(visual)),
            Err(e) => {
                tracing::warn!("Discarding malformed flexible visual: {}", e);
                None
            }
        };
    }

    let hint_type = raw.get("type").and_then(Value::as_str);
    if let Some(hint_type) = hint_type
        && LEGACY_VISUAL_TYPES.contains(&hint_type)
    {
        match serde_json::from_value::<LegacyVisual>(raw.clone()) {
            Ok(visual) => return Some(VisualConfig::Legacy(visual)),
            Err(e) => tracing::warn!("Legacy visual did not decode, wrapping instead: {}", e),
        }
    }

    Some(VisualConfig::Flexible(wrap(raw, hint_type.unwrap_or_default())))
}

/// Wrap a simple hint into a single-section `flow` layout.
fn wrap(raw: &Value, hint_type: &str) -> FlexibleVisual {
    let data = match truthy_field(raw, "items") {
        Some(items) => {
            let mut map = Map::new();
            map.insert("items".to_string(), items.clone());
            Value::Object(map)
        }
        None => truthy_field(raw, "data").unwrap_or(raw).clone(),
    };

    let title = string_field(raw, "title");
    let emphasis = string_field(raw, "emphasis").unwrap_or_else(|| Emphasis::Medium.to_string());

    let header = title.clone().map(|title| VisualHeader {
        title,
        subtitle: string_field(raw, "subtitle"),
        extra: Map::new(),
    });

    FlexibleVisual {
        layout: "flow".to_string(),
        sections: vec![VisualSection {
            component: component_for(hint_type).to_string(),
            data,
            title,
            emphasis_raw: Some(emphasis),
            extra: Map::new(),
        }],
        header,
        footer: None,
        cta: None,
        animation: Some("fade".to_string()),
        extra: Map::new(),
    }
}

// =============================================================================
// Latest Visual
// =============================================================================

/// Callback type for published visuals.
pub type VisualCallback =
    Arc<dyn Fn(VisualConfig) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Holder of the single live visual.
#[derive(Clone, Default)]
pub struct VisualState {
    current: Arc<ArcSwapOption<VisualConfig>>,
    on_update: Arc<RwLock<Option<VisualCallback>>>,
}

impl VisualState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_on_update(&self, callback: VisualCallback) {
        *self.on_update.write() = Some(callback);
    }

    /// Replace the live visual and notify the callback.
    pub async fn publish(&self, visual: VisualConfig) {
        self.current.store(Some(Arc::new(visual.clone())));
        let callback = self.on_update.read().clone();
        if let Some(callback) = callback {
            callback(visual).await;
        }
    }

    /// The live visual, if any.
    pub fn current(&self) -> Option<Arc<VisualConfig>> {
        self.current.load_full()
    }

    pub fn clear(&self) {
        self.current.store(None);
    }
}

impl fmt::Debug for VisualState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisualState")
            .field("has_visual", &self.current().is_some())
            .finish()
    }
}
