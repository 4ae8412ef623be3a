//! Wire types of the VoiceCare backend API.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use zeroize::Zeroizing;

// =============================================================================
// Tools
// =============================================================================

/// A tool definition exposed to the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool type, always "function" today
    #[serde(rename = "type", default = "default_tool_type")]
    pub tool_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema of the arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_tool_type() -> String {
    "function".to_string()
}

/// Response of `GET /tools`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCatalog {
    #[serde(default, deserialize_with = "null_as_default")]
    pub tools: Vec<ToolDefinition>,
    #[serde(default = "default_tool_choice", deserialize_with = "null_as_tool_choice")]
    pub tool_choice: String,
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self {
            tools: Vec::new(),
            tool_choice: default_tool_choice(),
        }
    }
}

impl ToolCatalog {
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }
}

fn default_tool_choice() -> String {
    "auto".to_string()
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_tool_choice<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_tool_choice))
}

// =============================================================================
// Session
// =============================================================================

/// Body of `POST /session`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRequest {
    pub deployment: String,
    pub voice: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
}

/// Short-lived credential for the signaling endpoint.
///
/// Zeroed on drop and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct EphemeralKey(Zeroizing<String>);

impl EphemeralKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(Zeroizing::new(key.into()))
    }

    /// Raw key for the `Authorization` header.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for EphemeralKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EphemeralKey(***)")
    }
}

impl<'de> Deserialize<'de> for EphemeralKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(EphemeralKey::new)
    }
}

/// Proactive recommendation attached to a known customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type", default, deserialize_with = "display_string")]
    pub recommendation_type: String,
    #[serde(default, deserialize_with = "display_string")]
    pub priority: String,
    #[serde(default, deserialize_with = "display_string")]
    pub title: String,
    #[serde(default, deserialize_with = "display_string")]
    pub talking_point: String,
    /// Monthly savings in GBP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_savings: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Accept strings, numbers or null for free-text fields.
fn display_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Response of `POST /session`.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionGrant {
    pub session_id: String,
    pub ephemeral_key: EphemeralKey,
    /// Signaling endpoint for the SDP exchange
    pub webrtc_url: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub proactive_recommendations: Vec<Recommendation>,
}

// =============================================================================
// Function Calls
// =============================================================================

/// Body of `POST /function-call`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionCallRequest {
    pub name: String,
    pub call_id: String,
    pub arguments: Value,
}

/// Response of `POST /function-call`.
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionCallResponse {
    #[serde(default)]
    pub output: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_catalog_defaults() {
        let catalog: ToolCatalog = serde_json::from_value(json!({})).unwrap();
        assert!(catalog.tools.is_empty());
        assert_eq!(catalog.tool_choice, "auto");

        let catalog: ToolCatalog =
            serde_json::from_value(json!({"tools": null, "tool_choice": null})).unwrap();
        assert!(catalog.tools.is_empty());
        assert_eq!(catalog.tool_choice, "auto");
    }

    #[test]
    fn test_tool_definition_roundtrip_keeps_unknown_fields() {
        let raw = json!({
            "type": "function",
            "name": "get_cart_summary",
            "description": "Cart",
            "parameters": {"type": "object"},
            "strict": true
        });
        let tool: ToolDefinition = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(tool.extra.get("strict"), Some(&json!(true)));
        assert_eq!(serde_json::to_value(&tool).unwrap(), raw);
    }

    #[test]
    fn test_session_request_omits_missing_account() {
        let req = SessionRequest {
            deployment: "gpt-realtime-2".to_string(),
            voice: "ballad".to_string(),
            account_number: None,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert!(value.get("account_number").is_none());
    }

    #[test]
    fn test_ephemeral_key_is_redacted() {
        let grant: SessionGrant = serde_json::from_value(json!({
            "session_id": "s1",
            "ephemeral_key": "ek_secret",
            "webrtc_url": "https://example.com/rtc",
            "proactive_recommendations": null
        }))
        .unwrap();

        assert_eq!(grant.ephemeral_key.expose(), "ek_secret");
        assert!(!format!("{grant:?}").contains("ek_secret"));
        assert!(grant.proactive_recommendations.is_empty());
    }

    #[test]
    fn test_recommendation_accepts_numeric_priority() {
        let rec: Recommendation = serde_json::from_value(json!({
            "type": "upgrade",
            "priority": 1,
            "title": "Upgrade",
            "talking_point": "Save money",
            "estimated_savings": 12.5
        }))
        .unwrap();
        assert_eq!(rec.priority, "1");
        assert_eq!(rec.estimated_savings, Some(12.5));
    }
}
