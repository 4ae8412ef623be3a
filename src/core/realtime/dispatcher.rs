//! Tool dispatch.
//!
//! Executes function calls requested by the assistant against the backend and
//! relays every result, success or failure, back over the logical channel as
//! a `function_call_output` followed by `response.create`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use super::base::{DataChannel, SessionCallbacks};
use super::messages::{ClientEvent, ConversationItem, FunctionCallItem};
use super::session::StateHandle;
use super::transcript::{ChatMessage, Transcript};
use super::visual::{self, VisualState};
use crate::core::backend::{BackendClient, FunctionCallRequest};
use crate::errors::{SessionError, ToolExecutionError};

/// Tools whose outputs carry device listings.
pub const DEVICE_TOOLS: &[&str] = &[
    "search_devices_by_attributes",
    "get_device_details",
    "compare_devices",
    "get_similar_devices",
];

const ACCESSORIES_TOOL: &str = "get_compatible_accessories";
const ADD_TO_CART_TOOL: &str = "add_to_cart";
const CART_SUMMARY_TOOL: &str = "get_cart_summary";
const CART_REFRESH_CALL_ID: &str = "cart_refresh";

/// Send an event, ignoring failures.
///
/// Sends race with teardown; a closed channel is expected and only logged.
pub async fn send_quietly(channel: &Arc<dyn DataChannel>, event: &ClientEvent) -> bool {
    if !channel.is_open() {
        debug!("Dropping {} on closed channel", event.event_type());
        return false;
    }

    let payload = match event.to_json() {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Failed to encode {}: {}", event.event_type(), e);
            return false;
        }
    };

    match channel.send_text(payload).await {
        Ok(()) => true,
        Err(e) => {
            debug!("Ignoring send failure for {}: {}", event.event_type(), e);
            false
        }
    }
}

/// Executes function calls and relays their outputs.
pub struct ToolDispatcher {
    state: Arc<StateHandle>,
    backend: BackendClient,
    transcript: Transcript,
    visuals: VisualState,
    callbacks: Arc<SessionCallbacks>,
    tool_timeout: Option<Duration>,
}

impl ToolDispatcher {
    pub fn new(
        state: Arc<StateHandle>,
        backend: BackendClient,
        transcript: Transcript,
        visuals: VisualState,
        callbacks: Arc<SessionCallbacks>,
        tool_timeout: Option<Duration>,
    ) -> Self {
        Self {
            state,
            backend,
            transcript,
            visuals,
            callbacks,
            tool_timeout,
        }
    }

    /// Dispatch one function call of session attempt `generation` to completion.
    ///
    /// Sends exactly one `function_call_output` for the call while the attempt
    /// is live. Once the attempt has been torn down the call has no further
    /// effect on the transcript, visuals or callbacks.
    pub async fn dispatch(
        &self,
        generation: u64,
        channel: &Arc<dyn DataChannel>,
        call: FunctionCallItem,
    ) {
        if !self.state.is_current(generation) {
            debug!("Skipping {} from ended session attempt {}", call.name, generation);
            return;
        }
        info!("Model requested function: {}", call.name);

        self.transcript
            .append(ChatMessage::tool_call(&call.name, call.arguments.clone()))
            .await;

        let request = FunctionCallRequest {
            name: call.name.clone(),
            call_id: call.call_id.clone(),
            arguments: call.arguments,
        };

        let result = self.execute(&request).await;
        if !self.state.is_current(generation) {
            debug!(
                "Discarding result of {} from ended session attempt {}",
                request.name, generation
            );
            return;
        }

        match result {
            Ok(output) => {
                let content =
                    serde_json::to_string_pretty(&output).unwrap_or_else(|_| output.to_string());
                self.transcript
                    .append(ChatMessage::tool_result(&request.name, content))
                    .await;

                if let Some(visual) = visual::extract(&output) {
                    debug!("Visual update from {}", request.name);
                    self.visuals.publish(visual).await;
                }
                self.publish_products(&request.name, &output).await;
                self.update_cart(generation, &request.name, &output).await;

                self.send_output(channel, &request.call_id, &output).await;
                info!("Provided output for {}", request.name);
            }
            Err(err) => {
                warn!("Function {} failed: {}", request.name, err);
                let message = err.to_string();

                self.send_output(channel, &request.call_id, &json!({ "error": &message }))
                    .await;
                self.transcript
                    .append(ChatMessage::tool_result(&request.name, message))
                    .await;

                let context = format!("Failed to execute {}", request.name);
                self.callbacks
                    .emit_error(
                        SessionError::ToolExecution {
                            name: request.name,
                            source: err,
                        },
                        context,
                    )
                    .await;
            }
        }
    }

    async fn execute(&self, request: &FunctionCallRequest) -> Result<Value, ToolExecutionError> {
        match self.tool_timeout {
            Some(limit) => {
                tokio::time::timeout(limit, self.backend.execute_function(request))
                    .await
                    .map_err(|_| ToolExecutionError::Timeout(limit.as_millis() as u64))?
            }
            None => self.backend.execute_function(request).await,
        }
    }

    async fn send_output(&self, channel: &Arc<dyn DataChannel>, call_id: &str, output: &Value) {
        let item = ClientEvent::ConversationItemCreate {
            item: ConversationItem::function_call_output(call_id, output),
        };
        if send_quietly(channel, &item).await {
            send_quietly(channel, &ClientEvent::ResponseCreate).await;
            debug!("Sent function_call_output for call {}", call_id);
        }
    }

    async fn publish_products(&self, name: &str, output: &Value) {
        if !self.callbacks.has_products() {
            return;
        }
        if let Some(products) = discovered_products(name, output) {
            debug!("{} product(s) discovered by {}", products.len(), name);
            self.callbacks.emit_products(products).await;
        }
    }

    async fn update_cart(&self, generation: u64, name: &str, output: &Value) {
        if !self.callbacks.has_cart() {
            return;
        }

        if name == ADD_TO_CART_TOOL && is_truthy(output.get("cart_count")) {
            let refresh = FunctionCallRequest {
                name: CART_SUMMARY_TOOL.to_string(),
                call_id: CART_REFRESH_CALL_ID.to_string(),
                arguments: json!({ "session_id": "default" }),
            };
            match self.execute(&refresh).await {
                Ok(cart) if self.state.is_current(generation) => {
                    self.callbacks.emit_cart(cart).await
                }
                Ok(_) => debug!("Dropping cart refresh for ended session attempt"),
                Err(e) => warn!("Failed to refresh cart: {}", e),
            }
        } else if name == CART_SUMMARY_TOOL {
            self.callbacks.emit_cart(output.clone()).await;
        }
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

fn array_field(output: &Value, key: &str) -> Vec<Value> {
    output
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Products to publish for a tool output, if the tool lists any.
pub fn discovered_products(name: &str, output: &Value) -> Option<Vec<Value>> {
    if name == ACCESSORIES_TOOL {
        let accessories = output.get("accessories")?.as_array()?;
        return Some(accessories.iter().map(as_accessory_product).collect());
    }

    if !DEVICE_TOOLS.contains(&name) {
        return None;
    }

    let products = match name {
        "search_devices_by_attributes" | "compare_devices" => array_field(output, "devices"),
        "get_device_details" if is_truthy(output.get("id")) => vec![output.clone()],
        "get_similar_devices" => ["cheaper_options", "similar_price", "premium_options"]
            .iter()
            .flat_map(|key| array_field(output, key))
            .collect(),
        _ => Vec::new(),
    };

    (!products.is_empty()).then_some(products)
}

/// Accessories are one-time purchases shown alongside devices.
fn as_accessory_product(accessory: &Value) -> Value {
    let mut product = accessory.as_object().cloned().unwrap_or_default();
    product.insert("price_monthly".to_string(), json!(0));
    product.insert("brand".to_string(), json!("Accessory"));
    product.insert("attributes".to_string(), Value::Object(Map::new()));
    Value::Object(product)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SessionResult;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct RecordingChannel {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DataChannel for RecordingChannel {
        fn label(&self) -> &str {
            "test"
        }

        fn is_open(&self) -> bool {
            true
        }

        async fn send_text(&self, payload: String) -> SessionResult<()> {
            self.sent.lock().push(payload);
            Ok(())
        }

        async fn close(&self) -> SessionResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_call_from_ended_attempt_is_ignored() {
        let state = Arc::new(StateHandle::new());
        let generation = state.begin().unwrap();
        let transcript = Transcript::new();
        let dispatcher = ToolDispatcher::new(
            state.clone(),
            BackendClient::new("http://127.0.0.1:9").unwrap(),
            transcript.clone(),
            VisualState::new(),
            Arc::new(SessionCallbacks::default()),
            None,
        );
        let recording = Arc::new(RecordingChannel {
            sent: Mutex::new(Vec::new()),
        });
        let channel: Arc<dyn DataChannel> = recording.clone();

        state.invalidate();
        dispatcher
            .dispatch(
                generation,
                &channel,
                FunctionCallItem {
                    call_id: "call_1".to_string(),
                    name: "get_plans".to_string(),
                    arguments: json!({}),
                },
            )
            .await;

        assert!(transcript.is_empty());
        assert!(recording.sent.lock().is_empty());
    }

    #[test]
    fn test_search_devices_products() {
        let output = json!({"devices": [{"id": "a"}, {"id": "b"}]});
        let products = discovered_products("search_devices_by_attributes", &output).unwrap();
        assert_eq!(products.len(), 2);
    }

    #[test]
    fn test_device_details_requires_id() {
        let output = json!({"id": "pixel", "name": "Pixel"});
        assert_eq!(
            discovered_products("get_device_details", &output).unwrap(),
            vec![output]
        );
        assert!(discovered_products("get_device_details", &json!({"error": "x"})).is_none());
    }

    #[test]
    fn test_similar_devices_concatenated_in_order() {
        let output = json!({
            "premium_options": [{"id": "p"}],
            "cheaper_options": [{"id": "c"}],
            "similar_price": [{"id": "s"}]
        });
        let ids: Vec<_> = discovered_products("get_similar_devices", &output)
            .unwrap()
            .into_iter()
            .map(|p| p["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["c", "s", "p"]);
    }

    #[test]
    fn test_accessories_are_normalized() {
        let output = json!({"accessories": [{"id": "case", "price": 20, "brand": "Acme"}]});
        let products = discovered_products("get_compatible_accessories", &output).unwrap();
        assert_eq!(products[0]["id"], "case");
        assert_eq!(products[0]["price_monthly"], 0);
        assert_eq!(products[0]["brand"], "Accessory");
        assert_eq!(products[0]["attributes"], json!({}));
    }

    #[test]
    fn test_other_tools_have_no_products() {
        assert!(discovered_products("add_to_cart", &json!({"devices": [1]})).is_none());
        assert!(discovered_products("compare_devices", &json!({"devices": []})).is_none());
    }

    #[test]
    fn test_truthiness() {
        assert!(is_truthy(Some(&json!(3))));
        assert!(!is_truthy(Some(&json!(0))));
        assert!(!is_truthy(None));
        assert!(is_truthy(Some(&json!({}))));
    }
}
