//! Function calls the voice assistant may make

use serde::Deserialize;
use serde_json::json;

use crate::notify::{NotificationLevel, Notifier};
use crate::providers::{FunctionCall, FunctionDeclaration, FunctionResponse};

/// Name of the sample device-control function
pub const CONTROL_LIGHT: &str = "controlLight";

#[derive(Debug, Deserialize)]
struct ControlLightArgs {
    on: bool,
    #[serde(default)]
    color: Option<String>,
}

/// Declarations sent with the session setup
pub fn declarations() -> Vec<FunctionDeclaration> {
    vec![FunctionDeclaration {
        name: CONTROL_LIGHT.to_string(),
        description: "Turn the desk light on or off and optionally set its color.".to_string(),
        parameters: json!({
            "type": "OBJECT",
            "properties": {
                "on": {
                    "type": "BOOLEAN",
                    "description": "true to switch the light on, false to switch it off"
                },
                "color": {
                    "type": "STRING",
                    "description": "Color name such as warm white, red or blue"
                }
            },
            "required": ["on"]
        }),
    }]
}

/// Evaluates one function call and builds its correlated response
///
/// Unknown functions and malformed arguments produce an error response
/// rather than failing the session.
pub fn evaluate(call: &FunctionCall, notifier: &dyn Notifier) -> FunctionResponse {
    let response = match call.name.as_str() {
        CONTROL_LIGHT => match serde_json::from_value::<ControlLightArgs>(call.args.clone()) {
            Ok(args) => {
                let message = match (args.on, args.color.as_deref()) {
                    (true, Some(color)) if !color.trim().is_empty() => {
                        format!("Light turned on ({})", color.trim())
                    }
                    (true, _) => "Light turned on".to_string(),
                    (false, _) => "Light turned off".to_string(),
                };
                notifier.notify(&message, NotificationLevel::Success);
                json!({ "result": message })
            }
            Err(e) => json!({ "error": format!("invalid arguments: {}", e) }),
        },
        other => {
            tracing::warn!(function = other, "Model called an unknown function");
            json!({ "error": format!("unknown function: {}", other) })
        }
    };

    FunctionResponse {
        id: call.id.clone(),
        name: call.name.clone(),
        response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationCenter;
    use std::time::Duration;

    fn call(name: &str, args: serde_json::Value) -> FunctionCall {
        FunctionCall {
            id: "call-1".to_string(),
            name: name.to_string(),
            args,
        }
    }

    #[test]
    fn test_control_light_notifies_and_echoes_id() {
        let center = NotificationCenter::new(Duration::from_secs(3));
        let response = evaluate(&call(CONTROL_LIGHT, json!({"on": true, "color": "blue"})), &center);

        assert_eq!(response.id, "call-1");
        assert_eq!(response.name, CONTROL_LIGHT);
        assert_eq!(response.response["result"], "Light turned on (blue)");
        assert_eq!(center.active()[0].message, "Light turned on (blue)");
    }

    #[test]
    fn test_control_light_off_ignores_color() {
        let center = NotificationCenter::new(Duration::from_secs(3));
        let response = evaluate(&call(CONTROL_LIGHT, json!({"on": false, "color": "red"})), &center);
        assert_eq!(response.response["result"], "Light turned off");
    }

    #[test]
    fn test_bad_arguments_and_unknown_function() {
        let center = NotificationCenter::new(Duration::from_secs(3));

        let bad = evaluate(&call(CONTROL_LIGHT, json!({"color": "red"})), &center);
        assert!(bad.response["error"].as_str().unwrap().contains("invalid arguments"));

        let unknown = evaluate(&call("openDoor", json!({})), &center);
        assert_eq!(unknown.response["error"], "unknown function: openDoor");
        assert!(center.active().is_empty());
    }

    #[test]
    fn test_declaration_requires_on_flag() {
        let decls = declarations();
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].parameters["required"][0], "on");
    }
}
