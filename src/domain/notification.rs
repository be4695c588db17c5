//! Notification payload handed to an app at launch

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A notification that triggered (or was pending for) an app launch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Raw notification body, usually JSON text supplied by the sender
    pub body: String,
    pub notification_id: i64,
    pub is_multiple: bool,
    pub remote: bool,
    pub action_id: Option<String>,
    pub user_text: Option<String>,
}

impl Notification {
    /// Create a local notification with the given body
    pub fn new(body: impl Into<String>, notification_id: i64) -> Self {
        Self {
            body: body.into(),
            notification_id,
            is_multiple: false,
            remote: false,
            action_id: None,
            user_text: None,
        }
    }

    /// Mark as a remote (push) notification
    pub fn remote(mut self) -> Self {
        self.remote = true;
        self
    }

    /// Attach the action the user picked
    pub fn with_action(mut self, action_id: impl Into<String>, user_text: Option<String>) -> Self {
        self.action_id = Some(action_id.into());
        self.user_text = user_text;
        self
    }

    /// Structured form delivered to apps on newer SDKs
    pub fn to_json(&self, origin: &str) -> Value {
        let mut obj = json!({
            "origin": origin,
            "data": self.body,
            "notificationId": self.notification_id,
            "isMultiple": self.is_multiple,
            "remote": self.remote,
        });
        if let Some(action_id) = &self.action_id {
            obj["actionId"] = json!(action_id);
        }
        if let Some(user_text) = &self.user_text {
            obj["userText"] = json!(user_text);
        }
        obj
    }
}
