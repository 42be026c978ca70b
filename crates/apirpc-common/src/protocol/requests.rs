use serde::{Deserialize, Serialize};

pub type ActionName = String;
pub type ApiArgs = serde_json::Value;

/// Encoded body of a request message.
///
/// `args` is omitted from the wire when the caller passes none.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiRequest {
    pub action: ActionName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<ApiArgs>,
}

impl ApiRequest {
    pub fn new(action: impl Into<String>, args: Option<ApiArgs>) -> Self {
        ApiRequest {
            action: action.into(),
            args,
        }
    }
}
