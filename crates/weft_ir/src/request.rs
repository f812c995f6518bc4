use serde::{Deserialize, Serialize};

use crate::{
    message::Message,
    metadata::Metadata,
    parameters::Parameters,
    tool::{JsonSchema, Tool, ToolChoice},
};

/// How streaming content chunks encode their text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    /// Each chunk carries only the new text.
    Delta,

    /// Each chunk also carries the full text so far.
    Accumulated,
}

/// A normalized chat request, the input side of the pivot format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,

    #[serde(default)]
    pub parameters: Parameters,

    pub metadata: Metadata,

    #[serde(default)]
    pub stream: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_mode: Option<StreamMode>,

    /// Desired shape of a structured (JSON) response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<JsonSchema>,
}

impl ChatRequest {
    /// A request with fresh metadata and defaults everywhere else.
    #[must_use]
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            tool_choice: None,
            parameters: Parameters::default(),
            metadata: Metadata::new(),
            stream: false,
            stream_mode: None,
            schema: None,
        }
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.parameters.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }

    #[must_use]
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    /// The requested model, if any.
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.parameters.model.as_deref()
    }
}
