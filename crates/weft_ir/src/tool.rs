use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool the assistant may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub parameters: JsonSchema,
}

impl Tool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: JsonSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A deliberately partial JSON Schema.
///
/// Covers the keywords providers actually exchange for tool parameters;
/// anything else round-trips untouched through `extra` so a frontend's schema
/// survives translation even when the fabric does not understand it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonSchema {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enumeration: Option<Vec<Value>>,

    #[serde(rename = "const", skip_serializing_if = "Option::is_none")]
    pub constant: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<IndexMap<String, JsonSchema>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<JsonSchema>>,

    #[serde(rename = "additionalProperties", skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,

    #[serde(rename = "minLength", skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,

    #[serde(rename = "maxLength", skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub examples: Option<Vec<Value>>,

    /// Keywords the fabric does not model.
    #[serde(flatten, skip_serializing_if = "IndexMap::is_empty")]
    pub extra: IndexMap<String, Value>,
}

impl JsonSchema {
    pub fn typed(schema_type: impl Into<String>) -> Self {
        Self {
            schema_type: Some(schema_type.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn string() -> Self {
        Self::typed("string")
    }

    /// An object schema with the given properties, all optional.
    #[must_use]
    pub fn object(properties: IndexMap<String, JsonSchema>) -> Self {
        Self {
            properties: Some(properties),
            ..Self::typed("object")
        }
    }

    #[must_use]
    pub fn with_required(mut self, required: Vec<String>) -> Self {
        self.required = Some(required);
        self
    }
}

/// How the backend should decide about calling tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ToolChoiceRepr", into = "ToolChoiceRepr")]
pub enum ToolChoice {
    /// The model decides.
    Auto,

    /// The model must call some tool.
    Required,

    /// Tool calling disabled.
    None,

    /// The model must call this specific tool.
    Tool { name: String },
}

/// Wire shape: `"auto" | "required" | "none" | {"name": "..."}`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ToolChoiceRepr {
    Mode(String),
    Named { name: String },
}

impl From<ToolChoice> for ToolChoiceRepr {
    fn from(choice: ToolChoice) -> Self {
        match choice {
            ToolChoice::Auto => Self::Mode("auto".to_owned()),
            ToolChoice::Required => Self::Mode("required".to_owned()),
            ToolChoice::None => Self::Mode("none".to_owned()),
            ToolChoice::Tool { name } => Self::Named { name },
        }
    }
}

impl TryFrom<ToolChoiceRepr> for ToolChoice {
    type Error = String;

    fn try_from(repr: ToolChoiceRepr) -> Result<Self, Self::Error> {
        match repr {
            ToolChoiceRepr::Mode(mode) => match mode.as_str() {
                "auto" => Ok(Self::Auto),
                "required" => Ok(Self::Required),
                "none" => Ok(Self::None),
                other => Err(format!("unknown tool choice mode: {other}")),
            },
            ToolChoiceRepr::Named { name } => Ok(Self::Tool { name }),
        }
    }
}
