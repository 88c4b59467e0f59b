//! Tool registry
//!
//! Tools are declared in a static table ([`ToolSpec`]). Registration derives
//! the externally visible [`ToolDescriptor`], including a JSON Schema built
//! from the declared parameters, and arguments are validated against the
//! same parameter list before a handler runs.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::{BridgeError, BridgeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer { min: Option<i64> },
    Boolean,
}

impl ParamType {
    fn schema(&self) -> Value {
        match self {
            Self::String => json!({"type": "string"}),
            Self::Integer { min: Some(min) } => json!({"type": "integer", "minimum": min}),
            Self::Integer { min: None } => json!({"type": "integer"}),
            Self::Boolean => json!({"type": "boolean"}),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer { .. } => "integer",
            Self::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub ty: ParamType,
    pub required: bool,
    pub description: &'static str,
}

impl ParamSpec {
    pub const fn required(name: &'static str, ty: ParamType, description: &'static str) -> Self {
        Self {
            name,
            ty,
            required: true,
            description,
        }
    }

    pub const fn optional(name: &'static str, ty: ParamType, description: &'static str) -> Self {
        Self {
            name,
            ty,
            required: false,
            description,
        }
    }
}

/// Bound implementation behind a tool
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: ToolArgs) -> BridgeResult<Value>;
}

/// Any async closure over validated arguments is a handler
#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(ToolArgs) -> Fut + Send + Sync,
    Fut: Future<Output = BridgeResult<Value>> + Send + 'static,
{
    async fn call(&self, args: ToolArgs) -> BridgeResult<Value> {
        self(args).await
    }
}

/// Static declaration of one tool
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

/// What an external caller sees in `tools/list`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl ToolDescriptor {
    fn derive(spec: &ToolSpec) -> Self {
        let mut properties = Map::new();
        for param in &spec.params {
            let mut schema = param.ty.schema();
            if !param.description.is_empty() {
                schema["description"] = json!(param.description);
            }
            properties.insert(param.name.to_string(), schema);
        }
        let required: Vec<&str> = spec
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();

        Self {
            name: spec.name.to_string(),
            description: spec.description.to_string(),
            input_schema: json!({
                "type": "object",
                "properties": properties,
                "required": required,
                "additionalProperties": false,
            }),
        }
    }
}

/// Arguments that passed validation, with integers already coerced
#[derive(Debug, Clone)]
pub struct ToolArgs {
    tool: String,
    values: Map<String, Value>,
}

impl ToolArgs {
    pub fn str(&self, name: &str) -> BridgeResult<&str> {
        self.values
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| self.missing(name))
    }

    pub fn u32(&self, name: &str) -> BridgeResult<u32> {
        let value = self.opt_i64(name).ok_or_else(|| self.missing(name))?;
        u32::try_from(value).map_err(|_| {
            BridgeError::invalid_arguments(&self.tool, format!("'{}' is out of range", name))
        })
    }

    pub fn opt_i64(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(Value::as_i64)
    }

    pub fn opt_usize(&self, name: &str) -> Option<usize> {
        self.opt_i64(name).and_then(|v| usize::try_from(v).ok())
    }

    pub fn flag(&self, name: &str) -> bool {
        self.values
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    fn missing(&self, name: &str) -> BridgeError {
        BridgeError::invalid_arguments(&self.tool, format!("missing parameter '{}'", name))
    }
}

struct RegisteredTool {
    descriptor: ToolDescriptor,
    params: Vec<ParamSpec>,
    handler: Arc<dyn ToolHandler>,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: ToolSpec) -> BridgeResult<&ToolDescriptor> {
        if self.index.contains_key(spec.name) {
            return Err(BridgeError::DuplicateToolName(spec.name.to_string()));
        }

        let descriptor = ToolDescriptor::derive(&spec);
        tracing::debug!("Registered tool {}", descriptor.name);
        self.index.insert(descriptor.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool {
            descriptor,
            params: spec.params,
            handler: spec.handler,
        });

        let last = self.tools.len() - 1;
        Ok(&self.tools[last].descriptor)
    }

    /// Descriptors in registration order
    pub fn list_tools(&self) -> Vec<&ToolDescriptor> {
        self.tools.iter().map(|t| &t.descriptor).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub async fn invoke(&self, name: &str, arguments: Value) -> BridgeResult<Value> {
        let tool = self
            .index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| BridgeError::UnknownTool(name.to_string()))?;

        let args = validate(name, &tool.params, arguments)?;
        tracing::debug!("Invoking tool {}", name);
        tool.handler.call(args).await
    }
}

fn validate(tool: &str, params: &[ParamSpec], arguments: Value) -> BridgeResult<ToolArgs> {
    let object = match arguments {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        other => {
            return Err(BridgeError::invalid_arguments(
                tool,
                format!("arguments must be an object, got {}", json_type(&other)),
            ));
        }
    };

    if let Some(unknown) = object
        .keys()
        .find(|key| !params.iter().any(|p| p.name == key.as_str()))
    {
        return Err(BridgeError::invalid_arguments(
            tool,
            format!("unknown parameter '{}'", unknown),
        ));
    }

    let mut values = Map::new();
    for param in params {
        match object.get(param.name) {
            None | Some(Value::Null) if param.required => {
                return Err(BridgeError::invalid_arguments(
                    tool,
                    format!("missing required parameter '{}'", param.name),
                ));
            }
            None | Some(Value::Null) => {}
            Some(value) => {
                values.insert(param.name.to_string(), coerce(tool, param, value)?);
            }
        }
    }

    Ok(ToolArgs {
        tool: tool.to_string(),
        values,
    })
}

fn coerce(tool: &str, param: &ParamSpec, value: &Value) -> BridgeResult<Value> {
    let mismatch = || {
        BridgeError::invalid_arguments(
            tool,
            format!(
                "'{}' must be {}, got {}",
                param.name,
                param.ty.name(),
                json_type(value)
            ),
        )
    };

    match param.ty {
        ParamType::String => value.as_str().map(Value::from).ok_or_else(mismatch),
        ParamType::Boolean => value.as_bool().map(Value::from).ok_or_else(mismatch),
        ParamType::Integer { min } => {
            let number = match value {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            }
            .ok_or_else(mismatch)?;

            if let Some(min) = min
                && number < min
            {
                return Err(BridgeError::invalid_arguments(
                    tool,
                    format!("'{}' must be >= {}, got {}", param.name, min, number),
                ));
            }
            Ok(Value::from(number))
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NON_NEGATIVE: ParamType = ParamType::Integer { min: Some(0) };

    fn echo_spec(name: &'static str) -> ToolSpec {
        ToolSpec {
            name,
            description: "Echo the validated arguments",
            params: vec![
                ParamSpec::required("path", ParamType::String, "File path"),
                ParamSpec::required("line", NON_NEGATIVE, ""),
                ParamSpec::optional("flat", ParamType::Boolean, ""),
            ],
            handler: Arc::new(|args: ToolArgs| async move {
                Ok::<_, BridgeError>(json!({
                    "path": args.str("path")?,
                    "line": args.u32("line")?,
                    "flat": args.flag("flat"),
                }))
            }),
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(echo_spec("echo")).unwrap();
        registry
    }

    #[test]
    fn test_descriptor_schema() {
        let registry = registry();
        let tools = registry.list_tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");
        assert_eq!(tools[0].description, "Echo the validated arguments");

        let schema = &tools[0].input_schema;
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["path", "line"]));
        assert_eq!(schema["additionalProperties"], json!(false));
        assert_eq!(schema["properties"]["line"]["minimum"], json!(0));
        assert_eq!(schema["properties"]["path"]["description"], "File path");
        assert!(schema["properties"]["flat"].get("description").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = registry();
        let err = registry.register(echo_spec("echo")).unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateToolName(ref n) if n == "echo"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_list_preserves_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(echo_spec(name)).unwrap();
        }
        let names: Vec<_> = registry.list_tools().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[tokio::test]
    async fn test_invoke_coerces_integers() {
        let registry = registry();
        let result = registry
            .invoke("echo", json!({"path": "a.py", "line": "7"}))
            .await
            .unwrap();
        assert_eq!(result, json!({"path": "a.py", "line": 7, "flat": false}));
    }

    #[tokio::test]
    async fn test_invoke_unknown_tool() {
        let err = registry().invoke("nonexistent_tool", json!({})).await.unwrap_err();
        assert!(matches!(err, BridgeError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn test_invoke_rejects_bad_arguments() {
        let registry = registry();
        let cases = [
            json!({"line": 1}),
            json!({"path": "a.py", "line": -1}),
            json!({"path": "a.py", "line": 1.5}),
            json!({"path": 3, "line": 1}),
            json!({"path": "a.py", "line": 1, "extra": true}),
            json!(["a.py", 1]),
        ];
        for case in cases {
            let err = registry.invoke("echo", case.clone()).await.unwrap_err();
            assert!(
                matches!(err, BridgeError::InvalidArguments { .. }),
                "{} -> {:?}",
                case,
                err
            );
        }
    }

    #[tokio::test]
    async fn test_null_arguments_are_empty_object() {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolSpec {
                name: "noop",
                description: "",
                params: Vec::new(),
                handler: Arc::new(|_args: ToolArgs| async { Ok::<_, BridgeError>(Value::Null) }),
            })
            .unwrap();
        assert_eq!(registry.invoke("noop", Value::Null).await.unwrap(), Value::Null);
    }
}
