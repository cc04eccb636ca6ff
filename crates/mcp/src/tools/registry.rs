// Tool registry: typed tools behind a closed set of identifiers

use crate::error::{RegistryError, ToolError};
use crate::policy::RecoveryChain;
use crate::protocol::ToolSchema;
use crate::schema::naming::{is_round_trip, kebab_to_pascal, pascal_to_kebab};
use crate::schema::{decode, encode, EncodingError, Schema, ValidationError};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Every tool this server knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolId {
    CreateFlashcards,
}

impl ToolId {
    pub const ALL: &'static [ToolId] = &[ToolId::CreateFlashcards];

    /// Internal tag, used to tag decoded input.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::CreateFlashcards => "CreateFlashcards",
        }
    }

    /// Name advertised to and used by clients.
    pub fn wire_name(&self) -> String {
        pascal_to_kebab(self.tag())
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|id| id.tag() == tag)
    }

    /// Resolve a client-supplied name. Only the exact wire name matches;
    /// `Create-Flashcards` or `create--flashcards` do not.
    pub fn from_wire_name(name: &str) -> Option<Self> {
        let id = Self::from_tag(&kebab_to_pascal(name))?;
        (id.wire_name() == name).then_some(id)
    }
}

impl std::fmt::Display for ToolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// A typed tool. The registry erases the types at registration.
#[async_trait::async_trait]
pub trait Tool: Send + Sync + 'static {
    type Input: DeserializeOwned + Send + Sync + 'static;
    type Output: Serialize + Send + 'static;

    fn id(&self) -> ToolId;

    fn description(&self) -> String;

    fn input_schema(&self) -> Schema;

    /// Shape of a successful result. Must be text.
    fn output_schema(&self) -> Schema {
        Schema::string()
    }

    /// Domain errors this tool turns into fixed messages.
    fn recovery(&self) -> RecoveryChain {
        RecoveryChain::new()
    }

    /// One attempt at the tool's effect. Called again on retry with the same input.
    async fn call(
        &self,
        input: &Self::Input,
        cancel: CancellationToken,
    ) -> Result<Self::Output, ToolError>;
}

/// Decoded input bound to its tool, ready to be attempted.
#[async_trait::async_trait]
pub trait PreparedCall: Send + Sync {
    /// Run one attempt. The inner result is the encoded success text; an
    /// `Err` there means the tool broke its declared output shape.
    async fn attempt(&self, cancel: CancellationToken)
        -> Result<Result<String, EncodingError>, ToolError>;
}

struct Prepared<T: Tool> {
    tool: Arc<T>,
    input: T::Input,
    output_schema: Arc<Schema>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[async_trait::async_trait]
impl<T: Tool> PreparedCall for Prepared<T> {
    async fn attempt(
        &self,
        cancel: CancellationToken,
    ) -> Result<Result<String, EncodingError>, ToolError> {
        let output = AssertUnwindSafe(self.tool.call(&self.input, cancel))
            .catch_unwind()
            .await
            .map_err(|payload| ToolError::Panicked(panic_message(payload.as_ref())))??;

        Ok(encode(&self.output_schema, &output))
    }
}

trait ErasedTool: Send + Sync {
    fn prepare(&self, raw: &Value) -> Result<Box<dyn PreparedCall>, ValidationError>;
}

struct Erased<T: Tool> {
    tool: Arc<T>,
    input_schema: Arc<Schema>,
    output_schema: Arc<Schema>,
}

impl<T: Tool> ErasedTool for Erased<T> {
    fn prepare(&self, raw: &Value) -> Result<Box<dyn PreparedCall>, ValidationError> {
        let input: T::Input = decode(&self.input_schema, raw)?;
        Ok(Box::new(Prepared {
            tool: self.tool.clone(),
            input,
            output_schema: self.output_schema.clone(),
        }))
    }
}

/// A registered tool: what clients see plus the erased handler.
pub struct ToolDescriptor {
    id: ToolId,
    name: String,
    description: String,
    input_schema: Arc<Schema>,
    recovery: RecoveryChain,
    handler: Box<dyn ErasedTool>,
}

impl ToolDescriptor {
    pub fn id(&self) -> ToolId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn recovery(&self) -> &RecoveryChain {
        &self.recovery
    }

    pub fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.to_json_schema(),
        }
    }

    /// Validate raw arguments and bind them to the handler.
    pub fn prepare(&self, raw: &Value) -> Result<Box<dyn PreparedCall>, ValidationError> {
        self.handler.prepare(raw)
    }
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn check_tag(tag: &str) -> Result<(), RegistryError> {
    if is_round_trip(tag) {
        Ok(())
    } else {
        Err(RegistryError::NotRoundTrip(tag.to_string()))
    }
}

/// Tools in registration order. Built at startup, read-only afterwards.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, refusing anything that could not be served correctly.
    pub fn register<T: Tool>(&mut self, tool: T) -> Result<(), RegistryError> {
        let id = tool.id();
        check_tag(id.tag())?;

        let name = id.wire_name();
        if self.tools.iter().any(|t| t.id == id) {
            return Err(RegistryError::Duplicate(name));
        }

        let output_schema = tool.output_schema();
        if !output_schema.is_text() {
            return Err(RegistryError::NonTextOutput(name));
        }

        let input_schema = Arc::new(tool.input_schema());
        let description = tool.description();
        let recovery = tool.recovery();
        let handler = Erased {
            tool: Arc::new(tool),
            input_schema: input_schema.clone(),
            output_schema: Arc::new(output_schema),
        };

        tracing::debug!(tool = %name, "Registered tool");
        self.tools.push(ToolDescriptor {
            id,
            name,
            description,
            input_schema,
            recovery,
            handler: Box::new(handler),
        });
        Ok(())
    }

    /// Schemas of every tool, in registration order.
    pub fn list(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(ToolDescriptor::schema).collect()
    }

    pub fn lookup(&self, name: &str) -> Option<&ToolDescriptor> {
        let id = ToolId::from_wire_name(name)?;
        self.tools.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
