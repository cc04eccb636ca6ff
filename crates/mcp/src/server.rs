// MCP server: answers tools/list and tools/call over one connection

use crate::error::ServerError;
use crate::policy::{ExecutionOutcome, ExecutionPolicy};
use crate::protocol::{
    methods, CallToolParams, CallToolResult, CancelledParams, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListToolsResult, ServerCapabilities,
    ServerInfo, ToolsCapability, DEFAULT_PROTOCOL_VERSION,
};
use crate::tools::ToolRegistry;
use crate::transport::{Frame, ResponseSink, Transport};
use serde_json::{json, Value};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Lifecycle of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Transport acquired, waiting for the client to finish initialization.
    Connecting,
    Ready,
    Dispatching { in_flight: usize },
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    TransportAcquired,
    Initialized,
    CallStarted,
    CallFinished,
    Shutdown,
    TransportClosed,
}

impl ConnectionState {
    pub fn on(self, event: ConnectionEvent) -> Self {
        use ConnectionEvent::*;
        use ConnectionState::*;

        match (self, event) {
            (_, TransportClosed) => Closed,
            (Closed, _) => Closed,
            (Closing, _) => Closing,
            (_, Shutdown) => Closing,
            (Disconnected, TransportAcquired) => Connecting,
            (Connecting, Initialized) => Ready,
            (Connecting | Ready, CallStarted) => Dispatching { in_flight: 1 },
            (Dispatching { in_flight }, CallStarted) => Dispatching {
                in_flight: in_flight + 1,
            },
            (Dispatching { in_flight }, CallFinished) if in_flight <= 1 => Ready,
            (Dispatching { in_flight }, CallFinished) => Dispatching {
                in_flight: in_flight - 1,
            },
            (state, _) => state,
        }
    }
}

/// Serves a fixed set of tools under one execution policy.
#[derive(Debug, Clone)]
pub struct McpServer {
    registry: Arc<ToolRegistry>,
    policy: ExecutionPolicy,
    info: ServerInfo,
}

impl McpServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            policy: ExecutionPolicy::default(),
            info: ServerInfo::default(),
        }
    }

    pub fn with_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_server_info(mut self, info: ServerInfo) -> Self {
        self.info = info;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn list_tools(&self) -> ListToolsResult {
        ListToolsResult {
            tools: self.registry.list(),
        }
    }

    /// Run one tool call to completion.
    ///
    /// Every failure a client can cause, and every handler failure, comes back
    /// as an `isError` result. `Err` means a tool broke its declared output
    /// shape and the server must stop.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> Result<CallToolResult, ServerError> {
        let Some(tool) = self.registry.lookup(name) else {
            warn!(tool = %name, "Unknown tool");
            return Ok(CallToolResult::error(format!("Tool '{}' not found", name)));
        };

        let call = match tool.prepare(&arguments) {
            Ok(call) => call,
            Err(e) => {
                debug!(tool = %name, error = %e, "Rejected tool arguments");
                return Ok(CallToolResult::error(format!(
                    "Failed to decode tool call '{}' parameters: {}",
                    name, e
                )));
            }
        };

        let call = call.as_ref();
        let outcome = self
            .policy
            .run(tool.recovery(), |token| call.attempt(token), cancel)
            .await;

        let result = match outcome {
            ExecutionOutcome::Success(Ok(text)) => CallToolResult::text(text),
            ExecutionOutcome::Success(Err(source)) => {
                error!(tool = %name, error = %source, "Tool returned a value it cannot encode");
                return Err(ServerError::Encoding {
                    tool: name.to_string(),
                    source,
                });
            }
            ExecutionOutcome::Recovered(message) => {
                info!(tool = %name, "Tool failure recovered");
                CallToolResult::error(message)
            }
            ExecutionOutcome::Cancelled => {
                info!(tool = %name, "Tool call cancelled");
                CallToolResult::error("The tool call was interrupted")
            }
            ExecutionOutcome::TimedOut(after) => CallToolResult::error(format!(
                "The tool call timed out after {} seconds",
                after.as_secs()
            )),
            ExecutionOutcome::Fault(message) => {
                error!(tool = %name, error = %message, "Tool call failed");
                CallToolResult::error(message)
            }
        };
        Ok(result)
    }

    fn initialize(&self, params: Option<Value>) -> InitializeResult {
        let params: InitializeParams = params
            .and_then(|p| serde_json::from_value(p).ok())
            .unwrap_or_default();

        if let Some(client) = &params.client_info {
            info!(client = %client.name, version = ?client.version, "Client connected");
        }

        InitializeResult {
            protocol_version: params
                .protocol_version
                .unwrap_or_else(|| DEFAULT_PROTOCOL_VERSION.to_string()),
            capabilities: ServerCapabilities {
                tools: ToolsCapability {
                    list_changed: false,
                },
            },
            server_info: self.info.clone(),
        }
    }

    /// Serve one connection until the client disconnects, `shutdown` fires
    /// or a fatal error occurs. The transport is closed in every case.
    pub async fn serve<R, W>(
        &self,
        reader: R,
        writer: W,
        shutdown: CancellationToken,
    ) -> Result<(), ServerError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut transport = Transport::new(reader, writer);
        let Some(sink) = transport.sink() else {
            return transport.close().await;
        };

        let mut connection = Connection {
            server: self.clone(),
            sink,
            state: ConnectionState::Disconnected.on(ConnectionEvent::TransportAcquired),
            calls: shutdown.child_token(),
            in_flight: InFlight::default(),
            tasks: JoinSet::new(),
        };
        info!(tools = self.registry.len(), "MCP server listening");

        let result = connection.run(&mut transport, &shutdown).await;
        connection.shutdown().await;
        let state = connection.state;
        drop(connection);

        let closed = transport.close().await;
        let state = state.on(ConnectionEvent::TransportClosed);
        debug!(?state, "Transport released");
        result.and(closed)
    }

    /// Serve on the process's stdin/stdout.
    pub async fn serve_stdio(&self, shutdown: CancellationToken) -> Result<(), ServerError> {
        self.serve(tokio::io::stdin(), tokio::io::stdout(), shutdown)
            .await
    }
}

/// Tokens of calls still running, keyed by request id.
///
/// Shared with the call tasks, which release their id before answering so the
/// client may reuse it as soon as it has the response.
#[derive(Debug, Clone, Default)]
struct InFlight(Arc<Mutex<HashMap<String, CancellationToken>>>);

impl InFlight {
    fn calls(&self) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a new call, or return `false` if the id is taken.
    fn claim(&self, key: &str, token: &CancellationToken) -> bool {
        match self.calls().entry(key.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(token.clone());
                true
            }
        }
    }

    fn release(&self, key: &str) {
        self.calls().remove(key);
    }

    fn get(&self, key: &str) -> Option<CancellationToken> {
        self.calls().get(key).cloned()
    }

    fn len(&self) -> usize {
        self.calls().len()
    }
}

/// Per-connection dispatch state, owned by the read loop.
struct Connection {
    server: McpServer,
    sink: ResponseSink,
    state: ConnectionState,
    /// Parent of every call's token.
    calls: CancellationToken,
    in_flight: InFlight,
    tasks: JoinSet<Result<(), ServerError>>,
}

fn request_key(id: &Value) -> String {
    id.to_string()
}

impl Connection {
    async fn run<R>(
        &mut self,
        transport: &mut Transport<R>,
        shutdown: &CancellationToken,
    ) -> Result<(), ServerError>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    return Ok(());
                }
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    self.finish(joined)?;
                }
                frame = transport.next_frame() => match frame {
                    None => {
                        info!("Client disconnected");
                        return Ok(());
                    }
                    Some(Ok(Frame::Text(line))) => self.handle_frame(&line)?,
                    Some(Ok(Frame::TooLong)) => {
                        warn!("Discarded oversized frame");
                        self.reject_frame()?;
                    }
                    Some(Ok(Frame::InvalidUtf8)) => {
                        warn!("Received a frame that is not UTF-8");
                        self.reject_frame()?;
                    }
                    Some(Err(e)) => return Err(e.into()),
                },
            }
        }
    }

    /// Cancel every running call and wait for all of them to finish.
    async fn shutdown(&mut self) {
        self.state = self.state.on(ConnectionEvent::Shutdown);
        let running = self.in_flight.len();
        if running > 0 {
            info!(in_flight = running, "Cancelling running tool calls");
        }
        self.calls.cancel();

        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = self.finish(joined) {
                error!(error = %e, "Tool call failed during shutdown");
            }
        }
    }

    fn finish(
        &mut self,
        joined: Result<Result<(), ServerError>, JoinError>,
    ) -> Result<(), ServerError> {
        let result = joined.map_err(|e| ServerError::Task(e.to_string()))?;
        self.state = self.state.on(ConnectionEvent::CallFinished);
        result
    }

    /// Answer a request; notifications get no response.
    fn respond(
        &self,
        id: Option<Value>,
        response: impl FnOnce(Value) -> JsonRpcResponse,
    ) -> Result<(), ServerError> {
        match id {
            Some(id) => self.sink.send(&response(id)),
            None => Ok(()),
        }
    }

    fn reject_frame(&self) -> Result<(), ServerError> {
        self.sink
            .send(&JsonRpcResponse::error(Value::Null, JsonRpcError::parse_error()))
    }

    fn handle_frame(&mut self, line: &str) -> Result<(), ServerError> {
        if line.trim().is_empty() {
            return Ok(());
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Received invalid JSON");
                return self.reject_frame();
            }
        };

        // A present but null id is neither a request nor a notification
        if value.get("id").is_some_and(Value::is_null) {
            warn!("Received a message with a null id");
            return self
                .sink
                .send(&JsonRpcResponse::error(Value::Null, JsonRpcError::invalid_request()));
        }

        let request: JsonRpcRequest = match serde_json::from_value(value.clone()) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Received malformed request");
                let id = value.get("id").cloned().unwrap_or(Value::Null);
                return self
                    .sink
                    .send(&JsonRpcResponse::error(id, JsonRpcError::invalid_request()));
            }
        };

        self.handle_request(request)
    }

    fn handle_request(&mut self, request: JsonRpcRequest) -> Result<(), ServerError> {
        let JsonRpcRequest {
            id, method, params, ..
        } = request;
        debug!(method = %method, id = ?id, "Received request");

        match method.as_str() {
            methods::INITIALIZE => {
                let result = self.server.initialize(params);
                self.respond(id, |id| JsonRpcResponse::from_result(id, &result))
            }
            methods::INITIALIZED => {
                self.state = self.state.on(ConnectionEvent::Initialized);
                debug!(state = ?self.state, "Client initialized");
                Ok(())
            }
            methods::PING => self.respond(id, |id| JsonRpcResponse::success(id, json!({}))),
            methods::LIST_TOOLS => {
                let result = self.server.list_tools();
                self.respond(id, |id| JsonRpcResponse::from_result(id, &result))
            }
            methods::CALL_TOOL => match id {
                Some(id) => self.start_call(id, params),
                None => {
                    warn!("Ignoring tools/call sent as a notification");
                    Ok(())
                }
            },
            methods::CANCELLED => {
                self.cancel_call(params);
                Ok(())
            }
            other => {
                if id.is_none() {
                    debug!(method = %other, "Ignoring unknown notification");
                }
                self.respond(id, |id| {
                    JsonRpcResponse::error(id, JsonRpcError::method_not_found(other))
                })
            }
        }
    }

    fn start_call(&mut self, id: Value, params: Option<Value>) -> Result<(), ServerError> {
        let params: CallToolParams = match params.map(serde_json::from_value) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                return self.sink.send(&JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_params(format!("Invalid tools/call params: {}", e)),
                ));
            }
            None => {
                return self.sink.send(&JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_params("Missing tools/call params"),
                ));
            }
        };

        let key = request_key(&id);
        let token = self.calls.child_token();
        if !self.in_flight.claim(&key, &token) {
            return self.sink.send(&JsonRpcResponse::error(
                id,
                JsonRpcError::invalid_params(format!("Request id {} is already in use", key)),
            ));
        }
        self.state = self.state.on(ConnectionEvent::CallStarted);

        let CallToolParams { name, arguments } = params;
        let arguments = arguments.unwrap_or_else(|| json!({}));
        let span = info_span!("tool_call", tool = %name, id = %key);
        let server = self.server.clone();
        let sink = self.sink.clone();
        let in_flight = self.in_flight.clone();

        self.tasks.spawn(
            async move {
                let outcome = server.call_tool(&name, arguments, &token).await;
                in_flight.release(&key);

                match outcome {
                    Ok(result) => {
                        debug!(is_error = result.is_error(), "Tool call finished");
                        if let Err(e) = sink.send(&JsonRpcResponse::from_result(id, &result)) {
                            warn!(error = %e, "Dropping tool call response");
                        }
                        Ok(())
                    }
                    Err(e) => {
                        let _ = sink.send(&JsonRpcResponse::error(
                            id,
                            JsonRpcError::internal_error(e.to_string()),
                        ));
                        Err(e)
                    }
                }
            }
            .instrument(span),
        );
        Ok(())
    }

    fn cancel_call(&self, params: Option<Value>) {
        let Some(params) = params.and_then(|p| serde_json::from_value::<CancelledParams>(p).ok())
        else {
            warn!("Ignoring malformed cancellation");
            return;
        };

        let key = request_key(&params.request_id);
        match self.in_flight.get(&key) {
            Some(token) => {
                info!(id = %key, reason = ?params.reason, "Client cancelled tool call");
                token.cancel();
            }
            None => debug!(id = %key, "Cancellation for unknown or finished request"),
        }
    }
}
