//! Request dispatch and per-command handlers.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, warn};

use crate::emitter::Emitter;
use crate::error::BridgeError;
use crate::outcome::{self, ControlOutcome, THREAD_ID};
use crate::protocol::{
    BreakpointView, Capabilities, ContinueBody, Event, LaunchArguments, Message, Request,
    ScopesArguments, ScopesBody, SetBreakpointsArguments, SetBreakpointsBody, Source, StackFrame,
    StackTraceArguments, StackTraceBody, Thread, ThreadsBody, VariablesArguments, VariablesBody,
};
use crate::remote::{
    self, Connect, LaunchOutcome, RemoteBreakpoints, RemoteScopes, RemoteStackTrace, RemoteThreads,
    RemoteVariables,
};
use crate::session::SessionState;

/// A handler's verdict: the response body plus the events that follow it.
/// Only the dispatcher turns this into outbound messages, so every request
/// gets exactly one response, sent after the outcome is determined.
struct Reply {
    body: Value,
    events: Vec<Event>,
}

impl Reply {
    fn empty() -> Self {
        Self {
            body: json!({}),
            events: Vec::new(),
        }
    }

    fn with_body<T: Serialize>(body: &T) -> Self {
        Self {
            body: to_body(body),
            events: Vec::new(),
        }
    }
}

fn to_body<T: Serialize>(body: &T) -> Value {
    serde_json::to_value(body).unwrap_or_else(|e| {
        error!(error = %e, "response body serialization failed");
        json!({})
    })
}

/// The protocol bridge. One instance serves one client connection and owns
/// at most one remote session at a time.
pub struct Bridge {
    emitter: Emitter,
    state: Mutex<SessionState>,
    connector: Arc<dyn Connect>,
    fallback_source: Option<PathBuf>,
}

impl Bridge {
    /// Create a bridge together with the receiver end of its outbound
    /// stream. The caller is responsible for draining the receiver in order.
    pub fn new(
        connector: Arc<dyn Connect>,
        fallback_source: Option<PathBuf>,
    ) -> (Self, UnboundedReceiver<Message>) {
        let (emitter, rx) = Emitter::new();
        (
            Self {
                emitter,
                state: Mutex::new(SessionState::default()),
                connector,
                fallback_source,
            },
            rx,
        )
    }

    /// Single failure boundary for all handlers: any error is logged and
    /// becomes the failure response for this request; nothing propagates
    /// further and the bridge keeps running.
    pub async fn dispatch(&self, request: Request) {
        debug!(seq = request.seq, command = %request.command, "received request");
        match self.handle(&request).await {
            Ok(reply) => {
                self.emitter.respond(&request, reply.body);
                for event in reply.events {
                    self.emitter.event(event);
                }
            }
            Err(err) => {
                error!(command = %request.command, error = %err, "request failed");
                self.emitter.respond_error(&request, &err);
            }
        }
    }

    async fn handle(&self, request: &Request) -> Result<Reply, BridgeError> {
        match request.command.as_str() {
            "initialize" => Ok(self.initialize()),
            "launch" => self.launch(request).await,
            "configurationDone" => Ok(Reply::empty()),
            "setBreakpoints" => self.set_breakpoints(request).await,
            "threads" => self.threads().await,
            "stackTrace" => self.stack_trace(request).await,
            "scopes" => self.scopes(request).await,
            "variables" => self.variables(request).await,
            "next" => self.step(remote::methods::NEXT).await,
            "stepBack" => self.step(remote::methods::STEP_BACK).await,
            "pause" => self.step(remote::methods::PAUSE).await,
            "continue" => self.continue_execution().await,
            "disconnect" | "terminate" => self.disconnect().await,
            unknown => Err(BridgeError::UnsupportedCommand(unknown.to_string())),
        }
    }

    /// Issue a remote call that requires the launched session, merging the
    /// session identifier into `params`.
    async fn session_call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, BridgeError> {
        let (client, session_id) = self
            .state
            .lock()
            .unwrap()
            .session()
            .ok_or(BridgeError::NoSession)?;

        let mut params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        params.insert("sessionId".to_string(), json!(session_id));

        let result = client.call(method, Value::Object(params)).await?;
        serde_json::from_value(result).map_err(BridgeError::RemotePayload)
    }

    fn initialize(&self) -> Reply {
        let capabilities = Capabilities {
            supports_configuration_done_request: true,
            supports_step_back: true,
            supports_restart_request: false,
        };
        Reply {
            body: to_body(&capabilities),
            events: vec![Event::Initialized],
        }
    }

    async fn launch(&self, request: &Request) -> Result<Reply, BridgeError> {
        let args: LaunchArguments = arguments(request)?;
        let source = self.resolve_source(&args)?;
        // Validate everything before touching the existing session, so a bad
        // launch leaves it intact.
        let program = load_program(&args).await?;

        self.state.lock().unwrap().detach();

        let client = self.connector.connect(&source).await?;
        client.call(remote::methods::INITIALIZE, json!({})).await?;

        let pending = self.state.lock().unwrap().pending_breakpoints.clone();
        let launched = client
            .call(
                remote::methods::LAUNCH,
                json!({
                    "program": program,
                    "stopOnEntry": args.stop_on_entry,
                    "breakpoints": pending,
                }),
            )
            .await?;
        let launched: LaunchOutcome =
            serde_json::from_value(launched).map_err(BridgeError::RemotePayload)?;

        debug!(session_id = launched.session_id, source = %source.display(), "session launched");
        self.state
            .lock()
            .unwrap()
            .attach(client, launched.session_id, source);

        Ok(Reply {
            body: json!({}),
            events: vec![outcome::translate(&launched.control)],
        })
    }

    fn resolve_source(&self, args: &LaunchArguments) -> Result<PathBuf, BridgeError> {
        if let Some(source) = args.source.as_deref().filter(|s| !s.is_empty()) {
            return Ok(PathBuf::from(source));
        }
        self.fallback_source
            .clone()
            .ok_or(BridgeError::MissingSource)
    }

    async fn set_breakpoints(&self, request: &Request) -> Result<Reply, BridgeError> {
        let args: SetBreakpointsArguments = arguments(request)?;
        let lines: Vec<i64> = args
            .breakpoints
            .iter()
            .map(|bp| bp.line)
            .filter(|line| *line > 0)
            .collect();

        let has_session = {
            let mut state = self.state.lock().unwrap();
            state.pending_breakpoints = lines.clone();
            state.session().is_some()
        };

        let breakpoints = if has_session {
            let result: RemoteBreakpoints = self
                .session_call(
                    remote::methods::SET_BREAKPOINTS,
                    json!({"breakpoints": lines}),
                )
                .await?;
            result.breakpoints
        } else {
            // No program is loaded yet, so verification is impossible; answer
            // optimistically and resubmit on launch.
            lines
                .iter()
                .map(|&line| BreakpointView {
                    line,
                    verified: true,
                    message: None,
                })
                .collect()
        };

        Ok(Reply::with_body(&SetBreakpointsBody { breakpoints }))
    }

    async fn threads(&self) -> Result<Reply, BridgeError> {
        let has_session = self.state.lock().unwrap().session().is_some();
        let threads = if has_session {
            let result: RemoteThreads = self.session_call(remote::methods::THREADS, json!({})).await?;
            result.threads
        } else {
            vec![Thread {
                id: THREAD_ID,
                name: "main".to_string(),
            }]
        };
        Ok(Reply::with_body(&ThreadsBody { threads }))
    }

    async fn stack_trace(&self, request: &Request) -> Result<Reply, BridgeError> {
        let args: StackTraceArguments = arguments(request)?;
        let result: RemoteStackTrace = self
            .session_call(
                remote::methods::STACK_TRACE,
                json!({"startFrame": args.start_frame, "levels": args.levels}),
            )
            .await?;

        let source = self.state.lock().unwrap().source.clone().map(|path| Source {
            name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            path: path.display().to_string(),
        });
        let stack_frames = result
            .stack_frames
            .into_iter()
            .map(|frame| StackFrame {
                id: frame.id,
                name: frame.name,
                line: frame.line,
                column: frame.column,
                source: source.clone(),
            })
            .collect();

        Ok(Reply::with_body(&StackTraceBody {
            stack_frames,
            total_frames: result.total_frames,
        }))
    }

    async fn scopes(&self, request: &Request) -> Result<Reply, BridgeError> {
        let args: ScopesArguments = arguments(request)?;
        let result: RemoteScopes = self
            .session_call(remote::methods::SCOPES, json!({"frameId": args.frame_id}))
            .await?;
        Ok(Reply::with_body(&ScopesBody {
            scopes: result.scopes,
        }))
    }

    async fn variables(&self, request: &Request) -> Result<Reply, BridgeError> {
        let args: VariablesArguments = arguments(request)?;
        let result: RemoteVariables = self
            .session_call(
                remote::methods::VARIABLES,
                json!({"variablesReference": args.variables_reference}),
            )
            .await?;
        Ok(Reply::with_body(&VariablesBody {
            variables: result.variables,
        }))
    }

    /// `next`, `stepBack` and `pause` share one shape: a single control call
    /// whose outcome becomes the follow-up event.
    async fn step(&self, method: &str) -> Result<Reply, BridgeError> {
        let control: ControlOutcome = self.session_call(method, json!({})).await?;
        debug!(line = control.line, reason = ?control.stop_reason, "control call returned");
        Ok(Reply {
            body: json!({}),
            events: vec![outcome::translate(&control)],
        })
    }

    async fn continue_execution(&self) -> Result<Reply, BridgeError> {
        if self.state.lock().unwrap().session().is_none() {
            return Err(BridgeError::NoSession);
        }

        // Continuation may run remotely for an unbounded time; tell the
        // client execution resumed before waiting on the engine.
        self.emitter.event(Event::Continued {
            thread_id: THREAD_ID,
        });

        let control: ControlOutcome = self
            .session_call(remote::methods::CONTINUE, json!({}))
            .await?;
        Ok(Reply {
            body: to_body(&ContinueBody {
                all_threads_continued: true,
            }),
            events: vec![outcome::translate(&control)],
        })
    }

    async fn disconnect(&self) -> Result<Reply, BridgeError> {
        let has_session = self.state.lock().unwrap().session().is_some();
        if has_session {
            // Best effort: the engine may already be gone.
            if let Err(err) = self
                .session_call::<Value>(remote::methods::DISCONNECT, json!({}))
                .await
            {
                warn!(error = %err, "remote disconnect failed, discarding session anyway");
            }
        }
        self.state.lock().unwrap().detach();
        Ok(Reply::empty())
    }
}

fn arguments<T: serde::de::DeserializeOwned>(request: &Request) -> Result<T, BridgeError> {
    request
        .parse_arguments()
        .map_err(BridgeError::InvalidArguments)
}

/// Resolve the program body: the inline array wins, otherwise the program
/// file must parse as a JSON array.
async fn load_program(args: &LaunchArguments) -> Result<Vec<Value>, BridgeError> {
    if let Some(program) = &args.program {
        return Ok(program.clone());
    }
    let Some(path) = args.program_file.as_deref().filter(|p| !p.is_empty()) else {
        return Err(BridgeError::MissingProgram);
    };
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| BridgeError::ProgramFileRead {
            path: path.to_string(),
            source,
        })?;
    match serde_json::from_str(&raw) {
        Ok(Value::Array(program)) => Ok(program),
        Ok(_) => Err(BridgeError::ProgramFileNotArray {
            path: path.to_string(),
        }),
        Err(source) => Err(BridgeError::ProgramFileParse {
            path: path.to_string(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::path::Path;

    use async_trait::async_trait;
    use picovm_rpc::{RemoteCall, RpcError};

    use crate::protocol::Payload;

    #[derive(Default)]
    struct ScriptedClient {
        calls: Mutex<Vec<(String, Value)>>,
        results: Mutex<VecDeque<Result<Value, RpcError>>>,
    }

    impl ScriptedClient {
        fn push(&self, result: Result<Value, RpcError>) {
            self.results.lock().unwrap().push_back(result);
        }

        fn calls(&self) -> Vec<(String, Value)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteCall for ScriptedClient {
        async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
            self.calls
                .lock()
                .unwrap()
                .push((method.to_string(), params));
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(json!({})))
        }
    }

    #[derive(Default)]
    struct ScriptedConnector {
        client: Arc<ScriptedClient>,
        connects: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl Connect for ScriptedConnector {
        async fn connect(&self, source: &Path) -> Result<Arc<dyn RemoteCall>, RpcError> {
            self.connects.lock().unwrap().push(source.to_path_buf());
            Ok(Arc::clone(&self.client) as Arc<dyn RemoteCall>)
        }
    }

    fn bridge() -> (
        Bridge,
        UnboundedReceiver<Message>,
        Arc<ScriptedConnector>,
    ) {
        let connector = Arc::new(ScriptedConnector::default());
        let (bridge, rx) = Bridge::new(Arc::clone(&connector) as Arc<dyn Connect>, None);
        (bridge, rx, connector)
    }

    fn request(seq: i64, command: &str, arguments: Value) -> Request {
        Request {
            seq,
            command: command.to_string(),
            arguments: Some(arguments),
        }
    }

    fn drain(rx: &mut UnboundedReceiver<Message>) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    async fn launch(bridge: &Bridge, connector: &ScriptedConnector) {
        connector.client.push(Ok(json!({})));
        connector.client.push(Ok(json!({
            "sessionId": 7,
            "threadId": 1,
            "line": 1,
            "stopReason": "entry",
            "terminated": false,
        })));
        bridge
            .dispatch(request(
                1,
                "launch",
                json!({"source": "/tmp/prog.pv", "program": [1, 2, 3]}),
            ))
            .await;
    }

    fn response_of(messages: &[Message]) -> (bool, Option<&str>, &Value) {
        for message in messages {
            if let Payload::Response {
                success,
                message: failure,
                body,
                ..
            } = &message.payload
            {
                return (*success, failure.as_deref(), body);
            }
        }
        panic!("no response in {messages:?}");
    }

    fn event_names(messages: &[Message]) -> Vec<&str> {
        messages
            .iter()
            .filter_map(|message| match &message.payload {
                Payload::Event { event, .. } => Some(event.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_initialize_responds_then_announces_initialized() {
        let (bridge, mut rx, _) = bridge();
        bridge.dispatch(request(1, "initialize", json!({}))).await;

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 2);
        let (success, _, body) = response_of(&messages);
        assert!(success);
        assert_eq!(body["supportsConfigurationDoneRequest"], json!(true));
        assert_eq!(body["supportsStepBack"], json!(true));
        assert_eq!(body["supportsRestartRequest"], json!(false));
        assert_eq!(event_names(&messages), vec!["initialized"]);
        // The event follows the response.
        assert!(matches!(messages[0].payload, Payload::Response { .. }));
    }

    #[tokio::test]
    async fn test_unsupported_command_fails_without_events() {
        let (bridge, mut rx, _) = bridge();
        bridge.dispatch(request(1, "attach", json!({}))).await;

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 1);
        let (success, failure, body) = response_of(&messages);
        assert!(!success);
        assert_eq!(failure, Some("Unsupported request: attach"));
        assert_eq!(body["error"]["id"], json!(4));
    }

    #[tokio::test]
    async fn test_set_breakpoints_before_launch_synthesizes_verified_views() {
        let (bridge, mut rx, connector) = bridge();
        bridge
            .dispatch(request(
                1,
                "setBreakpoints",
                json!({"breakpoints": [{"line": 3}, {"line": 7}]}),
            ))
            .await;

        let messages = drain(&mut rx);
        let (success, _, body) = response_of(&messages);
        assert!(success);
        assert_eq!(
            body["breakpoints"],
            json!([
                {"line": 3, "verified": true},
                {"line": 7, "verified": true},
            ])
        );
        assert!(event_names(&messages).is_empty());
        assert!(connector.client.calls().is_empty());
        assert!(connector.connects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_breakpoints_drops_non_positive_lines() {
        let (bridge, mut rx, _) = bridge();
        bridge
            .dispatch(request(
                1,
                "setBreakpoints",
                json!({"breakpoints": [{"line": 0}, {"line": -4}, {"line": 2}]}),
            ))
            .await;

        let messages = drain(&mut rx);
        let (_, _, body) = response_of(&messages);
        assert_eq!(body["breakpoints"], json!([{"line": 2, "verified": true}]));
    }

    #[tokio::test]
    async fn test_launch_pushes_pending_breakpoints_and_translates_outcome() {
        let (bridge, mut rx, connector) = bridge();
        bridge
            .dispatch(request(
                1,
                "setBreakpoints",
                json!({"breakpoints": [{"line": 3}, {"line": 7}]}),
            ))
            .await;
        drain(&mut rx);

        launch(&bridge, &connector).await;

        let messages = drain(&mut rx);
        let (success, _, _) = response_of(&messages);
        assert!(success);
        assert_eq!(event_names(&messages), vec!["stopped"]);

        let calls = connector.client.calls();
        assert_eq!(calls[0].0, remote::methods::INITIALIZE);
        assert_eq!(calls[1].0, remote::methods::LAUNCH);
        assert_eq!(calls[1].1["breakpoints"], json!([3, 7]));
        assert_eq!(calls[1].1["stopOnEntry"], json!(true));
        assert_eq!(calls[1].1["program"], json!([1, 2, 3]));
        assert_eq!(
            connector.connects.lock().unwrap().as_slice(),
            &[PathBuf::from("/tmp/prog.pv")]
        );
    }

    #[tokio::test]
    async fn test_launch_terminated_outcome_emits_terminated() {
        let (bridge, mut rx, connector) = bridge();
        connector.client.push(Ok(json!({})));
        connector.client.push(Ok(json!({
            "sessionId": 7,
            "threadId": 1,
            "line": 0,
            "stopReason": "terminated",
            "terminated": true,
        })));
        bridge
            .dispatch(request(1, "launch", json!({"source": "/tmp/p", "program": []})))
            .await;

        assert_eq!(event_names(&drain(&mut rx)), vec!["terminated"]);
    }

    #[tokio::test]
    async fn test_launch_without_source_or_fallback_fails() {
        let (bridge, mut rx, connector) = bridge();
        bridge
            .dispatch(request(1, "launch", json!({"program": []})))
            .await;

        let messages = drain(&mut rx);
        let (success, failure, body) = response_of(&messages);
        assert!(!success);
        assert!(failure.unwrap().contains("source"));
        assert_eq!(body["error"]["id"], json!(2));
        assert!(connector.connects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_launch_uses_fallback_source() {
        let connector = Arc::new(ScriptedConnector::default());
        let (bridge, mut rx) = Bridge::new(
            Arc::clone(&connector) as Arc<dyn Connect>,
            Some(PathBuf::from("/work/active.pv")),
        );
        connector.client.push(Ok(json!({})));
        connector.client.push(Ok(json!({
            "sessionId": 2,
            "threadId": 1,
            "line": 1,
            "stopReason": "entry",
            "terminated": false,
        })));

        bridge
            .dispatch(request(1, "launch", json!({"program": []})))
            .await;

        let messages = drain(&mut rx);
        let (success, _, _) = response_of(&messages);
        assert!(success);
        assert_eq!(
            connector.connects.lock().unwrap().as_slice(),
            &[PathBuf::from("/work/active.pv")]
        );
    }

    #[tokio::test]
    async fn test_session_requiring_commands_fail_before_launch() {
        let (bridge, mut rx, connector) = bridge();
        let commands = [
            "next",
            "stepBack",
            "pause",
            "continue",
            "stackTrace",
            "scopes",
            "variables",
        ];
        for (i, command) in commands.into_iter().enumerate() {
            bridge
                .dispatch(request(i as i64 + 1, command, json!({})))
                .await;
        }

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 7);
        for message in &messages {
            let Payload::Response { success, body, .. } = &message.payload else {
                panic!("expected only responses, got {message:?}");
            };
            assert!(!*success);
            assert_eq!(body["error"]["id"], json!(1));
        }
        assert!(connector.client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_threads_synthesized_before_launch() {
        let (bridge, mut rx, connector) = bridge();
        bridge.dispatch(request(1, "threads", json!({}))).await;

        let messages = drain(&mut rx);
        let (success, _, body) = response_of(&messages);
        assert!(success);
        assert_eq!(body["threads"], json!([{"id": 1, "name": "main"}]));
        assert!(connector.client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_threads_forwarded_once_session_exists() {
        let (bridge, mut rx, connector) = bridge();
        launch(&bridge, &connector).await;
        drain(&mut rx);

        connector
            .client
            .push(Ok(json!({"threads": [{"id": 1, "name": "interp"}]})));
        bridge.dispatch(request(2, "threads", json!({}))).await;

        let messages = drain(&mut rx);
        let (_, _, body) = response_of(&messages);
        assert_eq!(body["threads"], json!([{"id": 1, "name": "interp"}]));
        let calls = connector.client.calls();
        let (method, params) = calls.last().unwrap();
        assert_eq!(method, remote::methods::THREADS);
        assert_eq!(params["sessionId"], json!(7));
    }

    #[tokio::test]
    async fn test_stack_trace_annotates_frames_with_source() {
        let (bridge, mut rx, connector) = bridge();
        launch(&bridge, &connector).await;
        drain(&mut rx);

        connector.client.push(Ok(json!({
            "totalFrames": 2,
            "stackFrames": [
                {"id": 1, "name": "main", "line": 4, "column": 1},
                {"id": 2, "name": "push (prog.pv:2)", "line": 2, "column": 3},
            ],
        })));
        bridge
            .dispatch(request(2, "stackTrace", json!({"startFrame": 0, "levels": 5})))
            .await;

        let messages = drain(&mut rx);
        let (_, _, body) = response_of(&messages);
        assert_eq!(body["totalFrames"], json!(2));
        assert_eq!(
            body["stackFrames"][0]["source"],
            json!({"name": "prog.pv", "path": "/tmp/prog.pv"})
        );
        let calls = connector.client.calls();
        let (_, params) = calls.last().unwrap();
        assert_eq!(params["startFrame"], json!(0));
        assert_eq!(params["levels"], json!(5));
    }

    #[tokio::test]
    async fn test_continue_emits_event_then_response_then_outcome() {
        let (bridge, mut rx, connector) = bridge();
        launch(&bridge, &connector).await;
        drain(&mut rx);

        connector.client.push(Ok(json!({
            "line": 9,
            "stopReason": "breakpoint",
            "terminated": false,
        })));
        bridge.dispatch(request(2, "continue", json!({}))).await;

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 3);
        match &messages[0].payload {
            Payload::Event { event, body } => {
                assert_eq!(event, "continued");
                assert_eq!(body["allThreadsContinued"], json!(true));
            }
            other => panic!("expected continued event first, got {other:?}"),
        }
        match &messages[1].payload {
            Payload::Response { success, body, .. } => {
                assert!(*success);
                assert_eq!(body["allThreadsContinued"], json!(true));
            }
            other => panic!("expected response second, got {other:?}"),
        }
        match &messages[2].payload {
            Payload::Event { event, body } => {
                assert_eq!(event, "stopped");
                assert_eq!(body["reason"], json!("breakpoint"));
                assert_eq!(body["allThreadsStopped"], json!(true));
            }
            other => panic!("expected stopped event last, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_step_back_translates_terminated_outcome() {
        let (bridge, mut rx, connector) = bridge();
        launch(&bridge, &connector).await;
        drain(&mut rx);

        connector.client.push(Ok(json!({
            "line": 0,
            "stopReason": "step",
            "terminated": true,
        })));
        bridge.dispatch(request(2, "stepBack", json!({}))).await;

        let messages = drain(&mut rx);
        assert_eq!(event_names(&messages), vec!["terminated"]);
    }

    #[tokio::test]
    async fn test_remote_failure_becomes_failure_response() {
        let (bridge, mut rx, connector) = bridge();
        launch(&bridge, &connector).await;
        drain(&mut rx);

        connector.client.push(Err(RpcError::Call {
            method: remote::methods::NEXT.to_string(),
            code: -32000,
            message: "interpreter busy".to_string(),
        }));
        bridge.dispatch(request(2, "next", json!({}))).await;

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 1);
        let (success, failure, body) = response_of(&messages);
        assert!(!success);
        assert!(failure.unwrap().contains("interpreter busy"));
        assert_eq!(body["error"]["id"], json!(3));
    }

    #[tokio::test]
    async fn test_set_breakpoints_forwarded_once_session_exists() {
        let (bridge, mut rx, connector) = bridge();
        launch(&bridge, &connector).await;
        drain(&mut rx);

        connector.client.push(Ok(json!({
            "breakpoints": [
                {"line": 3, "verified": true},
                {"line": 99, "verified": false, "message": "line is past end of program"},
            ],
        })));
        bridge
            .dispatch(request(
                2,
                "setBreakpoints",
                json!({"breakpoints": [{"line": 3}, {"line": 99}]}),
            ))
            .await;

        let messages = drain(&mut rx);
        let (_, _, body) = response_of(&messages);
        assert_eq!(body["breakpoints"][1]["verified"], json!(false));
        assert_eq!(
            body["breakpoints"][1]["message"],
            json!("line is past end of program")
        );
        let calls = connector.client.calls();
        let (method, params) = calls.last().unwrap();
        assert_eq!(method, remote::methods::SET_BREAKPOINTS);
        assert_eq!(params["breakpoints"], json!([3, 99]));
        assert_eq!(params["sessionId"], json!(7));
    }

    #[tokio::test]
    async fn test_disconnect_succeeds_despite_remote_failure() {
        let (bridge, mut rx, connector) = bridge();
        launch(&bridge, &connector).await;
        drain(&mut rx);

        connector.client.push(Err(RpcError::Closed));
        bridge.dispatch(request(2, "disconnect", json!({}))).await;

        let messages = drain(&mut rx);
        let (success, _, _) = response_of(&messages);
        assert!(success);
        assert!(event_names(&messages).is_empty());

        // The bridge behaves as if no session ever existed.
        bridge.dispatch(request(3, "next", json!({}))).await;
        let messages = drain(&mut rx);
        let (success, _, body) = response_of(&messages);
        assert!(!success);
        assert_eq!(body["error"]["id"], json!(1));
    }

    #[tokio::test]
    async fn test_disconnect_without_session_skips_remote_call() {
        let (bridge, mut rx, connector) = bridge();
        bridge.dispatch(request(1, "terminate", json!({}))).await;

        let messages = drain(&mut rx);
        let (success, _, _) = response_of(&messages);
        assert!(success);
        assert!(connector.client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_relaunch_resubmits_pending_breakpoints() {
        let (bridge, mut rx, connector) = bridge();
        bridge
            .dispatch(request(
                1,
                "setBreakpoints",
                json!({"breakpoints": [{"line": 5}]}),
            ))
            .await;
        launch(&bridge, &connector).await;
        connector.client.push(Ok(json!(null)));
        bridge.dispatch(request(3, "disconnect", json!({}))).await;
        drain(&mut rx);

        // Second launch reuses the surviving breakpoint buffer.
        connector.client.push(Ok(json!({})));
        connector.client.push(Ok(json!({
            "sessionId": 8,
            "threadId": 1,
            "line": 1,
            "stopReason": "entry",
            "terminated": false,
        })));
        bridge
            .dispatch(request(4, "launch", json!({"source": "/tmp/prog.pv", "program": []})))
            .await;

        let calls = connector.client.calls();
        let (method, params) = calls.last().unwrap();
        assert_eq!(method, remote::methods::LAUNCH);
        assert_eq!(params["breakpoints"], json!([5]));
        drain(&mut rx);
    }

    #[tokio::test]
    async fn test_configuration_done_is_acknowledged() {
        let (bridge, mut rx, _) = bridge();
        bridge
            .dispatch(request(1, "configurationDone", json!({})))
            .await;

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 1);
        let (success, _, body) = response_of(&messages);
        assert!(success);
        assert_eq!(*body, json!({}));
    }
}
