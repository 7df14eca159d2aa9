// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Primitive dispatch: argument validation, executor calls, and response
//! formatting for the fourteen tools.
//!
//! Every tool response is a single text block. Errors are recovered at
//! this boundary and returned as structured tool errors; nothing here
//! crashes the service. All outbound text passes the redactor.

use crate::rpc::{RpcRequest, RpcResponse, METHOD_NOT_FOUND};
use crate::suggest::{find_similar, format_suggestion};
use crate::tools::list_tools_result;
use cdx_adapters::{CloudClient, EnvironmentsError};
use cdx_core::{
    redact, time_fmt, validate, Clock, EnvironmentId, IdGen, SandboxMode, Task, TaskId, TaskOrigin,
    TaskPatch, TaskResult, TaskStatus, ValidateError,
};
use cdx_engine::{
    wait_for_terminal, CloudExecutor, CloudTaskSpec, ExecError, LocalExecutor, LocalTaskSpec,
    SharedRegistry, WaitError, DEFAULT_POLL_INTERVAL,
};
use cdx_storage::TaskQuery;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Synchronous `local_run` wait bound when the caller sets none.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(600);

/// Error taxonomy kinds surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Timeout,
    AlreadyTerminal,
    RemoteApi,
    ConfigMissing,
    Internal,
}

impl ErrorKind {
    fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Timeout => "timeout",
            ErrorKind::AlreadyTerminal => "already-terminal",
            ErrorKind::RemoteApi => "remote-api",
            ErrorKind::ConfigMissing => "config-missing",
            ErrorKind::Internal => "internal",
        }
    }
}

/// A recovered tool failure, rendered as `kind: message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ToolError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    fn render(&self) -> String {
        format!("{}: {}", self.kind.as_str(), self.message)
    }
}

impl From<ValidateError> for ToolError {
    fn from(e: ValidateError) -> Self {
        ToolError::validation(e.to_string())
    }
}

impl From<ExecError> for ToolError {
    fn from(e: ExecError) -> Self {
        match e {
            ExecError::NotFound(id) => ToolError::not_found(format!("task {id} not found")),
            ExecError::NoThread(id) => {
                ToolError::validation(format!("task {id} has no agent thread to resume"))
            }
            ExecError::Registry(e) => ToolError::new(ErrorKind::Internal, e.to_string()),
        }
    }
}

/// Routes tool calls to the executors and registry.
pub struct Dispatcher<C: Clock, G: IdGen, CC: CloudClient> {
    registry: SharedRegistry<C>,
    local: LocalExecutor<C, G>,
    cloud: CloudExecutor<C, G, CC>,
    environments_path: PathBuf,
    clock: C,
}

impl<C: Clock, G: IdGen + 'static, CC: CloudClient> Dispatcher<C, G, CC> {
    pub fn new(
        registry: SharedRegistry<C>,
        local: LocalExecutor<C, G>,
        cloud: CloudExecutor<C, G, CC>,
        environments_path: PathBuf,
        clock: C,
    ) -> Self {
        Self {
            registry,
            local,
            cloud,
            environments_path,
            clock,
        }
    }

    /// Handle one request. `None` for notifications.
    pub async fn handle(&self, request: RpcRequest) -> Option<RpcResponse> {
        let id = request.id.clone()?;
        let response = match request.method.as_str() {
            "initialize" => RpcResponse::result(
                id,
                json!({
                    "protocolVersion": "2024-11-05",
                    "serverInfo": {"name": "cdx", "version": env!("CARGO_PKG_VERSION")},
                    "capabilities": {"tools": {}}
                }),
            ),
            "ping" => RpcResponse::result(id, json!({})),
            "tools/list" => RpcResponse::result(id, list_tools_result()),
            "tools/call" => {
                let params = request.params.unwrap_or(Value::Null);
                let name = params
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
                debug!(tool = %name, "tool call");
                match self.call_tool(&name, arguments).await {
                    Ok(text) => RpcResponse::result(
                        id,
                        json!({
                            "content": [{"type": "text", "text": redact(&text).into_owned()}]
                        }),
                    ),
                    Err(error) => RpcResponse::result(
                        id,
                        json!({
                            "content": [{"type": "text", "text": redact(&error.render()).into_owned()}],
                            "isError": true
                        }),
                    ),
                }
            }
            other => RpcResponse::error(id, METHOD_NOT_FOUND, format!("unknown method: {other}")),
        };
        Some(response)
    }

    async fn call_tool(&self, name: &str, args: Value) -> Result<String, ToolError> {
        match name {
            "local_run" => self.local_run(args).await,
            "local_exec" => self.local_exec(args),
            "local_resume" => self.local_resume(args),
            "local_status" => self.local_status(args),
            "local_results" => self.local_results(args),
            "local_wait" => self.wait(args, TaskOrigin::Local).await,
            "local_cancel" => self.local_cancel(args),
            "cloud_submit" => self.cloud_submit(args),
            "cloud_status" => self.cloud_status(),
            "cloud_results" => self.cloud_results(args),
            "cloud_wait" => self.wait(args, TaskOrigin::Cloud).await,
            "cloud_cancel" => self.cloud_cancel(args),
            "cloud_list_environments" => self.cloud_list_environments(),
            "cloud_github_setup" => self.cloud_github_setup(args),
            other => Err(ToolError::not_found(format!("unknown tool: {other}"))),
        }
    }

    // --- local primitives ---

    async fn local_run(&self, args: Value) -> Result<String, ToolError> {
        #[derive(Deserialize)]
        struct Args {
            task: String,
            mode: String,
            model: Option<String>,
            working_dir: Option<PathBuf>,
            #[serde(default)]
            confirm: bool,
            #[serde(default, rename = "async")]
            run_async: bool,
            timeout_sec: Option<u64>,
        }
        let args: Args = parse_args(args)?;
        let spec = self.validated_local_spec(
            args.task,
            &args.mode,
            args.confirm,
            args.working_dir,
            args.model,
        )?;
        let task = self.local.start(spec)?;

        if args.run_async {
            return Ok(format!(
                "Task {} created (status: {}). Track it with local_status, local_wait, or local_results.",
                task.id, task.status
            ));
        }

        let timeout = args
            .timeout_sec
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RUN_TIMEOUT);
        match wait_for_terminal(&self.registry, &task.id, timeout, Duration::from_secs(1)).await {
            Ok(done) => Ok(self.render_task_outcome(&done)),
            Err(WaitError::Timeout { id, .. }) => Err(ToolError::new(
                ErrorKind::Timeout,
                format!(
                    "task {id} is still running after {}s; it continues in the background",
                    timeout.as_secs()
                ),
            )),
            Err(WaitError::NotFound(id)) => {
                Err(ToolError::not_found(format!("task {id} not found")))
            }
        }
    }

    fn local_exec(&self, args: Value) -> Result<String, ToolError> {
        #[derive(Deserialize)]
        struct Args {
            task: String,
            mode: String,
            working_dir: Option<PathBuf>,
            model: Option<String>,
            #[serde(default)]
            confirm: bool,
        }
        let args: Args = parse_args(args)?;
        let spec = self.validated_local_spec(
            args.task,
            &args.mode,
            args.confirm,
            args.working_dir,
            args.model,
        )?;
        let task = self.local.start(spec)?;
        Ok(format!(
            "Task {} started in the background (status: {}). Poll local_status or block with local_wait.",
            task.id, task.status
        ))
    }

    fn local_resume(&self, args: Value) -> Result<String, ToolError> {
        #[derive(Deserialize)]
        struct Args {
            thread_id: String,
            task: String,
            mode: Option<String>,
            #[serde(default)]
            confirm: bool,
        }
        let args: Args = parse_args(args)?;
        validate::instruction(&args.task)?;

        // The newest task on that thread is the resume parent.
        let parent = self
            .registry
            .lock()
            .query(&TaskQuery::origin(TaskOrigin::Local))
            .into_iter()
            .find(|t| t.thread_id.as_ref().is_some_and(|th| th.as_str() == args.thread_id))
            .ok_or_else(|| {
                ToolError::not_found(format!("no local task with thread {}", args.thread_id))
            })?;

        let mode = match args.mode.as_deref() {
            Some(raw) => Some(validate::mode(raw)?),
            None => None,
        };
        let effective = mode.unwrap_or(parent.mode);
        validate::confirmation(effective, args.confirm)?;

        let task = self.local.resume(&parent.id, args.task, Some(effective))?;
        Ok(format!(
            "Task {} resumes thread {} (parent {}). Status: {}.",
            task.id, args.thread_id, parent.id, task.status
        ))
    }

    fn local_status(&self, args: Value) -> Result<String, ToolError> {
        #[derive(Deserialize)]
        struct Args {
            working_dir: Option<PathBuf>,
        }
        let args: Args = parse_args(args)?;
        let mut query = TaskQuery::origin(TaskOrigin::Local);
        if let Some(dir) = args.working_dir {
            query = query.with_working_dir(dir);
        }
        let tasks = self.registry.lock().query(&query);
        if tasks.is_empty() {
            return Ok("No local tasks.".to_string());
        }
        let lines: Vec<String> = tasks.iter().map(|t| self.summarize(t)).collect();
        Ok(lines.join("\n"))
    }

    fn local_results(&self, args: Value) -> Result<String, ToolError> {
        let task = self.lookup(args, TaskOrigin::Local)?;
        if !task.is_terminal() {
            let progress = task
                .progress_snapshot
                .as_ref()
                .map(|p| format!(" ({}%: {})", p.progress_percentage, p.current_action))
                .unwrap_or_default();
            return Ok(format!(
                "Task {} is not terminal yet: status {}{progress}. Use local_wait to block for it.",
                task.id, task.status
            ));
        }
        Ok(self.render_task_outcome(&task))
    }

    fn local_cancel(&self, args: Value) -> Result<String, ToolError> {
        #[derive(Deserialize)]
        struct Args {
            task_id: String,
            reason: Option<String>,
        }
        let args: Args = parse_args(args)?;
        let task = self.find_task(&args.task_id, TaskOrigin::Local)?;
        if task.is_terminal() {
            return Err(ToolError::new(
                ErrorKind::AlreadyTerminal,
                format!("task {} is already {}", task.id, task.status),
            ));
        }
        if !self.local.cancel(&task.id, args.reason.clone()) {
            // No live loop (only possible for records predating a crash);
            // settle the registry directly.
            let reason = args.reason.unwrap_or_else(|| "canceled by caller".into());
            self.registry
                .lock()
                .update(
                    &task.id,
                    TaskPatch::status(TaskStatus::Canceled).with_error(reason),
                )
                .map_err(|e| ToolError::new(ErrorKind::Internal, e.to_string()))?;
            return Ok(format!("Task {} marked canceled.", task.id));
        }
        Ok(format!(
            "Cancellation requested for {}: the agent receives SIGTERM now and SIGKILL after 5s if it ignores it.",
            task.id
        ))
    }

    // --- cloud primitives ---

    fn cloud_submit(&self, args: Value) -> Result<String, ToolError> {
        #[derive(Deserialize)]
        struct Args {
            task: String,
            environment_id: String,
            mode: Option<String>,
            model: Option<String>,
            #[serde(default)]
            confirm: bool,
        }
        let args: Args = parse_args(args)?;
        validate::instruction(&args.task)?;
        let mode = match args.mode.as_deref() {
            Some(raw) => validate::mode(raw)?,
            None => SandboxMode::WorkspaceWrite,
        };
        validate::confirmation(mode, args.confirm)?;

        let environments = self.load_environments()?;
        if !environments.contains_key(&args.environment_id) {
            let known: Vec<String> = environments.keys().cloned().collect();
            let hint = format_suggestion(&find_similar(&args.environment_id, &known));
            return Err(ToolError::not_found(format!(
                "environment {} not found{hint}",
                args.environment_id
            )));
        }

        let task = self.cloud.submit(CloudTaskSpec {
            instruction: args.task,
            environment_id: EnvironmentId::new(args.environment_id.clone()),
            mode,
            model: args.model,
        })?;
        Ok(format!(
            "Task {} submitted to environment {} (status: {}). Track it with cloud_status, cloud_wait, or cloud_results.",
            task.id, args.environment_id, task.status
        ))
    }

    fn cloud_status(&self) -> Result<String, ToolError> {
        let tasks = self
            .registry
            .lock()
            .query(&TaskQuery::origin(TaskOrigin::Cloud));
        if tasks.is_empty() {
            return Ok("No cloud tasks.".to_string());
        }
        let lines: Vec<String> = tasks.iter().map(|t| self.summarize(t)).collect();
        Ok(lines.join("\n"))
    }

    fn cloud_results(&self, args: Value) -> Result<String, ToolError> {
        let task = self.lookup(args, TaskOrigin::Cloud)?;
        if !task.is_terminal() {
            return Ok(format!(
                "Task {} is not terminal yet: status {}. Use cloud_wait to block for it.",
                task.id, task.status
            ));
        }
        Ok(self.render_task_outcome(&task))
    }

    fn cloud_cancel(&self, args: Value) -> Result<String, ToolError> {
        #[derive(Deserialize)]
        struct Args {
            task_id: String,
            reason: Option<String>,
        }
        let args: Args = parse_args(args)?;
        let task = self.find_task(&args.task_id, TaskOrigin::Cloud)?;
        if task.is_terminal() {
            return Err(ToolError::new(
                ErrorKind::AlreadyTerminal,
                format!("task {} is already {}", task.id, task.status),
            ));
        }
        if !self.cloud.cancel(&task.id, args.reason.clone()) {
            let reason = args.reason.unwrap_or_else(|| "canceled by caller".into());
            self.registry
                .lock()
                .update(
                    &task.id,
                    TaskPatch::status(TaskStatus::Canceled).with_error(reason),
                )
                .map_err(|e| ToolError::new(ErrorKind::Internal, e.to_string()))?;
        }
        Ok(format!(
            "Task {} is canceled in the local registry. Remote cancellation was requested best-effort; the hosted run may still finish on the provider's side.",
            task.id
        ))
    }

    fn cloud_list_environments(&self) -> Result<String, ToolError> {
        let environments = self.load_environments()?;
        if environments.is_empty() {
            return Ok("No environments configured.".to_string());
        }
        let lines: Vec<String> = environments
            .iter()
            .map(|(id, env)| {
                let description = env
                    .description
                    .as_deref()
                    .map(|d| format!(" - {d}"))
                    .unwrap_or_default();
                format!("{id}: {} [{}] {}{description}", env.name, env.stack, env.repo_url)
            })
            .collect();
        Ok(lines.join("\n"))
    }

    fn cloud_github_setup(&self, args: Value) -> Result<String, ToolError> {
        #[derive(Deserialize)]
        struct Args {
            repo_url: String,
            stack: Option<String>,
        }
        let args: Args = parse_args(args)?;
        let repo = args.repo_url.trim();
        if !(repo.starts_with("https://") || repo.starts_with("git@")) {
            return Err(ToolError::validation(format!(
                "repo_url must be an https:// or git@ repository address, got {repo:?}"
            )));
        }
        let stack = args.stack.unwrap_or_else(|| "auto-detected".to_string());
        Ok(format!(
            "GitHub setup for {repo}\n\
             \n\
             1. Open the hosted agent dashboard and choose \"Connect repository\".\n\
             2. Authorize the GitHub app for {repo} (read/write on code and pull requests).\n\
             3. Create an environment for the repository with stack: {stack}.\n\
             4. Add the environment to {} under a memorable id.\n\
             5. Verify with cloud_list_environments, then submit work with cloud_submit.",
            self.environments_path.display()
        ))
    }

    // --- shared helpers ---

    async fn wait(&self, args: Value, origin: TaskOrigin) -> Result<String, ToolError> {
        #[derive(Deserialize)]
        struct Args {
            task_id: String,
            timeout_sec: u64,
            poll_interval_sec: Option<u64>,
        }
        let args: Args = parse_args(args)?;
        let task = self.find_task(&args.task_id, origin)?;
        let poll = args
            .poll_interval_sec
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        match wait_for_terminal(
            &self.registry,
            &task.id,
            Duration::from_secs(args.timeout_sec),
            poll,
        )
        .await
        {
            Ok(done) => Ok(format!(
                "Task {} finished: {}.{}",
                done.id,
                done.status,
                done.error
                    .as_deref()
                    .map(|e| format!(" ({e})"))
                    .unwrap_or_default()
            )),
            Err(WaitError::Timeout { id, status, timeout_sec }) => Err(ToolError::new(
                ErrorKind::Timeout,
                format!("task {id} still {status} after {timeout_sec}s; the task is unchanged"),
            )),
            Err(WaitError::NotFound(id)) => {
                Err(ToolError::not_found(format!("task {id} not found")))
            }
        }
    }

    fn validated_local_spec(
        &self,
        task: String,
        mode: &str,
        confirm: bool,
        working_dir: Option<PathBuf>,
        model: Option<String>,
    ) -> Result<LocalTaskSpec, ToolError> {
        validate::instruction(&task)?;
        let mode = validate::mode(mode)?;
        validate::confirmation(mode, confirm)?;
        if let Some(dir) = &working_dir {
            validate::working_dir(dir)?;
        }
        Ok(LocalTaskSpec {
            instruction: task,
            mode,
            working_dir,
            model,
        })
    }

    /// Parse `{task_id}` args and fetch the task with origin checking and
    /// suggestions on a miss.
    fn lookup(&self, args: Value, origin: TaskOrigin) -> Result<Task, ToolError> {
        #[derive(Deserialize)]
        struct Args {
            task_id: String,
        }
        let args: Args = parse_args(args)?;
        self.find_task(&args.task_id, origin)
    }

    fn find_task(&self, raw_id: &str, origin: TaskOrigin) -> Result<Task, ToolError> {
        let id: TaskId = validate::task_id(raw_id)?;
        if id.origin() != origin {
            return Err(ToolError::validation(format!(
                "task {id} is a {} task; use the {} primitives",
                id.origin(),
                id.origin()
            )));
        }
        let registry = self.registry.lock();
        registry.get(&id).ok_or_else(|| {
            let known: Vec<String> = registry
                .ids()
                .into_iter()
                .map(|t| t.as_str().to_string())
                .collect();
            let hint = format_suggestion(&find_similar(raw_id, &known));
            ToolError::not_found(format!("task {raw_id} not found{hint}"))
        })
    }

    fn load_environments(
        &self,
    ) -> Result<std::collections::BTreeMap<String, cdx_adapters::Environment>, ToolError> {
        cdx_adapters::environments::load(&self.environments_path).map_err(|e| match e {
            EnvironmentsError::Missing(path) => ToolError::new(
                ErrorKind::ConfigMissing,
                format!(
                    "no environments file at {}; create it to use cloud primitives",
                    path.display()
                ),
            ),
            other => ToolError::new(ErrorKind::Internal, other.to_string()),
        })
    }

    /// One status line for listings.
    fn summarize(&self, task: &Task) -> String {
        let now = self.clock.epoch_ms();
        let elapsed = time_fmt::format_elapsed_ms(now.saturating_sub(task.created_at));
        let action = match (&task.progress_snapshot, &task.error) {
            (_, Some(error)) => format!(" - {error}"),
            (Some(progress), None) if !task.is_terminal() => format!(
                " - {}% {}",
                progress.progress_percentage, progress.current_action
            ),
            _ => String::new(),
        };
        let mut instruction = task.instruction.replace('\n', " ");
        if instruction.len() > 60 {
            instruction.truncate(57);
            instruction.push_str("...");
        }
        format!(
            "{} [{}] ({} ago, {}): {}{}",
            task.id, task.status, elapsed, task.mode, instruction, action
        )
    }

    /// Full outcome text for results/run responses.
    fn render_task_outcome(&self, task: &Task) -> String {
        let mut out = format!("Task {} {}", task.id, task.status);
        if let (Some(done), created) = (task.completed_at, task.created_at) {
            out.push_str(&format!(
                " after {}",
                time_fmt::format_elapsed_ms(done.saturating_sub(created))
            ));
        }
        out.push('.');
        if let Some(error) = &task.error {
            out.push_str(&format!("\nerror: {error}"));
        }
        match &task.result {
            Some(TaskResult::Local(result)) => {
                out.push_str(&format!(
                    "\nexit_code: {}",
                    result
                        .exit_code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "none".into())
                ));
                if let Some(signal) = result.signal {
                    out.push_str(&format!("\nsignal: {signal}"));
                }
                if let Some(thread_id) = &result.thread_id {
                    out.push_str(&format!("\nthread_id: {thread_id}"));
                }
                if let Some(usage) = &result.usage {
                    out.push_str(&format!(
                        "\ntokens: {} in ({} cached), {} out",
                        usage.input_tokens, usage.cached_input_tokens, usage.output_tokens
                    ));
                }
                if let Some(progress) = &task.progress_snapshot {
                    out.push_str(&format!(
                        "\nsteps: {}/{} ({} files changed, {} commands)",
                        progress.completed_steps,
                        progress.total_steps,
                        progress.files_changed,
                        progress.commands_executed
                    ));
                }
                if !result.stdout.is_empty() {
                    out.push_str(&format!("\n\nagent message:\n{}", result.stdout));
                }
                if !result.stderr.is_empty() {
                    out.push_str(&format!("\n\nstderr:\n{}", result.stderr));
                }
            }
            Some(TaskResult::Cloud(result)) => {
                if let Some(url) = &result.task_url {
                    out.push_str(&format!("\nurl: {url}"));
                }
                out.push_str(&format!("\n\nsummary:\n{}", result.summary));
                if let Some(diff) = &result.diff {
                    out.push_str(&format!("\n\ndiff:\n{diff}"));
                }
                if let Some(artifacts) = &result.artifacts {
                    out.push_str(&format!("\nartifacts: {}", artifacts.join(", ")));
                }
            }
            None => {}
        }
        out
    }
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::validation(format!("bad arguments: {e}")))
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
