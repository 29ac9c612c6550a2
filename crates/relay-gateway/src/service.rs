//! The gateway service: one inbound message in, one reply out.

use std::sync::Arc;
use std::time::Duration;

use relay_action::outcome::approval_request_notice;
use relay_action::proposal::extract_proposal;
use relay_action::reference::{resolve_latest, resolve_most_recent, PendingResolution};
use relay_action::{
    ActionError, ActionExecutor, ActionReference, AdminCheck, ApprovalEngine,
    PendingScope, RequestOutcome, SensitiveApprovalGrants,
};
use relay_core::config::{ApprovalConfig, TriageConfig};
use relay_core::text::{compact_snippet, truncate_chars};
use relay_core::{
    MessageInput, MessageOutput, RelayConfig, RequestContext, StoreError, Timestamp, UserIdentity,
};
use relay_triage::{
    build_routed_task_prompt, build_routed_task_title, derive_decision, should_auto_route,
    RouteOverride, TriageClass, TriageError, TriagePriority,
};
use relay_triage::routing::LANE_OPERATIONS;
use serde_json::Value;

use crate::commands::CommandName;
use crate::error::GatewayError;
use crate::guidance::{detect_guidance, Guidance, NextStep, GUIDANCE_LISTING_LIMIT};
use crate::intent::{parse_explicit, parse_natural_language, Command, PromptCommand};
use crate::notifier::RoutingNotifier;
use crate::retriever::{RetrievalError, Retriever};
use crate::store::Store;
use crate::tools::{LookupTaskTool, RunActionTool, Tool, ToolRegistry, UpdateTaskRoutingTool};
use crate::types::{ContextRecord, NewObjective, NewTask, TaskRoutingUpdate};

type HandlerResult = Result<MessageOutput, GatewayError>;

const PENDING_ACTIONS_LIMIT: usize = 10;
const SEARCH_LIMIT: usize = 5;
const TASK_TITLE_MAX_CHARS: usize = 72;
const TASK_DUE_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

const MONITOR_PROMPT_PREFIX: &str =
    "Monitor this target for updates and report only concrete changes:\n";

/// Composes intent parsing, command handlers, the approval engine, the tool
/// registry and triage over one [`Store`].
pub struct GatewayService<S: Store + 'static> {
    store: Arc<S>,
    approval: ApprovalConfig,
    triage: TriageConfig,
    grants: Arc<SensitiveApprovalGrants>,
    executor: Option<Arc<dyn ActionExecutor>>,
    engine: Arc<ApprovalEngine<S>>,
    tools: ToolRegistry,
    retriever: Option<Arc<dyn Retriever>>,
    notifier: Option<Arc<dyn RoutingNotifier>>,
}

impl<S: Store + 'static> GatewayService<S> {
    /// Service without an executor, retriever or notifier.
    pub fn new(store: Arc<S>, config: &RelayConfig) -> Self {
        let approval = config.approval.clone();
        let grants = Arc::new(SensitiveApprovalGrants::new(approval.sensitive_approval_ttl()));
        let engine = build_engine(&store, &approval, &grants, None);

        let mut tools = ToolRegistry::new(Arc::clone(&grants), approval.system_worker_id.clone());
        tools.register(Arc::new(RunActionTool::new(Arc::clone(&engine))));
        tools.register(Arc::new(LookupTaskTool::new(Arc::clone(&store))));
        tools.register(Arc::new(UpdateTaskRoutingTool::new(Arc::clone(&store))));

        Self {
            store,
            approval,
            triage: config.triage.clone(),
            grants,
            executor: None,
            engine,
            tools,
            retriever: None,
            notifier: None,
        }
    }

    /// Run approved actions through `executor` instead of skipping them.
    pub fn with_executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = Some(executor);
        self.engine = build_engine(&self.store, &self.approval, &self.grants, self.executor.clone());
        self.tools
            .register(Arc::new(RunActionTool::new(Arc::clone(&self.engine))));
        self
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn RoutingNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Add or replace a tool.
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) {
        self.tools.register(tool);
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn engine(&self) -> &Arc<ApprovalEngine<S>> {
        &self.engine
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn grants(&self) -> &Arc<SensitiveApprovalGrants> {
        &self.grants
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    pub async fn handle_message(&self, input: &MessageInput) -> HandlerResult {
        self.handle_message_at(input, Timestamp::now()).await
    }

    /// Handle one message as of `now`.
    ///
    /// Order: explicit command, approval guidance, natural-language command,
    /// then triage. Store failures propagate as errors.
    pub async fn handle_message_at(&self, input: &MessageInput, now: Timestamp) -> HandlerResult {
        let text = input.text.trim();
        if text.is_empty() {
            return Ok(MessageOutput::unhandled());
        }

        if let Some(command) = parse_explicit(text) {
            tracing::debug!(connector = %input.connector, command = ?command, "Explicit command");
            return self.dispatch(input, command, now).await;
        }
        if let Some(guidance) = detect_guidance(text) {
            return self.handle_guidance(input, guidance).await;
        }
        if let Some(command) = parse_natural_language(text) {
            return self.dispatch(input, command, now).await;
        }
        self.handle_auto_triage(input, text, now).await
    }

    /// Run a tool for the sender of `input`, in its conversation's context.
    pub async fn invoke_tool(
        &self,
        input: &MessageInput,
        name: &str,
        args: Value,
        now: Timestamp,
    ) -> Result<String, GatewayError> {
        let ctx = self.request_context(input).await?;
        Ok(self.tools.invoke(&ctx, name, args, now).await?)
    }

    /// Turn an ```` ```action ```` block in a generated reply into an action
    /// request. The block is removed and replaced by the request outcome;
    /// text without a block is returned unchanged.
    pub async fn apply_reply_actions(
        &self,
        input: &MessageInput,
        reply: &str,
        now: Timestamp,
    ) -> Result<String, GatewayError> {
        let Some((proposal, cleaned)) = extract_proposal(reply) else {
            return Ok(reply.to_string());
        };
        let ctx = self.request_context(input).await?;
        let addendum = match self.engine.request(&ctx, proposal, now).await? {
            RequestOutcome::PendingApproval { approval, .. } => approval_request_notice(&approval.id),
            RequestOutcome::Executed(outcome) => outcome.reply,
        };
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            return Ok(addendum);
        }
        Ok(format!("{}\n\n{}", cleaned, addendum))
    }

    async fn dispatch(&self, input: &MessageInput, command: Command, now: Timestamp) -> HandlerResult {
        match command {
            Command::Usage(name) => Ok(usage(name)),
            Command::Task { prompt } => self.handle_task(input, &prompt, now).await,
            Command::Route { args } => self.handle_route(input, &args, now).await,
            Command::Search { query } => self.handle_search(input, &query).await,
            Command::Open { target } => self.handle_open(input, &target).await,
            Command::Status => self.handle_status(input).await,
            Command::Monitor { goal } => self.handle_monitor(input, &goal).await,
            Command::AdminChannel => self.handle_admin_channel(input).await,
            Command::Prompt(prompt) => self.handle_prompt(input, prompt).await,
            Command::ApprovePairing { token } => self.handle_approve_pairing(input, &token).await,
            Command::DenyPairing { token, reason } => {
                self.handle_deny_pairing(input, &token, reason.as_deref()).await
            }
            Command::PendingActions => self.handle_pending_actions(input).await,
            Command::ApproveAction(reference) => self.handle_approve_action(input, reference, now).await,
            Command::DenyAction { reference, reason } => {
                self.handle_deny_action(input, reference, reason.as_deref()).await
            }
        }
    }

    // =========================================================================
    // Shared helpers
    // =========================================================================

    async fn ensure_context(&self, input: &MessageInput) -> Result<ContextRecord, GatewayError> {
        Ok(self
            .store
            .ensure_context(&input.connector, &input.external_id, &input.display_name)
            .await?)
    }

    async fn request_context(&self, input: &MessageInput) -> Result<RequestContext, GatewayError> {
        let context = self.ensure_context(input).await?;
        Ok(RequestContext::new(input.clone(), context.workspace_id, context.id))
    }

    /// `Ok(identity)` for admins, else the fixed access-denied reply.
    async fn require_admin(
        &self,
        input: &MessageInput,
    ) -> Result<Result<UserIdentity, MessageOutput>, GatewayError> {
        match self.engine.authorize_admin(input).await? {
            AdminCheck::Granted(identity) => Ok(Ok(identity)),
            denied => {
                tracing::info!(
                    connector = %input.connector,
                    user_id = %input.from_user_id,
                    check = ?denied,
                    "Admin command refused"
                );
                Ok(Err(MessageOutput::handled(denied.denial_reply().unwrap_or_default())))
            }
        }
    }

    // =========================================================================
    // Guidance
    // =========================================================================

    async fn handle_guidance(&self, input: &MessageInput, guidance: Guidance) -> HandlerResult {
        let step = match guidance {
            Guidance::Fixed(reply) => return Ok(MessageOutput::handled(reply)),
            Guidance::ApprovalNextStep => self.next_approval_step(input).await?,
        };
        Ok(MessageOutput::handled(step.reply()))
    }

    async fn next_approval_step(&self, input: &MessageInput) -> Result<NextStep, GatewayError> {
        let scope = PendingScope::from_input(input);
        let mut items = self
            .store
            .list_pending_action_approvals(&scope, GUIDANCE_LISTING_LIMIT)
            .await?;
        let mut across_contexts = false;
        if items.is_empty() {
            items = self
                .store
                .list_pending_action_approvals_global(GUIDANCE_LISTING_LIMIT)
                .await?;
            across_contexts = true;
        }
        Ok(match items.as_slice() {
            [] => NextStep::NonePending,
            [only] => NextStep::Single {
                action_id: only.id.clone(),
                access: self.engine.authorize_admin(input).await?,
            },
            _ => NextStep::Multiple { across_contexts },
        })
    }

    // =========================================================================
    // Action approvals
    // =========================================================================

    async fn handle_pending_actions(&self, input: &MessageInput) -> HandlerResult {
        if let Err(denied) = self.require_admin(input).await? {
            return Ok(denied);
        }
        let scope = PendingScope::from_input(input);
        let mut items = self
            .store
            .list_pending_action_approvals(&scope, PENDING_ACTIONS_LIMIT)
            .await?;
        let mut all_contexts = false;
        if items.is_empty() {
            items = self
                .store
                .list_pending_action_approvals_global(PENDING_ACTIONS_LIMIT)
                .await?;
            all_contexts = true;
        }
        if items.is_empty() {
            return Ok(MessageOutput::handled("No pending actions."));
        }

        let header = if all_contexts {
            "Pending actions (all contexts):"
        } else {
            "Pending actions:"
        };
        let mut lines = vec![header.to_string()];
        for item in &items {
            let summary = match item.summary.trim() {
                "" => item.action_type.as_str(),
                s => s,
            };
            let mut line = format!("- `{}` {} ({})", item.id, summary, item.action_type);
            if all_contexts {
                line.push_str(&format!(
                    " [{}/{}]",
                    or_unknown(&item.connector),
                    or_unknown(&item.external_id)
                ));
            }
            lines.push(line);
        }
        Ok(MessageOutput::handled(lines.join("\n")))
    }

    async fn handle_approve_action(
        &self,
        input: &MessageInput,
        reference: ActionReference,
        now: Timestamp,
    ) -> HandlerResult {
        let identity = match self.require_admin(input).await? {
            Ok(identity) => identity,
            Err(denied) => return Ok(denied),
        };

        let id = match reference {
            ActionReference::All => {
                let report = self.engine.approve_all(input, &identity.user_id, now).await?;
                return Ok(MessageOutput::handled(report.approve_reply()));
            }
            reference => match self.resolve_reference(input, reference, "approve").await? {
                Ok(id) => id,
                Err(reply) => return Ok(reply),
            },
        };

        match self
            .engine
            .approve_and_execute(input, &identity.user_id, &id, now)
            .await
        {
            Ok(outcome) => Ok(MessageOutput::handled(outcome.reply)),
            Err(e) => approval_state_reply(e),
        }
    }

    async fn handle_deny_action(
        &self,
        input: &MessageInput,
        reference: ActionReference,
        reason: Option<&str>,
    ) -> HandlerResult {
        let identity = match self.require_admin(input).await? {
            Ok(identity) => identity,
            Err(denied) => return Ok(denied),
        };

        let id = match reference {
            ActionReference::All => {
                let report = self.engine.deny_all(input, &identity.user_id, reason).await?;
                return Ok(MessageOutput::handled(report.deny_reply()));
            }
            reference => match self.resolve_reference(input, reference, "deny").await? {
                Ok(id) => id,
                Err(reply) => return Ok(reply),
            },
        };

        match self.engine.deny(&identity.user_id, &id, reason).await {
            Ok(record) => Ok(MessageOutput::handled(format!("Action `{}` denied.", record.id))),
            Err(e) => approval_state_reply(e),
        }
    }

    /// Concrete id for a single-action reference, or the reply explaining
    /// why there is none.
    async fn resolve_reference(
        &self,
        input: &MessageInput,
        reference: ActionReference,
        verb: &str,
    ) -> Result<Result<String, MessageOutput>, GatewayError> {
        let scope = PendingScope::from_input(input);
        let resolution = match reference {
            ActionReference::Id(id) => return Ok(Ok(id)),
            ActionReference::Latest => resolve_latest(self.store.as_ref(), &scope).await?,
            ActionReference::MostRecent | ActionReference::All => {
                resolve_most_recent(self.store.as_ref(), &scope).await?
            }
        };
        tracing::debug!(resolution = ?resolution, verb = %verb, "Resolved pending action reference");
        match resolution {
            PendingResolution::Found(id) => Ok(Ok(id)),
            other => Ok(Err(MessageOutput::handled(other.reply(verb).unwrap_or_default()))),
        }
    }

    // =========================================================================
    // Pairing
    // =========================================================================

    async fn handle_approve_pairing(&self, input: &MessageInput, token: &str) -> HandlerResult {
        let token = token.trim();
        if token.is_empty() {
            return Ok(usage(CommandName::Approve));
        }
        let identity = match self.require_admin(input).await? {
            Ok(identity) => identity,
            Err(denied) => return Ok(denied),
        };
        match self
            .store
            .approve_pairing(token, &identity.user_id, &identity.role)
            .await
        {
            Ok(approval) => {
                tracing::info!(connector = %approval.request.connector, user_id = %approval.user_id, "Pairing approved");
                Ok(MessageOutput::handled(format!(
                    "Pairing approved for `{}` ({}).",
                    approval.request.display_name, approval.user_id
                )))
            }
            Err(StoreError::PairingNotFound(_)) => Ok(MessageOutput::handled("Pairing token not found.")),
            Err(e) => Err(e.into()),
        }
    }

    async fn handle_deny_pairing(
        &self,
        input: &MessageInput,
        token: &str,
        reason: Option<&str>,
    ) -> HandlerResult {
        let token = token.trim();
        if token.is_empty() {
            return Ok(usage(CommandName::Deny));
        }
        let identity = match self.require_admin(input).await? {
            Ok(identity) => identity,
            Err(denied) => return Ok(denied),
        };
        let reason = match reason.map(str::trim) {
            Some(r) if !r.is_empty() => r,
            _ => self.approval.default_deny_reason.as_str(),
        };
        match self.store.deny_pairing(token, &identity.user_id, reason).await {
            Ok(request) => {
                tracing::info!(connector = %request.connector, reason = %reason, "Pairing denied");
                Ok(MessageOutput::handled(format!(
                    "Pairing denied for `{}`.",
                    request.display_name
                )))
            }
            Err(StoreError::PairingNotFound(_)) => Ok(MessageOutput::handled("Pairing token not found.")),
            Err(e) => Err(e.into()),
        }
    }

    // =========================================================================
    // Context administration
    // =========================================================================

    async fn handle_admin_channel(&self, input: &MessageInput) -> HandlerResult {
        if let Err(denied) = self.require_admin(input).await? {
            return Ok(denied);
        }
        let context = self.ensure_context(input).await?;
        self.store.set_context_admin(&context.id, true).await?;
        tracing::info!(context_id = %context.id, "Admin channel enabled");
        Ok(MessageOutput::handled(format!(
            "Admin channel enabled for context `{}`.",
            context.id
        )))
    }

    async fn handle_prompt(&self, input: &MessageInput, command: PromptCommand) -> HandlerResult {
        if let Err(denied) = self.require_admin(input).await? {
            return Ok(denied);
        }
        let context = self.ensure_context(input).await?;
        match command {
            PromptCommand::Show => {
                let prompt = match context.system_prompt.trim() {
                    "" => "(empty)",
                    p => p,
                };
                Ok(MessageOutput::handled(format!("Current context prompt:\n{}", prompt)))
            }
            PromptCommand::Clear => {
                self.store.set_context_system_prompt(&context.id, "").await?;
                Ok(MessageOutput::handled("Context prompt cleared."))
            }
            PromptCommand::Set(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Ok(MessageOutput::handled("Usage: /prompt set <text>"));
                }
                self.store.set_context_system_prompt(&context.id, text).await?;
                Ok(MessageOutput::handled(format!(
                    "Context prompt updated for `{}`.",
                    context.id
                )))
            }
        }
    }

    async fn handle_route(&self, input: &MessageInput, args: &str, now: Timestamp) -> HandlerResult {
        if let Err(denied) = self.require_admin(input).await? {
            return Ok(denied);
        }
        let context = self.ensure_context(input).await?;
        if !context.is_admin {
            return Ok(MessageOutput::handled(
                "Access denied: route overrides are only allowed in admin channels.",
            ));
        }

        let fields: Vec<&str> = args.split_whitespace().collect();
        if fields.len() < 2 {
            return Ok(usage(CommandName::Route));
        }
        let task = match self.store.lookup_task(fields[0]).await {
            Ok(task) => task,
            Err(StoreError::TaskNotFound(_)) => return Ok(MessageOutput::handled("Task not found.")),
            Err(e) => return Err(e.into()),
        };
        let (task_ws, context_ws) = (task.workspace_id.trim(), context.workspace_id.trim());
        if !task_ws.is_empty() && !context_ws.is_empty() && !task_ws.eq_ignore_ascii_case(context_ws) {
            return Ok(MessageOutput::handled(
                "Access denied: task belongs to a different workspace.",
            ));
        }

        let route = match RouteOverride::parse(args) {
            Ok(route) => route,
            Err(TriageError::InvalidClass(_)) => {
                return Ok(MessageOutput::handled(
                    "Invalid route class. Use: question, issue, task, moderation, noise.",
                ))
            }
            Err(TriageError::InvalidDueWindow(_)) | Err(TriageError::InvalidPriority(_)) => {
                return Ok(MessageOutput::handled(
                    "Invalid due window. Examples: `2h`, `8h`, `1d`, `2d`.",
                ))
            }
            Err(TriageError::MissingArguments) => return Ok(usage(CommandName::Route)),
        };

        let due_at = route.due_at(now);
        let updated = match self
            .store
            .update_task_routing(TaskRoutingUpdate {
                task_id: task.id.clone(),
                route_class: route.class,
                priority: route.priority,
                due_at,
                lane: route.lane.clone(),
            })
            .await
        {
            Ok(updated) => updated,
            Err(StoreError::TaskNotFound(_)) => return Ok(MessageOutput::handled("Task not found.")),
            Err(e) => return Err(e.into()),
        };
        tracing::info!(
            task_id = %updated.id,
            class = %route.class,
            priority = %route.priority,
            lane = %route.lane,
            "Task routing overridden"
        );

        let due = due_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "(none)".to_string());
        Ok(MessageOutput::handled(format!(
            "Routing updated for `{}`:\n- class: `{}`\n- priority: `{}`\n- lane: `{}`\n- due: `{}`",
            updated.id, route.class, route.priority, route.lane, due
        )))
    }

    // =========================================================================
    // Retrieval
    // =========================================================================

    async fn handle_status(&self, input: &MessageInput) -> HandlerResult {
        let Some(retriever) = &self.retriever else {
            return Ok(MessageOutput::handled("Status is not configured on this runtime."));
        };
        let context = self.ensure_context(input).await?;
        let status = match retriever.status(&context.workspace_id).await {
            Ok(status) => status,
            Err(RetrievalError::Unavailable(_)) => {
                return Ok(MessageOutput::handled(
                    "Status is unavailable: the search backend is not reachable.",
                ))
            }
            Err(e) => return Err(e.into()),
        };

        let workspace = match status.workspace_id.trim() {
            "" => context.workspace_id.as_str(),
            ws => ws,
        };
        let mut lines = vec![format!("Workspace `{}` search index status:", workspace)];
        if !status.workspace_exists {
            lines.push("- workspace directory not created yet".to_string());
            return Ok(MessageOutput::handled(lines.join("\n")));
        }
        lines.push(
            if status.indexed {
                "- indexed: yes"
            } else {
                "- indexed: no (will build on first search/change)"
            }
            .to_string(),
        );
        lines.push(format!("- pending reindex: {}", yes_no(status.pending_reindex)));
        lines.push(
            if status.index_exists {
                "- index file: present"
            } else {
                "- index file: not found"
            }
            .to_string(),
        );
        if let Some(at) = status.last_indexed_at {
            lines.push(format!("- last indexed: {}", at.to_rfc3339()));
        }
        if !status.summary.trim().is_empty() {
            lines.push(format!("- summary: {}", compact_snippet(&status.summary)));
        }
        Ok(MessageOutput::handled(lines.join("\n")))
    }

    async fn handle_search(&self, input: &MessageInput, query: &str) -> HandlerResult {
        let query = query.trim();
        if query.is_empty() {
            return Ok(usage(CommandName::Search));
        }
        let Some(retriever) = &self.retriever else {
            return Ok(MessageOutput::handled("Search is not configured on this runtime."));
        };
        let context = self.ensure_context(input).await?;
        let hits = match retriever.search(&context.workspace_id, query, SEARCH_LIMIT).await {
            Ok(hits) => hits,
            Err(RetrievalError::Unavailable(_)) => {
                return Ok(MessageOutput::handled(
                    "Search is unavailable: the search backend is not reachable.",
                ))
            }
            Err(e) => return Err(e.into()),
        };
        if hits.is_empty() {
            return Ok(MessageOutput::handled("No markdown matches found."));
        }

        let mut lines = vec![format!("Top {} result(s):", hits.len())];
        for (index, hit) in hits.iter().enumerate() {
            let snippet = compact_snippet(&hit.snippet);
            let line = match hit.percent() {
                Some(score) => format!("{}. `{}` ({}%) {}", index + 1, hit.location(), score, snippet),
                None => format!("{}. `{}` {}", index + 1, hit.location(), snippet),
            };
            lines.push(line);
        }
        Ok(MessageOutput::handled(lines.join("\n")))
    }

    async fn handle_open(&self, input: &MessageInput, target: &str) -> HandlerResult {
        let target = target.trim();
        if target.is_empty() {
            return Ok(usage(CommandName::Open));
        }
        let Some(retriever) = &self.retriever else {
            return Ok(MessageOutput::handled("Open is not configured on this runtime."));
        };
        let context = self.ensure_context(input).await?;
        let document = match retriever.open(&context.workspace_id, target).await {
            Ok(document) => document,
            Err(RetrievalError::Unavailable(_)) => {
                return Ok(MessageOutput::handled(
                    "Open is unavailable: the search backend is not reachable.",
                ))
            }
            Err(RetrievalError::NotFound(_)) => {
                return Ok(MessageOutput::handled("Markdown file not found in this workspace."))
            }
            Err(RetrievalError::InvalidTarget(_)) => {
                return Ok(MessageOutput::handled(
                    "Invalid target. Use a relative `.md` path or a document id (`#abc123`).",
                ))
            }
            Err(e) => return Err(e.into()),
        };

        let content = match document.content.trim() {
            "" => "(empty file)",
            c => c,
        };
        let mut reply = format!("`{}`\n{}", document.path, content);
        if document.truncated {
            reply.push_str("\n\n(Truncated to safe output size.)");
        }
        Ok(MessageOutput::handled(reply))
    }

    // =========================================================================
    // Tasks and objectives
    // =========================================================================

    async fn handle_task(&self, input: &MessageInput, prompt: &str, now: Timestamp) -> HandlerResult {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Ok(usage(CommandName::Task));
        }
        let context = self.ensure_context(input).await?;
        let task = self
            .store
            .create_task(NewTask {
                workspace_id: context.workspace_id,
                context_id: context.id,
                title: truncate_chars(prompt, TASK_TITLE_MAX_CHARS).trim_end().to_string(),
                prompt: prompt.to_string(),
                route_class: TriageClass::Task,
                priority: TriagePriority::P2,
                due_at: Some(now.after(TASK_DUE_WINDOW)),
                lane: LANE_OPERATIONS.to_string(),
                source_connector: input.connector.trim().to_lowercase(),
                source_external_id: input.external_id.trim().to_string(),
                source_user_id: input.from_user_id.trim().to_string(),
                source_text: prompt.to_string(),
            })
            .await?;
        tracing::info!(task_id = %task.id, connector = %task.source_connector, "Task queued");
        Ok(MessageOutput::handled(format!("Task queued: `{}`", task.id)))
    }

    async fn handle_monitor(&self, input: &MessageInput, goal: &str) -> HandlerResult {
        let goal = goal.trim();
        if goal.is_empty() {
            return Ok(usage(CommandName::Monitor));
        }
        let context = self.ensure_context(input).await?;
        let title = format!("Monitor: {}", compact_snippet(goal));
        let objective = self
            .store
            .create_objective(NewObjective {
                workspace_id: context.workspace_id,
                context_id: context.id,
                title: truncate_chars(&title, TASK_TITLE_MAX_CHARS).trim_end().to_string(),
                prompt: format!("{}{}", MONITOR_PROMPT_PREFIX, goal),
            })
            .await?;
        tracing::info!(objective_id = %objective.id, "Monitoring objective created");
        Ok(MessageOutput::handled(
            "Monitoring objective created. I'll keep checking and report updates until you pause or delete it.",
        ))
    }

    // =========================================================================
    // Triage
    // =========================================================================

    async fn handle_auto_triage(&self, input: &MessageInput, text: &str, now: Timestamp) -> HandlerResult {
        if !self.triage.enabled || text.starts_with('/') {
            return Ok(MessageOutput::unhandled());
        }
        let context = self.ensure_context(input).await?;
        let mut decision = derive_decision(input, &context.workspace_id, &context.id, text, now);
        if decision.class == TriageClass::Noise || !should_auto_route(&decision) {
            tracing::debug!(class = %decision.class, reason = %decision.reason, "Message not routed");
            return Ok(MessageOutput::unhandled());
        }

        let title = build_routed_task_title(decision.class, &decision.source_text);
        let prompt = build_routed_task_prompt(&decision);
        let task = self
            .store
            .create_task(NewTask::from_decision(&decision, title, prompt))
            .await?;
        decision.task_id = Some(task.id.clone());
        tracing::info!(
            task_id = %task.id,
            class = %decision.class,
            priority = %decision.priority,
            lane = %decision.lane,
            "Message routed to task"
        );

        if self.triage.notify_routing {
            if let Some(notifier) = &self.notifier {
                notifier.notify(&decision).await;
            }
        }
        Ok(MessageOutput::handled(triage_ack(decision.class)))
    }
}

fn build_engine<S: Store + 'static>(
    store: &Arc<S>,
    approval: &ApprovalConfig,
    grants: &Arc<SensitiveApprovalGrants>,
    executor: Option<Arc<dyn ActionExecutor>>,
) -> Arc<ApprovalEngine<S>> {
    let mut engine =
        ApprovalEngine::new(Arc::clone(store), approval.clone()).with_grants(Arc::clone(grants));
    if let Some(executor) = executor {
        engine = engine.with_executor(executor);
    }
    Arc::new(engine)
}

fn usage(name: CommandName) -> MessageOutput {
    MessageOutput::handled(name.usage().unwrap_or_default())
}

/// Fixed replies for the expected approval state conflicts; anything else
/// propagates.
fn approval_state_reply(err: ActionError) -> HandlerResult {
    match err {
        ActionError::NotFound(_) => Ok(MessageOutput::handled("Action approval not found.")),
        ActionError::NotReady(_) => Ok(MessageOutput::handled("Action approval is not pending.")),
        other => Err(other.into()),
    }
}

fn triage_ack(class: TriageClass) -> &'static str {
    match class {
        TriageClass::Issue => {
            "Thanks for flagging this. I'm investigating now and I'll report back with findings."
        }
        TriageClass::Moderation => {
            "Received. I'm reviewing this now and I'll follow up with what I find."
        }
        TriageClass::Question => "Yes, I'm on it. I'll investigate and come back with an answer.",
        _ => "Understood. I'm handling this now and I'll share results shortly.",
    }
}

fn or_unknown(value: &str) -> &str {
    match value.trim() {
        "" => "unknown",
        v => v,
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
