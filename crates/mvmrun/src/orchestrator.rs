//! # Executive Orchestrator
//!
//! The executive isolate's half of the core: it owns the bookkeeping of every
//! isolate, application, and window in the process, drives lifecycle through
//! the conduit, and enforces foreground exclusivity.
//!
//! ## Invariants
//! - Isolate phases only move forward; a notice for a destroyed isolate is
//!   stale and ignored.
//! - At most one window is foreground at a time; the handoff always completes
//!   the background request before issuing the foreground one.
//! - The executive event loop never awaits a synchronous call inline. Its own
//!   queue carries the responses those calls wait for, so an inline await
//!   would deadlock the loop against itself; anything needing a round trip is
//!   spawned.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use mvmrpc::AppDescriptor;
use mvmrpc::AppId;
use mvmrpc::Command;
use mvmrpc::Frame;
use mvmrpc::IsolateId;
use mvmrpc::Payload;
use mvmrpc::Response;
use mvmrpc::WindowId;
use mvmrpc::WireCommand;
use mvmrpc::lifecycle::DestroyApp;
use mvmrpc::lifecycle::DestroyIsolate;
use mvmrpc::lifecycle::GetAppWindows;
use mvmrpc::lifecycle::InitIsolate;
use mvmrpc::lifecycle::PauseApp;
use mvmrpc::lifecycle::ResumeApp;
use mvmrpc::lifecycle::StartApp;
use mvmrpc::route::ExecutiveNotice;
use mvmrpc::window::Background;
use mvmrpc::window::Foreground;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::conduit::Conduit;
use crate::context::Context;
use crate::error::Error;
use crate::error::Result;
use crate::midlet::MidletState;
use crate::policy::ActivationPolicy;
use crate::policy::AppSnapshot;
use crate::queue::Event;
use crate::queue::EventQueue;

/// Lifecycle calls wait indefinitely: every request is eventually answered
/// unless the target dies, and a dead target fails the waiter instead.
const LIFECYCLE_TIMEOUT: Duration = Duration::ZERO;

/// Isolate teardown is bounded so a wedged isolate cannot stall the
/// executive; on expiry the isolate is written off as unreachable.
const DESTROY_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawns the execution vehicle for one isolate and registers its queue.
///
/// The orchestrator does not care whether that vehicle is an in-process task
/// or something heavier; it only requires that the isolate answer lifecycle
/// requests on its queue afterwards.
#[async_trait]
pub trait IsolateFactory: Send + Sync + 'static {
    async fn create(&self, ctx: Arc<Context>, id: IsolateId) -> Result<()>;
}

/// Forward-only isolate phase tracked by the executive.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum IsolatePhase {
    Created,
    Initialized,
    Running,
    Destroyed,
}

/// The executive's snapshot of one application. Updated from notifications;
/// may lag the isolate's authoritative peer.
#[derive(Clone, Debug)]
struct AppEntry {
    state: MidletState,
    windows: Vec<WindowId>,
}

/// The executive isolate: bookkeeping plus the event loop draining its queue.
pub struct Orchestrator {
    ctx: Arc<Context>,
    conduit: Arc<Conduit>,
    factory: Arc<dyn IsolateFactory>,
    policy: Box<dyn ActivationPolicy>,
    isolates: DashMap<IsolateId, IsolatePhase>,
    apps: DashMap<(IsolateId, AppId), AppEntry>,
    windows: DashMap<WindowId, (IsolateId, AppId)>,
    foreground: Mutex<Option<WindowId>>,
}

impl Orchestrator {
    /// Creates the orchestrator, registers the executive queue, and spawns
    /// its event loop.
    pub fn spawn(
        ctx: Arc<Context>,
        factory: Arc<dyn IsolateFactory>,
        policy: Box<dyn ActivationPolicy>,
    ) -> Arc<Self> {
        let id = ctx.ams_isolate_id();
        let (sender, queue) = EventQueue::channel();
        ctx.register_queue(id, sender);

        let orchestrator = Arc::new(Self {
            conduit: Arc::new(Conduit::new(id, ctx.clone())),
            ctx,
            factory,
            policy,
            isolates: DashMap::new(),
            apps: DashMap::new(),
            windows: DashMap::new(),
            foreground: Mutex::new(None),
        });

        tokio::spawn(orchestrator.clone().run(queue));
        orchestrator
    }

    /// The shared runtime context.
    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// This orchestrator's conduit, for callers co-located with the
    /// executive.
    pub fn conduit(&self) -> &Arc<Conduit> {
        &self.conduit
    }

    /// The executive's lagging view of an application's state.
    pub fn app_state(&self, isolate_id: IsolateId, app_id: AppId) -> Option<MidletState> {
        self.apps.get(&(isolate_id, app_id)).map(|entry| entry.state)
    }

    /// The window currently holding the foreground, if any.
    pub async fn foreground_window(&self) -> Option<WindowId> {
        *self.foreground.lock().await
    }

    // -- lifecycle operations -----------------------------------------------

    /// Creates a fresh isolate, initializes it, and starts the application
    /// described by `descriptor` inside it.
    pub async fn launch(&self, app_model: i32, descriptor: &[u8]) -> Result<(IsolateId, AppId)> {
        let id = self.ctx.alloc_isolate_id();
        self.isolates.insert(id, IsolatePhase::Created);
        info!(isolate = %id, "launching isolate");

        if let Err(e) = self.factory.create(self.ctx.clone(), id).await {
            self.isolates.insert(id, IsolatePhase::Destroyed);
            return Err(e);
        }

        let init = InitIsolate { app_model }.to_wire();
        self.expect_success(self.lifecycle_request(id, init).await?)?;
        self.advance(id, IsolatePhase::Initialized);

        let app_id = self.start_app(id, descriptor).await?;
        self.advance(id, IsolatePhase::Running);
        Ok((id, app_id))
    }

    /// Launcher entry with the full naming set: builds an [`AppDescriptor`]
    /// payload and launches it.
    pub async fn execute(
        &self,
        app_model: i32,
        suite_id: &str,
        class_name: &str,
        display_name: &str,
        args: &[String],
    ) -> Result<(IsolateId, AppId)> {
        let descriptor = AppDescriptor {
            suite_id: suite_id.to_string(),
            class_name: class_name.to_string(),
            display_name: display_name.to_string(),
            args: args.to_vec(),
        };
        let bytes = descriptor.encode().map_err(Error::Protocol)?;
        self.launch(app_model, &bytes).await
    }

    /// Starts an application in an already running isolate.
    pub async fn start_app(&self, isolate_id: IsolateId, descriptor: &[u8]) -> Result<AppId> {
        let cmd = StartApp { descriptor: descriptor.to_vec() }.to_wire();
        let response = self.lifecycle_request(isolate_id, cmd).await?;
        let app_id = AppId(self.expect_int(response)?);

        // Register before fetching windows: the activation notice may already
        // be racing this task through the executive loop.
        self.apps
            .entry((isolate_id, app_id))
            .or_insert(AppEntry { state: MidletState::ActivePending, windows: Vec::new() });

        let windows = self.get_app_windows(isolate_id, app_id).await?;
        for window in &windows {
            self.windows.insert(*window, (isolate_id, app_id));
        }
        if let Some(mut entry) = self.apps.get_mut(&(isolate_id, app_id)) {
            entry.windows = windows;
        }
        Ok(app_id)
    }

    /// Requests that an application pause; completion arrives later as an
    /// `AppPaused` notification.
    pub async fn pause_app(&self, isolate_id: IsolateId, app_id: AppId) -> Result<()> {
        let cmd = PauseApp { app_id }.to_wire();
        self.expect_success(self.lifecycle_request(isolate_id, cmd).await?)
    }

    /// Requests that a paused application resume.
    pub async fn resume_app(&self, isolate_id: IsolateId, app_id: AppId) -> Result<()> {
        let cmd = ResumeApp { app_id }.to_wire();
        self.expect_success(self.lifecycle_request(isolate_id, cmd).await?)
    }

    /// Destroys an application. Destruction is idempotent: an application the
    /// executive already saw die yields `Ok`, and an unreachable isolate
    /// means the application is gone with it.
    pub async fn destroy_app(
        &self,
        isolate_id: IsolateId,
        app_id: AppId,
        best_effort: bool,
    ) -> Result<()> {
        if let Some(entry) = self.apps.get(&(isolate_id, app_id)) {
            if entry.state == MidletState::Destroyed {
                return Ok(());
            }
        }

        let cmd = DestroyApp { app_id, best_effort }.to_wire();
        match self.call(isolate_id, cmd, LIFECYCLE_TIMEOUT).await {
            Ok(response) => {
                self.expect_success(response)?;
                self.forget_app(isolate_id, app_id).await;
                Ok(())
            }
            Err(Error::Unreachable(_)) => {
                // The isolate died under us; its applications died with it.
                self.purge_isolate(isolate_id).await;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Asks an isolate which windows an application owns.
    pub async fn get_app_windows(
        &self,
        isolate_id: IsolateId,
        app_id: AppId,
    ) -> Result<Vec<WindowId>> {
        let cmd = GetAppWindows { app_id }.to_wire();
        let response = self.lifecycle_request(isolate_id, cmd).await?;
        Ok(self.expect_ints(response)?.into_iter().map(WindowId).collect())
    }

    /// Hands the foreground to `window`.
    ///
    /// The previous holder is backgrounded first and that request is awaited
    /// before the foreground request goes out, so no interleaving can leave
    /// two windows foreground. Handoffs are serialized by the foreground
    /// lock.
    pub async fn set_foreground(&self, window: WindowId) -> Result<()> {
        let mut foreground = self.foreground.lock().await;
        if *foreground == Some(window) {
            return Ok(());
        }

        if let Some(previous) = *foreground {
            if let Some(owner) = self.windows.get(&previous).map(|entry| entry.0) {
                let cmd = Background { window_id: previous }.to_wire();
                match self.call(owner, cmd, LIFECYCLE_TIMEOUT).await {
                    Ok(response) => self.expect_success(response)?,
                    // A dead owner has no foreground to give up.
                    Err(Error::Unreachable(_)) => {}
                    Err(e) => return Err(e),
                }
            }
            *foreground = None;
        }

        let owner = self
            .windows
            .get(&window)
            .map(|entry| entry.0)
            .ok_or(Error::Remote(format!("unknown window: {}", window)))?;
        let cmd = Foreground { window_id: window }.to_wire();
        self.expect_success(self.call(owner, cmd, LIFECYCLE_TIMEOUT).await?)?;
        *foreground = Some(window);
        Ok(())
    }

    /// Tears an isolate down and fails everything still waiting on it.
    pub async fn destroy_isolate(&self, isolate_id: IsolateId, best_effort: bool) -> Result<()> {
        let cmd = DestroyIsolate { best_effort }.to_wire();
        match self.call(isolate_id, cmd, DESTROY_TIMEOUT).await {
            Ok(response) => {
                if let Response::Failure(msg) = response {
                    warn!(isolate = %isolate_id, reason = %msg, "isolate refused teardown");
                }
            }
            Err(e) => {
                debug!(isolate = %isolate_id, error = %e, "teardown request not answered");
            }
        }

        self.conduit.fail_target(isolate_id);
        self.ctx.unregister_queue(isolate_id);
        self.purge_isolate(isolate_id).await;
        Ok(())
    }

    /// Shuts the whole core down: every isolate's loop, then the executive's.
    pub async fn close(&self) {
        let targets: Vec<IsolateId> = self
            .isolates
            .iter()
            .filter(|entry| *entry.value() != IsolatePhase::Destroyed)
            .map(|entry| *entry.key())
            .collect();
        for target in targets {
            if let Err(e) = self.ctx.deliver(target, Event::Shutdown) {
                debug!(isolate = %target, error = %e, "already gone at shutdown");
            }
            self.conduit.fail_target(target);
        }
        let _ = self.ctx.deliver(self.ctx.ams_isolate_id(), Event::Shutdown);
    }

    // -- event loop ---------------------------------------------------------

    async fn run(self: Arc<Self>, mut queue: EventQueue) {
        while let Some(event) = queue.next().await {
            match event {
                Event::Command(Frame::Response { seq, response }) => {
                    self.conduit.fulfill(seq, response);
                }
                Event::Command(Frame::Notify { from, cmd }) => self.handle_notice(from, &cmd),
                Event::Command(Frame::Request { seq, from, .. }) => {
                    // The executive takes no requests; answer rather than
                    // leave the caller hanging.
                    let reply = Frame::Response {
                        seq,
                        response: Response::failure("executive accepts no requests"),
                    };
                    if let Err(e) = self.ctx.deliver(from, Event::Command(reply)) {
                        debug!(source = %from, error = %e, "could not refuse request");
                    }
                }
                Event::Shutdown => break,
                other => debug!(?other, "ignoring raw event on executive queue"),
            }
        }
        self.ctx.unregister_queue(self.ctx.ams_isolate_id());
    }

    /// Digests one notification. Bookkeeping happens inline; anything that
    /// needs a round trip is spawned so the loop stays free to fulfill the
    /// responses those round trips wait for.
    fn handle_notice(self: &Arc<Self>, from: IsolateId, cmd: &WireCommand) {
        if self.isolates.get(&from).map(|phase| *phase.value()) == Some(IsolatePhase::Destroyed) {
            debug!(source = %from, id = %cmd.id, "dropping notice from destroyed isolate");
            return;
        }

        let notice = match ExecutiveNotice::from_wire(cmd) {
            Ok(notice) => notice,
            Err(e) => {
                warn!(source = %from, id = %cmd.id, error = %e, "dropping undecodable notice");
                return;
            }
        };

        match notice {
            ExecutiveNotice::IsolateInitialized(n) => {
                self.advance(n.isolate_id, IsolatePhase::Initialized);
            }
            ExecutiveNotice::IsolateDestroyed(n) => {
                info!(isolate = %n.isolate_id, "isolate destroyed");
                self.conduit.fail_target(n.isolate_id);
                self.ctx.unregister_queue(n.isolate_id);
                let this = self.clone();
                tokio::spawn(async move {
                    this.purge_isolate(n.isolate_id).await;
                    this.fill_foreground(None).await;
                });
            }
            ExecutiveNotice::AppPaused(n) => {
                let key = (n.app.isolate_id, n.app.app_id);
                self.record_state(key, MidletState::Paused);
                let this = self.clone();
                tokio::spawn(async move {
                    // Only a pause that vacated the foreground opens a slot,
                    // and the app that just paused is not a candidate for it.
                    if this.drop_foreground_of(key.0, key.1).await {
                        this.fill_foreground(Some(key)).await;
                    }
                });
            }
            ExecutiveNotice::AppResumed(n) => {
                self.record_state((n.app.isolate_id, n.app.app_id), MidletState::Active);
            }
            ExecutiveNotice::AppRequestResume(n) => {
                let this = self.clone();
                tokio::spawn(async move {
                    this.consider_resume(n.app.isolate_id, n.app.app_id).await;
                });
            }
            ExecutiveNotice::AppRequestPause(n) => {
                let this = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = this.pause_app(n.app.isolate_id, n.app.app_id).await {
                        warn!(error = %e, "requested pause failed");
                    }
                });
            }
            ExecutiveNotice::NotifyFg(n) => {
                let this = self.clone();
                tokio::spawn(async move {
                    let mut foreground = this.foreground.lock().await;
                    if let Some(previous) = *foreground {
                        if previous != n.window.window_id {
                            debug!(window = %previous, "foreground displaced by local event");
                        }
                    }
                    *foreground = Some(n.window.window_id);
                });
            }
            ExecutiveNotice::NotifyBg(n) => {
                let this = self.clone();
                tokio::spawn(async move {
                    let mut foreground = this.foreground.lock().await;
                    if *foreground == Some(n.window.window_id) {
                        *foreground = None;
                    }
                });
            }
        }
    }

    // -- policy -------------------------------------------------------------

    /// An application asked to come forward; the policy arbitrates against
    /// everything else the executive tracks.
    async fn consider_resume(&self, isolate_id: IsolateId, app_id: AppId) {
        let mut candidates = self.snapshots();
        for candidate in &mut candidates {
            if candidate.isolate_id == isolate_id && candidate.app_id == app_id {
                candidate.state = MidletState::ActivePending;
            }
        }

        match self.policy.select_next(&candidates) {
            Some((winner_isolate, winner_app))
                if winner_isolate == isolate_id && winner_app == app_id =>
            {
                if let Err(e) = self.resume_app(isolate_id, app_id).await {
                    warn!(error = %e, "requested resume failed");
                    return;
                }
                self.foreground_first_window(isolate_id, app_id).await;
            }
            _ => {
                debug!(isolate = %isolate_id, app = %app_id, "resume request denied by policy");
            }
        }
    }

    /// The foreground is (possibly) empty; ask the policy whether a paused
    /// application should take it.
    async fn fill_foreground(&self, exclude: Option<(IsolateId, AppId)>) {
        if self.foreground.lock().await.is_some() {
            return;
        }

        let candidates: Vec<AppSnapshot> = self
            .snapshots()
            .into_iter()
            .filter(|app| app.state == MidletState::Paused)
            .filter(|app| exclude != Some((app.isolate_id, app.app_id)))
            .collect();
        let Some((isolate_id, app_id)) = self.policy.select_next(&candidates) else {
            return;
        };

        if let Err(e) = self.resume_app(isolate_id, app_id).await {
            warn!(error = %e, "policy-driven resume failed");
            return;
        }
        self.foreground_first_window(isolate_id, app_id).await;
    }

    async fn foreground_first_window(&self, isolate_id: IsolateId, app_id: AppId) {
        let window = self
            .apps
            .get(&(isolate_id, app_id))
            .and_then(|entry| entry.windows.first().copied());
        if let Some(window) = window {
            if let Err(e) = self.set_foreground(window).await {
                warn!(window = %window, error = %e, "foreground handoff failed");
            }
        }
    }

    // -- bookkeeping --------------------------------------------------------

    fn snapshots(&self) -> Vec<AppSnapshot> {
        self.apps
            .iter()
            .map(|entry| AppSnapshot {
                isolate_id: entry.key().0,
                app_id: entry.key().1,
                state: entry.value().state,
            })
            .collect()
    }

    fn record_state(&self, key: (IsolateId, AppId), state: MidletState) {
        // Upsert: a lifecycle notice can outrun the bookkeeping of the call
        // that caused it.
        self.apps
            .entry(key)
            .and_modify(|entry| entry.state = state)
            .or_insert(AppEntry { state, windows: Vec::new() });
    }

    fn advance(&self, isolate_id: IsolateId, phase: IsolatePhase) {
        let mut entry = self.isolates.entry(isolate_id).or_insert(IsolatePhase::Created);
        if *entry < phase {
            *entry = phase;
        }
    }

    async fn forget_app(&self, isolate_id: IsolateId, app_id: AppId) {
        self.drop_foreground_of(isolate_id, app_id).await;
        if let Some((_, entry)) = self.apps.remove(&(isolate_id, app_id)) {
            for window in entry.windows {
                self.windows.remove(&window);
            }
        }
    }

    /// Clears the foreground if `app` holds it; true means it was vacated.
    async fn drop_foreground_of(&self, isolate_id: IsolateId, app_id: AppId) -> bool {
        let owned: Vec<WindowId> = self
            .apps
            .get(&(isolate_id, app_id))
            .map(|entry| entry.windows.clone())
            .unwrap_or_default();
        let mut foreground = self.foreground.lock().await;
        if let Some(current) = *foreground {
            if owned.contains(&current) {
                *foreground = None;
                return true;
            }
        }
        false
    }

    async fn purge_isolate(&self, isolate_id: IsolateId) {
        self.advance(isolate_id, IsolatePhase::Destroyed);

        let keys: Vec<(IsolateId, AppId)> = self
            .apps
            .iter()
            .filter(|entry| entry.key().0 == isolate_id)
            .map(|entry| *entry.key())
            .collect();
        for key in keys {
            self.forget_app(key.0, key.1).await;
        }
    }

    // -- wire helpers -------------------------------------------------------

    async fn call(
        &self,
        target: IsolateId,
        cmd: WireCommand,
        timeout: Duration,
    ) -> Result<Response> {
        self.conduit.send_sync(target, cmd, timeout).await
    }

    /// A lifecycle call that cannot reach its target means the isolate is
    /// wedged or gone; write it off instead of retrying.
    async fn lifecycle_request(&self, target: IsolateId, cmd: WireCommand) -> Result<Response> {
        match self.call(target, cmd, LIFECYCLE_TIMEOUT).await {
            Ok(response) => Ok(response),
            Err(e) => {
                if matches!(e, Error::Timeout | Error::Unreachable(_)) {
                    warn!(isolate = %target, error = %e, "isolate wedged, writing it off");
                    let _ = self.destroy_isolate(target, true).await;
                }
                Err(e)
            }
        }
    }

    fn expect_success(&self, response: Response) -> Result<()> {
        match response {
            Response::Success => Ok(()),
            Response::Failure(msg) => Err(Error::Remote(msg)),
            Response::Data(_) => Err(Error::Remote("unexpected data response".into())),
        }
    }

    fn expect_int(&self, response: Response) -> Result<i32> {
        match response {
            Response::Data(Payload::Int(v)) => Ok(v),
            Response::Failure(msg) => Err(Error::Remote(msg)),
            other => Err(Error::Remote(format!("unexpected response: {:?}", other))),
        }
    }

    fn expect_ints(&self, response: Response) -> Result<Vec<i32>> {
        match response {
            Response::Data(Payload::Ints(v)) => Ok(v),
            Response::Data(Payload::Int(v)) => Ok(vec![v]),
            Response::Failure(msg) => Err(Error::Remote(msg)),
            other => Err(Error::Remote(format!("unexpected response: {:?}", other))),
        }
    }
}
