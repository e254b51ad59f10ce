//! # Isolate Runtime
//!
//! The application-isolate side of the core: one event loop draining the
//! isolate's queue, the peers of the applications it hosts, and the handlers
//! that turn decoded requests into peer transitions and responses.
//!
//! Lifecycle callbacks are never invoked inline by a request handler. A
//! request (or a raw UI event) only moves the peer to a pending state and
//! schedules a settle pass on the same queue; the settle pass materializes
//! whatever pending state it finds then. A pause and a resume delivered
//! before the settle pass therefore collapse inside the peer, and neither
//! callback runs.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI32;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use mvmrpc::Command;
use mvmrpc::Frame;
use mvmrpc::IsolateId;
use mvmrpc::Payload;
use mvmrpc::Response;
use mvmrpc::WindowId;
use mvmrpc::AppId;
use mvmrpc::WireCommand;
use mvmrpc::fields::AppRef;
use mvmrpc::fields::WindowRef;
use mvmrpc::lifecycle::AppPaused;
use mvmrpc::lifecycle::AppRequestPause;
use mvmrpc::lifecycle::AppRequestResume;
use mvmrpc::lifecycle::AppResumed;
use mvmrpc::lifecycle::IsolateDestroyed;
use mvmrpc::lifecycle::IsolateInitialized;
use mvmrpc::route::IsolateRequest;
use mvmrpc::window::NotifyBg;
use mvmrpc::window::NotifyFg;
use tracing::debug;
use tracing::warn;

use async_trait::async_trait;

use crate::conduit::Conduit;
use crate::context::Context;
use crate::orchestrator::IsolateFactory;
use crate::midlet::MidletPeer;
use crate::midlet::MidletState;
use crate::queue::Event;
use crate::queue::EventQueue;
use crate::traits::AppLoader;
use crate::traits::MidletApp;
use crate::traits::NullUiSink;
use crate::traits::UiEvent;
use crate::traits::UiSink;

/// Spawns isolates as in-process tasks sharing the executive's context.
pub struct InProcessFactory {
    loader: Arc<dyn AppLoader>,
    ui: Arc<dyn UiSink>,
}

impl InProcessFactory {
    pub fn new(loader: Arc<dyn AppLoader>) -> Self {
        Self { loader, ui: Arc::new(NullUiSink) }
    }

    pub fn with_ui(loader: Arc<dyn AppLoader>, ui: Arc<dyn UiSink>) -> Self {
        Self { loader, ui }
    }
}

#[async_trait]
impl IsolateFactory for InProcessFactory {
    async fn create(&self, ctx: Arc<Context>, id: IsolateId) -> crate::error::Result<()> {
        IsolateRuntime::spawn_with_ui(ctx, id, self.loader.clone(), self.ui.clone());
        Ok(())
    }
}

/// One hosted application: its peer, its callbacks, and its window.
struct AppHost {
    app_id: AppId,
    peer: Arc<MidletPeer>,
    app: Arc<dyn MidletApp>,
    window_id: WindowId,
    foreground: AtomicBool,
}

/// The runtime of one application isolate.
///
/// Owns the isolate's peers exclusively; all mutation funnels through the
/// event loop, which handles one event at a time.
pub struct IsolateRuntime {
    id: IsolateId,
    ctx: Arc<Context>,
    conduit: Arc<Conduit>,
    loader: Arc<dyn AppLoader>,
    ui: Arc<dyn UiSink>,
    apps: DashMap<AppId, Arc<AppHost>>,
    windows: DashMap<WindowId, AppId>,
    next_app_id: AtomicI32,
    app_model: AtomicI32,
}

impl IsolateRuntime {
    /// Creates the runtime, registers its queue, and spawns its event loop.
    pub fn spawn(ctx: Arc<Context>, id: IsolateId, loader: Arc<dyn AppLoader>) -> Arc<Self> {
        Self::spawn_with_ui(ctx, id, loader, Arc::new(NullUiSink))
    }

    /// Like [`IsolateRuntime::spawn`], with a UI subsystem attached.
    pub fn spawn_with_ui(
        ctx: Arc<Context>,
        id: IsolateId,
        loader: Arc<dyn AppLoader>,
        ui: Arc<dyn UiSink>,
    ) -> Arc<Self> {
        let (sender, queue) = EventQueue::channel();
        ctx.register_queue(id, sender);

        let runtime = Arc::new(Self {
            id,
            conduit: Arc::new(Conduit::new(id, ctx.clone())),
            ctx,
            loader,
            ui,
            apps: DashMap::new(),
            windows: DashMap::new(),
            next_app_id: AtomicI32::new(1),
            app_model: AtomicI32::new(0),
        });

        tokio::spawn(runtime.clone().run(queue));
        runtime
    }

    /// This isolate's id.
    pub fn id(&self) -> IsolateId {
        self.id
    }

    /// The peer of a hosted application, if it exists.
    pub fn peer(&self, app_id: AppId) -> Option<Arc<MidletPeer>> {
        self.apps.get(&app_id).map(|host| host.peer.clone())
    }

    /// The window a hosted application drives.
    pub fn window_of(&self, app_id: AppId) -> Option<WindowId> {
        self.apps.get(&app_id).map(|host| host.window_id)
    }

    /// Whether a window of this isolate currently reports foreground.
    pub fn is_foreground(&self, window_id: WindowId) -> bool {
        self.host_by_window(window_id)
            .map(|host| host.foreground.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    // -- event loop ---------------------------------------------------------

    async fn run(self: Arc<Self>, mut queue: EventQueue) {
        while let Some(event) = queue.next().await {
            match event {
                Event::Command(frame) => self.handle_frame(frame),
                Event::ActivateMidlet { display_id } => self.on_lifecycle_event(display_id, MidletState::ActivePending),
                Event::PauseMidlet { display_id } => self.on_lifecycle_event(display_id, MidletState::PausePending),
                Event::DestroyMidlet { display_id } => self.on_lifecycle_event(display_id, MidletState::DestroyPending),
                Event::ForegroundNotify { display_id } => self.on_visibility_event(display_id, true),
                Event::BackgroundNotify { display_id } => self.on_visibility_event(display_id, false),
                Event::Settle { display_id } => self.settle(display_id),
                Event::Shutdown => break,
            }
        }

        // Unregister first so in-flight senders fail as unreachable, then
        // tell the executive we are gone.
        self.ctx.unregister_queue(self.id);
        let gone = IsolateDestroyed { isolate_id: self.id }.to_wire();
        if let Err(e) = self.conduit.notify(self.ctx.ams_isolate_id(), gone) {
            debug!(isolate = %self.id, error = %e, "executive unreachable during teardown");
        }
    }

    fn handle_frame(&self, frame: Frame) {
        match frame {
            Frame::Request { seq, from, cmd } => {
                let response = self.handle_request(&cmd);
                let reply = Frame::Response { seq, response };
                if let Err(e) = self.ctx.deliver(from, Event::Command(reply)) {
                    warn!(isolate = %self.id, source = %from, error = %e, "could not deliver response");
                }
            }
            Frame::Response { seq, response } => self.conduit.fulfill(seq, response),
            Frame::Notify { from, .. } => {
                warn!(isolate = %self.id, source = %from, "unexpected notification on application isolate");
            }
        }
    }

    /// Decodes and executes one request. Decode and routing errors are
    /// answered with `Failure` and logged; they never tear the loop down.
    fn handle_request(&self, cmd: &WireCommand) -> Response {
        let request = match IsolateRequest::from_wire(cmd) {
            Ok(request) => request,
            Err(e) => {
                warn!(isolate = %self.id, id = %cmd.id, error = %e, "rejecting undecodable request");
                return Response::failure(e.to_string());
            }
        };

        match request {
            IsolateRequest::InitIsolate(req) => self.init_isolate(req.app_model),
            IsolateRequest::DestroyIsolate(req) => self.destroy_isolate(req.best_effort),
            IsolateRequest::StartApp(req) => self.start_app(&req.descriptor),
            IsolateRequest::PauseApp(req) => self.pause_app(req.app_id),
            IsolateRequest::ResumeApp(req) => self.resume_app(req.app_id),
            IsolateRequest::GetAppWindows(req) => self.get_app_windows(req.app_id),
            IsolateRequest::DestroyApp(req) => self.destroy_app(req.app_id, req.best_effort),
            IsolateRequest::Foreground(req) => self.set_visibility(req.window_id, true),
            IsolateRequest::Background(req) => self.set_visibility(req.window_id, false),
        }
    }

    // -- request handlers ---------------------------------------------------

    fn init_isolate(&self, app_model: i32) -> Response {
        self.app_model.store(app_model, Ordering::Release);
        let ready = IsolateInitialized { isolate_id: self.id }.to_wire();
        if let Err(e) = self.conduit.notify(self.ctx.ams_isolate_id(), ready) {
            return Response::failure(e.to_string());
        }
        Response::Success
    }

    fn destroy_isolate(&self, best_effort: bool) -> Response {
        for entry in self.apps.iter() {
            let host = entry.value();
            if !best_effort {
                host.app.destroy_app();
            }
            host.peer.request_state(MidletState::Destroyed);
        }
        self.apps.clear();
        self.windows.clear();

        // The response for this request goes out before the loop drains the
        // shutdown marker.
        if let Err(e) = self.ctx.deliver(self.id, Event::Shutdown) {
            return Response::failure(e.to_string());
        }
        Response::Success
    }

    fn start_app(&self, descriptor: &[u8]) -> Response {
        let app = match self.loader.load(descriptor) {
            Ok(app) => app,
            Err(e) => {
                warn!(isolate = %self.id, error = %e, "application instantiation failed");
                return Response::failure(e.to_string());
            }
        };

        let app_id = AppId(self.next_app_id.fetch_add(1, Ordering::Relaxed));
        let window_id = self.ctx.alloc_window_id();
        let host = Arc::new(AppHost {
            app_id,
            peer: Arc::new(MidletPeer::new(window_id)),
            app,
            window_id,
            foreground: AtomicBool::new(false),
        });
        self.apps.insert(app_id, host);
        self.windows.insert(window_id, app_id);

        self.emit_ui(UiEvent::ActivateMidlet { isolate_id: self.id, display_id: window_id });
        self.schedule_settle(window_id);
        Response::Data(Payload::Int(app_id.0))
    }

    fn pause_app(&self, app_id: AppId) -> Response {
        let Some(host) = self.host(app_id) else {
            return Response::failure(format!("no such app: {}", app_id));
        };
        host.peer.request_state(MidletState::PausePending);
        self.emit_ui(UiEvent::PauseMidlet { isolate_id: self.id, display_id: host.window_id });
        self.schedule_settle(host.window_id);
        Response::Success
    }

    fn resume_app(&self, app_id: AppId) -> Response {
        let Some(host) = self.host(app_id) else {
            return Response::failure(format!("no such app: {}", app_id));
        };
        host.peer.request_state(MidletState::ActivePending);
        self.emit_ui(UiEvent::ActivateMidlet { isolate_id: self.id, display_id: host.window_id });
        self.schedule_settle(host.window_id);
        Response::Success
    }

    fn get_app_windows(&self, app_id: AppId) -> Response {
        match self.host(app_id) {
            Some(host) => Response::Data(Payload::Ints(vec![host.window_id.0])),
            None => Response::failure(format!("no such app: {}", app_id)),
        }
    }

    fn destroy_app(&self, app_id: AppId, best_effort: bool) -> Response {
        // An app that is already gone is a stale executive view; destruction
        // is idempotent.
        let Some(host) = self.host(app_id) else {
            return Response::Success;
        };

        if best_effort {
            host.peer.request_state(MidletState::Destroyed);
            self.remove_app(&host);
        } else {
            host.peer.request_state(MidletState::DestroyPending);
            self.schedule_settle(host.window_id);
        }
        self.emit_ui(UiEvent::DestroyMidlet { isolate_id: self.id, display_id: host.window_id });
        Response::Success
    }

    fn set_visibility(&self, window_id: WindowId, foreground: bool) -> Response {
        let Some(host) = self.windows.get(&window_id).and_then(|app_id| self.host(*app_id)) else {
            return Response::failure(format!("no such window: {}", window_id));
        };
        host.foreground.store(foreground, Ordering::Release);

        let event = if foreground {
            UiEvent::ForegroundNotify { isolate_id: self.id, display_id: window_id }
        } else {
            UiEvent::BackgroundNotify { isolate_id: self.id, display_id: window_id }
        };
        self.emit_ui(event);
        self.notify_visibility(window_id, foreground);
        Response::Success
    }

    // -- raw event handlers -------------------------------------------------

    /// A raw lifecycle event only records the pending state; the callback it
    /// implies runs at the next settle pass for that window.
    fn on_lifecycle_event(&self, display_id: WindowId, requested: MidletState) {
        let Some(host) = self.host_by_window(display_id) else {
            debug!(isolate = %self.id, window = %display_id, "lifecycle event for unknown window");
            return;
        };
        host.peer.request_state(requested);
        self.schedule_settle(display_id);
    }

    /// A window changed visibility for a local cause; record it and tell the
    /// executive.
    fn on_visibility_event(&self, display_id: WindowId, foreground: bool) {
        let Some(host) = self.host_by_window(display_id) else {
            return;
        };
        host.foreground.store(foreground, Ordering::Release);
        self.notify_visibility(display_id, foreground);
    }

    /// Materializes whatever pending state the peer holds now.
    ///
    /// A state that collapsed between the scheduling event and this pass is
    /// settled already, and no callback runs.
    fn settle(&self, display_id: WindowId) {
        let Some(host) = self.host_by_window(display_id) else {
            return;
        };

        match host.peer.state() {
            MidletState::PausePending => {
                host.app.pause_app();
                host.peer.request_state(MidletState::Paused);
                self.notify_executive(AppPaused { app: self.app_ref(host.app_id) }.to_wire());
            }
            MidletState::ActivePending => match host.app.start_app() {
                Ok(()) => {
                    host.peer.request_state(MidletState::Active);
                    self.notify_executive(AppResumed { app: self.app_ref(host.app_id) }.to_wire());
                }
                Err(e) => {
                    warn!(isolate = %self.id, app = %host.app_id, error = %e, "activation failed, destroying");
                    host.peer.request_state(MidletState::DestroyPending);
                    self.schedule_settle(display_id);
                }
            },
            MidletState::DestroyPending => {
                host.app.destroy_app();
                host.peer.request_state(MidletState::Destroyed);
                self.remove_app(&host);
            }
            MidletState::Paused | MidletState::Active | MidletState::Destroyed => {}
        }
    }

    // -- local calls from the hosted application / UI subsystem -------------

    /// The application reports it paused itself.
    pub fn notify_paused(&self, app_id: AppId) {
        if let Some(host) = self.host(app_id) {
            host.peer.request_state(MidletState::Paused);
            self.notify_executive(AppPaused { app: self.app_ref(app_id) }.to_wire());
        }
    }

    /// The application reports it destroyed itself.
    pub fn notify_destroyed(&self, app_id: AppId) {
        if let Some(host) = self.host(app_id) {
            host.peer.request_state(MidletState::Destroyed);
            self.remove_app(&host);
        }
    }

    /// The application asks the executive to be resumed. No local state
    /// changes; the executive answers with a `ResumeApp` request if the
    /// policy agrees.
    pub fn resume_request(&self, app_id: AppId) {
        self.notify_executive(AppRequestResume { app: self.app_ref(app_id) }.to_wire());
    }

    /// The application asks the executive to be paused.
    pub fn pause_request(&self, app_id: AppId) {
        self.notify_executive(AppRequestPause { app: self.app_ref(app_id) }.to_wire());
    }

    // -- helpers ------------------------------------------------------------

    fn host(&self, app_id: AppId) -> Option<Arc<AppHost>> {
        self.apps.get(&app_id).map(|host| Arc::clone(host.value()))
    }

    fn host_by_window(&self, window_id: WindowId) -> Option<Arc<AppHost>> {
        self.windows.get(&window_id).and_then(|app_id| self.host(*app_id))
    }

    fn remove_app(&self, host: &AppHost) {
        self.apps.remove(&host.app_id);
        self.windows.remove(&host.window_id);
    }

    fn app_ref(&self, app_id: AppId) -> AppRef {
        AppRef::new(self.id, app_id)
    }

    fn schedule_settle(&self, display_id: WindowId) {
        // Delivery to our own queue only fails during teardown.
        let _ = self.ctx.deliver(self.id, Event::Settle { display_id });
    }

    fn emit_ui(&self, event: UiEvent) {
        self.ui.emit(event);
    }

    fn notify_visibility(&self, window_id: WindowId, foreground: bool) {
        let window = WindowRef::new(self.id, window_id);
        let cmd = if foreground {
            NotifyFg { window }.to_wire()
        } else {
            NotifyBg { window }.to_wire()
        };
        self.notify_executive(cmd);
    }

    fn notify_executive(&self, cmd: WireCommand) {
        if let Err(e) = self.conduit.notify(self.ctx.ams_isolate_id(), cmd) {
            debug!(isolate = %self.id, error = %e, "executive unreachable for notification");
        }
    }
}
