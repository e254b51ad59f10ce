//! Integration tests for the mvmrun core: a real orchestrator, real isolate
//! event loops, and recording application/UI doubles.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Result;
use mvmrpc::AppId;
use mvmrpc::IsolateId;
use mvmrpc::Response;
use mvmrpc::WireCommand;
use mvmrun::AppLoader;
use mvmrun::Context;
use mvmrun::Error;
use mvmrun::Event;
use mvmrun::HighestPriority;
use mvmrun::IsolateFactory;
use mvmrun::IsolateRuntime;
use mvmrun::MidletApp;
use mvmrun::MidletState;
use mvmrun::Orchestrator;
use mvmrun::UiEvent;
use mvmrun::UiSink;

/// Application double counting every lifecycle callback it receives.
#[derive(Default)]
struct Recorder {
    starts: AtomicUsize,
    pauses: AtomicUsize,
    destroys: AtomicUsize,
}

impl Recorder {
    fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    fn pauses(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }

    fn destroys(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }
}

impl MidletApp for Recorder {
    fn start_app(&self) -> mvmrun::Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn pause_app(&self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
    }

    fn destroy_app(&self) {
        self.destroys.fetch_add(1, Ordering::SeqCst);
    }
}

/// Loader and UI sink shared by every isolate the harness spawns. Loading the
/// descriptor `b"bad"` fails the way a broken application archive would.
#[derive(Default)]
struct Shared {
    apps: Mutex<Vec<Arc<Recorder>>>,
    descriptors: Mutex<Vec<Vec<u8>>>,
    events: Mutex<Vec<UiEvent>>,
}

impl Shared {
    fn app(&self, index: usize) -> Arc<Recorder> {
        self.apps.lock().unwrap()[index].clone()
    }

    fn descriptor(&self, index: usize) -> Vec<u8> {
        self.descriptors.lock().unwrap()[index].clone()
    }

    fn events(&self) -> Vec<UiEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl AppLoader for Shared {
    fn load(&self, descriptor: &[u8]) -> mvmrun::Result<Arc<dyn MidletApp>> {
        if descriptor == b"bad" {
            return Err(Error::Instantiation("descriptor names no loadable class".into()));
        }
        self.descriptors.lock().unwrap().push(descriptor.to_vec());
        let app = Arc::new(Recorder::default());
        self.apps.lock().unwrap().push(app.clone());
        Ok(app)
    }
}

impl UiSink for Shared {
    fn emit(&self, event: UiEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Factory spawning in-process isolates and keeping their handles so tests
/// can inspect peer state directly.
struct Harness {
    shared: Arc<Shared>,
    runtimes: Mutex<Vec<Arc<IsolateRuntime>>>,
}

impl Harness {
    fn runtime(&self, id: IsolateId) -> Arc<IsolateRuntime> {
        self.runtimes
            .lock()
            .unwrap()
            .iter()
            .find(|rt| rt.id() == id)
            .expect("no runtime spawned for isolate")
            .clone()
    }
}

#[async_trait::async_trait]
impl IsolateFactory for Harness {
    async fn create(&self, ctx: Arc<Context>, id: IsolateId) -> mvmrun::Result<()> {
        let runtime =
            IsolateRuntime::spawn_with_ui(ctx, id, self.shared.clone(), self.shared.clone());
        self.runtimes.lock().unwrap().push(runtime);
        Ok(())
    }
}

fn setup() -> (Arc<Context>, Arc<Orchestrator>, Arc<Harness>, Arc<Shared>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let shared = Arc::new(Shared::default());
    let harness = Arc::new(Harness {
        shared: shared.clone(),
        runtimes: Mutex::new(Vec::new()),
    });
    let ctx = Arc::new(Context::new(IsolateId(0)));
    let orchestrator = Orchestrator::spawn(ctx.clone(), harness.clone(), Box::new(HighestPriority));
    (ctx, orchestrator, harness, shared)
}

async fn wait_until(what: &str, mut pred: impl FnMut() -> bool) {
    for _ in 0..500 {
        if pred() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

// --- Launch and activation --------------------------------------------------

#[tokio::test]
async fn test_launch_runs_activation_callback() -> Result<()> {
    let (_ctx, orchestrator, _harness, shared) = setup();

    let (isolate, app) = orchestrator.launch(0, b"demo").await?;
    wait_until("activation", || {
        orchestrator.app_state(isolate, app) == Some(MidletState::Active)
    })
    .await;

    let recorder = shared.app(0);
    assert_eq!(recorder.starts(), 1);
    assert_eq!(recorder.pauses(), 0);
    Ok(())
}

#[tokio::test]
async fn test_execute_carries_the_descriptor_to_the_loader() -> Result<()> {
    let (_ctx, orchestrator, _harness, shared) = setup();

    let args = vec!["24h".to_string()];
    let (isolate, app) = orchestrator
        .execute(0, "suite-17", "clock.Main", "Clock", &args)
        .await?;
    wait_until("activation", || {
        orchestrator.app_state(isolate, app) == Some(MidletState::Active)
    })
    .await;

    let descriptor = mvmrpc::AppDescriptor::decode(&shared.descriptor(0))?;
    assert_eq!(descriptor.suite_id, "suite-17");
    assert_eq!(descriptor.class_name, "clock.Main");
    assert_eq!(descriptor.args, args);
    Ok(())
}

#[tokio::test]
async fn test_failed_class_load_is_a_failure_not_a_fault() -> Result<()> {
    let (_ctx, orchestrator, _harness, _shared) = setup();

    let (isolate, _app) = orchestrator.launch(0, b"demo").await?;

    let err = orchestrator.start_app(isolate, b"bad").await.unwrap_err();
    match err {
        Error::Remote(msg) => assert!(msg.contains("no loadable class")),
        other => panic!("expected Remote failure, got {:?}", other),
    }

    // The isolate's event loop must have survived the failed load.
    let second = orchestrator.start_app(isolate, b"demo2").await?;
    assert_ne!(second, AppId(0));
    Ok(())
}

// --- Lifecycle round trips --------------------------------------------------

#[tokio::test]
async fn test_pause_and_resume_roundtrip() -> Result<()> {
    let (_ctx, orchestrator, _harness, shared) = setup();

    let (isolate, app) = orchestrator.launch(0, b"demo").await?;
    wait_until("activation", || {
        orchestrator.app_state(isolate, app) == Some(MidletState::Active)
    })
    .await;

    orchestrator.pause_app(isolate, app).await?;
    wait_until("pause", || {
        orchestrator.app_state(isolate, app) == Some(MidletState::Paused)
    })
    .await;
    assert_eq!(shared.app(0).pauses(), 1);

    orchestrator.resume_app(isolate, app).await?;
    wait_until("resume", || {
        orchestrator.app_state(isolate, app) == Some(MidletState::Active)
    })
    .await;
    assert_eq!(shared.app(0).starts(), 2);
    Ok(())
}

#[tokio::test]
async fn test_rapid_pause_resume_invokes_no_callbacks() -> Result<()> {
    let (ctx, orchestrator, harness, shared) = setup();

    let (isolate, app) = orchestrator.launch(0, b"demo").await?;
    wait_until("activation", || {
        orchestrator.app_state(isolate, app) == Some(MidletState::Active)
    })
    .await;

    let runtime = harness.runtime(isolate);
    let window = runtime.window_of(app).expect("app has a window");

    // Both raw events land on the queue before either is handled, so the
    // pending pause collapses against the resume and neither callback runs.
    ctx.deliver(isolate, Event::PauseMidlet { display_id: window })?;
    ctx.deliver(isolate, Event::ActivateMidlet { display_id: window })?;

    tokio::time::sleep(Duration::from_millis(100)).await;
    let peer = runtime.peer(app).expect("app has a peer");
    assert_eq!(peer.state(), MidletState::Active);
    assert_eq!(shared.app(0).pauses(), 0);
    assert_eq!(shared.app(0).starts(), 1);
    Ok(())
}

#[tokio::test]
async fn test_resume_request_is_arbitrated_by_policy() -> Result<()> {
    let (_ctx, orchestrator, harness, shared) = setup();

    let (isolate, app) = orchestrator.launch(0, b"demo").await?;
    wait_until("activation", || {
        orchestrator.app_state(isolate, app) == Some(MidletState::Active)
    })
    .await;

    orchestrator.pause_app(isolate, app).await?;
    wait_until("pause", || {
        orchestrator.app_state(isolate, app) == Some(MidletState::Paused)
    })
    .await;

    harness.runtime(isolate).resume_request(app);
    wait_until("policy-driven resume", || {
        orchestrator.app_state(isolate, app) == Some(MidletState::Active)
    })
    .await;
    assert_eq!(shared.app(0).starts(), 2);
    Ok(())
}

// --- Destruction ------------------------------------------------------------

#[tokio::test]
async fn test_destroy_app_is_idempotent() -> Result<()> {
    let (_ctx, orchestrator, _harness, shared) = setup();

    let (isolate, app) = orchestrator.launch(0, b"demo").await?;
    wait_until("activation", || {
        orchestrator.app_state(isolate, app) == Some(MidletState::Active)
    })
    .await;

    orchestrator.destroy_app(isolate, app, false).await?;
    wait_until("destruction callback", || shared.app(0).destroys() == 1).await;
    assert_eq!(orchestrator.app_state(isolate, app), None);

    // A second destroy of the same app answers Ok instead of failing.
    orchestrator.destroy_app(isolate, app, false).await?;
    assert_eq!(shared.app(0).destroys(), 1);
    Ok(())
}

#[tokio::test]
async fn test_calls_after_isolate_destruction_fail_fast() -> Result<()> {
    let (ctx, orchestrator, _harness, _shared) = setup();

    let (isolate, app) = orchestrator.launch(0, b"demo").await?;
    wait_until("activation", || {
        orchestrator.app_state(isolate, app) == Some(MidletState::Active)
    })
    .await;

    orchestrator.destroy_isolate(isolate, false).await?;
    wait_until("queue removal", || !ctx.is_reachable(isolate)).await;

    // The waiter gets a synthesized failure, not an indefinite hang.
    let err = orchestrator.pause_app(isolate, app).await.unwrap_err();
    assert!(matches!(err, Error::Unreachable(_)));

    // The core itself is still healthy.
    let (second, second_app) = orchestrator.launch(0, b"demo2").await?;
    wait_until("second activation", || {
        orchestrator.app_state(second, second_app) == Some(MidletState::Active)
    })
    .await;
    Ok(())
}

#[tokio::test]
async fn test_close_shuts_every_loop_down() -> Result<()> {
    let (ctx, orchestrator, _harness, _shared) = setup();

    let (isolate, app) = orchestrator.launch(0, b"demo").await?;
    wait_until("activation", || {
        orchestrator.app_state(isolate, app) == Some(MidletState::Active)
    })
    .await;

    orchestrator.close().await;
    wait_until("isolate shutdown", || !ctx.is_reachable(isolate)).await;
    wait_until("executive shutdown", || !ctx.is_reachable(ctx.ams_isolate_id())).await;
    Ok(())
}

// --- Foreground handoff -----------------------------------------------------

#[tokio::test]
async fn test_foreground_handoff_is_exclusive() -> Result<()> {
    let (_ctx, orchestrator, harness, shared) = setup();

    let (iso_a, app_a) = orchestrator.launch(0, b"demo-a").await?;
    let (iso_b, app_b) = orchestrator.launch(0, b"demo-b").await?;
    wait_until("both active", || {
        orchestrator.app_state(iso_a, app_a) == Some(MidletState::Active)
            && orchestrator.app_state(iso_b, app_b) == Some(MidletState::Active)
    })
    .await;

    let win_a = orchestrator.get_app_windows(iso_a, app_a).await?[0];
    let win_b = orchestrator.get_app_windows(iso_b, app_b).await?[0];

    orchestrator.set_foreground(win_a).await?;
    assert_eq!(orchestrator.foreground_window().await, Some(win_a));
    assert!(harness.runtime(iso_a).is_foreground(win_a));

    orchestrator.set_foreground(win_b).await?;
    assert_eq!(orchestrator.foreground_window().await, Some(win_b));
    assert!(!harness.runtime(iso_a).is_foreground(win_a));
    assert!(harness.runtime(iso_b).is_foreground(win_b));

    // The old holder was backgrounded before the new one came forward.
    let events = shared.events();
    let bg = events
        .iter()
        .position(|e| matches!(e, UiEvent::BackgroundNotify { display_id, .. } if *display_id == win_a))
        .expect("background event for the old holder");
    let fg = events
        .iter()
        .position(|e| matches!(e, UiEvent::ForegroundNotify { display_id, .. } if *display_id == win_b))
        .expect("foreground event for the new holder");
    assert!(bg < fg);
    Ok(())
}

// --- Protocol robustness ----------------------------------------------------

#[tokio::test]
async fn test_unroutable_command_gets_failure_reply() -> Result<()> {
    let (_ctx, orchestrator, _harness, _shared) = setup();

    let (isolate, app) = orchestrator.launch(0, b"demo").await?;
    wait_until("activation", || {
        orchestrator.app_state(isolate, app) == Some(MidletState::Active)
    })
    .await;

    let bogus = WireCommand {
        message_type: "bogus/type".into(),
        id: "Nothing".into(),
        data: vec![],
        payload: None,
    };
    let response = orchestrator
        .conduit()
        .send_sync(isolate, bogus, Duration::from_secs(5))
        .await?;
    assert!(matches!(response, Response::Failure(_)));

    // The loop answered instead of crashing and still serves real requests.
    orchestrator.pause_app(isolate, app).await?;
    wait_until("pause after bogus command", || {
        orchestrator.app_state(isolate, app) == Some(MidletState::Paused)
    })
    .await;
    Ok(())
}
