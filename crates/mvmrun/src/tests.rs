//! Tests for the peer state machine and the conduit, using scripted
//! responder loops in place of real isolates.

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use mvmrpc::Command;
use mvmrpc::Frame;
use mvmrpc::IsolateId;
use mvmrpc::Response;
use mvmrpc::WindowId;
use mvmrpc::WireCommand;
use mvmrpc::lifecycle::InitIsolate;
use mvmrpc::lifecycle::PauseApp;
use mvmrpc::AppId;

use crate::conduit::Conduit;
use crate::context::Context;
use crate::error::Error;
use crate::midlet::MidletPeer;
use crate::midlet::MidletState;
use crate::policy::ActivationPolicy;
use crate::policy::AppSnapshot;
use crate::policy::HighestPriority;
use crate::queue::Event;
use crate::queue::EventQueue;

fn probe_cmd() -> WireCommand {
    InitIsolate { app_model: 0 }.to_wire()
}

/// Registers a queue for `id` and answers every request with `response`,
/// after an optional delay.
fn spawn_responder(ctx: &Arc<Context>, id: IsolateId, response: Response, delay: Duration) {
    let (tx, mut queue) = EventQueue::channel();
    ctx.register_queue(id, tx);
    let ctx = ctx.clone();
    tokio::spawn(async move {
        while let Some(event) = queue.next().await {
            if let Event::Command(Frame::Request { seq, from, .. }) = event {
                let ctx = ctx.clone();
                let response = response.clone();
                tokio::spawn(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let reply = Frame::Response { seq, response };
                    let _ = ctx.deliver(from, Event::Command(reply));
                });
            }
        }
    });
}

/// Registers a queue for `id` that drains every event and never replies.
fn spawn_black_hole(ctx: &Arc<Context>, id: IsolateId) {
    let (tx, mut queue) = EventQueue::channel();
    ctx.register_queue(id, tx);
    tokio::spawn(async move { while queue.next().await.is_some() {} });
}

/// Registers a pump for the conduit's own isolate, feeding responses back
/// into it the way a real event loop would.
fn spawn_pump(ctx: &Arc<Context>, conduit: &Arc<Conduit>) {
    let (tx, mut queue) = EventQueue::channel();
    ctx.register_queue(conduit.self_id(), tx);
    let conduit = conduit.clone();
    tokio::spawn(async move {
        while let Some(event) = queue.next().await {
            if let Event::Command(Frame::Response { seq, response }) = event {
                conduit.fulfill(seq, response);
            }
        }
    });
}

fn caller(ctx: &Arc<Context>) -> Arc<Conduit> {
    let conduit = Arc::new(Conduit::new(ctx.ams_isolate_id(), ctx.clone()));
    spawn_pump(ctx, &conduit);
    conduit
}

// -- peer state machine ------------------------------------------------------

#[test]
fn test_new_peer_starts_active_pending() {
    let peer = MidletPeer::new(WindowId(1));
    assert_eq!(peer.state(), MidletState::ActivePending);
}

#[test]
fn test_pause_then_resume_collapses_to_active() {
    let peer = MidletPeer::new(WindowId(1));
    peer.request_state(MidletState::Active);
    assert_eq!(peer.request_state(MidletState::PausePending), MidletState::PausePending);

    // The resume arrives before the pause materialized; both cancel out and
    // the peer settles directly on Active.
    assert_eq!(peer.request_state(MidletState::ActivePending), MidletState::Active);
}

#[test]
fn test_resume_then_pause_collapses_to_paused() {
    let peer = MidletPeer::new(WindowId(1));
    peer.request_state(MidletState::Paused);
    assert_eq!(peer.request_state(MidletState::ActivePending), MidletState::ActivePending);
    assert_eq!(peer.request_state(MidletState::PausePending), MidletState::Paused);
}

#[test]
fn test_redundant_requests_are_ignored() {
    let peer = MidletPeer::new(WindowId(1));
    peer.request_state(MidletState::Active);
    assert_eq!(peer.request_state(MidletState::ActivePending), MidletState::Active);

    peer.request_state(MidletState::Paused);
    assert_eq!(peer.request_state(MidletState::PausePending), MidletState::Paused);
}

#[test]
fn test_destroy_pending_only_yields_to_destroyed() {
    let peer = MidletPeer::new(WindowId(1));
    peer.request_state(MidletState::DestroyPending);

    assert_eq!(peer.request_state(MidletState::ActivePending), MidletState::DestroyPending);
    assert_eq!(peer.request_state(MidletState::PausePending), MidletState::DestroyPending);
    assert_eq!(peer.request_state(MidletState::Paused), MidletState::DestroyPending);
    assert_eq!(peer.request_state(MidletState::Destroyed), MidletState::Destroyed);
}

#[test]
fn test_destroyed_is_terminal() {
    let peer = MidletPeer::new(WindowId(1));
    peer.request_state(MidletState::Destroyed);

    for requested in [
        MidletState::Paused,
        MidletState::Active,
        MidletState::ActivePending,
        MidletState::PausePending,
        MidletState::DestroyPending,
    ] {
        assert_eq!(peer.request_state(requested), MidletState::Destroyed);
    }
}

#[test]
fn test_wait_for_observes_transition() {
    let peer = Arc::new(MidletPeer::new(WindowId(1)));

    let waiter = {
        let peer = peer.clone();
        std::thread::spawn(move || {
            peer.wait_for(|s| s == MidletState::Active, Duration::from_secs(5))
        })
    };

    std::thread::sleep(Duration::from_millis(20));
    peer.request_state(MidletState::Active);
    assert_eq!(waiter.join().unwrap(), MidletState::Active);
}

#[test]
fn test_wait_for_times_out() {
    let peer = MidletPeer::new(WindowId(1));
    let observed = peer.wait_for(|s| s == MidletState::Destroyed, Duration::from_millis(20));
    assert_eq!(observed, MidletState::ActivePending);
}

// -- conduit -----------------------------------------------------------------

#[tokio::test]
async fn test_send_sync_receives_correlated_response() {
    let ctx = Arc::new(Context::new(IsolateId(0)));
    let conduit = caller(&ctx);
    let target = IsolateId(1);
    spawn_responder(&ctx, target, Response::Success, Duration::ZERO);

    let response = conduit
        .send_sync(target, probe_cmd(), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(response, Response::Success);
    assert_eq!(conduit.pending_count(), 0);
}

#[tokio::test]
async fn test_zero_timeout_waits_for_slow_responder() {
    let ctx = Arc::new(Context::new(IsolateId(0)));
    let conduit = caller(&ctx);
    let target = IsolateId(1);
    spawn_responder(&ctx, target, Response::Success, Duration::from_millis(50));

    let response = conduit
        .send_sync(target, probe_cmd(), Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(response, Response::Success);
}

#[tokio::test]
async fn test_send_sync_times_out_and_discards_late_response() {
    let ctx = Arc::new(Context::new(IsolateId(0)));
    let conduit = caller(&ctx);
    let target = IsolateId(1);
    spawn_responder(&ctx, target, Response::Success, Duration::from_millis(200));

    let err = conduit
        .send_sync(target, probe_cmd(), Duration::from_millis(20))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout));
    assert_eq!(conduit.pending_count(), 0);

    // The late response finds no waiter and must not disturb anything.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(conduit.pending_count(), 0);
}

#[tokio::test]
async fn test_send_sync_to_unknown_target_fails_fast() {
    let ctx = Arc::new(Context::new(IsolateId(0)));
    let conduit = caller(&ctx);

    let err = conduit
        .send_sync(IsolateId(99), probe_cmd(), Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unreachable(IsolateId(99))));
    assert_eq!(conduit.pending_count(), 0);
}

#[tokio::test]
async fn test_callbacks_fire_exactly_once_under_concurrency() {
    let ctx = Arc::new(Context::new(IsolateId(0)));
    let conduit = caller(&ctx);
    let target = IsolateId(1);

    // A jittery responder so fulfillments race each other.
    {
        let (tx, mut queue) = EventQueue::channel();
        ctx.register_queue(target, tx);
        let ctx = ctx.clone();
        tokio::spawn(async move {
            while let Some(event) = queue.next().await {
                if let Event::Command(Frame::Request { seq, from, .. }) = event {
                    let ctx = ctx.clone();
                    tokio::spawn(async move {
                        let jitter = rand::random::<u64>() % 10;
                        tokio::time::sleep(Duration::from_millis(jitter)).await;
                        let reply = Frame::Response { seq, response: Response::Success };
                        let _ = ctx.deliver(from, Event::Command(reply));
                    });
                }
            }
        });
    }

    let fired = Arc::new(AtomicUsize::new(0));
    let count = 64;
    for _ in 0..count {
        let fired = fired.clone();
        conduit
            .send_async(target, probe_cmd(), move |result| {
                assert!(result.is_ok());
                fired.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(fired.load(Ordering::SeqCst), count);
    assert_eq!(conduit.pending_count(), 0);
}

#[tokio::test]
async fn test_cancel_suppresses_callback() {
    let ctx = Arc::new(Context::new(IsolateId(0)));
    let conduit = caller(&ctx);
    let target = IsolateId(1);
    spawn_responder(&ctx, target, Response::Success, Duration::from_millis(50));

    let fired = Arc::new(AtomicUsize::new(0));
    let token = {
        let fired = fired.clone();
        conduit
            .send_async(target, probe_cmd(), move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap()
    };

    assert!(conduit.cancel(token));
    assert!(!conduit.cancel(token));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert_eq!(conduit.pending_count(), 0);
}

#[tokio::test]
async fn test_fail_target_fails_outstanding_waiters() {
    let ctx = Arc::new(Context::new(IsolateId(0)));
    let conduit = caller(&ctx);
    let target = IsolateId(1);
    spawn_black_hole(&ctx, target);

    let pending = {
        let conduit = conduit.clone();
        tokio::spawn(async move {
            conduit
                .send_sync(target, PauseApp { app_id: AppId(1) }.to_wire(), Duration::ZERO)
                .await
        })
    };

    // Let the call register, then declare the target dead.
    tokio::time::sleep(Duration::from_millis(20)).await;
    conduit.fail_target(target);

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Unreachable(IsolateId(1))));
    assert_eq!(conduit.pending_count(), 0);
}

#[tokio::test]
async fn test_fail_target_reaches_async_callbacks() {
    let ctx = Arc::new(Context::new(IsolateId(0)));
    let conduit = caller(&ctx);
    let target = IsolateId(1);
    spawn_black_hole(&ctx, target);

    let failed = Arc::new(AtomicUsize::new(0));
    {
        let failed = failed.clone();
        conduit
            .send_async(target, probe_cmd(), move |result| {
                assert!(matches!(result, Err(Error::Unreachable(_))));
                failed.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    conduit.fail_target(target);
    assert_eq!(failed.load(Ordering::SeqCst), 1);
    assert_eq!(conduit.pending_count(), 0);
}

// -- context -----------------------------------------------------------------

#[test]
fn test_id_allocation_is_unique_and_monotonic() {
    let ctx = Context::new(IsolateId(0));
    let a = ctx.alloc_isolate_id();
    let b = ctx.alloc_isolate_id();
    assert!(a.0 < b.0);
    assert!(a.0 > ctx.ams_isolate_id().0);

    let w1 = ctx.alloc_window_id();
    let w2 = ctx.alloc_window_id();
    assert!(w1.0 < w2.0);
}

#[test]
fn test_unregistered_isolate_is_unreachable() {
    let ctx = Context::new(IsolateId(0));
    assert!(!ctx.is_reachable(IsolateId(7)));
    let err = ctx.deliver(IsolateId(7), Event::Shutdown).unwrap_err();
    assert!(matches!(err, Error::Unreachable(IsolateId(7))));
}

// -- activation policy -------------------------------------------------------

#[test]
fn test_highest_priority_prefers_urgent_state() {
    let policy = HighestPriority;
    let apps = [
        AppSnapshot { isolate_id: IsolateId(1), app_id: AppId(1), state: MidletState::Paused },
        AppSnapshot {
            isolate_id: IsolateId(2),
            app_id: AppId(1),
            state: MidletState::ActivePending,
        },
    ];
    assert_eq!(policy.select_next(&apps), Some((IsolateId(2), AppId(1))));
}

#[test]
fn test_highest_priority_never_picks_dying_apps() {
    let policy = HighestPriority;
    let apps = [
        AppSnapshot {
            isolate_id: IsolateId(1),
            app_id: AppId(1),
            state: MidletState::DestroyPending,
        },
        AppSnapshot { isolate_id: IsolateId(2), app_id: AppId(1), state: MidletState::Destroyed },
    ];
    assert_eq!(policy.select_next(&apps), None);
}

#[test]
fn test_highest_priority_breaks_ties_deterministically() {
    let policy = HighestPriority;
    let apps = [
        AppSnapshot { isolate_id: IsolateId(3), app_id: AppId(2), state: MidletState::Paused },
        AppSnapshot { isolate_id: IsolateId(1), app_id: AppId(5), state: MidletState::Paused },
        AppSnapshot { isolate_id: IsolateId(1), app_id: AppId(2), state: MidletState::Paused },
    ];
    assert_eq!(policy.select_next(&apps), Some((IsolateId(1), AppId(2))));
}
