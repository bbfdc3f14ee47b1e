//! Scheduler properties checked against the scripted engine.
//!
//! # Design
//! Most tests build a `Pool::manual` and advance it with `tick`, so every
//! admission and every pump happens exactly when the test says. Latencies are
//! expressed as pump steps: one step stands for 10ms.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sinet_core::error::{ERR_CONNECT, ERR_INIT, ERR_OK};
use sinet_core::{Pool, PoolConfig, PoolStats, Request, Script, ScriptedTransport, Task, TaskStatus};

fn manual() -> (Pool, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::new());
    (Pool::manual(Arc::clone(&transport)), transport)
}

fn task_for(url: &str) -> Task {
    Task::with_requests([Request::get(url)])
}

/// Tick until nothing is queued or running, at most `limit` times.
fn run_to_idle(pool: &Pool, limit: usize) {
    for _ in 0..limit {
        let stats = pool.stats();
        if stats.queued == 0 && stats.running == 0 {
            return;
        }
        pool.tick();
    }
    panic!("pool still busy after {limit} ticks: {:?}", pool.stats());
}

#[test]
fn execute_is_visible_before_the_coordinator_runs() {
    let (pool, transport) = manual();
    let task = task_for("a");

    pool.execute(&task);

    assert!(pool.is_queued(&task));
    assert!(!pool.is_running(&task));
    assert!(pool.is_running_or_queued(&task));
    assert_eq!(task.status(), TaskStatus::Queued);
    assert_eq!(transport.opens(), 0);
}

#[test]
fn execute_twice_queues_once() {
    let (pool, _transport) = manual();
    let task = task_for("a");

    pool.execute(&task);
    pool.execute(&task);

    assert_eq!(pool.stats().queued, 1);
}

#[test]
fn finished_task_cannot_be_executed_again() {
    let (pool, transport) = manual();
    transport.route("a", Script::new(1));
    let task = task_for("a");
    pool.execute(&task);
    run_to_idle(&pool, 10);

    pool.execute(&task);
    assert!(!pool.is_queued(&task));
    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(transport.opens(), 1);
}

#[test]
fn canceling_a_queued_task_never_opens_a_session() {
    let (pool, transport) = manual();
    let task = task_for("a");
    pool.execute(&task);

    pool.cancel(&task);
    run_to_idle(&pool, 10);

    assert_eq!(transport.opens(), 0);
    assert_eq!(task.status(), TaskStatus::Canceled);
    assert!(!pool.is_running_or_queued(&task));
    assert!(!pool.is_finished(&task));
}

#[test]
fn canceling_a_running_task_closes_its_session_once() {
    let (pool, transport) = manual();
    transport.route("slow", Script::new(100).chunk("partial").chunk("more"));
    let request = Request::get("slow");
    let task = Task::with_requests([request.clone()]);
    pool.execute(&task);

    pool.tick();
    pool.tick();
    assert!(pool.is_running(&task));

    pool.cancel(&task);
    pool.cancel(&task);

    assert_eq!(transport.closes(), 1);
    assert!(!pool.is_running(&task));
    assert!(pool.is_finished(&task));
    assert_eq!(task.status(), TaskStatus::Canceled);
    assert_eq!(request.response_buffer(), b"partial");
    assert_eq!(request.response_errcode(), ERR_OK);
}

#[test]
fn canceling_a_finished_task_is_a_noop() {
    let (pool, transport) = manual();
    transport.route("a", Script::new(1));
    let task = task_for("a");
    pool.execute(&task);
    run_to_idle(&pool, 10);

    pool.cancel(&task);

    assert_eq!(task.status(), TaskStatus::Completed);
    assert!(pool.is_finished(&task));
    assert_eq!(transport.closes(), 1);
}

#[test]
fn unknown_tasks_degrade_to_noops() {
    let (pool, _transport) = manual();
    let stranger = Task::new();

    pool.cancel(&stranger);

    assert!(!pool.is_queued(&stranger));
    assert!(!pool.is_running(&stranger));
    assert!(!pool.is_running_or_queued(&stranger));
    assert_eq!(stranger.status(), TaskStatus::Created);
}

#[test]
fn completion_order_follows_admission_not_latency() {
    let (pool, transport) = manual();
    // 50ms, 10ms and 200ms at 10ms per step.
    transport.route("a", Script::new(5).chunk("A"));
    transport.route("b", Script::new(1).chunk("B"));
    transport.route("c", Script::new(20).chunk("C"));
    let tasks = [task_for("a"), task_for("b"), task_for("c")];
    for task in &tasks {
        pool.execute(task);
    }

    run_to_idle(&pool, 100);

    assert_eq!(transport.finish_log(), vec!["a", "b", "c"]);
    assert_eq!(pool.take_finished(), tasks.to_vec());
    assert_eq!(
        transport.open_log(),
        tasks.iter().map(Task::id).collect::<Vec<_>>()
    );
    for task in &tasks {
        assert_eq!(task.status(), TaskStatus::Completed);
    }
}

#[test]
fn only_one_task_runs_at_a_time() {
    let (pool, transport) = manual();
    transport.route("a", Script::new(3));
    transport.route("b", Script::new(3));
    let first = task_for("a");
    let second = task_for("b");
    pool.execute(&first);
    pool.execute(&second);

    for _ in 0..3 {
        pool.tick();
        assert!(pool.stats().running <= 1);
        assert!(pool.is_queued(&second));
    }
    pool.tick();
    assert!(pool.is_running(&second));
    assert!(pool.is_finished(&first));
}

#[test]
fn requests_within_a_task_progress_together() {
    let (pool, transport) = manual();
    transport.route("x", Script::new(4).chunk("x"));
    transport.route("y", Script::new(4).chunk("y"));
    let x = Request::get("x");
    let y = Request::get("y");
    let task = Task::with_requests([x.clone(), y.clone()]);
    pool.execute(&task);

    pool.tick();
    pool.tick();

    assert_eq!(x.response_buffer(), b"x");
    assert_eq!(y.response_buffer(), b"y");
    run_to_idle(&pool, 10);
    assert_eq!(task.status(), TaskStatus::Completed);
}

#[test]
fn a_failing_request_does_not_abort_its_siblings() {
    let (pool, transport) = manual();
    transport.route("ok", Script::new(3).chunk("fine"));
    let good = Request::get("ok");
    let bad = Request::get("unrouted");
    let task = Task::with_requests([bad.clone(), good.clone()]);
    pool.execute(&task);

    run_to_idle(&pool, 10);

    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(task.error_code(), ERR_OK);
    assert_eq!(bad.response_errcode(), ERR_CONNECT);
    assert_eq!(good.response_errcode(), ERR_OK);
    assert_eq!(good.response_buffer(), b"fine");
}

#[test]
fn engine_failure_completes_the_task_with_an_error() {
    let (pool, transport) = manual();
    transport.route("a", Script::new(1));
    transport.fail_next_open();
    let failed = task_for("a");
    let next = task_for("a");
    pool.execute(&failed);
    pool.execute(&next);

    pool.tick();

    assert_eq!(failed.status(), TaskStatus::Completed);
    assert_eq!(failed.error_code(), ERR_INIT);
    assert_eq!(failed.request(0).unwrap().response_errcode(), ERR_INIT);
    assert!(pool.is_finished(&failed));

    run_to_idle(&pool, 10);
    assert_eq!(next.status(), TaskStatus::Completed);
    assert_eq!(next.error_code(), ERR_OK);
}

#[test]
fn empty_task_completes_on_first_pump() {
    let (pool, transport) = manual();
    let task = Task::new();
    pool.execute(&task);

    pool.tick();
    assert!(pool.is_running(&task));
    pool.tick();

    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(transport.closes(), 1);
}

#[test]
fn streamed_bytes_add_up_to_response_size() {
    let (pool, transport) = manual();
    let chunks: Vec<Vec<u8>> = (1..=7).map(|n| vec![n as u8; n * 13]).collect();
    let mut script = Script::new(4);
    for chunk in &chunks {
        script = script.chunk(chunk.clone());
    }
    transport.route("stream", script);
    let request = Request::get("stream");
    pool.execute(&Task::with_requests([request.clone()]));

    run_to_idle(&pool, 10);

    let expected: Vec<u8> = chunks.concat();
    assert_eq!(request.response_size(), chunks.iter().map(Vec::len).sum::<usize>());
    assert_eq!(request.response_buffer(), expected);
}

#[test]
fn clear_all_empties_everything_and_closes_each_session_once() {
    let (pool, transport) = manual();
    transport.route("done", Script::new(1));
    transport.route("slow", Script::new(100));
    let done = task_for("done");
    let running = task_for("slow");
    let queued = task_for("slow");
    pool.execute(&done);
    run_to_idle(&pool, 10);
    pool.execute(&running);
    pool.execute(&queued);
    pool.tick();
    assert!(pool.is_running(&running));

    pool.clear_all();
    pool.clear_all();

    assert_eq!(pool.stats(), PoolStats::default());
    assert_eq!(transport.opens(), 2);
    assert_eq!(transport.closes(), 2);
    assert_eq!(running.status(), TaskStatus::Canceled);
    assert_eq!(queued.status(), TaskStatus::Canceled);
    assert_eq!(done.status(), TaskStatus::Completed);
}

#[test]
fn combined_check_holds_while_admission_is_in_flight() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route("a", Script::new(2));
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = std::sync::Mutex::new(release_rx);
    transport.on_open(move |_task| {
        let _ = entered_tx.send(());
        let _ = release_rx.lock().unwrap().recv();
    });
    let pool = Arc::new(Pool::manual(Arc::clone(&transport)));
    let task = task_for("a");
    pool.execute(&task);

    let coordinator = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || pool.tick())
    };
    entered_rx.recv().unwrap();

    // The task has left the queue but is not in the running map yet.
    let observer = {
        let pool = Arc::clone(&pool);
        let task = task.clone();
        thread::spawn(move || pool.is_running_or_queued(&task))
    };
    thread::sleep(Duration::from_millis(20));
    release_tx.send(()).unwrap();

    assert!(coordinator.join().unwrap().admitted);
    assert!(observer.join().unwrap());
    assert!(pool.is_running(&task));
}

#[test]
fn background_pool_runs_tasks_to_completion() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route("a", Script::new(3).chunk("one").chunk("two"));
    transport.route("b", Script::new(2).chunk("three"));
    let pool = Pool::new(
        Arc::clone(&transport),
        PoolConfig {
            min_interval_ms: 1,
            max_interval_ms: 4,
        },
    )
    .unwrap();
    let first = task_for("a");
    let second = task_for("b");
    pool.execute(&first);
    pool.execute(&second);

    assert_eq!(second.wait(Duration::from_secs(10)), TaskStatus::Completed);
    assert_eq!(first.status(), TaskStatus::Completed);
    assert_eq!(first.request(0).unwrap().response_buffer(), b"onetwo");
    assert_eq!(transport.finish_log(), vec!["a", "b"]);

    pool.shutdown();
    pool.shutdown();
}

#[test]
fn dropping_the_pool_cancels_outstanding_work() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route("slow", Script::new(1_000_000));
    let running = task_for("slow");
    let queued = task_for("slow");
    {
        let pool = Pool::new(Arc::clone(&transport), PoolConfig::default()).unwrap();
        pool.execute(&running);
        pool.execute(&queued);
        while !pool.is_running(&running) {
            thread::sleep(Duration::from_millis(1));
        }
    }
    assert_eq!(running.status(), TaskStatus::Canceled);
    assert_eq!(queued.status(), TaskStatus::Canceled);
    assert_eq!(transport.closes(), transport.opens());
}

#[test]
fn shutdown_cancels_running_and_queued_tasks() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route("slow", Script::new(1_000_000));
    let running = task_for("slow");
    let queued = task_for("slow");
    let pool = Pool::new(Arc::clone(&transport), PoolConfig::default()).unwrap();
    pool.execute(&running);
    pool.execute(&queued);
    while !pool.is_running(&running) {
        thread::sleep(Duration::from_millis(1));
    }

    pool.shutdown();

    assert_eq!(pool.stats(), PoolStats::default());
    assert_eq!(running.status(), TaskStatus::Canceled);
    assert_eq!(queued.status(), TaskStatus::Canceled);
    assert_eq!(transport.opens(), 1);
    assert_eq!(transport.closes(), 1);
}
