//! Integration tests for the GC tracing feature.
//!
//! A `tracing-subscriber` formatter writes into a shared buffer so the spans
//! and events a collection emits can be inspected.

#![cfg(feature = "tracing")]

use std::io;
use std::sync::{Arc, Mutex};

use bug_gc::builtins::new_string;
use bug_gc::tracing::internal::next_gc_id;
use bug_gc::{Context, HeapConfig};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Runs `f` with a DEBUG subscriber installed and returns what it logged.
fn capture(f: impl FnOnce()) -> String {
    let out = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .with_ansi(false)
        .with_writer(out.clone())
        .finish();
    let guard = subscriber.set_default();
    f();
    drop(guard);
    out.text()
}

#[test]
fn test_collection_emits_phase_events() {
    let log = capture(|| {
        let mut ctx = Context::new().unwrap();
        let s = new_string(&mut ctx, "traced").unwrap();
        ctx.push(s).unwrap();
        ctx.collect();
    });

    assert!(log.contains("gc_collect"), "{log}");
    assert!(log.contains("explicit"), "{log}");
    for phase in ["Clear", "Mark", "Promote", "Sweep"] {
        assert!(log.contains(phase), "missing {phase} in {log}");
    }
    assert_eq!(log.matches("phase_end").count(), 4, "{log}");
}

#[test]
fn test_oversize_escape_is_logged() {
    let log = capture(|| {
        let mut ctx = Context::with_config(HeapConfig::new().arena_bytes(256)).unwrap();
        ctx.allocate_bytes(1024).unwrap();
    });

    assert!(log.contains("oversize_escape"), "{log}");
    assert!(!log.contains("gc_collect"), "{log}");
}

#[test]
fn test_arena_exhaustion_trigger_is_logged() {
    let log = capture(|| {
        let mut ctx = Context::with_config(HeapConfig::new().arena_bytes(256)).unwrap();
        for _ in 0..16 {
            ctx.allocate_bytes(16).unwrap();
        }
    });

    assert!(log.contains("arena_exhausted"), "{log}");
}

#[test]
fn test_collections_without_subscriber() {
    let mut ctx = Context::new().unwrap();
    for i in 0..5 {
        new_string(&mut ctx, &format!("{i}")).unwrap();
        ctx.collect();
    }
    assert_eq!(ctx.stats().collections, 5);
}

#[test]
fn test_gc_ids_increase() {
    let first = next_gc_id();
    let second = next_gc_id();
    assert!(second.0 > first.0);
}
