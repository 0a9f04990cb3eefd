//! Integration tests for the Engine logging hub
//!
//! These tests drive the public logging API the way the backend and demo crates do.
//! No GPU required.
//!
//! Run with: cargo test --test logging_integration_tests

use vertex_bench::vbench::{Engine, Error, Result};
use vertex_bench::vbench::log::{Logger, LogEntry, LogSeverity};
use vertex_bench::{engine_bail, engine_debug, engine_err, engine_error, engine_info, engine_warn};
use std::sync::{Arc, Mutex};
use serial_test::serial;

// ============================================================================
// TEST LOGGER IMPLEMENTATION
// ============================================================================

/// Test logger that captures log entries for verification
struct TestLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl TestLogger {
    fn new() -> (Self, Arc<Mutex<Vec<LogEntry>>>) {
        let entries = Arc::new(Mutex::new(Vec::new()));
        (Self { entries: entries.clone() }, entries)
    }
}

impl Logger for TestLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

// ============================================================================
// LOGGING TESTS
// ============================================================================

#[test]
#[serial]
fn test_integration_custom_logger() {
    let (test_logger, entries) = TestLogger::new();
    Engine::set_logger(test_logger);

    Engine::log(LogSeverity::Info, "vbench::demo", "Benchmark started".to_string());
    Engine::log(LogSeverity::Warn, "vbench::vulkan", "Swapchain out of date".to_string());

    {
        let captured = entries.lock().unwrap();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0].severity, LogSeverity::Info);
        assert_eq!(captured[0].source, "vbench::demo");
        assert_eq!(captured[0].message, "Benchmark started");
        assert_eq!(captured[1].severity, LogSeverity::Warn);
        assert_eq!(captured[1].file, None);
    }

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_integration_error_logging_with_location() {
    let (test_logger, entries) = TestLogger::new();
    Engine::set_logger(test_logger);

    Engine::log_detailed(
        LogSeverity::Error,
        "vbench::vulkan",
        "Device lost".to_string(),
        "vulkan_frame_sync.rs",
        42,
    );

    {
        let captured = entries.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].file, Some("vulkan_frame_sync.rs"));
        assert_eq!(captured[0].line, Some(42));
    }

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_integration_logger_reset() {
    let (test_logger, entries) = TestLogger::new();
    Engine::set_logger(test_logger);

    Engine::log(LogSeverity::Info, "vbench::demo", "Message 1".to_string());
    Engine::reset_logger();
    Engine::log(LogSeverity::Info, "vbench::demo", "Message 2".to_string());

    assert_eq!(entries.lock().unwrap().len(), 1);
}

#[test]
#[serial]
fn test_integration_macros_from_dependent_crate() {
    let (test_logger, entries) = TestLogger::new();
    Engine::set_logger(test_logger);

    let frames = 60;
    engine_debug!("vbench::frame", "Recorded {} frames", frames);
    engine_info!("vbench::demo", "Average GPU time: {:.3} ms", 1.25);
    engine_warn!("vbench::vulkan", "Suboptimal swapchain");
    engine_error!("vbench::vulkan", "Queue submit failed");

    {
        let captured = entries.lock().unwrap();
        let severities: Vec<LogSeverity> = captured.iter().map(|e| e.severity).collect();
        assert_eq!(
            severities,
            vec![LogSeverity::Debug, LogSeverity::Info, LogSeverity::Warn, LogSeverity::Error]
        );
        assert_eq!(captured[0].message, "Recorded 60 frames");
        assert_eq!(captured[1].message, "Average GPU time: 1.250 ms");
        assert!(captured[3].file.is_some_and(|f| f.ends_with("logging_integration_tests.rs")));
    }

    Engine::reset_logger();
}

fn failing_operation(fail: bool) -> Result<u32> {
    if fail {
        engine_bail!("vbench::vulkan", "Fence wait failed: {}", "DEVICE_LOST");
    }
    Ok(7)
}

#[test]
#[serial]
fn test_integration_error_macros_log_and_return() {
    let (test_logger, entries) = TestLogger::new();
    Engine::set_logger(test_logger);

    assert_eq!(failing_operation(false).unwrap(), 7);
    match failing_operation(true) {
        Err(Error::BackendError(msg)) => assert_eq!(msg, "Fence wait failed: DEVICE_LOST"),
        other => panic!("expected BackendError, got {:?}", other),
    }

    let err = engine_err!("vbench::Buffer", "Mapping failed");
    assert_eq!(err.to_string(), "Backend error: Mapping failed");

    {
        let captured = entries.lock().unwrap();
        assert_eq!(captured.len(), 2);
        assert!(captured.iter().all(|e| e.severity == LogSeverity::Error && e.line.is_some()));
    }

    Engine::reset_logger();
}
