//! Unit tests for the Engine logging hub and the error helper macros
//!
//! IMPORTANT: LOGGER is a global OnceLock shared across all tests.
//! All tests are marked with #[serial] to run sequentially.

use crate::vbench::{Engine, Error, Result};
use crate::vbench::log::{Logger, LogEntry, LogSeverity};
use std::sync::{Arc, Mutex};
use serial_test::serial;

// ============================================================================
// TEST HELPERS
// ============================================================================

/// Test logger that captures log entries for verification
struct CaptureLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

fn install_capture_logger() -> Arc<Mutex<Vec<LogEntry>>> {
    let entries = Arc::new(Mutex::new(Vec::new()));
    Engine::set_logger(CaptureLogger { entries: entries.clone() });
    entries
}

impl Logger for CaptureLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

// ============================================================================
// LOGGER MANAGEMENT TESTS
// ============================================================================

#[test]
#[serial]
fn test_default_logger_logs_without_panic() {
    Engine::reset_logger();
    Engine::log(LogSeverity::Info, "vbench::test", "default logger output".to_string());
}

#[test]
#[serial]
fn test_set_custom_logger_receives_logs() {
    let entries = install_capture_logger();

    Engine::log(LogSeverity::Debug, "vbench::test", "first".to_string());
    Engine::log(LogSeverity::Warn, "vbench::test", "second".to_string());

    {
        let captured = entries.lock().unwrap();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0].severity, LogSeverity::Debug);
        assert_eq!(captured[1].message, "second");
        assert!(captured[1].file.is_none());
    }

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_reset_logger_stops_capture() {
    let entries = install_capture_logger();
    Engine::reset_logger();

    Engine::log(LogSeverity::Info, "vbench::test", "not captured".to_string());

    assert!(entries.lock().unwrap().is_empty());
}

#[test]
#[serial]
fn test_log_detailed_with_file_line() {
    let entries = install_capture_logger();

    Engine::log_detailed(LogSeverity::Error, "vbench::test", "boom".to_string(), "frame.rs", 99);

    {
        let captured = entries.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].file, Some("frame.rs"));
        assert_eq!(captured[0].line, Some(99));
    }

    Engine::reset_logger();
}

// ============================================================================
// MACRO TESTS
// ============================================================================

#[test]
#[serial]
fn test_level_macros_route_through_engine() {
    let entries = install_capture_logger();

    crate::engine_trace!("vbench::test", "trace {}", 1);
    crate::engine_debug!("vbench::test", "debug {}", 2);
    crate::engine_info!("vbench::test", "info {}", 3);
    crate::engine_warn!("vbench::test", "warn {}", 4);
    crate::engine_error!("vbench::test", "error {}", 5);

    {
        let captured = entries.lock().unwrap();
        let severities: Vec<LogSeverity> = captured.iter().map(|e| e.severity).collect();
        assert_eq!(
            severities,
            vec![
                LogSeverity::Trace,
                LogSeverity::Debug,
                LogSeverity::Info,
                LogSeverity::Warn,
                LogSeverity::Error,
            ]
        );
        assert_eq!(captured[4].message, "error 5");
        assert!(captured[4].file.is_some());
        assert!(captured[3].file.is_none());
    }

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_engine_err_logs_and_builds_backend_error() {
    let entries = install_capture_logger();

    let err = crate::engine_err!("vbench::vulkan", "Failed to create fence: {}", "ERROR_OUT_OF_HOST_MEMORY");

    match err {
        Error::BackendError(msg) => assert_eq!(msg, "Failed to create fence: ERROR_OUT_OF_HOST_MEMORY"),
        other => panic!("unexpected error variant: {:?}", other),
    }

    {
        let captured = entries.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].severity, LogSeverity::Error);
        assert_eq!(captured[0].source, "vbench::vulkan");
    }

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_engine_bail_returns_early() {
    let entries = install_capture_logger();

    fn check(value: u32) -> Result<u32> {
        if value == 0 {
            crate::engine_bail!("vbench::test", "value must be non-zero");
        }
        Ok(value)
    }

    assert_eq!(check(3).unwrap(), 3);
    assert!(matches!(check(0), Err(Error::BackendError(_))));
    assert_eq!(entries.lock().unwrap().len(), 1);

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_engine_bail_warn_logs_at_warn() {
    let entries = install_capture_logger();

    fn check() -> Result<()> {
        crate::engine_bail_warn!("vbench::test", "skipping {}", "frame");
    }

    assert!(check().is_err());
    {
        let captured = entries.lock().unwrap();
        assert_eq!(captured[0].severity, LogSeverity::Warn);
        assert_eq!(captured[0].message, "skipping frame");
    }

    Engine::reset_logger();
}
