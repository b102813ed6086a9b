//! Unit tests for error.rs
//!
//! Tests all Error variants and their implementations (Display, Debug, Clone, std::error::Error).

use crate::error::{Error, Result};

// ============================================================================
// ERROR DISPLAY TESTS
// ============================================================================

#[test]
fn test_backend_error_display() {
    let err = Error::BackendError("vkQueueSubmit failed".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Backend error"));
    assert!(display.contains("vkQueueSubmit failed"));
}

#[test]
fn test_out_of_memory_display() {
    let err = Error::OutOfMemory { requested: 4096 };
    assert_eq!(format!("{}", err), "Out of GPU memory (requested 4096 bytes)");
}

#[test]
fn test_invalid_resource_display() {
    let err = Error::InvalidResource("Unknown buffer handle".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Invalid resource"));
    assert!(display.contains("Unknown buffer handle"));
}

#[test]
fn test_initialization_failed_display() {
    let err = Error::InitializationFailed("No Vulkan-capable GPU found".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Initialization failed"));
    assert!(display.contains("No Vulkan-capable GPU found"));
}

// ============================================================================
// ERROR TRAIT IMPLEMENTATIONS
// ============================================================================

#[test]
fn test_error_is_std_error() {
    let err = Error::OutOfMemory { requested: 1 };
    let _: &dyn std::error::Error = &err;
}

#[test]
fn test_error_debug() {
    let debug = format!("{:?}", Error::BackendError("test".to_string()));
    assert!(debug.contains("BackendError"));

    let debug = format!("{:?}", Error::OutOfMemory { requested: 8 });
    assert!(debug.contains("OutOfMemory"));
    assert!(debug.contains("requested: 8"));
}

#[test]
fn test_error_clone_and_eq() {
    let err = Error::InvalidResource("handle 3".to_string());
    assert_eq!(err.clone(), err);
    assert_ne!(err, Error::InvalidResource("handle 4".to_string()));
}

// ============================================================================
// RESULT ALIAS
// ============================================================================

fn fails_with_oom() -> Result<u32> {
    Err(Error::OutOfMemory { requested: 64 })
}

fn propagates() -> Result<u32> {
    let value = fails_with_oom()?;
    Ok(value + 1)
}

#[test]
fn test_result_propagation() {
    assert_eq!(propagates(), Err(Error::OutOfMemory { requested: 64 }));
}
