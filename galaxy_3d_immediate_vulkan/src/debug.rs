/// Vulkan Debug Messenger - routes validation layer messages to the engine logger
///
/// Errors go through `engine_error!`, warnings through `engine_warn!`, info
/// and verbose messages through `engine_debug!` / `engine_trace!`. Counters
/// are kept per severity for tests and shutdown reports.

use ash::vk;
use galaxy_3d_immediate::{engine_debug, engine_error, engine_info, engine_trace, engine_warn};
use std::ffi::CStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

const SOURCE: &str = "galaxy3d::vulkan::Validation";

/// Whether the callback forwards messages (off once the context shuts down)
static ENABLED: AtomicBool = AtomicBool::new(false);

/// Panic on validation errors instead of only logging them
static PANIC_ON_ERROR: AtomicBool = AtomicBool::new(false);

/// Global validation statistics (thread-safe atomic counters)
static VALIDATION_STATS: ValidationStatsTracker = ValidationStatsTracker::new();

/// Validation message counts per severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

struct ValidationStatsTracker {
    errors: AtomicU32,
    warnings: AtomicU32,
    info: AtomicU32,
    verbose: AtomicU32,
}

impl ValidationStatsTracker {
    const fn new() -> Self {
        Self {
            errors: AtomicU32::new(0),
            warnings: AtomicU32::new(0),
            info: AtomicU32::new(0),
            verbose: AtomicU32::new(0),
        }
    }

    fn get_stats(&self) -> ValidationStats {
        ValidationStats {
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            info: self.info.load(Ordering::Relaxed),
            verbose: self.verbose.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.errors.store(0, Ordering::Relaxed);
        self.warnings.store(0, Ordering::Relaxed);
        self.info.store(0, Ordering::Relaxed);
        self.verbose.store(0, Ordering::Relaxed);
    }
}

/// Initialize debug configuration
pub fn init_debug_config(panic_on_error: bool) {
    VALIDATION_STATS.reset();
    PANIC_ON_ERROR.store(panic_on_error, Ordering::Relaxed);
    ENABLED.store(true, Ordering::Release);
}

/// Stop forwarding messages (called before the messenger is destroyed)
pub fn cleanup_debug_config() {
    ENABLED.store(false, Ordering::Release);
}

/// Get current validation statistics
pub fn get_validation_stats() -> ValidationStats {
    VALIDATION_STATS.get_stats()
}

/// Log a one-line summary of the validation statistics
pub fn log_validation_stats_report() {
    let stats = get_validation_stats();
    if stats.total() == 0 {
        engine_info!(SOURCE, "No validation messages");
    } else {
        engine_info!(SOURCE, "Validation messages: {} errors, {} warnings, {} info, {} verbose",
            stats.errors, stats.warnings, stats.info, stats.verbose);
    }
}

/// Severity flags to request from the messenger
pub fn messenger_severity_flags() -> vk::DebugUtilsMessageSeverityFlagsEXT {
    vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
        | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
        | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
}

/// Vulkan debug messenger callback
///
/// Called by the validation layers when they detect issues.
pub unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if !ENABLED.load(Ordering::Acquire) || p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = *p_callback_data;
    let message_id_name = if callback_data.p_message_id_name.is_null() {
        "Unknown"
    } else {
        CStr::from_ptr(callback_data.p_message_id_name)
            .to_str()
            .unwrap_or("Invalid UTF-8")
    };
    let message = if callback_data.p_message.is_null() {
        "No message"
    } else {
        CStr::from_ptr(callback_data.p_message)
            .to_str()
            .unwrap_or("Invalid UTF-8")
    };

    let type_str = if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else {
        "General"
    };

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        VALIDATION_STATS.errors.fetch_add(1, Ordering::Relaxed);
        engine_error!(SOURCE, "[{}] {}: {}", type_str, message_id_name, message);
        if PANIC_ON_ERROR.load(Ordering::Relaxed) {
            panic!("Vulkan validation error ({}): {}", message_id_name, message);
        }
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        VALIDATION_STATS.warnings.fetch_add(1, Ordering::Relaxed);
        engine_warn!(SOURCE, "[{}] {}: {}", type_str, message_id_name, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        VALIDATION_STATS.info.fetch_add(1, Ordering::Relaxed);
        engine_debug!(SOURCE, "[{}] {}: {}", type_str, message_id_name, message);
    } else {
        VALIDATION_STATS.verbose.fetch_add(1, Ordering::Relaxed);
        engine_trace!(SOURCE, "[{}] {}: {}", type_str, message_id_name, message);
    }

    vk::FALSE // Don't abort Vulkan execution
}
