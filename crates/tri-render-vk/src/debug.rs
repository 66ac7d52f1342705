// SPDX-License-Identifier: CEPL-1.0
//! Validation-layer diagnostics.
//!
//! Messages are forwarded to `tracing` under the `vulkan` target, one event
//! per callback. The callback always returns `VK_FALSE`, so the call that
//! triggered it proceeds.

use std::ffi::{c_void, CStr};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use ash::ext::debug_utils;
use ash::vk;
use tracing::Level;

static EMITTED: AtomicU64 = AtomicU64::new(0);

/// Number of validation messages reported since process start.
pub fn diagnostics_emitted() -> u64 {
    EMITTED.load(Ordering::Relaxed)
}

pub(crate) fn level_for(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        Level::ERROR
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        Level::WARN
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        Level::INFO
    } else {
        Level::DEBUG
    }
}

fn emit(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    msg: &str,
) {
    EMITTED.fetch_add(1, Ordering::Relaxed);
    let level = level_for(severity);
    if level == Level::ERROR {
        tracing::error!(target: "vulkan", ?types, "validation layer: {msg}");
    } else if level == Level::WARN {
        tracing::warn!(target: "vulkan", ?types, "validation layer: {msg}");
    } else if level == Level::INFO {
        tracing::info!(target: "vulkan", ?types, "validation layer: {msg}");
    } else {
        tracing::debug!(target: "vulkan", ?types, "validation layer: {msg}");
    }
}

pub(crate) unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    let p_message = unsafe { (*data).p_message };
    if p_message.is_null() {
        return vk::FALSE;
    }
    let msg = unsafe { CStr::from_ptr(p_message) }.to_string_lossy();
    emit(severity, types, &msg);
    vk::FALSE
}

/// Used both for the long-lived messenger and chained into instance creation
/// so that `vkCreateInstance`/`vkDestroyInstance` are covered too.
pub(crate) fn messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    }
}

/// Owned by [`crate::instance::Instance`], which destroys it before itself.
pub(crate) struct DebugMessenger {
    loader: debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    pub(crate) fn new(entry: &ash::Entry, instance: &ash::Instance) -> Result<Self> {
        let loader = debug_utils::Instance::new(entry, instance);
        let ci = messenger_create_info();
        let handle = unsafe { loader.create_debug_utils_messenger(&ci, None) }
            .context("create_debug_utils_messenger")?;
        Ok(DebugMessenger { loader, handle })
    }

    /// # Safety
    /// Must run before the owning instance is destroyed, at most once.
    pub(crate) unsafe fn destroy(&self) {
        unsafe { self.loader.destroy_debug_utils_messenger(self.handle, None) };
    }
}
