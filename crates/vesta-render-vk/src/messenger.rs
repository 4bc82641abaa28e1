// SPDX-License-Identifier: CEPL-1.0
use ash::ext::debug_utils;
use ash::{vk, Entry, Instance};
use std::ffi::CStr;
use tracing::{debug, error, info, trace, warn};

use crate::error::{RenderResult, VkCheck};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Verbose,
}

pub fn classify(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Severity {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        Severity::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        Severity::Warning
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        Severity::Info
    } else {
        Severity::Verbose
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    match classify(severity) {
        Severity::Error => error!(?types, "[Vulkan] {msg}"),
        Severity::Warning => warn!(?types, "[Vulkan] {msg}"),
        Severity::Info => info!(?types, "[Vulkan] {msg}"),
        Severity::Verbose => trace!(?types, "[Vulkan] {msg}"),
    }
    vk::FALSE
}

/// Observes validation output; never influences control flow.
pub struct DebugMessenger {
    loader: debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    pub unsafe fn new(entry: &Entry, instance: &Instance) -> RenderResult<Self> {
        info!("vk: creating debug messenger");
        let loader = debug_utils::Instance::new(entry, instance);
        let ci = vk::DebugUtilsMessengerCreateInfoEXT {
            s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
            message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            pfn_user_callback: Some(debug_callback),
            ..Default::default()
        };
        let handle = loader
            .create_debug_utils_messenger(&ci, None)
            .check("vkCreateDebugUtilsMessengerEXT")?;
        Ok(Self { loader, handle })
    }

    pub unsafe fn destroy(&mut self) {
        debug!("vk: destroying debug messenger");
        self.loader
            .destroy_debug_utils_messenger(self.handle, None);
        self.handle = vk::DebugUtilsMessengerEXT::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vk::DebugUtilsMessageSeverityFlagsEXT as S;

    #[test]
    fn four_severities() {
        assert_eq!(classify(S::ERROR), Severity::Error);
        assert_eq!(classify(S::WARNING), Severity::Warning);
        assert_eq!(classify(S::INFO), Severity::Info);
        assert_eq!(classify(S::VERBOSE), Severity::Verbose);
    }

    #[test]
    fn most_severe_bit_wins() {
        assert_eq!(classify(S::WARNING | S::VERBOSE), Severity::Warning);
        assert_eq!(classify(S::ERROR | S::INFO), Severity::Error);
    }

    #[test]
    fn null_payload_is_ignored() {
        let ret = unsafe {
            debug_callback(
                S::ERROR,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                std::ptr::null(),
                std::ptr::null_mut(),
            )
        };
        assert_eq!(ret, vk::FALSE);
    }
}
