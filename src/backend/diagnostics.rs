// Validation-layer messenger
//
// The callback's user data points at the boxed sink owned by the messenger,
// so the sink lives exactly as long as the messenger does.

use crate::error::GpuResult;
use crate::rhi::{DiagnosticSink, Severity};
use ash::vk;
use std::ffi::{c_void, CStr};
use std::sync::Arc;

pub(super) struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
    _sink: Box<Arc<dyn DiagnosticSink>>,
}

impl DebugMessenger {
    pub(super) fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        sink: Arc<dyn DiagnosticSink>,
    ) -> GpuResult<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let sink = Box::new(sink);
        let user_data = &*sink as *const Arc<dyn DiagnosticSink> as *mut c_void;

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback))
            .user_data(user_data);

        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None) }?;
        Ok(Self {
            loader,
            messenger,
            _sink: sink,
        })
    }

    /// Must run before the instance is destroyed.
    pub(super) unsafe fn destroy(&self) {
        self.loader
            .destroy_debug_utils_messenger(self.messenger, None);
    }
}

fn severity(flags: vk::DebugUtilsMessageSeverityFlagsEXT) -> Severity {
    if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        Severity::Error
    } else if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        Severity::Warning
    } else if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        Severity::Info
    } else {
        Severity::Verbose
    }
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    p_user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || p_user_data.is_null() {
        return vk::FALSE;
    }
    let data = &*p_callback_data;
    if data.p_message.is_null() {
        return vk::FALSE;
    }
    let sink = &*(p_user_data as *const Arc<dyn DiagnosticSink>);
    let message = CStr::from_ptr(data.p_message).to_string_lossy();
    sink.message(severity(message_severity), &message);

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highest_flag_wins() {
        let both = vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR;
        assert_eq!(severity(both), Severity::Error);
        assert_eq!(
            severity(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE),
            Severity::Verbose
        );
    }
}
