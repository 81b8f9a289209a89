//! Plugin descriptor: the static, `Copy` handle to a handler module.

use crate::handler::HandlerDescriptor;

/// A static descriptor for a module that contributes handlers.
///
/// ```rust,ignore
/// pub static ECHO: PluginDescriptor = PluginDescriptor {
///     name: "echo",
///     description: "Repeats the message being replied to",
///     handlers: echo_handlers,
/// };
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PluginDescriptor {
    /// Human-readable plugin name (used in logs).
    pub name: &'static str,

    /// One-line description.
    pub description: &'static str,

    /// Factory for the plugin's handlers, in the order they should be
    /// registered.
    pub handlers: fn() -> Vec<HandlerDescriptor>,
}

impl PluginDescriptor {
    /// Creates the plugin's handlers.
    #[inline]
    pub fn instantiate(&self) -> Vec<HandlerDescriptor> {
        (self.handlers)()
    }
}
