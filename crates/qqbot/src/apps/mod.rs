//! Built-in apps.

pub mod echo;

pub use echo::ECHO;

use qqbot_framework::PluginDescriptor;

/// Every built-in plugin, in registration order.
pub fn builtin() -> Vec<PluginDescriptor> {
    vec![ECHO]
}
