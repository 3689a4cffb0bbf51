use crate::error::{NotifyError, Result};
use crate::NotificationChannel;
use serde_json::Value;
use std::collections::HashMap;

/// Factory for one channel type.
///
/// The registry validates a channel's JSON config through the matching
/// plugin and builds the [`NotificationChannel`] used for delivery.
pub trait ChannelPlugin: Send + Sync {
    /// Channel type name (e.g. `"email"`, `"dingtalk"`).
    fn name(&self) -> &str;

    fn validate_config(&self, config: &Value) -> Result<()>;

    /// `instance_id` is the channel's row id.
    fn create_channel(&self, instance_id: &str, config: &Value) -> Result<Box<dyn NotificationChannel>>;

    /// Copy of `config` safe to log or return from the API.
    fn redact_config(&self, config: &Value) -> Value {
        crate::utils::redact_sensitive_json(config)
    }
}

/// Channel plugins keyed by type name.
///
/// # Examples
///
/// ```
/// use opsmon_notify::plugin::ChannelRegistry;
///
/// let registry = ChannelRegistry::default();
/// assert!(registry.has_plugin("email"));
/// assert!(registry.has_plugin("dingtalk"));
/// assert!(registry.has_plugin("webhook"));
/// assert!(!registry.has_plugin("pager"));
/// ```
pub struct ChannelRegistry {
    plugins: HashMap<String, Box<dyn ChannelPlugin>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
        }
    }

    /// Registers `plugin`, replacing any plugin with the same name.
    pub fn register(&mut self, plugin: Box<dyn ChannelPlugin>) {
        self.plugins.insert(plugin.name().to_string(), plugin);
    }

    pub fn create_channel(
        &self,
        type_name: &str,
        instance_id: &str,
        config: &Value,
    ) -> Result<Box<dyn NotificationChannel>> {
        let plugin = self
            .plugins
            .get(type_name)
            .ok_or_else(|| NotifyError::UnknownChannelType(type_name.to_string()))?;
        plugin.validate_config(config)?;
        plugin.create_channel(instance_id, config)
    }

    pub fn get_plugin(&self, type_name: &str) -> Option<&dyn ChannelPlugin> {
        self.plugins.get(type_name).map(|p| p.as_ref())
    }

    pub fn has_plugin(&self, type_name: &str) -> bool {
        self.plugins.contains_key(type_name)
    }

    /// Redacts with the matching plugin, or generically for unknown types.
    pub fn redact_config(&self, type_name: &str, config: &Value) -> Value {
        match self.get_plugin(type_name) {
            Some(plugin) => plugin.redact_config(config),
            None => crate::utils::redact_sensitive_json(config),
        }
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.plugins.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(crate::channels::email::EmailPlugin));
        registry.register(Box::new(crate::channels::dingtalk::DingTalkPlugin));
        registry.register(Box::new(crate::channels::webhook::WebhookPlugin));
        registry
    }
}
