//! Pushes Spot Event Plugin configuration to a Deadline render queue.
pub mod configurator;
pub mod deadline_client;
pub mod event_plugin_requests;
pub mod spot_settings;

pub use configurator::SpotEventPluginConfigurator;
