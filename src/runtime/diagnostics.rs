use serde_json::json;

use crate::logging::{LogLevel, Logger, event_with_fields, json_kv};

use super::{InstanceId, LifecycleEvent, LifecycleListener};

/// Logs lifecycle notifications for observability/debugging.
pub struct LifecycleLogger {
    logger: Logger,
    level: LogLevel,
    log_back_press: bool,
}

impl LifecycleLogger {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            level: LogLevel::Debug,
            log_back_press: true,
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn log_back_press(mut self, enabled: bool) -> Self {
        self.log_back_press = enabled;
        self
    }
}

impl LifecycleListener for LifecycleLogger {
    fn name(&self) -> &str {
        "diagnostics.lifecycle_logger"
    }

    fn on_lifecycle(&mut self, instance_id: InstanceId, event: LifecycleEvent) {
        if event == LifecycleEvent::BackPress && !self.log_back_press {
            return;
        }
        let message = match event {
            LifecycleEvent::Foreground => "lifecycle.foreground",
            LifecycleEvent::Background => "lifecycle.background",
            LifecycleEvent::BackPress => "lifecycle.back_press",
        };
        let event = event_with_fields(
            self.level,
            "rnoh::lifecycle",
            message,
            [json_kv("instance", json!(instance_id.0))],
        );
        let _ = self.logger.log_event(event);
    }
}
