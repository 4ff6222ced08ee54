//! Pluggable log and error sinks.
//!
//! A pipeline owns exactly one [`Notifier`]. Sinks left unset in
//! [`NotifierConfig`] fall back to the console sinks, which emit `tracing`
//! events.

use serde_json::Value;
use std::sync::Arc;

use crate::errors::BackupError;

pub trait LogSink: Send + Sync {
    fn log(&self, message: &str, context: &Value);
}

pub trait ErrorSink: Send + Sync {
    fn error(&self, message: &str, context: &Value);
}

impl<F> LogSink for F
where
    F: Fn(&str, &Value) + Send + Sync,
{
    fn log(&self, message: &str, context: &Value) {
        self(message, context)
    }
}

impl<F> ErrorSink for F
where
    F: Fn(&str, &Value) + Send + Sync,
{
    fn error(&self, message: &str, context: &Value) {
        self(message, context)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleLogSink;

impl LogSink for ConsoleLogSink {
    fn log(&self, message: &str, context: &Value) {
        if context.is_null() {
            tracing::info!("{}", message);
        } else {
            tracing::info!(%context, "{}", message);
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleErrorSink;

impl ErrorSink for ConsoleErrorSink {
    fn error(&self, message: &str, context: &Value) {
        if context.is_null() {
            tracing::error!("{}", message);
        } else {
            tracing::error!(%context, "{}", message);
        }
    }
}

#[derive(Default, Clone)]
pub struct NotifierConfig {
    pub log_sink: Option<Arc<dyn LogSink>>,
    pub error_sink: Option<Arc<dyn ErrorSink>>,
}

#[derive(Clone)]
pub struct Notifier {
    log_sink: Arc<dyn LogSink>,
    error_sink: Arc<dyn ErrorSink>,
}

impl Notifier {
    pub fn new(config: NotifierConfig) -> Self {
        Self {
            log_sink: config.log_sink.unwrap_or_else(|| Arc::new(ConsoleLogSink)),
            error_sink: config
                .error_sink
                .unwrap_or_else(|| Arc::new(ConsoleErrorSink)),
        }
    }

    pub fn log(&self, message: &str) {
        self.log_sink.log(message, &Value::Null);
    }

    pub fn log_with(&self, message: &str, context: Value) {
        self.log_sink.log(message, &context);
    }

    /// Hands `error` to the error sink and gives it back, so call sites can
    /// write `return Err(notifier.report(err))`.
    pub fn report(&self, error: BackupError) -> BackupError {
        self.error_sink.error(&error.to_string(), &error.context());
        error
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(NotifierConfig::default())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Captures every call so tests can assert on what was reported.
    #[derive(Default)]
    pub struct RecordingSink {
        pub calls: Mutex<Vec<(String, Value)>>,
    }

    impl RecordingSink {
        pub fn messages(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(m, _)| m.clone())
                .collect()
        }

        pub fn len(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl LogSink for RecordingSink {
        fn log(&self, message: &str, context: &Value) {
            self.calls
                .lock()
                .unwrap()
                .push((message.to_string(), context.clone()));
        }
    }

    impl ErrorSink for RecordingSink {
        fn error(&self, message: &str, context: &Value) {
            self.calls
                .lock()
                .unwrap()
                .push((message.to_string(), context.clone()));
        }
    }

    /// A notifier whose log and error channels record into separate sinks.
    pub fn recording_notifier() -> (Notifier, Arc<RecordingSink>, Arc<RecordingSink>) {
        let logs = Arc::new(RecordingSink::default());
        let errors = Arc::new(RecordingSink::default());
        let notifier = Notifier::new(NotifierConfig {
            log_sink: Some(logs.clone()),
            error_sink: Some(errors.clone()),
        });
        (notifier, logs, errors)
    }
}
