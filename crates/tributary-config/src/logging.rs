//! Logging configuration for the managed components.
//!
//! Logging configs are Java properties files. Order is preserved so that the
//! generated text is stable across passes.

use tributary_core::spec::{ComponentKind, Logging};

pub const MONITOR_INTERVAL_KEY: &str = "monitorInterval";
pub const DEFAULT_MONITOR_INTERVAL: &str = "30";

/// Java properties with insertion order preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedProperties {
    entries: Vec<(String, String)>,
}

impl OrderedProperties {
    /// Parse properties text. Blank lines and `#`/`!` comments are skipped;
    /// a repeated key keeps its first position and takes the last value.
    pub fn parse(text: &str) -> Self {
        let mut props = Self::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let split = line.find(['=', ':']);
            let (key, value) = match split {
                Some(idx) => (line[..idx].trim(), line[idx + 1..].trim()),
                None => (line, ""),
            };
            props.insert(key, value);
        }
        props
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Replace in place, or append.
    pub fn insert(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }

    /// Append only if the key is not set yet.
    pub fn insert_if_absent(&mut self, key: &str, value: &str) {
        if !self.contains_key(key) {
            self.entries.push((key.to_string(), value.to_string()));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }
}

const LOG4J2_DEFAULTS: &str = "\
name=TributaryConfig
appender.console.type=Console
appender.console.name=STDOUT
appender.console.layout.type=PatternLayout
appender.console.layout.pattern=%d{yyyy-MM-dd HH:mm:ss} %-5p %c{1}:%L - %m%n
rootLogger.level=INFO
rootLogger.appenderRefs=console
rootLogger.appenderRef.console.ref=STDOUT
";

const LOG4J_DEFAULTS: &str = "\
log4j.rootLogger=INFO, CONSOLE
log4j.appender.CONSOLE=org.apache.log4j.ConsoleAppender
log4j.appender.CONSOLE.layout=org.apache.log4j.PatternLayout
log4j.appender.CONSOLE.layout.ConversionPattern=%d{ISO8601} %p %m (%c) [%t]%n
";

/// Default logging properties of a component.
pub fn default_logging(kind: ComponentKind) -> OrderedProperties {
    match kind {
        ComponentKind::Mirror => OrderedProperties::parse(LOG4J_DEFAULTS),
        _ => OrderedProperties::parse(LOG4J2_DEFAULTS),
    }
}

/// Key of the logging file in the component's config map.
pub fn logging_config_key(kind: ComponentKind) -> &'static str {
    match kind {
        ComponentKind::Mirror => "log4j.properties",
        _ => "log4j2.properties",
    }
}

/// Generate the logging configuration text of a component.
///
/// Inline loggers are layered over the defaults; external text replaces them.
/// `monitorInterval` is appended when absent and never overwritten.
pub fn logging_config(kind: ComponentKind, logging: Option<&Logging>) -> String {
    let mut props = match logging {
        None => default_logging(kind),
        Some(Logging::Inline { loggers }) => {
            let mut props = default_logging(kind);
            for (key, value) in loggers {
                props.insert(key, value);
            }
            props
        }
        Some(Logging::External { properties }) => OrderedProperties::parse(properties),
    };
    props.insert_if_absent(MONITOR_INTERVAL_KEY, DEFAULT_MONITOR_INTERVAL);
    props.render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_parse_preserves_order() {
        let props = OrderedProperties::parse("# comment\nb = 2\na:1\n\nb=3\n");
        assert_eq!(props.render(), "b=3\na=1\n");
    }

    #[test]
    fn test_monitor_interval_appended() {
        let text = logging_config(ComponentKind::Bridge, None);
        assert!(text.ends_with("monitorInterval=30\n"));
    }

    #[test]
    fn test_user_monitor_interval_kept() {
        let logging = Logging::External {
            properties: "monitorInterval=5\nrootLogger.level=DEBUG\n".into(),
        };
        let text = logging_config(ComponentKind::Balancer, Some(&logging));
        assert_eq!(text, "monitorInterval=5\nrootLogger.level=DEBUG\n");
    }

    #[test]
    fn test_inline_loggers_override_defaults() {
        let mut loggers = BTreeMap::new();
        loggers.insert("rootLogger.level".to_string(), "WARN".to_string());
        let text = logging_config(
            ComponentKind::Balancer,
            Some(&Logging::Inline { loggers }),
        );
        let props = OrderedProperties::parse(&text);
        assert_eq!(props.get("rootLogger.level"), Some("WARN"));
        assert_eq!(props.get(MONITOR_INTERVAL_KEY), Some("30"));
    }
}
