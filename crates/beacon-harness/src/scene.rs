//! Scripted scenes.
//!
//! A scene is a component tree plus a publish script, written in TOML:
//!
//! ```toml
//! [[component]]
//! id = "menu"
//!
//! [[component.on]]
//! filter = "open(string)"
//! action = "reply"
//! value = "opened"
//!
//! [[component]]
//! id = "item"
//! parent = "menu"
//!
//! [[component.on]]
//! filter = "open"
//! action = "defer"
//! value = "loaded"
//! delay_ms = 5
//!
//! [[publish]]
//! channel = "open"
//! args = ["file"]
//! scope = "menu"
//! ```
//!
//! Components without a parent hang off the root. A parent must be declared
//! before its children.

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tenvis_beacon_core::{
    ArenaTree, Component, Deferred, DispatchConfig, DispatchError, Dispatcher, HandlerError,
    HandlerResult, NodeId, PublishEvent, Scope, Subscriptions, Value,
};
use tracing::{debug, info};

/// What a scripted handler does when invoked.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Return nothing.
    Record,
    /// Return a value synchronously.
    Reply { value: serde_json::Value },
    /// Fail synchronously, aborting the publish.
    Fail { message: String },
    /// Return a deferred resolved after a delay.
    Defer {
        value: serde_json::Value,
        #[serde(default)]
        delay_ms: u64,
    },
    /// Return a deferred rejected after a delay.
    Reject {
        message: String,
        #[serde(default)]
        delay_ms: u64,
    },
}

/// One subscription of a scripted component.
#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    pub filter: String,
    #[serde(flatten)]
    pub action: Action,
}

/// A component declaration.
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentSpec {
    pub id: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub on: Vec<Subscription>,
}

/// One publish in the script.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishStep {
    pub channel: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
    /// Component id whose subtree receives the publish. Global when absent.
    #[serde(default)]
    pub scope: Option<String>,
}

/// A full scene.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Scene {
    #[serde(default, rename = "component")]
    pub components: Vec<ComponentSpec>,
    /// Channels heard by direct listeners.
    #[serde(default)]
    pub listen: Vec<String>,
    #[serde(default)]
    pub publish: Vec<PublishStep>,
}

/// Shared log of fired handlers and listeners.
type FiredLog = Arc<Mutex<Vec<String>>>;

/// Component driven by its scene declaration.
struct Scripted {
    id: String,
    on: Vec<Subscription>,
    fired: FiredLog,
}

impl Scripted {
    fn handle(&self, index: usize, event: &PublishEvent, args: &[Value]) -> HandlerResult {
        let subscription = &self.on[index];
        self.fired.lock().push(format!(
            "{} <- {} ({} args)",
            self.id,
            subscription.filter,
            args.len()
        ));
        debug!(component = %self.id, channel = %event.channel, "Scripted handler invoked");

        match &subscription.action {
            Action::Record => Ok(().into()),
            Action::Reply { value } => Ok(Value::from(value.clone()).into()),
            Action::Fail { message } => Err(HandlerError::new(message.clone())),
            Action::Defer { value, delay_ms } => {
                let (deferred, resolver) = Deferred::new();
                let value = Value::from(value.clone());
                let delay = Duration::from_millis(*delay_ms);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    resolver.resolve(value);
                });
                Ok(deferred.into())
            }
            Action::Reject { message, delay_ms } => {
                let (deferred, resolver) = Deferred::new();
                let error = HandlerError::new(message.clone());
                let delay = Duration::from_millis(*delay_ms);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    resolver.reject(error);
                });
                Ok(deferred.into())
            }
        }
    }
}

impl Component for Scripted {
    fn subscriptions(&self) -> Subscriptions<Self> {
        self.on
            .iter()
            .enumerate()
            .fold(Subscriptions::new(), |subs, (index, subscription)| {
                subs.on(
                    subscription.filter.clone(),
                    move |this: &Self, event: &PublishEvent, args: &[Value]| {
                        this.handle(index, event, args)
                    },
                )
            })
    }
}

/// How a publish step ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Every completion resolved, in handler order.
    Resolved(Vec<serde_json::Value>),
    /// A handler failed synchronously.
    Aborted(String),
    /// A deferred completion failed.
    Rejected(String),
}

/// Result of one publish step.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub channel: String,
    pub scope: Option<String>,
    pub fired: Vec<String>,
    pub outcome: Outcome,
}

/// Result of a scene run.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub steps: Vec<StepReport>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            let scope = step.scope.as_deref().unwrap_or("<global>");
            writeln!(f, "#{} {} @ {}", i + 1, step.channel, scope)?;
            for fired in &step.fired {
                writeln!(f, "    {fired}")?;
            }
            match &step.outcome {
                Outcome::Resolved(values) => {
                    let values = serde_json::Value::Array(values.clone());
                    writeln!(f, "    => resolved {values}")?;
                }
                Outcome::Aborted(error) => writeln!(f, "    => aborted: {error}")?,
                Outcome::Rejected(error) => writeln!(f, "    => rejected: {error}")?,
            }
        }
        Ok(())
    }
}

impl Scene {
    /// Load a scene from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scene file: {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Failed to parse scene file: {}", path.display()))
    }

    /// Parse a scene from TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Build the tree, attach every component and run the publish script.
    ///
    /// # Errors
    ///
    /// Returns an error if the dispatcher configuration is invalid or the
    /// scene references an undeclared component.
    pub async fn run(&self, config: &DispatchConfig) -> Result<Report> {
        let dispatcher = Dispatcher::with_config(ArenaTree::new(), config.clone())?;
        let root = dispatcher.with_tree(|tree| tree.root());
        let fired: FiredLog = Arc::default();

        let mut nodes: HashMap<&str, NodeId> = HashMap::new();
        let mut instances = Vec::with_capacity(self.components.len());
        for spec in &self.components {
            if nodes.contains_key(spec.id.as_str()) {
                bail!("Duplicate component id '{}'", spec.id);
            }
            let parent = match &spec.parent {
                Some(parent) => *nodes.get(parent.as_str()).with_context(|| {
                    format!("Component '{}' has undeclared parent '{parent}'", spec.id)
                })?,
                None => root,
            };

            let node = dispatcher.with_tree_mut(|tree| tree.append_child(parent))?;
            let instance = Arc::new(Scripted {
                id: spec.id.clone(),
                on: spec.on.clone(),
                fired: Arc::clone(&fired),
            });
            dispatcher.attach(&instance, node)?;
            nodes.insert(spec.id.as_str(), node);
            instances.push(instance);
        }

        for channel in &self.listen {
            let log = Arc::clone(&fired);
            dispatcher.on(channel.clone(), move |event: &PublishEvent, args: &[Value]| {
                log.lock()
                    .push(format!("listener <- {} ({} args)", event.channel, args.len()));
            });
        }

        let stats = dispatcher.stats();
        info!(
            components = stats.attached,
            subscribers = stats.subscribers,
            listeners = stats.listeners,
            "Scene ready"
        );

        let mut report = Report::default();
        for step in &self.publish {
            let scope = match &step.scope {
                Some(id) => Scope::Subtree(
                    *nodes
                        .get(id.as_str())
                        .with_context(|| format!("Publish scoped to undeclared component '{id}'"))?,
                ),
                None => Scope::Global,
            };
            let args = step.args.iter().cloned().map(Value::from).collect();

            let outcome = match dispatcher.publish_scoped(scope, &step.channel, args) {
                Ok(all) => match all.await {
                    Ok(values) => Outcome::Resolved(values.iter().map(Value::to_json).collect()),
                    Err(err) => Outcome::Rejected(err.to_string()),
                },
                Err(err @ DispatchError::Handler { .. }) => Outcome::Aborted(err.to_string()),
                Err(err) => return Err(err.into()),
            };

            report.steps.push(StepReport {
                channel: step.channel.clone(),
                scope: step.scope.clone(),
                fired: std::mem::take(&mut *fired.lock()),
                outcome,
            });
        }

        drop(instances);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MENU: &str = r#"
        listen = ["open"]

        [[component]]
        id = "menu"

        [[component.on]]
        filter = "open(string)"
        action = "reply"
        value = "opened"

        [[component]]
        id = "item"
        parent = "menu"

        [[component.on]]
        filter = "open"
        action = "defer"
        value = "loaded"

        [[component]]
        id = "footer"

        [[component.on]]
        filter = "open"
        action = "record"

        [[publish]]
        channel = "open"
        args = ["file"]
        scope = "menu"

        [[publish]]
        channel = "open"
        args = [1]
    "#;

    #[test]
    fn test_parse_scene() {
        let scene = Scene::parse(MENU).unwrap();
        assert_eq!(scene.components.len(), 3);
        assert_eq!(scene.components[1].parent.as_deref(), Some("menu"));
        assert!(matches!(
            scene.components[1].on[0].action,
            Action::Defer { delay_ms: 0, .. }
        ));
        assert_eq!(scene.publish[0].args, vec![json!("file")]);
        assert_eq!(scene.listen, vec!["open"]);
    }

    #[tokio::test]
    async fn test_run_scoped_and_global() {
        let scene = Scene::parse(MENU).unwrap();
        let report = scene.run(&DispatchConfig::default()).await.unwrap();

        let scoped = &report.steps[0];
        assert_eq!(
            scoped.fired,
            vec!["menu <- open(string) (1 args)", "item <- open (1 args)"]
        );
        assert_eq!(
            scoped.outcome,
            Outcome::Resolved(vec![json!("opened"), json!("loaded")])
        );

        let global = &report.steps[1];
        assert_eq!(
            global.fired,
            vec![
                "item <- open (1 args)",
                "footer <- open (1 args)",
                "listener <- open (1 args)",
            ]
        );
        assert_eq!(
            global.outcome,
            Outcome::Resolved(vec![json!("loaded"), serde_json::Value::Null])
        );
    }

    #[tokio::test]
    async fn test_run_failures() {
        let scene = Scene::parse(
            r#"
            [[component]]
            id = "a"

            [[component.on]]
            filter = "save"
            action = "fail"
            message = "disk full"

            [[component.on]]
            filter = "load"
            action = "reject"
            message = "timeout"
            delay_ms = 1

            [[publish]]
            channel = "save"

            [[publish]]
            channel = "load"
            "#,
        )
        .unwrap();

        let report = scene.run(&DispatchConfig::default()).await.unwrap();
        assert!(matches!(&report.steps[0].outcome, Outcome::Aborted(e) if e.contains("disk full")));
        assert!(matches!(&report.steps[1].outcome, Outcome::Rejected(e) if e.contains("timeout")));
    }

    #[tokio::test]
    async fn test_undeclared_parent() {
        let scene = Scene::parse(
            r#"
            [[component]]
            id = "child"
            parent = "missing"
            "#,
        )
        .unwrap();
        let err = scene.run(&DispatchConfig::default()).await.unwrap_err();
        assert!(err.to_string().contains("undeclared parent"));
    }

    #[tokio::test]
    async fn test_invalid_marker() {
        let config = DispatchConfig {
            marker: "has space".to_string(),
            ..DispatchConfig::default()
        };
        assert!(Scene::default().run(&config).await.is_err());
    }

    #[test]
    fn test_report_display() {
        let report = Report {
            steps: vec![StepReport {
                channel: "ping".to_string(),
                scope: None,
                fired: vec!["a <- ping (0 args)".to_string()],
                outcome: Outcome::Resolved(vec![serde_json::Value::Null]),
            }],
        };
        assert_eq!(
            report.to_string(),
            "#1 ping @ <global>\n    a <- ping (0 args)\n    => resolved [null]\n"
        );
    }
}
