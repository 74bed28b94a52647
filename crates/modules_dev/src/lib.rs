//! Developer menu module.
//!
//! Exposes the dev menu items of a running experience to the runtime and
//! applies the toggles the user picks from it.

use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use bridge::{
    Arguments, HostError, InvocationContext, MethodSpec, ModuleDescriptor, ModuleProvider,
    NativeCapability, ValueKind,
};
use serde_json::{Map, Value, json};

pub const IMPLEMENTATION: &str = "DevMenu";

const INSPECTOR: &str = "dev-inspector";
const REMOTE_DEBUG: &str = "dev-remote-debug";
const HMR: &str = "dev-hmr";
const PERF_MONITOR: &str = "dev-perf-monitor";

/// Registers the dev menu constructor under [`IMPLEMENTATION`].
pub fn register(provider: &mut ModuleProvider) {
    provider.register(IMPLEMENTATION, |descriptor| {
        let menu = DevMenuModule::from_descriptor(descriptor)?;
        Ok(Box::new(DevMenuCapability(Arc::new(menu))) as Box<dyn NativeCapability>)
    });
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DevSettings {
    pub element_inspector: bool,
    pub remote_debug: bool,
    pub hot_module_replacement: bool,
    pub perf_monitor: bool,
}

#[derive(Debug)]
pub struct DevMenuModule {
    manifest_url: String,
    manifest: Option<Map<String, Value>>,
    settings: Mutex<DevSettings>,
}

impl DevMenuModule {
    pub fn new(manifest_url: impl Into<String>, manifest: Option<Map<String, Value>>) -> Self {
        Self {
            manifest_url: manifest_url.into(),
            manifest,
            settings: Mutex::new(DevSettings::default()),
        }
    }

    /// Reads `{ manifestUrl?, manifest? }` from the descriptor config.
    pub fn from_descriptor(descriptor: &ModuleDescriptor) -> anyhow::Result<Self> {
        let config = match descriptor.config() {
            Value::Null => return Ok(Self::new("", None)),
            Value::Object(config) => config,
            other => {
                return Err(HostError::new("dev menu config must be an object")
                    .with_context("config", other)
                    .into());
            }
        };

        let manifest_url = match config.get("manifestUrl") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(url)) => url.clone(),
            Some(other) => {
                return Err(HostError::new("manifestUrl must be a string")
                    .with_context("manifestUrl", other)
                    .into());
            }
        };

        let manifest = match config.get("manifest") {
            None | Some(Value::Null) => None,
            Some(Value::Object(manifest)) => Some(manifest.clone()),
            Some(_) => return Err(HostError::new("manifest must be an object").into()),
        };

        Ok(Self::new(manifest_url, manifest))
    }

    pub fn manifest_url(&self) -> &str {
        &self.manifest_url
    }

    /// Dev tools are available when the manifest names a developer tool.
    pub fn is_dev_support_enabled(&self) -> bool {
        self.manifest
            .as_ref()
            .and_then(|manifest| manifest.get("developer"))
            .and_then(|developer| developer.get("tool"))
            .is_some_and(|tool| !tool.is_null())
    }

    pub fn settings(&self) -> anyhow::Result<DevSettings> {
        self.settings
            .lock()
            .map(|settings| *settings)
            .map_err(|_| anyhow!("dev settings lock poisoned"))
    }

    fn initial_props(&self) -> Value {
        json!({
            "task": {
                "manifestUrl": self.manifest_url,
                "manifest": self.manifest.clone().map(Value::Object).unwrap_or(Value::Null),
            },
            "uuid": nanoid::nanoid!(),
        })
    }

    fn menu_items(&self) -> anyhow::Result<Value> {
        let settings = self.settings()?;
        let mut items = Map::new();

        if !self.is_dev_support_enabled() {
            items.insert(INSPECTOR.into(), unavailable("Element Inspector Unavailable"));
            items.insert(REMOTE_DEBUG.into(), unavailable("Remote Debugger Unavailable"));
            let mut hmr = unavailable("Fast Refresh Unavailable");
            hmr["detail"] = json!(
                "Use the Reload button above to reload when in production mode. \
                 Switch back to development mode to use Fast Refresh."
            );
            items.insert(HMR.into(), hmr);
            items.insert(PERF_MONITOR.into(), unavailable("Performance Monitor Unavailable"));
            return Ok(Value::Object(items));
        }

        let toggle = |enabled: bool, on: &str, off: &str| {
            let label = if enabled { on } else { off };
            json!({ "label": label, "isEnabled": true })
        };
        items.insert(
            INSPECTOR.into(),
            toggle(
                settings.element_inspector,
                "Hide Element Inspector",
                "Show Element Inspector",
            ),
        );
        items.insert(
            REMOTE_DEBUG.into(),
            toggle(settings.remote_debug, "Stop Remote Debugging", "Debug Remote JS"),
        );
        items.insert(
            HMR.into(),
            toggle(
                settings.hot_module_replacement,
                "Disable Fast Refresh",
                "Enable Fast Refresh",
            ),
        );
        items.insert(
            PERF_MONITOR.into(),
            toggle(
                settings.perf_monitor,
                "Hide Performance Monitor",
                "Show Performance Monitor",
            ),
        );
        Ok(Value::Object(items))
    }

    fn select_item(&self, ctx: &InvocationContext<'_>, key: &str) -> anyhow::Result<()> {
        if !self.is_dev_support_enabled() {
            tracing::debug!("dev support disabled, ignoring menu item {}", key);
            return Ok(());
        }

        let settings = {
            let mut settings = self
                .settings
                .lock()
                .map_err(|_| anyhow!("dev settings lock poisoned"))?;
            match key {
                INSPECTOR => settings.element_inspector = !settings.element_inspector,
                REMOTE_DEBUG => settings.remote_debug = !settings.remote_debug,
                HMR => settings.hot_module_replacement = !settings.hot_module_replacement,
                PERF_MONITOR => settings.perf_monitor = !settings.perf_monitor,
                _ => {
                    tracing::debug!("unknown dev menu item {}", key);
                    return Ok(());
                }
            }
            *settings
        };

        match key {
            REMOTE_DEBUG => ctx.request_reload("remote debugging toggled"),
            HMR => ctx.emit(
                "hotModuleReplacementChanged",
                json!({ "enabled": settings.hot_module_replacement }),
            ),
            INSPECTOR => ctx.emit(
                "elementInspectorChanged",
                json!({ "enabled": settings.element_inspector }),
            ),
            _ => ctx.emit(
                "perfMonitorChanged",
                json!({ "enabled": settings.perf_monitor }),
            ),
        }
    }
}

fn unavailable(label: &str) -> Value {
    json!({ "label": label, "isEnabled": false })
}

/// Runtime-facing wrapper. Each declared method holds its own reference to
/// the shared menu state.
struct DevMenuCapability(Arc<DevMenuModule>);

impl DevMenuCapability {
    fn bind<F>(
        &self,
        handler: F,
    ) -> impl Fn(&InvocationContext<'_>, Arguments) -> anyhow::Result<Value> + Send + Sync + use<F>
    where
        F: Fn(&DevMenuModule, &InvocationContext<'_>, Arguments) -> anyhow::Result<Value>
            + Send
            + Sync
            + 'static,
    {
        let menu = Arc::clone(&self.0);
        move |ctx: &InvocationContext<'_>, args: Arguments| handler(&menu, ctx, args)
    }
}

impl NativeCapability for DevMenuCapability {
    fn methods(&self) -> Vec<MethodSpec> {
        vec![
            MethodSpec::sync(
                "getManifestUrl",
                self.bind(|menu, _, _| Ok(json!(menu.manifest_url))),
            )
            .returns(ValueKind::String),
            MethodSpec::sync(
                "getInitialProps",
                self.bind(|menu, _, _| Ok(menu.initial_props())),
            )
            .returns(ValueKind::Object),
            MethodSpec::sync("getMenuItems", self.bind(|menu, _, _| menu.menu_items()))
                .returns(ValueKind::Object),
            MethodSpec::asynchronous(
                "selectItemWithKey",
                self.bind(|menu, ctx, args| {
                    menu.select_item(ctx, args.string(0)?)?;
                    Ok(Value::Null)
                }),
            )
            .param("itemKey", ValueKind::String),
            MethodSpec::asynchronous(
                "reloadApp",
                self.bind(|_, ctx, _| {
                    ctx.request_reload("reload requested from dev menu")?;
                    Ok(Value::Null)
                }),
            ),
            MethodSpec::sync(
                "isDevSupportEnabled",
                self.bind(|menu, _, _| Ok(json!(menu.is_dev_support_enabled()))),
            )
            .returns(ValueKind::Bool),
        ]
    }

    fn constants(&self) -> Map<String, Value> {
        let mut constants = Map::new();
        constants.insert("manifestUrl".into(), json!(self.0.manifest_url));
        constants
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge::error::METHOD_NOT_FOUND;
    use bridge::{BridgeSession, Runtime, RuntimeMessage};

    #[derive(Default)]
    struct Recorder {
        messages: Mutex<Vec<RuntimeMessage>>,
    }

    impl Runtime for Recorder {
        fn post(&self, message: RuntimeMessage) -> anyhow::Result<()> {
            self.messages
                .lock()
                .map_err(|_| anyhow!("recorder poisoned"))?
                .push(message);
            Ok(())
        }
    }

    fn start_session(config: Value) -> (Arc<Recorder>, BridgeSession) {
        let mut provider = ModuleProvider::new();
        register(&mut provider);
        let runtime = Arc::new(Recorder::default());
        let descriptors = [ModuleDescriptor::new("ExpoDevMenu")
            .with_implementation(IMPLEMENTATION)
            .with_config(config)];
        let session = BridgeSession::start(runtime.clone(), &descriptors, &provider);
        (runtime, session)
    }

    fn dev_config() -> Value {
        json!({
            "manifestUrl": "https://exp.host/@demo/app",
            "manifest": { "developer": { "tool": "expo-cli" } },
        })
    }

    #[test]
    fn reports_manifest_url_and_support() {
        let (_runtime, session) = start_session(dev_config());
        assert_eq!(
            session.invoke("ExpoDevMenu", "getManifestUrl", vec![]),
            Ok(json!("https://exp.host/@demo/app"))
        );
        assert_eq!(
            session.invoke("ExpoDevMenu", "isDevSupportEnabled", vec![]),
            Ok(json!(true))
        );

        let (_runtime, session) =
            start_session(json!({ "manifest": { "developer": { "tool": null } } }));
        assert_eq!(
            session.invoke("ExpoDevMenu", "isDevSupportEnabled", vec![]),
            Ok(json!(false))
        );
        assert_eq!(
            session.invoke("ExpoDevMenu", "getManifestUrl", vec![]),
            Ok(json!(""))
        );
    }

    #[test]
    fn initial_props_carry_manifest_and_fresh_id() {
        let (_runtime, session) = start_session(dev_config());
        let first = session
            .invoke("ExpoDevMenu", "getInitialProps", vec![])
            .expect("props");
        let second = session
            .invoke("ExpoDevMenu", "getInitialProps", vec![])
            .expect("props");

        assert_eq!(first["task"]["manifestUrl"], json!("https://exp.host/@demo/app"));
        assert_eq!(first["task"]["manifest"]["developer"]["tool"], json!("expo-cli"));
        assert!(first["uuid"].as_str().is_some_and(|id| !id.is_empty()));
        assert_ne!(first["uuid"], second["uuid"]);
    }

    #[test]
    fn menu_items_without_dev_support_are_disabled() {
        let (_runtime, session) = start_session(Value::Null);
        let items = session
            .invoke("ExpoDevMenu", "getMenuItems", vec![])
            .expect("items");

        for key in [INSPECTOR, REMOTE_DEBUG, HMR, PERF_MONITOR] {
            assert_eq!(items[key]["isEnabled"], json!(false), "{}", key);
        }
        assert!(items[HMR]["detail"].is_string());
    }

    #[test]
    fn selecting_items_toggles_and_notifies() {
        let (runtime, session) = start_session(dev_config());

        session
            .invoke("ExpoDevMenu", "selectItemWithKey", vec![json!(HMR)])
            .expect("toggle hmr");
        session
            .invoke("ExpoDevMenu", "selectItemWithKey", vec![json!(REMOTE_DEBUG)])
            .expect("toggle debugger");
        session
            .invoke("ExpoDevMenu", "selectItemWithKey", vec![json!("dev-unknown")])
            .expect("unknown keys are ignored");

        let items = session
            .invoke("ExpoDevMenu", "getMenuItems", vec![])
            .expect("items");
        assert_eq!(items[HMR]["label"], json!("Disable Fast Refresh"));
        assert_eq!(items[REMOTE_DEBUG]["label"], json!("Stop Remote Debugging"));
        assert_eq!(items[INSPECTOR]["label"], json!("Show Element Inspector"));

        let messages = runtime.messages.lock().expect("lock").clone();
        assert_eq!(
            messages,
            vec![
                RuntimeMessage::Event {
                    module: "ExpoDevMenu".to_string(),
                    name: "hotModuleReplacementChanged".to_string(),
                    body: json!({ "enabled": true }),
                },
                RuntimeMessage::Reload {
                    reason: "remote debugging toggled".to_string(),
                },
            ]
        );
    }

    #[test]
    fn selection_is_ignored_without_dev_support() {
        let (runtime, session) = start_session(Value::Null);
        session
            .invoke("ExpoDevMenu", "selectItemWithKey", vec![json!(PERF_MONITOR)])
            .expect("no-op");
        assert!(runtime.messages.lock().expect("lock").is_empty());
    }

    #[test]
    fn reload_posts_to_runtime() {
        let (runtime, session) = start_session(Value::Null);
        session
            .invoke("ExpoDevMenu", "reloadApp", vec![])
            .expect("reload");
        assert!(matches!(
            runtime.messages.lock().expect("lock").as_slice(),
            [RuntimeMessage::Reload { .. }]
        ));
    }

    #[test]
    fn invalid_config_fails_construction() {
        let (_runtime, session) = start_session(json!({ "manifestUrl": 5 }));
        let failure = session.failures().next().expect("construction failure");
        assert_eq!(failure.name, "ExpoDevMenu");
        assert_eq!(failure.error.message(), "manifestUrl must be a string");
        assert_eq!(failure.error.context().get("manifestUrl"), Some(&json!(5)));

        let (_runtime, session) = start_session(json!("not an object"));
        assert_eq!(session.failures().count(), 1);
        assert!(session.module("ExpoDevMenu").is_none());
    }

    #[test]
    fn exposes_manifest_url_constant() {
        let (_runtime, session) = start_session(dev_config());
        let module = session.module("ExpoDevMenu").expect("module");
        assert_eq!(
            module.constants().get("manifestUrl"),
            Some(&json!("https://exp.host/@demo/app"))
        );
    }

    #[test]
    fn register_adds_the_dev_menu_constructor() {
        let mut provider = ModuleProvider::new();
        assert!(!provider.contains(IMPLEMENTATION));
        register(&mut provider);
        assert!(provider.contains(IMPLEMENTATION));
    }

    #[test]
    fn only_declared_methods_are_callable() {
        let (_runtime, session) = start_session(dev_config());
        let names: Vec<_> = session.describe_modules()[0]
            .methods
            .iter()
            .map(|method| method.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "getManifestUrl",
                "getInitialProps",
                "getMenuItems",
                "selectItemWithKey",
                "reloadApp",
                "isDevSupportEnabled",
            ]
        );

        let err = session
            .invoke("ExpoDevMenu", "openDevTools", vec![])
            .expect_err("undeclared method");
        assert_eq!(err.code(), METHOD_NOT_FOUND);
    }
}
