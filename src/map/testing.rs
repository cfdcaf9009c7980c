//! In-memory renderer used by the map tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use super::options::{ContainerId, MapOptions, MapView};
use super::renderer::{Control, MapRenderer, Marker, RendererError, RendererFactory};

type Log = Arc<Mutex<Vec<String>>>;

struct FakeState {
    container: ContainerId,
    view: MapView,
    style: String,
    destroyed: bool,
    controls: HashSet<Control>,
    sources: HashMap<String, Value>,
    layers: Vec<String>,
    jumps: usize,
}

pub(crate) struct FakeRenderer {
    state: Mutex<FakeState>,
    log: Log,
}

impl FakeRenderer {
    fn new(options: &MapOptions, log: Log) -> Self {
        Self {
            state: Mutex::new(FakeState {
                container: options.container.clone(),
                view: options.view,
                style: options.style.clone(),
                destroyed: false,
                controls: HashSet::new(),
                sources: HashMap::new(),
                layers: Vec::new(),
                jumps: 0,
            }),
            log,
        }
    }

    pub(crate) fn jumps(&self) -> usize {
        self.state.lock().unwrap().jumps
    }

    pub(crate) fn style(&self) -> String {
        self.state.lock().unwrap().style.clone()
    }
}

#[async_trait]
impl MapRenderer for FakeRenderer {
    fn is_destroyed(&self) -> bool {
        self.state.lock().unwrap().destroyed
    }

    fn container(&self) -> ContainerId {
        self.state.lock().unwrap().container.clone()
    }

    fn set_container(&self, container: &ContainerId) {
        self.state.lock().unwrap().container = container.clone();
    }

    fn view(&self) -> MapView {
        self.state.lock().unwrap().view
    }

    fn jump_to(&self, view: MapView) {
        let mut state = self.state.lock().unwrap();
        state.view = view;
        state.jumps += 1;
    }

    fn set_style(&self, style: &str) {
        let mut state = self.state.lock().unwrap();
        state.style = style.to_string();
        state.sources.clear();
        state.layers.clear();
    }

    async fn style_loaded(&self) -> Result<(), RendererError> {
        tokio::task::yield_now().await;
        Ok(())
    }

    fn has_control(&self, control: Control) -> bool {
        self.state.lock().unwrap().controls.contains(&control)
    }

    fn add_control(&self, control: Control) {
        self.state.lock().unwrap().controls.insert(control);
    }

    fn has_source(&self, id: &str) -> bool {
        self.state.lock().unwrap().sources.contains_key(id)
    }

    fn add_source(&self, id: &str, source: Value) -> Result<(), RendererError> {
        let mut state = self.state.lock().unwrap();
        if state.sources.contains_key(id) {
            return Err(RendererError::new(format!("source `{id}` already exists")));
        }
        state.sources.insert(id.to_string(), source);
        Ok(())
    }

    fn has_layer(&self, id: &str) -> bool {
        self.state.lock().unwrap().layers.iter().any(|layer| layer == id)
    }

    fn add_layer(&self, layer: Value) -> Result<(), RendererError> {
        let id = layer
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| RendererError::new("layer without id"))?
            .to_string();
        let mut state = self.state.lock().unwrap();
        if state.layers.contains(&id) {
            return Err(RendererError::new(format!("layer `{id}` already exists")));
        }
        state.layers.push(id);
        Ok(())
    }

    fn destroy(&self) {
        let mut state = self.state.lock().unwrap();
        state.destroyed = true;
        self.log
            .lock()
            .unwrap()
            .push(format!("destroy:{}", state.style));
    }
}

#[derive(Default)]
pub(crate) struct FakeFactory {
    renderers: Mutex<Vec<Arc<FakeRenderer>>>,
    log: Log,
}

impl FakeFactory {
    pub(crate) fn created(&self) -> usize {
        self.renderers.lock().unwrap().len()
    }

    pub(crate) fn renderer(&self, index: usize) -> Arc<FakeRenderer> {
        Arc::clone(&self.renderers.lock().unwrap()[index])
    }

    pub(crate) fn log(&self) -> Log {
        Arc::clone(&self.log)
    }

    pub(crate) fn log_entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl RendererFactory for FakeFactory {
    fn create(&self, options: &MapOptions) -> Result<Arc<dyn MapRenderer>, RendererError> {
        let renderer = Arc::new(FakeRenderer::new(options, self.log()));
        self.renderers.lock().unwrap().push(Arc::clone(&renderer));
        Ok(renderer)
    }
}

pub(crate) struct FakeMarker {
    id: String,
    log: Log,
    removed: Arc<AtomicBool>,
}

impl FakeMarker {
    pub(crate) fn new(id: &str, log: Log, removed: Arc<AtomicBool>) -> Self {
        Self {
            id: id.to_string(),
            log,
            removed,
        }
    }
}

impl Marker for FakeMarker {
    fn id(&self) -> &str {
        &self.id
    }

    fn remove(&self) {
        self.removed.store(true, Ordering::SeqCst);
        self.log.lock().unwrap().push(format!("marker:{}", self.id));
    }
}
