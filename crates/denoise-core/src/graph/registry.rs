//! Component registry - discovery and asynchronous instantiation
//!
//! Components are identified by a [`ComponentDescriptor`] made of three
//! four-character codes (type / subtype / manufacturer). The registry finds
//! matching [`ComponentHandle`]s and builds [`EffectNode`]s from them.
//!
//! Instantiation always returns an [`Instantiation`] task backed by a
//! oneshot channel. In-process requests complete immediately; out-of-process
//! requests build the node on an isolated worker thread where a panicking
//! component is contained and reported as `InstantiationFailed`.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;
use std::thread;

use tokio::sync::oneshot;

use crate::effect::{EffectNode, EffectResult, DENOISE_EFFECT_NAME};

use super::error::{GraphError, GraphResult};

/// Four-character code packed big-endian into a `u32`
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FourCC(pub u32);

impl FourCC {
    /// Matches any code when used in a descriptor query
    pub const ANY: FourCC = FourCC(0);

    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }

    pub fn bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    pub fn is_any(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.bytes();
        if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            for b in bytes {
                write!(f, "{}", b as char)?;
            }
            Ok(())
        } else {
            write!(f, "0x{:08X}", self.0)
        }
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self)
    }
}

impl FromStr for FourCC {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| format!("four-character code must be 4 bytes, got '{}'", s))?;
        if !bytes.iter().all(|b| b.is_ascii()) {
            return Err(format!("four-character code must be ASCII, got '{}'", s));
        }
        Ok(Self::from_bytes(bytes))
    }
}

/// Identity of a component: type, subtype and manufacturer codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentDescriptor {
    pub component_type: FourCC,
    pub subtype: FourCC,
    pub manufacturer: FourCC,
}

impl ComponentDescriptor {
    /// The bundled noise-suppression effect
    pub const DENOISE: ComponentDescriptor = ComponentDescriptor::new(
        FourCC::from_bytes(*b"aufx"),
        FourCC::from_bytes(*b"rnnz"),
        FourCC::from_bytes(*b"XIPH"),
    );

    pub const fn new(component_type: FourCC, subtype: FourCC, manufacturer: FourCC) -> Self {
        Self {
            component_type,
            subtype,
            manufacturer,
        }
    }

    /// Whether a registered descriptor satisfies this query
    ///
    /// [`FourCC::ANY`] fields in the query match every value.
    pub fn matches(&self, registered: &ComponentDescriptor) -> bool {
        let field = |query: FourCC, value: FourCC| query.is_any() || query == value;
        field(self.component_type, registered.component_type)
            && field(self.subtype, registered.subtype)
            && field(self.manufacturer, registered.manufacturer)
    }
}

impl fmt::Display for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.component_type, self.subtype, self.manufacturer
        )
    }
}

impl FromStr for ComponentDescriptor {
    type Err = String;

    /// Parse `type/subtype/manufacturer`, e.g. `aufx/rnnz/XIPH`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [component_type, subtype, manufacturer] => Ok(Self::new(
                component_type.parse()?,
                subtype.parse()?,
                manufacturer.parse()?,
            )),
            _ => Err(format!(
                "component descriptor must be 'type/subtype/manufacturer', got '{}'",
                s
            )),
        }
    }
}

/// A discovered component that can be instantiated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentHandle {
    /// Registry-local identifier
    pub id: u32,
    pub descriptor: ComponentDescriptor,
    pub name: String,
    pub version: u32,
}

/// How to instantiate a component
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstantiationOptions {
    /// Build on an isolated worker with panic containment
    pub out_of_process: bool,
}

/// Pending result of [`ComponentRegistry::instantiate`]
///
/// Completed on the control thread by polling or waiting; never touched by
/// the render thread.
pub struct Instantiation {
    component: String,
    receiver: oneshot::Receiver<GraphResult<EffectNode>>,
}

impl Instantiation {
    /// Create a task and the sender that completes it
    pub fn channel(component: impl Into<String>) -> (oneshot::Sender<GraphResult<EffectNode>>, Self) {
        let (sender, receiver) = oneshot::channel();
        (
            sender,
            Self {
                component: component.into(),
                receiver,
            },
        )
    }

    /// Task that is already complete
    pub fn ready(component: impl Into<String>, result: GraphResult<EffectNode>) -> Self {
        let (sender, task) = Self::channel(component);
        // Receiver is alive in `task`, so this cannot fail
        let _ = sender.send(result);
        task
    }

    /// Name of the component being built
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Non-blocking completion check
    ///
    /// `None` while the worker is still building. A worker that vanished
    /// without answering yields `InstantiationFailed`.
    pub fn try_complete(&mut self) -> Option<GraphResult<EffectNode>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(self.abandoned())),
        }
    }

    /// Block the calling (control) thread until the task completes
    pub fn wait(self) -> GraphResult<EffectNode> {
        let failure = self.abandoned();
        self.receiver.blocking_recv().unwrap_or(Err(failure))
    }

    fn abandoned(&self) -> GraphError {
        GraphError::InstantiationFailed {
            component: self.component.clone(),
            reason: "instantiation worker exited without a result".to_string(),
        }
    }
}

impl fmt::Debug for Instantiation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instantiation")
            .field("component", &self.component)
            .finish_non_exhaustive()
    }
}

/// Source of effect components
pub trait ComponentRegistry: Send + Sync {
    /// All registered components matching `descriptor`
    fn find(&self, descriptor: &ComponentDescriptor) -> Vec<ComponentHandle>;

    /// Start building a node for `handle`
    fn instantiate(&self, handle: &ComponentHandle, options: InstantiationOptions) -> Instantiation;
}

/// Constructor for a registered component
pub type ComponentFactory = Arc<dyn Fn(&ComponentHandle) -> EffectResult<EffectNode> + Send + Sync>;

struct Registration {
    handle: ComponentHandle,
    factory: ComponentFactory,
}

/// Registry of components compiled into the host
#[derive(Default)]
pub struct BundledRegistry {
    components: Vec<Registration>,
}

impl BundledRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the bundled denoiser
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            ComponentDescriptor::DENOISE,
            DENOISE_EFFECT_NAME,
            1,
            |_| EffectNode::denoiser(),
        );
        registry
    }

    /// Register a component; returns its handle
    pub fn register<F>(
        &mut self,
        descriptor: ComponentDescriptor,
        name: impl Into<String>,
        version: u32,
        factory: F,
    ) -> ComponentHandle
    where
        F: Fn(&ComponentHandle) -> EffectResult<EffectNode> + Send + Sync + 'static,
    {
        let handle = ComponentHandle {
            id: self.components.len() as u32,
            descriptor,
            name: name.into(),
            version,
        };
        log::debug!("Registered component '{}' ({})", handle.name, descriptor);
        self.components.push(Registration {
            handle: handle.clone(),
            factory: Arc::new(factory),
        });
        handle
    }

    /// Number of registered components
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    fn factory(&self, handle: &ComponentHandle) -> Option<ComponentFactory> {
        self.components
            .iter()
            .find(|r| r.handle.id == handle.id && r.handle.descriptor == handle.descriptor)
            .map(|r| r.factory.clone())
    }
}

impl ComponentRegistry for BundledRegistry {
    fn find(&self, descriptor: &ComponentDescriptor) -> Vec<ComponentHandle> {
        self.components
            .iter()
            .filter(|r| descriptor.matches(&r.handle.descriptor))
            .map(|r| r.handle.clone())
            .collect()
    }

    fn instantiate(&self, handle: &ComponentHandle, options: InstantiationOptions) -> Instantiation {
        let Some(factory) = self.factory(handle) else {
            return Instantiation::ready(
                handle.name.clone(),
                Err(GraphError::ComponentNotFound {
                    descriptor: handle.descriptor,
                }),
            );
        };

        if !options.out_of_process {
            return Instantiation::ready(handle.name.clone(), build(&factory, handle));
        }

        let (sender, task) = Instantiation::channel(handle.name.clone());
        let handle = handle.clone();
        let spawned = thread::Builder::new()
            .name("denoise-instantiate".to_string())
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| build(&factory, &handle)))
                    .unwrap_or_else(|payload| {
                        Err(GraphError::InstantiationFailed {
                            component: handle.name.clone(),
                            reason: format!("component panicked: {}", panic_message(&*payload)),
                        })
                    });
                if sender.send(result).is_err() {
                    log::debug!("Instantiation of '{}' abandoned by requester", handle.name);
                }
            });

        if let Err(e) = spawned {
            // The sender went down with the closure; the task reports the failure
            log::error!("Failed to spawn instantiation worker: {}", e);
        }
        task
    }
}

fn build(factory: &ComponentFactory, handle: &ComponentHandle) -> GraphResult<EffectNode> {
    factory(handle).map_err(|e| GraphError::InstantiationFailed {
        component: handle.name.clone(),
        reason: e.to_string(),
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_display_and_parse() {
        let code: FourCC = "rnnz".parse().unwrap();
        assert_eq!(code, FourCC::from_bytes(*b"rnnz"));
        assert_eq!(code.to_string(), "rnnz");
        assert!("toolong".parse::<FourCC>().is_err());
        assert_eq!(FourCC(1).to_string(), "0x00000001");
    }

    #[test]
    fn test_descriptor_parse_and_match() {
        let parsed: ComponentDescriptor = "aufx/rnnz/XIPH".parse().unwrap();
        assert_eq!(parsed, ComponentDescriptor::DENOISE);
        assert_eq!(parsed.to_string(), "aufx/rnnz/XIPH");
        assert!("aufx/rnnz".parse::<ComponentDescriptor>().is_err());

        let any_effect = ComponentDescriptor::new(
            FourCC::from_bytes(*b"aufx"),
            FourCC::ANY,
            FourCC::ANY,
        );
        assert!(any_effect.matches(&ComponentDescriptor::DENOISE));
        assert!(!ComponentDescriptor::DENOISE.matches(&any_effect));
    }

    #[test]
    fn test_builtin_in_process() {
        let registry = BundledRegistry::with_builtin();
        let handles = registry.find(&ComponentDescriptor::DENOISE);
        assert_eq!(handles.len(), 1);

        let mut task = registry.instantiate(&handles[0], InstantiationOptions::default());
        let node = task.try_complete().unwrap().unwrap();
        assert_eq!(node.name(), DENOISE_EFFECT_NAME);
    }

    #[test]
    fn test_out_of_process_completes() {
        let registry = BundledRegistry::with_builtin();
        let handle = registry.find(&ComponentDescriptor::DENOISE).remove(0);
        let task = registry.instantiate(
            &handle,
            InstantiationOptions {
                out_of_process: true,
            },
        );
        let node = task.wait().unwrap();
        assert_eq!(node.descriptor(), ComponentDescriptor::DENOISE);
    }

    #[test]
    fn test_panicking_factory_is_contained() {
        let mut registry = BundledRegistry::new();
        let handle = registry.register(ComponentDescriptor::DENOISE, "Broken", 1, |_| {
            panic!("model file missing")
        });
        let task = registry.instantiate(
            &handle,
            InstantiationOptions {
                out_of_process: true,
            },
        );
        match task.wait() {
            Err(GraphError::InstantiationFailed { component, reason }) => {
                assert_eq!(component, "Broken");
                assert!(reason.contains("model file missing"));
            }
            other => panic!("expected InstantiationFailed, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_unknown_handle() {
        let registry = BundledRegistry::new();
        let handle = ComponentHandle {
            id: 9,
            descriptor: ComponentDescriptor::DENOISE,
            name: "ghost".to_string(),
            version: 1,
        };
        let result = registry.instantiate(&handle, InstantiationOptions::default()).wait();
        assert!(matches!(result, Err(GraphError::ComponentNotFound { .. })));
    }
}
