//! GraphManager - discovery, instantiation and the effect slot lifecycle
//!
//! Main entry point for the control surface. It handles:
//! - Finding the effect component in the registry
//! - Instantiating it (optionally out of process) as a generation-tagged task
//! - Attaching the resulting node between the input and the mixer
//! - Detaching it again so audio passes through unprocessed
//!
//! # Staleness
//!
//! Every instantiation, attach and detach draws a fresh generation from a
//! monotonic counter. A completed instantiation is only attached when its
//! generation is newer than the last attach or detach, so a slow
//! instantiation can never replace a node the user asked for later.

use std::sync::Arc;

use crate::effect::{EffectError, EffectNode, EngineFault, ParameterStore, RenderStats};

use super::error::{GraphError, GraphResult};
use super::host::{AudioGraph, Endpoint, NodeId};
use super::registry::{
    ComponentDescriptor, ComponentHandle, ComponentRegistry, Instantiation, InstantiationOptions,
};

/// Control-side view of the node in the effect slot
#[derive(Debug, Clone)]
pub struct ActiveEffect {
    pub id: NodeId,
    pub name: String,
    pub descriptor: ComponentDescriptor,
    pub generation: u64,
    pub latency_samples: u32,
    parameters: Arc<ParameterStore>,
    stats: Arc<RenderStats>,
}

impl ActiveEffect {
    pub fn parameters(&self) -> &Arc<ParameterStore> {
        &self.parameters
    }

    pub fn stats(&self) -> &Arc<RenderStats> {
        &self.stats
    }
}

/// Instantiation task tagged with the generation it was requested in
#[derive(Debug)]
pub struct PendingInstantiation {
    pub generation: u64,
    pub component: ComponentHandle,
    task: Instantiation,
}

impl PendingInstantiation {
    /// Non-blocking completion check
    pub fn try_complete(&mut self) -> Option<CompletedInstantiation> {
        let result = self.task.try_complete()?;
        Some(CompletedInstantiation {
            generation: self.generation,
            component: self.component.clone(),
            result,
        })
    }

    /// Block the control thread until the task completes
    pub fn wait(self) -> CompletedInstantiation {
        CompletedInstantiation {
            generation: self.generation,
            component: self.component,
            result: self.task.wait(),
        }
    }
}

/// Finished instantiation, successful or not
#[derive(Debug)]
pub struct CompletedInstantiation {
    pub generation: u64,
    pub component: ComponentHandle,
    pub result: GraphResult<EffectNode>,
}

/// Result of [`GraphManager::attach_instantiated`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    Attached(NodeId),
    /// A newer attach or detach happened first; the node was discarded
    Stale { generation: u64, current: u64 },
}

/// Something the control surface should know about
#[derive(Debug)]
pub enum GraphEvent {
    /// A requested effect is now in the slot
    ///
    /// `deferred` is set when the swap is staged but still waiting for room
    /// in the command queue; [`GraphManager::poll`] publishes it later.
    Attached {
        generation: u64,
        node: NodeId,
        name: String,
        deferred: bool,
    },
    /// A completed instantiation was superseded and discarded
    Stale { generation: u64 },
    /// Instantiation or attach failed; passthrough keeps running
    Failed { generation: u64, error: GraphError },
    /// A previously queued commit reached the render side's queue
    Committed,
    /// The active node silenced buffers since the last poll
    EngineFailures {
        node: NodeId,
        new: u64,
        total: u64,
        last: Option<EngineFault>,
    },
}

/// Owns the graph's effect slot on behalf of the control thread
pub struct GraphManager {
    graph: Box<dyn AudioGraph>,
    registry: Arc<dyn ComponentRegistry>,
    active: Option<ActiveEffect>,
    next_generation: u64,
    /// Generation of the last attach or detach
    current_generation: u64,
    pending: Vec<PendingInstantiation>,
    /// Staged changes waiting for room in the command queue
    uncommitted: bool,
    reported_failures: u64,
}

impl GraphManager {
    pub fn new(graph: Box<dyn AudioGraph>, registry: Arc<dyn ComponentRegistry>) -> Self {
        Self {
            graph,
            registry,
            active: None,
            next_generation: 1,
            current_generation: 0,
            pending: Vec::new(),
            uncommitted: false,
            reported_failures: 0,
        }
    }

    fn fresh_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    /// Find the single component matching `descriptor`
    pub fn discover_effect_component(
        &self,
        descriptor: &ComponentDescriptor,
    ) -> GraphResult<ComponentHandle> {
        let mut handles = self.registry.find(descriptor);
        match handles.len() {
            0 => {
                log::warn!("No component registered for {}", descriptor);
                Err(GraphError::ComponentNotFound {
                    descriptor: *descriptor,
                })
            }
            1 => {
                let handle = handles.remove(0);
                log::info!(
                    "Discovered '{}' v{} for {}",
                    handle.name,
                    handle.version,
                    descriptor
                );
                Ok(handle)
            }
            count => {
                log::error!(
                    "{} components registered for {} - packaging defect",
                    count,
                    descriptor
                );
                Err(GraphError::AmbiguousComponent {
                    descriptor: *descriptor,
                    count,
                })
            }
        }
    }

    /// Start instantiating `handle`, tagged with a fresh generation
    pub fn instantiate(
        &mut self,
        handle: &ComponentHandle,
        out_of_process: bool,
    ) -> PendingInstantiation {
        let generation = self.fresh_generation();
        log::info!(
            "Instantiating '{}' (generation {}, {})",
            handle.name,
            generation,
            if out_of_process {
                "out of process"
            } else {
                "in process"
            }
        );
        let task = self
            .registry
            .instantiate(handle, InstantiationOptions { out_of_process });
        PendingInstantiation {
            generation,
            component: handle.clone(),
            task,
        }
    }

    /// Configure, allocate and install `node` in the effect slot
    ///
    /// Allocation failures leave the current node in place. A full command
    /// queue is not a failure: the swap stays staged, the node is active,
    /// and [`poll`](Self::poll) publishes it later.
    pub fn attach(&mut self, node: EffectNode) -> GraphResult<NodeId> {
        let generation = self.fresh_generation();
        self.attach_generation(node, generation)
    }

    /// Attach a completed instantiation unless something newer happened first
    pub fn attach_instantiated(
        &mut self,
        completed: CompletedInstantiation,
    ) -> GraphResult<AttachOutcome> {
        if completed.generation <= self.current_generation {
            log::info!(
                "Discarding stale instantiation of '{}' (generation {} <= {})",
                completed.component.name,
                completed.generation,
                self.current_generation
            );
            return Ok(AttachOutcome::Stale {
                generation: completed.generation,
                current: self.current_generation,
            });
        }
        let node = completed.result?;
        let id = self.attach_generation(node, completed.generation)?;
        Ok(AttachOutcome::Attached(id))
    }

    fn attach_generation(&mut self, mut node: EffectNode, generation: u64) -> GraphResult<NodeId> {
        let format = self.graph.input_format();

        node.deallocate_resources();
        node.set_input_format(format)?;
        node.set_output_format(format)?;
        let max_frames = self.graph.max_frames();
        if !node.set_maximum_frames(max_frames) {
            return Err(EffectError::ResourceAllocationFailed {
                effect: node.name().to_string(),
                reason: format!("cannot render {} frames per call", max_frames),
            }
            .into());
        }
        node.allocate_resources()?;

        let active = ActiveEffect {
            id: NodeId(0),
            name: node.name().to_string(),
            descriptor: node.descriptor(),
            generation,
            latency_samples: node.latency_samples(),
            parameters: node.parameters().clone(),
            stats: node.stats().clone(),
        };

        // One staged batch: old node out, new node between input and mixer
        self.graph.disconnect_input(Endpoint::Mixer);
        if let Some(old) = self.active.take() {
            self.graph.detach_node(old.id)?;
            log::info!("Detached '{}' ({})", old.name, old.id);
        }
        let id = self.graph.attach_node(node);
        self.graph.connect(Endpoint::Input, Endpoint::Node(id), format)?;
        self.graph.connect(Endpoint::Node(id), Endpoint::Mixer, format)?;

        self.active = Some(ActiveEffect { id, ..active });
        self.current_generation = generation;
        self.reported_failures = 0;
        self.commit_or_defer()?;

        log::info!("Attached effect {} (generation {})", id, generation);
        Ok(id)
    }

    /// Remove the effect and route input straight to the mixer
    ///
    /// Also supersedes in-flight instantiations. Returns whether a node was
    /// removed. Like [`attach`](Self::attach), a full command queue only
    /// defers publishing the change.
    pub fn detach(&mut self) -> GraphResult<bool> {
        self.current_generation = self.fresh_generation();
        let Some(active) = self.active.take() else {
            return Ok(false);
        };

        self.graph.disconnect_input(Endpoint::Mixer);
        self.graph.detach_node(active.id)?;
        let format = self.graph.input_format();
        self.graph.connect(Endpoint::Input, Endpoint::Mixer, format)?;
        self.commit_or_defer()?;

        log::info!("Detached '{}' ({}); passthrough", active.name, active.id);
        Ok(true)
    }

    fn commit_staged(&mut self) -> GraphResult<()> {
        match self.graph.commit() {
            Ok(()) => {
                self.uncommitted = false;
                Ok(())
            }
            Err(GraphError::CommandQueueFull) => {
                self.uncommitted = true;
                Err(GraphError::CommandQueueFull)
            }
            Err(e) => Err(e),
        }
    }

    /// Commit the staged batch, leaving it staged when the queue is full
    fn commit_or_defer(&mut self) -> GraphResult<()> {
        match self.commit_staged() {
            Err(GraphError::CommandQueueFull) => {
                log::warn!("Graph command queue full; change published on next poll");
                Ok(())
            }
            other => other,
        }
    }

    /// Discover and instantiate the component for `descriptor`
    ///
    /// The task stays pending until [`poll`](Self::poll) or
    /// [`wait_pending`](Self::wait_pending) attaches it. Returns its generation.
    pub fn request_effect(
        &mut self,
        descriptor: &ComponentDescriptor,
        out_of_process: bool,
    ) -> GraphResult<u64> {
        let handle = self.discover_effect_component(descriptor)?;
        let pending = self.instantiate(&handle, out_of_process);
        let generation = pending.generation;
        self.pending.push(pending);
        Ok(generation)
    }

    /// Complete finished instantiations and report render-side faults
    ///
    /// Call periodically from the control thread; never blocks.
    pub fn poll(&mut self) -> Vec<GraphEvent> {
        let mut events = Vec::new();

        if self.uncommitted && self.commit_staged().is_ok() {
            log::info!("Staged graph changes committed");
            events.push(GraphEvent::Committed);
        }

        for mut pending in std::mem::take(&mut self.pending) {
            match pending.try_complete() {
                Some(completed) => events.push(self.complete(completed)),
                None => self.pending.push(pending),
            }
        }

        if let Some(event) = self.check_engine_failures() {
            events.push(event);
        }
        events
    }

    /// Block until every pending instantiation completes
    pub fn wait_pending(&mut self) -> Vec<GraphEvent> {
        let mut events: Vec<GraphEvent> = std::mem::take(&mut self.pending)
            .into_iter()
            .map(PendingInstantiation::wait)
            .collect::<Vec<_>>()
            .into_iter()
            .map(|completed| self.complete(completed))
            .collect();
        if let Some(event) = self.check_engine_failures() {
            events.push(event);
        }
        events
    }

    fn complete(&mut self, completed: CompletedInstantiation) -> GraphEvent {
        let generation = completed.generation;
        match self.attach_instantiated(completed) {
            Ok(AttachOutcome::Attached(node)) => GraphEvent::Attached {
                generation,
                node,
                name: self
                    .active
                    .as_ref()
                    .map(|a| a.name.clone())
                    .unwrap_or_default(),
                deferred: self.uncommitted,
            },
            Ok(AttachOutcome::Stale { .. }) => GraphEvent::Stale { generation },
            Err(error) => {
                log::warn!("Effect generation {} failed: {}", generation, error);
                GraphEvent::Failed { generation, error }
            }
        }
    }

    fn check_engine_failures(&mut self) -> Option<GraphEvent> {
        let active = self.active.as_ref()?;
        let total = active.stats.failures();
        if total <= self.reported_failures {
            return None;
        }
        let new = total - self.reported_failures;
        self.reported_failures = total;
        let last = active.stats.last_fault();
        if let Some(fault) = last {
            let error = EffectError::EngineProcessingFailed {
                engine: active.name.clone(),
                fault,
            };
            log::warn!("{} ({} buffers silenced, {} total)", error, new, total);
        }
        Some(GraphEvent::EngineFailures {
            node: active.id,
            new,
            total,
            last,
        })
    }

    /// Node currently in the effect slot
    pub fn active(&self) -> Option<&ActiveEffect> {
        self.active.as_ref()
    }

    /// Parameters of the active node
    pub fn parameters(&self) -> Option<&Arc<ParameterStore>> {
        self.active.as_ref().map(|a| &a.parameters)
    }

    /// Whether an effect occupies the slot
    pub fn is_enabled(&self) -> bool {
        self.active.is_some()
    }

    pub fn graph(&self) -> &dyn AudioGraph {
        self.graph.as_ref()
    }

    /// Instantiations not yet completed that could still attach
    ///
    /// Tasks superseded by a later attach or detach are not counted; they are
    /// discarded as stale once they finish.
    pub fn pending_count(&self) -> usize {
        self.pending
            .iter()
            .filter(|p| p.generation > self.current_generation)
            .count()
    }

    /// Generation of the last attach or detach
    pub fn current_generation(&self) -> u64 {
        self.current_generation
    }

    /// Whether staged changes are waiting for queue space
    pub fn has_uncommitted_changes(&self) -> bool {
        self.uncommitted
    }
}
