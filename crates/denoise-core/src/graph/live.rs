//! Live audio graph split into a control half and a render half
//!
//! [`LiveGraph`] implements [`AudioGraph`]: it owns freshly attached nodes,
//! stages connections and validates them on commit. [`GraphRenderer`] runs
//! inside the audio callback, drains committed commands at the top of each
//! buffer and renders the current route.
//!
//! ```text
//!  control thread                     render thread
//!  ──────────────                     ─────────────
//!  attach / connect / detach
//!  commit ──▶ GraphCommand ──rtrb──▶ process(): drain, then render
//!                                     retired node ──▶ basedrop collector
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use basedrop::Owned;

use crate::effect::{EffectNode, RenderStatus};
use crate::types::{AudioBuffer, RenderTimestamp, StreamFormat};

use super::command::{command_channel, GraphCommand, Route, SlotChange};
use super::error::{GraphError, GraphResult};
use super::gc::gc_handle;
use super::host::{AudioGraph, Connection, Endpoint, NodeId};

/// Counters published by the render half
#[derive(Debug, Default)]
pub struct GraphAtomics {
    commits_applied: AtomicU64,
    route: AtomicU64,
}

impl GraphAtomics {
    /// Number of commits the render half has applied
    pub fn commits_applied(&self) -> u64 {
        self.commits_applied.load(Ordering::Acquire)
    }

    /// Route the render half is currently following
    pub fn route(&self) -> Route {
        Route::decode(self.route.load(Ordering::Acquire))
    }

    /// Node currently rendering in the effect slot
    pub fn active_node(&self) -> Option<NodeId> {
        match self.route() {
            Route::Effect(id) => Some(id),
            _ => None,
        }
    }
}

/// Control-side facts about an attached node
#[derive(Debug, Clone, Copy)]
struct NodeInfo {
    input_format: StreamFormat,
    output_format: StreamFormat,
    max_frames: usize,
    allocated: bool,
}

/// Control half of the live graph
pub struct LiveGraph {
    input_format: StreamFormat,
    output_format: StreamFormat,
    max_frames: usize,
    next_id: u64,
    /// Attached nodes not yet handed to the render half
    staged: HashMap<NodeId, EffectNode>,
    info: HashMap<NodeId, NodeInfo>,
    attached: BTreeSet<NodeId>,
    connections: Vec<Connection>,
    /// Node owned by the render half after the last commit
    installed: Option<NodeId>,
    committed_route: Route,
    commits_pushed: u64,
    commands: rtrb::Producer<GraphCommand>,
    gc: basedrop::Handle,
    atomics: Arc<GraphAtomics>,
}

impl LiveGraph {
    /// Create both halves; initial topology is input → mixer
    pub fn new(
        input_format: StreamFormat,
        output_format: StreamFormat,
        max_frames: usize,
    ) -> (LiveGraph, GraphRenderer) {
        let (producer, consumer) = command_channel();
        let atomics = Arc::new(GraphAtomics::default());
        atomics
            .route
            .store(Route::Passthrough.encode(), Ordering::Release);

        let graph = LiveGraph {
            input_format,
            output_format,
            max_frames,
            next_id: 1,
            staged: HashMap::new(),
            info: HashMap::new(),
            attached: BTreeSet::new(),
            connections: vec![Connection {
                from: Endpoint::Input,
                to: Endpoint::Mixer,
                format: input_format,
            }],
            installed: None,
            committed_route: Route::Passthrough,
            commits_pushed: 0,
            commands: producer,
            gc: gc_handle(),
            atomics: atomics.clone(),
        };

        let renderer = GraphRenderer {
            commands: consumer,
            slot: None,
            route: Route::Passthrough,
            effect_out: AudioBuffer::new(input_format.channels, max_frames),
            max_frames,
            atomics,
        };

        log::info!(
            "Live graph created: input {}, output {}, max {} frames",
            input_format,
            output_format,
            max_frames
        );
        (graph, renderer)
    }

    /// Render-side counters
    pub fn atomics(&self) -> &Arc<GraphAtomics> {
        &self.atomics
    }

    /// Route published by the last successful commit
    pub fn committed_route(&self) -> Route {
        self.committed_route
    }

    /// Whether the render half has applied every commit
    pub fn is_synced(&self) -> bool {
        self.atomics.commits_applied() == self.commits_pushed
    }

    /// Node owned by the render half as of the last commit
    pub fn installed_node(&self) -> Option<NodeId> {
        self.installed
    }

    fn input_of(&self, to: Endpoint) -> Option<&Connection> {
        self.connections.iter().find(|c| c.to == to)
    }

    fn check_endpoint(&self, endpoint: Endpoint) -> GraphResult<()> {
        match endpoint {
            Endpoint::Node(id) if !self.attached.contains(&id) => Err(GraphError::UnknownNode(id)),
            _ => Ok(()),
        }
    }

    /// Route implied by the staged connections
    fn staged_route(&self) -> Route {
        let slot = self.attached.iter().next().copied();
        if let Some(id) = slot {
            let fed = self
                .input_of(Endpoint::Node(id))
                .is_some_and(|c| c.from == Endpoint::Input);
            let feeds_mixer = self
                .input_of(Endpoint::Mixer)
                .is_some_and(|c| c.from == Endpoint::Node(id));
            if fed && feeds_mixer {
                return Route::Effect(id);
            }
        }
        match self.input_of(Endpoint::Mixer) {
            Some(c) if c.from == Endpoint::Input => Route::Passthrough,
            _ => Route::Silence,
        }
    }

    fn validate_route(&self, route: Route) -> GraphResult<()> {
        let Route::Effect(id) = route else {
            return Ok(());
        };
        let info = self.info.get(&id).ok_or(GraphError::UnknownNode(id))?;
        if !info.allocated {
            return Err(GraphError::InvalidConnection(format!(
                "{} is routed but has no allocated resources",
                id
            )));
        }
        let channels = self.input_format.channels;
        if info.input_format.channels != channels || info.output_format.channels != channels {
            return Err(GraphError::InvalidConnection(format!(
                "{} is configured for {} → {}, input carries {}",
                id, info.input_format, info.output_format, self.input_format
            )));
        }
        if info.max_frames < self.max_frames {
            return Err(GraphError::InvalidConnection(format!(
                "{} renders at most {} frames, graph needs {}",
                id, info.max_frames, self.max_frames
            )));
        }
        Ok(())
    }
}

impl AudioGraph for LiveGraph {
    fn input_format(&self) -> StreamFormat {
        self.input_format
    }

    fn output_format(&self) -> StreamFormat {
        self.output_format
    }

    fn max_frames(&self) -> usize {
        self.max_frames
    }

    fn attach_node(&mut self, node: EffectNode) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.info.insert(
            id,
            NodeInfo {
                input_format: node.input_format(),
                output_format: node.output_format(),
                max_frames: node.maximum_frames(),
                allocated: node.is_allocated(),
            },
        );
        log::debug!("Staged attach of '{}' as {}", node.name(), id);
        self.staged.insert(id, node);
        self.attached.insert(id);
        id
    }

    fn detach_node(&mut self, id: NodeId) -> GraphResult<()> {
        if !self.attached.remove(&id) {
            return Err(GraphError::UnknownNode(id));
        }
        self.connections
            .retain(|c| c.from != Endpoint::Node(id) && c.to != Endpoint::Node(id));
        self.info.remove(&id);
        // Never committed: still ours, drop it here
        if let Some(node) = self.staged.remove(&id) {
            log::debug!("Dropped uncommitted node '{}' ({})", node.name(), id);
        }
        log::debug!("Staged detach of {}", id);
        Ok(())
    }

    fn connect(&mut self, from: Endpoint, to: Endpoint, format: StreamFormat) -> GraphResult<()> {
        if from == to || from == Endpoint::Mixer || to == Endpoint::Input {
            return Err(GraphError::InvalidConnection(format!(
                "cannot connect {} → {}",
                from, to
            )));
        }
        self.check_endpoint(from)?;
        self.check_endpoint(to)?;

        self.connections.retain(|c| c.to != to);
        self.connections.push(Connection { from, to, format });
        log::debug!("Staged connection {} → {} ({})", from, to, format);
        Ok(())
    }

    fn disconnect_input(&mut self, to: Endpoint) {
        self.connections.retain(|c| c.to != to);
    }

    fn connections(&self) -> Vec<Connection> {
        self.connections.clone()
    }

    fn attached_nodes(&self) -> Vec<NodeId> {
        self.attached.iter().copied().collect()
    }

    fn commit(&mut self) -> GraphResult<()> {
        let mut attached = self.attached.iter().copied();
        let slot = attached.next();
        if attached.next().is_some() {
            let occupant = self.installed.or(slot).unwrap_or(NodeId(0));
            return Err(GraphError::SlotOccupied { occupant });
        }

        let route = self.staged_route();
        self.validate_route(route)?;

        if self.commands.slots() == 0 {
            log::warn!("Graph command queue full; keeping changes staged");
            return Err(GraphError::CommandQueueFull);
        }

        let change = match (slot, self.installed) {
            (Some(new), Some(old)) if new == old => SlotChange::Keep,
            (Some(new), _) => match self.staged.remove(&new) {
                Some(node) => SlotChange::Replace(new, Owned::new(&self.gc, node)),
                None => return Err(GraphError::UnknownNode(new)),
            },
            (None, Some(_)) => SlotChange::Clear,
            (None, None) => SlotChange::Keep,
        };

        // Free slot checked above; this producer is the only writer
        if self
            .commands
            .push(GraphCommand::Apply {
                slot: change,
                route,
            })
            .is_err()
        {
            return Err(GraphError::CommandQueueFull);
        }

        self.installed = slot;
        self.committed_route = route;
        self.commits_pushed += 1;
        log::info!("Graph commit #{}: {:?}", self.commits_pushed, route);
        Ok(())
    }
}

/// Outcome of one graph render call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphStatus {
    Silent,
    Passthrough,
    Effect(RenderStatus),
}

/// Render half of the live graph
///
/// Owned by the audio callback. `process` never allocates, locks or blocks.
pub struct GraphRenderer {
    commands: rtrb::Consumer<GraphCommand>,
    slot: Option<(NodeId, Owned<EffectNode>)>,
    route: Route,
    effect_out: AudioBuffer,
    max_frames: usize,
    atomics: Arc<GraphAtomics>,
}

impl GraphRenderer {
    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    pub fn route(&self) -> Route {
        self.route
    }

    /// Apply every pending commit
    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.pop() {
            match command {
                GraphCommand::Apply { slot, route } => {
                    match slot {
                        SlotChange::Keep => {}
                        // Previous occupant drops through the collector
                        SlotChange::Replace(id, node) => self.slot = Some((id, node)),
                        SlotChange::Clear => self.slot = None,
                    }
                    self.route = route;
                    self.atomics.route.store(route.encode(), Ordering::Release);
                    self.atomics.commits_applied.fetch_add(1, Ordering::Release);
                }
            }
        }
    }

    /// Render one buffer of `frames` frames from `input` into `output`
    ///
    /// Pending commits are applied first, so topology changes land exactly
    /// on a buffer boundary. The routed signal is mixed to the output's
    /// channel layout (mono spreads to every channel).
    pub fn process(
        &mut self,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
        frames: usize,
        timestamp: RenderTimestamp,
    ) -> GraphStatus {
        self.drain_commands();

        match self.route {
            Route::Silence => {
                output.silence(frames);
                GraphStatus::Silent
            }
            Route::Passthrough => {
                output.spread_from(input, frames);
                GraphStatus::Passthrough
            }
            Route::Effect(id) => {
                let status = match self.slot.as_mut() {
                    Some((slot_id, node)) if *slot_id == id => {
                        self.effect_out.set_frames(frames);
                        match node.render_block() {
                            Some(mut block) => {
                                block.render(input, &mut self.effect_out, frames, timestamp)
                            }
                            None => {
                                self.effect_out.silence(frames);
                                RenderStatus::NotAllocated
                            }
                        }
                    }
                    _ => {
                        self.effect_out.silence(frames);
                        RenderStatus::NotAllocated
                    }
                };
                output.spread_from(&self.effect_out, frames);
                GraphStatus::Effect(status)
            }
        }
    }
}
