//! End-to-end behaviour of the parameter store, render bridge and effect slot

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use denoise_core::effect::{
    DenoiseEngine, EffectError, EffectNode, EffectResult, EngineConfig, EngineFault,
    ParameterSnapshot, ParameterStore, ProcessStatus, RenderBridge, RenderStatus, GATE_ATTACK,
    SPEECH_THRESHOLD,
};
use denoise_core::graph::{
    AttachOutcome, BundledRegistry, ComponentDescriptor, ComponentRegistry, Endpoint, GraphError,
    GraphManager, GraphRenderer, InstantiationOptions, LiveGraph, Route,
};
use denoise_core::{AudioBuffer, RenderTimestamp, StreamFormat};

const FRAMES: usize = 480;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn mono() -> StreamFormat {
    StreamFormat::mono(48000)
}

fn manager(registry: BundledRegistry) -> (GraphManager, GraphRenderer) {
    let (graph, renderer) = LiveGraph::new(mono(), mono(), FRAMES);
    (GraphManager::new(Box::new(graph), Arc::new(registry)), renderer)
}

fn render(renderer: &mut GraphRenderer, level: f32) -> AudioBuffer {
    let input = AudioBuffer::from_channels(&[&[level; FRAMES]]);
    let mut output = AudioBuffer::new(1, FRAMES);
    renderer.process(&input, &mut output, FRAMES, RenderTimestamp::default());
    output
}

/// Copies input to output, except that every call listed in `fail_on`
/// reports a malformed buffer after scribbling on the output
struct FlakyEngine {
    calls: Arc<AtomicUsize>,
    fail_on: &'static [usize],
}

impl DenoiseEngine for FlakyEngine {
    fn name(&self) -> &str {
        "Flaky"
    }

    fn allocate(&mut self, _config: EngineConfig) -> EffectResult<()> {
        Ok(())
    }

    fn process(
        &mut self,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
        frames: usize,
        _snapshot: &ParameterSnapshot,
    ) -> ProcessStatus {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        output.copy_from(input, frames);
        if self.fail_on.contains(&call) {
            output.scale(frames, 7.0);
            return ProcessStatus::Failed(EngineFault::MalformedBuffer);
        }
        ProcessStatus::Ok
    }

    fn deallocate(&mut self) {}
}

#[test]
fn parameter_writes_are_clamped() {
    init_logging();
    let store = ParameterStore::denoise().unwrap();

    let threshold = store.address_of("threshold").unwrap();
    assert_eq!(store.value(threshold).unwrap(), 0.95);
    assert_eq!(store.set_value(threshold, 1.5).unwrap(), 1.0);
    assert_eq!(store.value(threshold).unwrap(), 1.0);

    for (address, value) in [
        (SPEECH_THRESHOLD, -3.0),
        (SPEECH_THRESHOLD, 0.42),
        (GATE_ATTACK, 9000.0),
        (GATE_ATTACK, -1.0),
        (GATE_ATTACK, 250.0),
    ] {
        let info = store.info(address).unwrap().clone();
        store.set_value(address, value).unwrap();
        assert_eq!(store.value(address).unwrap(), value.clamp(info.min, info.max));
    }
}

#[test]
fn snapshots_never_revert() {
    let store = Arc::new(ParameterStore::denoise().unwrap());
    let writer = {
        let store = store.clone();
        std::thread::spawn(move || {
            for i in 100..=1000 {
                store.set_value(GATE_ATTACK, i as f32).unwrap();
            }
        })
    };

    // Default attack is 100 ms and the writer only climbs from there, so a
    // smaller value than the previous read would be a stale snapshot
    let mut last_value = 0.0;
    let mut last_epoch = 0;
    for _ in 0..10_000 {
        let snapshot = store.snapshot();
        let value = snapshot.get(GATE_ATTACK).unwrap();
        assert!(snapshot.epoch >= last_epoch);
        assert!(value >= last_value, "{} after {}", value, last_value);
        last_value = value;
        last_epoch = snapshot.epoch;
    }
    writer.join().unwrap();
    assert_eq!(store.snapshot().get(GATE_ATTACK), Some(1000.0));
}

#[test]
fn unequal_channel_counts_fail_allocation() {
    let mut node = EffectNode::denoiser().unwrap();
    node.set_input_format(StreamFormat::mono(48000)).unwrap();
    node.set_output_format(StreamFormat::stereo(48000)).unwrap();

    assert!(matches!(
        node.allocate_resources(),
        Err(EffectError::FormatMismatch { input: 1, output: 2 })
    ));
    assert!(!node.is_allocated());
    assert!(node.render_block().is_none());
}

#[test]
fn malformed_engine_buffer_is_silenced_once() {
    init_logging();
    let calls = Arc::new(AtomicUsize::new(0));
    let params = Arc::new(ParameterStore::denoise().unwrap());
    let mut bridge = RenderBridge::new(
        Box::new(FlakyEngine {
            calls: calls.clone(),
            fail_on: &[0],
        }),
        params,
    );
    bridge
        .allocate(EngineConfig {
            max_frames: FRAMES,
            channels: 1,
            sample_rate: 48000,
        })
        .unwrap();

    let input = AudioBuffer::from_channels(&[&[0.25; FRAMES]]);
    let mut output = AudioBuffer::new(1, FRAMES);

    let status = bridge.render(&input, &mut output, FRAMES, RenderTimestamp::new(0));
    assert_eq!(status, RenderStatus::Silenced(EngineFault::MalformedBuffer));
    assert!(output.is_silent());

    let status = bridge.render(&input, &mut output, FRAMES, RenderTimestamp::new(FRAMES as u64));
    assert_eq!(status, RenderStatus::Rendered);
    assert!(output.channel(0).iter().all(|&s| s == 0.25));

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(bridge.stats().failures(), 1);
    assert_eq!(bridge.stats().rendered(), 1);
}

#[test]
fn second_attach_replaces_first() {
    init_logging();
    let (mut manager, mut renderer) = manager(BundledRegistry::with_builtin());

    let first = manager.attach(EffectNode::denoiser().unwrap()).unwrap();
    render(&mut renderer, 0.0);
    let second = manager.attach(EffectNode::denoiser().unwrap()).unwrap();
    render(&mut renderer, 0.0);

    assert_ne!(first, second);
    assert_eq!(manager.graph().attached_nodes(), vec![second]);
    let connections = manager.graph().connections();
    assert_eq!(connections.len(), 2);
    assert!(connections
        .iter()
        .all(|c| c.from != Endpoint::Node(first) && c.to != Endpoint::Node(first)));
    assert_eq!(renderer.route(), Route::Effect(second));
}

#[test]
fn second_attach_replaces_first_before_render_drains() {
    init_logging();
    let (mut manager, mut renderer) = manager(BundledRegistry::with_builtin());

    // Both commits queued before the render side sees either
    let first = manager.attach(EffectNode::denoiser().unwrap()).unwrap();
    let second = manager.attach(EffectNode::denoiser().unwrap()).unwrap();
    assert!(!manager.has_uncommitted_changes());
    assert_eq!(renderer.route(), Route::Passthrough);

    manager
        .parameters()
        .unwrap()
        .set_value(SPEECH_THRESHOLD, 0.0)
        .unwrap();
    render(&mut renderer, 0.5);
    let output = render(&mut renderer, 0.5);

    assert_eq!(renderer.route(), Route::Effect(second));
    assert_eq!(manager.graph().attached_nodes(), vec![second]);
    let connections = manager.graph().connections();
    assert_eq!(connections.len(), 2);
    assert!(connections
        .iter()
        .all(|c| c.from != Endpoint::Node(first) && c.to != Endpoint::Node(first)));
    assert!(output.channel(0).iter().all(|&s| s == 0.5));
}

#[test]
fn stale_instantiation_does_not_replace_current_node() {
    init_logging();
    let (mut manager, mut renderer) = manager(BundledRegistry::with_builtin());

    let handle = manager
        .discover_effect_component(&ComponentDescriptor::DENOISE)
        .unwrap();
    let slow = manager.instantiate(&handle, false).wait();

    let current = manager.attach(EffectNode::denoiser().unwrap()).unwrap();
    let outcome = manager.attach_instantiated(slow).unwrap();

    assert!(matches!(outcome, AttachOutcome::Stale { .. }));
    assert_eq!(manager.active().unwrap().id, current);
    render(&mut renderer, 0.0);
    assert_eq!(renderer.route(), Route::Effect(current));
}

#[test]
fn discovery_requires_exactly_one_match() {
    let (manager_empty, _r) = manager(BundledRegistry::new());
    assert!(matches!(
        manager_empty.discover_effect_component(&ComponentDescriptor::DENOISE),
        Err(GraphError::ComponentNotFound { .. })
    ));

    let mut registry = BundledRegistry::with_builtin();
    registry.register(ComponentDescriptor::DENOISE, "Second Copy", 1, |_| {
        EffectNode::denoiser()
    });
    let (manager_twice, _r) = manager(registry);
    assert!(matches!(
        manager_twice.discover_effect_component(&ComponentDescriptor::DENOISE),
        Err(GraphError::AmbiguousComponent { count: 2, .. })
    ));
}

#[test]
fn out_of_process_panic_is_contained() {
    init_logging();
    let mut registry = BundledRegistry::new();
    let handle = registry.register(ComponentDescriptor::DENOISE, "Crashy", 1, |_| {
        panic!("model weights missing")
    });

    let task = registry.instantiate(&handle, InstantiationOptions { out_of_process: true });
    match task.wait() {
        Err(GraphError::InstantiationFailed { reason, .. }) => {
            assert!(reason.contains("model weights missing"));
        }
        other => panic!("unexpected result {:?}", other.map(|n| n.name().to_string())),
    }
}

#[test]
fn requested_effect_processes_audio_end_to_end() {
    init_logging();
    let (mut manager, mut renderer) = manager(BundledRegistry::with_builtin());

    let generation = manager
        .request_effect(&ComponentDescriptor::DENOISE, true)
        .unwrap();
    let events = manager.wait_pending();
    assert!(matches!(
        events.as_slice(),
        [denoise_core::graph::GraphEvent::Attached { generation: g, .. }] if *g == generation
    ));

    // Threshold 0 opens the gate for everything
    let params = manager.parameters().unwrap().clone();
    params.set_value(SPEECH_THRESHOLD, 0.0).unwrap();
    let mut output = render(&mut renderer, 0.5);
    for _ in 0..3 {
        output = render(&mut renderer, 0.5);
    }
    assert!(output.channel(0).iter().all(|&s| s == 0.5));

    params.set_bypass(true);
    let output = render(&mut renderer, 0.3);
    assert!(output.channel(0).iter().all(|&s| s == 0.3));

    assert!(manager.detach().unwrap());
    let output = render(&mut renderer, 0.1);
    assert_eq!(renderer.route(), Route::Passthrough);
    assert!(output.channel(0).iter().all(|&s| s == 0.1));
}
