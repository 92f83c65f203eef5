//! The block-rate render loop of §4.9: per [`Engine::play`] call, drain
//! host-fired events into the event runtime, ask the scheduler how far it
//! can advance before the next trigger, render that span through the
//! device graph, and feed newly due triggers back into the event runtime
//! for the next iteration.

use std::sync::Arc;

use kunquat_event::{BindTable, Event, EventRuntime};
use kunquat_graph::{DeviceGraph, Node, NodeBody, NodeId, PortManifest};
use kunquat_padsynth::PadsynthBank;
use kunquat_player::{Composition, Scheduler};
use kunquat_stream::{EmptyEnv, Evaluator};
use kunquat_tuning::TuningTable;
use kunquat_voice::Oscillator;
use rtrb::{Consumer, Producer, RingBuffer};

use crate::config::EngineConfig;
use crate::dispatch::VoiceDispatch;
use crate::error::{EngineError, EngineResult};
use crate::voice_node::PadsynthVoiceNode;

pub struct Engine {
    config: EngineConfig,
    graph: DeviceGraph,
    voice_node_id: NodeId,
    scheduler: Scheduler,
    event_runtime: EventRuntime,
    evaluator: Evaluator,
    event_tx: Producer<Event>,
    event_rx: Consumer<Event>,
    stopped: bool,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        composition: Composition,
        tuning: TuningTable,
        bank: Arc<PadsynthBank>,
        binds: BindTable,
        start_bpm: f64,
        seed: u64,
    ) -> EngineResult<Self> {
        let voice_node = PadsynthVoiceNode::new(config.max_voices, config.sample_rate, tuning, bank);
        Self::with_voice_node(config, composition, binds, start_bpm, seed, voice_node)
    }

    /// Build an engine around a voice node driven by an arbitrary oscillator
    /// kind instead of the PADsynth lookup, e.g. the debug instrument used
    /// in this crate's own tests.
    pub fn new_with_oscillator_factory(
        config: EngineConfig,
        composition: Composition,
        tuning: TuningTable,
        binds: BindTable,
        start_bpm: f64,
        seed: u64,
        make_oscillator: impl Fn() -> Box<dyn Oscillator>,
    ) -> EngineResult<Self> {
        let voice_node = PadsynthVoiceNode::with_oscillator_factory(
            config.max_voices,
            config.sample_rate,
            tuning,
            make_oscillator,
        );
        Self::with_voice_node(config, composition, binds, start_bpm, seed, voice_node)
    }

    fn with_voice_node(
        config: EngineConfig,
        composition: Composition,
        binds: BindTable,
        start_bpm: f64,
        seed: u64,
        voice_node: PadsynthVoiceNode,
    ) -> EngineResult<Self> {
        let mut graph = DeviceGraph::new(config.block_size);
        let voice_node_id = graph.add_node(Node {
            name: "voice".to_string(),
            ports: PortManifest::linear(0, 2),
            body: NodeBody::Voice(Box::new(voice_node)),
        })?;
        graph.connect(voice_node_id, 0, NodeId::MASTER, 0)?;
        graph.connect(voice_node_id, 1, NodeId::MASTER, 1)?;
        graph.validate()?;
        graph.set_sample_rate(config.sample_rate);

        let scheduler = Scheduler::new(composition, config.sample_rate, start_bpm)?;
        let event_runtime = EventRuntime::new(binds, config.bind_expansion_budget_per_block, seed);
        let (event_tx, event_rx) = RingBuffer::new(config.event_ring_capacity);

        Ok(Self {
            config,
            graph,
            voice_node_id,
            scheduler,
            event_runtime,
            evaluator: Evaluator::new(seed),
            event_tx,
            event_rx,
            stopped: false,
        })
    }

    /// Push a host-originated command onto the lock-free ring, draining it
    /// into the event runtime's pending queue at the start of the next
    /// `play` call.
    pub fn fire_event(&mut self, channel: i32, event_json: &str) -> EngineResult<()> {
        let event = Event::from_wire(channel, event_json)?;
        self.event_tx.push(event).map_err(|_| EngineError::EventRingFull)
    }

    pub fn receive_events(&mut self) -> String {
        self.event_runtime.take_notifications()
    }

    pub fn has_stopped(&self) -> bool {
        self.stopped || self.scheduler.has_stopped()
    }

    pub fn get_audio(&self, channel: usize) -> &[f32] {
        self.graph
            .output(NodeId::MASTER, channel as u16)
            .unwrap_or(&[])
    }

    pub fn set_position(&mut self, track: usize, nanoseconds: u64) -> EngineResult<()> {
        self.scheduler.set_position(track, nanoseconds)?;
        self.stopped = false;
        Ok(())
    }

    /// Render up to `max_frames` of audio, returning how many frames were
    /// actually produced. May return 0 when the event-expansion budget runs
    /// out mid-block; the host should drain `receive_events` and retry.
    pub fn play(&mut self, max_frames: u64) -> EngineResult<u64> {
        while let Ok(event) = self.event_rx.pop() {
            self.event_runtime.fire(event);
        }

        if self.has_stopped() {
            return Ok(0);
        }

        let mut rendered: u64 = 0;
        while rendered < max_frames {
            let drained = {
                // Borrows only `self.graph`, leaving `self.event_runtime`
                // free for the `run_block` call on the same line.
                let body = self
                    .graph
                    .node_body_mut(self.voice_node_id)
                    .expect("voice node always present");
                let voice_node = match body {
                    NodeBody::Voice(processor) => processor
                        .as_any_mut()
                        .downcast_mut::<PadsynthVoiceNode>()
                        .expect("voice node body is always a PadsynthVoiceNode"),
                    _ => unreachable!("voice_node_id always names the Voice node"),
                };
                let mut dispatch = VoiceDispatch { voice_node };
                self.event_runtime.run_block(&EmptyEnv, &mut dispatch)
            };
            if !drained {
                return Ok(rendered);
            }

            let remaining = max_frames - rendered;
            let step = self
                .scheduler
                .step(remaining, &EmptyEnv, &mut self.evaluator)?;

            if step.frames > 0 {
                let start = rendered as usize;
                let stop = start + step.frames as usize;
                self.graph.render_block(start, stop)?;
                rendered += step.frames;
            }

            for event in step.fired {
                self.event_runtime.fire(event);
            }

            if step.reached_end {
                self.stopped = true;
                break;
            }
            if step.frames == 0 && step.fired.is_empty() {
                // Zero-length pattern boundary with nothing due: loop again
                // without burning a scheduling step on no progress.
                continue;
            }
        }

        Ok(rendered)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kunquat_core::Tstamp;
    use kunquat_event::{BindRule, Substitution};
    use kunquat_player::{Pattern, PatternId, PatternInstanceRef, Track, Trigger};
    use kunquat_tuning::RatioSpec;
    use kunquat_voice::DebugOscillator;

    fn debug_engine(
        config: EngineConfig,
        composition: Composition,
        start_bpm: f64,
        binds: BindTable,
    ) -> Engine {
        let tuning = TuningTable::new(0, 55.0, RatioSpec::Ratio(2.0), &[RatioSpec::Ratio(1.0)], &[]).unwrap();
        Engine::new_with_oscillator_factory(config, composition, tuning, binds, start_bpm, 1, || {
            Box::new(DebugOscillator::new()) as Box<dyn Oscillator>
        })
        .unwrap()
    }

    fn one_pattern_composition(length: Tstamp, triggers: Vec<(Tstamp, Trigger)>, infinite: bool) -> Composition {
        let mut comp = Composition::new(
            vec![Track {
                systems: vec![vec![PatternInstanceRef { pattern: PatternId(0) }]],
            }],
            infinite,
        );
        comp.insert_pattern(PatternId(0), Pattern::new(length, vec![triggers]));
        comp
    }

    /// Scenario 1 (debug note): a voice built on the debug oscillator, held
    /// at 55 Hz, renders the documented `[1, .5, .5, .5]` waveform once the
    /// filter's click-free startup crossfade (§4.5's `CrossfadingFilter`,
    /// 200 samples at this rate) has settled.
    #[test]
    fn scenario_debug_note_renders_repeating_waveform() {
        let config = EngineConfig {
            sample_rate: 220.0,
            block_size: 512,
            ..EngineConfig::low_latency()
        };
        let comp = one_pattern_composition(Tstamp::new(1000, 0), vec![], false);
        let mut engine = debug_engine(config, comp, 120.0, BindTable::new(vec![]));

        engine.fire_event(0, r#"["n+", 0]"#).unwrap();
        let rendered = engine.play(240).unwrap();
        assert_eq!(rendered, 240);

        let settled = &engine.get_audio(0)[200..240];
        let expected: Vec<f32> = [1.0, 0.5, 0.5, 0.5].iter().copied().cycle().take(40).collect();
        assert_eq!(settled, expected.as_slice());
        assert_eq!(&engine.get_audio(1)[200..240], expected.as_slice());
    }

    /// Scenario 3 (pattern loop): a single-pattern, infinite order list
    /// re-enters the same pattern every cycle, re-firing its trigger row
    /// each time. Using a `q*` query (rather than a note) to observe this
    /// keeps the assertion about scheduling, not about voice/filter state.
    #[test]
    fn scenario_pattern_loop_refires_each_cycle() {
        let config = EngineConfig {
            sample_rate: 220.0,
            block_size: 512,
            ..EngineConfig::low_latency()
        };
        let comp = one_pattern_composition(
            Tstamp::new(1, 0),
            vec![(Tstamp::new(0, 100), Trigger::new("q*", "1"))],
            true,
        );
        let mut engine = debug_engine(config, comp, 120.0, BindTable::new(vec![]));

        // 1 beat at 120 bpm, 220 Hz = 110 frames per trip around the loop.
        // Render in small batches rather than one exact-sized call: the
        // scheduler's per-step frame count is its own floor-rounded
        // accounting, not something this test should have to reproduce.
        let mut notifications = 0usize;
        let mut rendered_total = 0u64;
        for _ in 0..50 {
            rendered_total += engine.play(50).unwrap();
            notifications += engine.receive_events().matches("A*").count();
            if notifications >= 3 {
                break;
            }
        }
        assert!(notifications >= 3);
        assert!(rendered_total >= 300);
    }

    /// Scenario 6 (bind overflow): a single `#` expands into 2048 `q*`
    /// events under a budget too small to drain them in one block. `play`
    /// short-renders (0 frames) until the queue empties across several
    /// calls, and every expanded query still gets its `A*` reply.
    #[test]
    fn scenario_bind_overflow_short_renders_until_drained() {
        let config = EngineConfig {
            sample_rate: 44_100.0,
            bind_expansion_budget_per_block: 100,
            ..EngineConfig::low_latency()
        };
        let comp = one_pattern_composition(Tstamp::new(1000, 0), vec![], false);
        let substitutions = (0..2048)
            .map(|_| Substitution {
                channel_offset: 0,
                event_name: "q*".to_string(),
                argument_expr: "1".to_string(),
            })
            .collect();
        let binds = BindTable::new(vec![BindRule {
            event_name: "#".to_string(),
            condition_expr: "1".to_string(),
            substitutions,
        }]);
        let mut engine = debug_engine(config, comp, 120.0, binds);

        engine.fire_event(0, r##"["#", 1]"##).unwrap();
        let first = engine.play(10).unwrap();
        assert_eq!(first, 0);
        let mut total_notifications = engine.receive_events().matches("A*").count();

        let mut rendered = 0u64;
        for _ in 0..64 {
            rendered = engine.play(10).unwrap();
            total_notifications += engine.receive_events().matches("A*").count();
            if rendered > 0 {
                break;
            }
        }
        assert_eq!(rendered, 10);
        assert_eq!(total_notifications, 2048);
    }
}
