//! Engine-wide tunables, mirroring `rf_engine::EngineConfig`'s role as the
//! one struct a host fills in before constructing the render core.

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub sample_rate: f64,
    pub block_size: usize,
    pub max_voices: usize,
    pub max_processors: usize,
    pub max_pattern_instances: usize,
    pub max_audio_unit_ports: usize,
    pub bind_expansion_budget_per_block: usize,
    /// Capacity of the host→render `fire_event` ring.
    pub event_ring_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.0,
            block_size: 256,
            max_voices: 256,
            max_processors: 1024,
            max_pattern_instances: 1024,
            max_audio_unit_ports: 256,
            bind_expansion_budget_per_block: 2048,
            event_ring_capacity: 1024,
        }
    }
}

impl EngineConfig {
    pub fn low_latency() -> Self {
        Self {
            block_size: 64,
            max_voices: 64,
            ..Self::default()
        }
    }
}
