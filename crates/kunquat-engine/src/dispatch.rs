//! Routes dispatched events (everything the scheduler didn't intercept as
//! a master-control event) into voice-pool mutations, mirroring the
//! command-handling match in `rf_engine::processor::AudioProcessor`.

use kunquat_event::{ANSWER_PREFIX, Event, EventHandler};
use kunquat_stream::Value;

use crate::voice_node::PadsynthVoiceNode;

/// Borrows the voice node for the lifetime of one `run_block` call.
pub struct VoiceDispatch<'a> {
    pub voice_node: &'a mut PadsynthVoiceNode,
}

impl EventHandler for VoiceDispatch<'_> {
    fn handle(&mut self, event: &Event) -> Option<Event> {
        match event.name.as_str() {
            "n+" => {
                let group_id = event.channel as u32;
                match &event.argument {
                    Value::Int(note) if *note >= 0 => {
                        let _ = self.voice_node.note_on(group_id, *note as usize);
                    }
                    Value::Float(hz) => {
                        let _ = self.voice_node.note_on_hz(group_id, *hz);
                    }
                    other => {
                        log::warn!("n+ argument not a note index or frequency: {other:?}");
                    }
                }
                None
            }
            "n-" => {
                self.voice_node.release_group(event.channel as u32);
                None
            }
            ".f" => {
                if let Some(force) = as_f64(&event.argument) {
                    self.voice_node.set_group_force(event.channel as u32, force);
                } else {
                    log::warn!(".f argument is not numeric: {:?}", event.argument);
                }
                None
            }
            name if name.starts_with("q*") => {
                let count = self.voice_node.active_count() as i64;
                let reply_name = format!("{ANSWER_PREFIX}*");
                Some(Event::new(event.channel, reply_name, Value::Int(count)))
            }
            _ => None,
        }
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}
