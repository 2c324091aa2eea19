use rocketmen::ActionBuffer;
use rocketmen::world::{ACTION_ROTATE_LEFT, ACTION_ROTATE_RIGHT, ACTION_THRUST};

/// Ticks per script step.
const STEP_TICKS: u32 = 30;

/// Stands in for a real device: every controller replays the same
/// thrust/turn pattern, offset by its controller id.
#[derive(Default)]
pub struct ScriptedInput {
    ticks: u32,
}

impl ScriptedInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once per fixed tick, before the session update.
    pub fn advance(&mut self) {
        self.ticks = self.ticks.wrapping_add(1);
    }
}

impl rocketmen::InputSource for ScriptedInput {
    fn capture(&mut self, controller_id: i32, _listen_mouse_kb: bool, actions: &mut ActionBuffer) {
        let step = (self.ticks / STEP_TICKS).wrapping_add(controller_id as u32) % 4;
        match step {
            0 => {
                actions.push(ACTION_THRUST);
            }
            1 => {
                actions.push(ACTION_THRUST);
                actions.push(ACTION_ROTATE_LEFT);
            }
            2 => {}
            _ => {
                actions.push(ACTION_ROTATE_RIGHT);
            }
        }
    }
}
