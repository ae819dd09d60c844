use awvm_core::system::{PlayerInput, System};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Platform without a window: time comes from the monotonic clock and input
/// from an optional script, one state per processed event batch.
pub struct HeadlessSystem {
    input: PlayerInput,
    script: VecDeque<PlayerInput>,
    start: Instant,
}

impl Default for HeadlessSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessSystem {
    pub fn new() -> Self {
        Self::with_script(Vec::new())
    }

    pub fn with_script(script: Vec<PlayerInput>) -> Self {
        Self {
            input: PlayerInput::default(),
            script: script.into(),
            start: Instant::now(),
        }
    }
}

impl System for HeadlessSystem {
    fn input(&self) -> &PlayerInput {
        &self.input
    }

    fn input_mut(&mut self) -> &mut PlayerInput {
        &mut self.input
    }

    fn process_events(&mut self) {
        if let Some(input) = self.script.pop_front() {
            log::trace!(target: "awvm::info", "HeadlessSystem::process_events() {:?}", input);
            self.input = input;
        }
    }

    fn sleep(&self, duration: u32) {
        std::thread::sleep(Duration::from_millis(duration as u64));
    }

    fn get_timestamp(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use awvm_core::system::DIR_LEFT;

    #[test]
    fn test_scripted_input() {
        let mut sys = HeadlessSystem::with_script(vec![
            PlayerInput {
                dir_mask: DIR_LEFT,
                ..Default::default()
            },
            PlayerInput {
                quit: true,
                ..Default::default()
            },
        ]);
        assert_eq!(sys.input(), &PlayerInput::default());

        sys.process_events();
        assert_eq!(sys.input().dir_mask, DIR_LEFT);

        sys.process_events();
        assert!(sys.input().quit);

        // The last state sticks once the script runs out.
        sys.process_events();
        assert!(sys.input().quit);
    }

    #[test]
    fn test_timestamp_advances_with_sleep() {
        let sys = HeadlessSystem::new();
        let before = sys.get_timestamp();
        sys.sleep(20);
        assert!(sys.get_timestamp() >= before + 20);
    }
}
