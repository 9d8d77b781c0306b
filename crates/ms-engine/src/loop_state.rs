//! Loop bookkeeping: the simple loop counter and the nested loop stack.

use crate::position::Position;

/// One level of the nested loop stack.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoopStackEntry {
    /// Loops forever
    pub infinity: bool,
    /// Passes left; only meaningful when not infinite
    pub loops: i32,
    /// Where to jump back to at the loop end
    pub start_position: Position,
    /// Tick of the loop start
    pub start: u64,
    /// Tick of the loop end
    pub end: u64,
}

/// Loop flags raised during dispatch plus the loop counters.
#[derive(Clone, Debug, PartialEq)]
pub struct LoopState {
    pub caught_start: bool,
    pub caught_end: bool,
    pub caught_stack_start: bool,
    pub caught_stack_end: bool,
    pub caught_stack_break: bool,
    /// Ignore the next stack begin, set after jumping back to it
    pub skip_stack_start: bool,
    /// Loop markers are inconsistent; loop events are ignored
    pub invalid_loop: bool,
    /// Next song end rewinds to the track begin instead of the loop begin
    pub temporary_broken: bool,
    /// Configured passes through the simple loop, -1 for infinite
    pub loops_count: i32,
    pub loops_left: i32,
    pub stack: Vec<LoopStackEntry>,
    /// Index of the innermost active stack level, -1 when none
    pub stack_level: i32,
}

impl Default for LoopState {
    fn default() -> Self {
        Self {
            caught_start: false,
            caught_end: false,
            caught_stack_start: false,
            caught_stack_end: false,
            caught_stack_break: false,
            skip_stack_start: false,
            invalid_loop: false,
            temporary_broken: false,
            loops_count: -1,
            loops_left: -1,
            stack: Vec::new(),
            stack_level: -1,
        }
    }
}

impl LoopState {
    /// Clear the edge flags and restart the loop counters.
    pub fn reset(&mut self) {
        self.caught_start = false;
        self.caught_end = false;
        self.caught_stack_start = false;
        self.caught_stack_end = false;
        self.caught_stack_break = false;
        self.skip_stack_start = false;
        self.loops_left = self.loops_count;
        self.stack_level = -1;
    }

    /// Reset everything, including the stack and the validity flag.
    pub fn full_reset(&mut self) {
        self.loops_count = -1;
        self.reset();
        self.invalid_loop = false;
        self.temporary_broken = false;
        self.stack.clear();
    }

    /// A stack end was caught and the current level still wants to repeat.
    pub fn is_stack_end(&self) -> bool {
        if !self.caught_stack_end {
            return false;
        }
        match self.level_index() {
            Some(level) => {
                let entry = &self.stack[level];
                entry.infinity || entry.loops > 0
            }
            None => false,
        }
    }

    pub fn stack_up(&mut self) {
        self.stack_level += 1;
    }

    pub fn stack_down(&mut self) {
        self.stack_level -= 1;
    }

    fn level_index(&self) -> Option<usize> {
        usize::try_from(self.stack_level)
            .ok()
            .filter(|&level| level < self.stack.len())
    }

    /// The innermost stack entry.
    ///
    /// Falls back to the first entry, creating it if needed, when the level
    /// is out of range.
    pub fn current_stack_mut(&mut self) -> &mut LoopStackEntry {
        match self.level_index() {
            Some(level) => &mut self.stack[level],
            None => {
                if self.stack.is_empty() {
                    self.stack.push(LoopStackEntry::default());
                }
                &mut self.stack[0]
            }
        }
    }

    /// Arm the entry one level above the current one with `loops` passes.
    pub fn arm_next_level(&mut self, loops: u8) {
        let next = (self.stack_level + 1).max(0) as usize;
        if next >= self.stack.len() {
            self.stack.resize(next + 1, LoopStackEntry::default());
        }
        let entry = &mut self.stack[next];
        entry.loops = loops as i32;
        entry.infinity = loops == 0;
    }
}
