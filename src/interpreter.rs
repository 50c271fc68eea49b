//! Execution controller
//!
//! Runs the decode/execute loop on a dedicated thread and exposes a
//! lifecycle state machine the host drives from its own thread:
//!
//! ```text
//! UNSTARTED --start-----> RUNNING
//! RUNNING   --quit------------------------> FINISHED
//! RUNNING   --abort-----> ABORTING --loop-> FINISHED
//! RUNNING   --pause_zm--> PAUSING --loop--> PAUSED
//! PAUSED    --resume_zm-> RESUMING --loop-> RUNNING
//! ```
//!
//! The execution thread is the sole owner of machine state while
//! RUNNING.  The host requests transitions, feeds key codes through
//! [Interpreter::input], and answers filename prompts through
//! [Interpreter::reply_file_name].  Cancellation is cooperative: abort
//! and pause are observed at instruction boundaries, and both interrupt
//! a blocked input read.  An interrupted instruction is abandoned with
//! the program counter still at its start, so it re-executes cleanly on
//! resume.
use std::fs;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::thread::JoinHandle;

use crate::error::{ErrorCode, RuntimeError};
use crate::recoverable_error;
use crate::zmachine::io::{InputQueue, NamePrompt, Screen};
use crate::zmachine::state::memory::Memory;
use crate::zmachine::ZMachine;

/// Lifecycle state of the execution thread.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunState {
    Unstarted,
    Running,
    Aborting,
    Pausing,
    Paused,
    Resuming,
    Finished,
}

struct Control {
    state: Mutex<RunState>,
    changed: Condvar,
}

impl Control {
    fn new() -> Control {
        Control {
            state: Mutex::new(RunState::Unstarted),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current(&self) -> RunState {
        *self.lock()
    }

    fn set(&self, to: RunState) {
        let mut state = self.lock();
        debug!(target: "app::run", "Run state {:?} -> {:?}", *state, to);
        *state = to;
        self.changed.notify_all();
    }

    /// Moves to `to` only if the current state is one of `from`.
    fn transition(&self, from: &[RunState], to: RunState) -> bool {
        let mut state = self.lock();
        if from.contains(&state) {
            debug!(target: "app::run", "Run state {:?} -> {:?}", *state, to);
            *state = to;
            self.changed.notify_all();
            true
        } else {
            false
        }
    }

    /// Blocks until the state is one of `targets`.
    fn wait_for(&self, targets: &[RunState]) -> RunState {
        let mut state = self.lock();
        while !targets.contains(&state) {
            state = self.changed.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        *state
    }
}

pub struct Interpreter {
    control: Arc<Control>,
    machine: Arc<Mutex<ZMachine>>,
    input: Arc<InputQueue>,
    prompt: Arc<NamePrompt>,
    handle: Option<JoinHandle<()>>,
}

impl Interpreter {
    /// Builds an interpreter from a story image.
    ///
    /// Fails if the image is too short, its version byte is not 3, 5 or
    /// 8, or its header is inconsistent.  Nothing runs until
    /// [Interpreter::start].
    pub fn load(
        story: Vec<u8>,
        screen: Box<dyn Screen>,
        name: &str,
    ) -> Result<Interpreter, RuntimeError> {
        let memory = Memory::new(story)?;
        let input = Arc::new(InputQueue::new());
        let prompt = Arc::new(NamePrompt::new());
        let machine = ZMachine::new(memory, screen, input.clone(), prompt.clone(), name)?;
        Ok(Interpreter {
            control: Arc::new(Control::new()),
            machine: Arc::new(Mutex::new(machine)),
            input,
            prompt,
            handle: None,
        })
    }

    pub fn state(&self) -> RunState {
        self.control.current()
    }

    /// Spawns the execution thread.  Returns false unless the machine is
    /// UNSTARTED.
    pub fn start(&mut self) -> bool {
        if !self
            .control
            .transition(&[RunState::Unstarted], RunState::Running)
        {
            return false;
        }

        let control = self.control.clone();
        let machine = self.machine.clone();
        let input = self.input.clone();
        let prompt = self.prompt.clone();
        self.handle = Some(thread::spawn(move || {
            run(&control, &machine, &input, &prompt)
        }));
        true
    }

    /// Asks the execution thread to pause and blocks until it has.
    ///
    /// Returns false if the machine is not RUNNING, or if it finished
    /// before reaching PAUSED.
    pub fn pause_zm(&self) -> bool {
        if !self
            .control
            .transition(&[RunState::Running], RunState::Pausing)
        {
            return false;
        }

        // Unblock a pending input read or filename prompt
        self.input.interrupt();
        self.prompt.interrupt();
        self.control.wait_for(&[RunState::Paused, RunState::Finished]) == RunState::Paused
    }

    /// Asks a paused execution thread to resume and blocks until it is
    /// running again.  Returns false if the machine is not PAUSED.
    pub fn resume_zm(&self) -> bool {
        if !self
            .control
            .transition(&[RunState::Paused], RunState::Resuming)
        {
            return false;
        }

        self.control
            .wait_for(&[RunState::Running, RunState::Finished])
            == RunState::Running
    }

    /// Requests termination.  The execution thread observes the request
    /// at its next instruction boundary and exits its loop.
    pub fn abort(&self) {
        if self.control.transition(
            &[
                RunState::Running,
                RunState::Pausing,
                RunState::Paused,
                RunState::Resuming,
            ],
            RunState::Aborting,
        ) {
            self.input.interrupt();
            self.prompt.interrupt();
        }
    }

    /// Aborts and waits for the execution thread to exit.  A machine
    /// that never started goes straight to FINISHED.
    pub fn quit(&mut self) {
        self.control
            .transition(&[RunState::Unstarted], RunState::Finished);
        self.abort();
        self.join();
    }

    /// Waits for the execution thread to exit.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!(target: "app::run", "Execution thread panicked");
            }
        }
    }

    /// Resets a paused or finished machine to its initial state.  A
    /// finished machine returns to UNSTARTED and may be started again.
    pub fn restart(&mut self) -> bool {
        match self.state() {
            RunState::Paused => match self.machine_lock().restart() {
                Ok(_) => true,
                Err(e) => {
                    error!(target: "app::run", "Restart failed: {}", e);
                    false
                }
            },
            RunState::Finished => {
                self.join();
                match self.machine_lock().restart() {
                    Ok(_) => {
                        self.control.set(RunState::Unstarted);
                        true
                    }
                    Err(e) => {
                        error!(target: "app::run", "Restart failed: {}", e);
                        false
                    }
                }
            }
            _ => false,
        }
    }

    /// Feeds a key code to the machine's input queue.
    pub fn input(&self, code: u16) {
        self.input.push_key(code);
    }

    /// Suggested filename of an outstanding save/restore prompt.
    pub fn file_name_request(&self) -> Option<String> {
        self.prompt.pending()
    }

    /// Answers a save/restore filename prompt.
    pub fn reply_file_name(&self, name: &str) {
        self.prompt.reply(name);
    }

    fn machine_lock(&self) -> MutexGuard<'_, ZMachine> {
        self.machine.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn apply_snapshot(&self, data: &[u8]) -> Result<bool, RuntimeError> {
        match self.state() {
            RunState::Paused | RunState::Unstarted => self.machine_lock().thaw(data),
            state => recoverable_error!(
                ErrorCode::Interpreter,
                "Machine state may only be restored while paused, not {:?}",
                state
            ),
        }
    }

    /// Writes a state capture to `path`.  The machine must be paused.
    pub fn disk_save(&self, path: &str, pc: usize) -> bool {
        let data = match self.mem_save(pc) {
            Some(data) => data,
            None => return false,
        };

        match fs::write(path, &data) {
            Ok(_) => true,
            Err(e) => {
                error!(target: "app::state", "Error writing '{}': {}", path, e);
                false
            }
        }
    }

    /// Restores a state capture from `path`.  The machine must be
    /// paused; a failed restore leaves it untouched.
    pub fn disk_restore(&self, path: &str) -> bool {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                error!(target: "app::state", "Error reading '{}': {}", path, e);
                return false;
            }
        };

        self.mem_restore(&data)
    }

    /// Captures the paused machine's state as bytes.
    pub fn mem_save(&self, pc: usize) -> Option<Vec<u8>> {
        if self.state() != RunState::Paused && self.state() != RunState::Unstarted {
            return None;
        }

        match self.machine_lock().freeze(pc) {
            Ok(data) => Some(data),
            Err(e) => {
                error!(target: "app::state", "Save failed: {}", e);
                None
            }
        }
    }

    /// Applies a state capture made by [Interpreter::mem_save].
    pub fn mem_restore(&self, data: &[u8]) -> bool {
        match self.apply_snapshot(data) {
            Ok(b) => b,
            Err(e) => {
                error!(target: "app::state", "Restore failed: {}", e);
                false
            }
        }
    }

    /// Saves the paused machine's state to the single undo slot.
    pub fn save_undo(&self) -> bool {
        if self.state() != RunState::Paused {
            return false;
        }

        let mut machine = self.machine_lock();
        match machine.pc().and_then(|pc| machine.save_undo(pc)) {
            Ok(_) => true,
            Err(e) => {
                error!(target: "app::state", "Undo save failed: {}", e);
                false
            }
        }
    }

    /// Restores the undo slot, consuming it.
    pub fn restore_undo(&self) -> bool {
        if self.state() != RunState::Paused {
            return false;
        }

        let mut machine = self.machine_lock();
        match machine.restore_undo() {
            Ok(Some(pc)) => match machine.set_pc(pc) {
                Ok(_) => true,
                Err(e) => {
                    error!(target: "app::state", "Undo restore failed: {}", e);
                    false
                }
            },
            Ok(None) => false,
            Err(e) => {
                error!(target: "app::state", "Undo restore failed: {}", e);
                false
            }
        }
    }
}

/// The decode/execute loop.
///
/// Checks the control state at every instruction boundary.  Fatal
/// faults stop the loop and reach the host exactly once through the
/// screen's finished callback.
fn run(control: &Control, machine: &Mutex<ZMachine>, input: &InputQueue, prompt: &NamePrompt) {
    let mut n = 1u64;
    loop {
        match control.current() {
            RunState::Aborting => {
                input.clear_interrupt();
                prompt.clear_interrupt();
                control.set(RunState::Finished);
                machine
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .finished(None);
                return;
            }
            RunState::Pausing => {
                input.clear_interrupt();
                prompt.clear_interrupt();
                control.set(RunState::Paused);
                // Release the machine to the host until it resumes or
                // aborts
                match control.wait_for(&[RunState::Resuming, RunState::Aborting]) {
                    RunState::Resuming => control.set(RunState::Running),
                    _ => continue,
                }
            }
            _ => {}
        }

        log_mdc::insert("instruction_count", format!("{:8x}", n));
        let mut zmachine = machine.lock().unwrap_or_else(|e| e.into_inner());
        match zmachine.step() {
            Ok(true) => {}
            Ok(false) => {
                // The program quit
                control.set(RunState::Finished);
                zmachine.finished(None);
                return;
            }
            Err(e) if e.code() == ErrorCode::Interrupted => {
                // The in-flight instruction was abandoned with the pc
                // rewound; the next iteration observes the pause or
                // abort request
                debug!(target: "app::run", "Input read interrupted");
            }
            Err(e) => {
                let pc = zmachine.pc().unwrap_or(0);
                error!(target: "app::run", "Fatal fault at {:#06x}: {}", pc, e);
                control.set(RunState::Finished);
                zmachine.finished(Some(format!("{:#06x}: {}", pc, e)));
                return;
            }
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;

    // READ_CHAR followed by a JUMP back to it, so the machine blocks
    // for input, stores the key, and loops
    fn read_loop_map(version: u8) -> Vec<u8> {
        let mut map = test_map(version);
        map[0x400] = 0xF6;
        map[0x401] = 0x7F;
        map[0x402] = 0x01;
        map[0x403] = 0x80;
        map[0x404] = 0x8C;
        map[0x405] = 0xFF;
        map[0x406] = 0xFB;
        map
    }

    // An unconditional JUMP to itself
    fn spin_loop_map(version: u8) -> Vec<u8> {
        let mut map = test_map(version);
        map[0x400] = 0x8C;
        map[0x401] = 0xFF;
        map[0x402] = 0xFF;
        map
    }

    fn interpreter(map: Vec<u8>) -> Interpreter {
        let i = Interpreter::load(map, test_screen(), "test");
        assert!(i.is_ok());
        i.unwrap()
    }

    #[test]
    fn test_load_bad_version() {
        let mut map = test_map(3);
        map[0] = 4;
        assert!(Interpreter::load(map, test_screen(), "test").is_err());
        let mut map = test_map(3);
        map[0] = 6;
        assert!(Interpreter::load(map, test_screen(), "test").is_err());
    }

    #[test]
    fn test_load_short_image() {
        assert!(Interpreter::load(vec![3; 16], test_screen(), "test").is_err());
    }

    #[test]
    fn test_start() {
        let mut i = interpreter(spin_loop_map(5));
        assert_eq!(i.state(), RunState::Unstarted);
        assert!(i.start());
        // Already started
        assert!(!i.start());
        i.quit();
        assert_eq!(i.state(), RunState::Finished);
    }

    #[test]
    fn test_pause_resume() {
        let mut i = interpreter(spin_loop_map(5));
        // Not running yet
        assert!(!i.pause_zm());
        assert!(i.start());
        assert!(i.pause_zm());
        assert_eq!(i.state(), RunState::Paused);
        // Already paused
        assert!(!i.pause_zm());
        assert!(i.resume_zm());
        assert_eq!(i.state(), RunState::Running);
        // Not paused
        assert!(!i.resume_zm());
        i.quit();
    }

    #[test]
    fn test_pause_interrupts_input_read() {
        let mut i = interpreter(read_loop_map(5));
        assert!(i.start());
        // The machine is blocked reading a key
        assert!(i.pause_zm());
        assert!(i.resume_zm());
        // The read instruction re-executes and sees this key
        i.input(b'x' as u16);
        assert!(i.pause_zm());
        let data = i.mem_save(0x400);
        assert!(data.is_some());
        i.quit();
    }

    #[test]
    fn test_abort() {
        let mut i = interpreter(read_loop_map(5));
        assert!(i.start());
        i.abort();
        i.join();
        assert_eq!(i.state(), RunState::Finished);
    }

    #[test]
    fn test_abort_while_paused() {
        let mut i = interpreter(spin_loop_map(5));
        assert!(i.start());
        assert!(i.pause_zm());
        i.abort();
        i.join();
        assert_eq!(i.state(), RunState::Finished);
    }

    #[test]
    fn test_mem_save_restore() {
        let mut i = interpreter(spin_loop_map(3));
        assert!(i.start());
        // Capture requires a paused machine
        assert!(i.mem_save(0x400).is_none());
        assert!(i.pause_zm());
        let data = i.mem_save(0x400);
        assert!(data.is_some());
        assert!(i.mem_restore(&data.unwrap()));
        i.quit();
    }

    #[test]
    fn test_mem_restore_mismatch() {
        let mut i = interpreter(spin_loop_map(3));
        let mut other = test_map(3);
        // Different release number
        other[0x02] = 0x12;
        other[0x03] = 0x34;
        let o = interpreter(other);
        let data = o.mem_save(0x400).unwrap();
        assert!(i.start());
        assert!(i.pause_zm());
        assert!(!i.mem_restore(&data));
        i.quit();
    }

    #[test]
    fn test_disk_save_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir
            .path()
            .join("test-int.ifzs")
            .to_string_lossy()
            .to_string();
        let mut i = interpreter(spin_loop_map(5));
        assert!(i.start());
        assert!(i.pause_zm());
        assert!(i.disk_save(&path, 0x400));
        assert!(i.disk_restore(&path));
        assert!(!i.disk_restore("no-such-file.ifzs"));
        i.quit();
    }

    #[test]
    fn test_undo() {
        let mut i = interpreter(spin_loop_map(5));
        assert!(i.start());
        assert!(!i.save_undo());
        assert!(i.pause_zm());
        // Nothing in the slot yet
        assert!(!i.restore_undo());
        assert!(i.save_undo());
        assert!(i.restore_undo());
        // The slot is consumed
        assert!(!i.restore_undo());
        i.quit();
    }

    #[test]
    fn test_restart() {
        let mut i = interpreter(spin_loop_map(5));
        assert!(!i.restart());
        assert!(i.start());
        assert!(i.pause_zm());
        assert!(i.restart());
        assert!(i.resume_zm());
        i.quit();
        assert!(i.restart());
        assert_eq!(i.state(), RunState::Unstarted);
        assert!(i.start());
        i.quit();
    }
}
