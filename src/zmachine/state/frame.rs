use crate::instruction::StoreResult;
use crate::quetzal::{Stk, Stks};
use crate::{error::*, fatal_error};

/// A routine activation: locals, evaluation stack, and where to put the
/// result when the routine returns.
#[derive(Debug)]
pub struct Frame {
    address: usize,
    pc: usize,
    locals: Vec<u16>,
    arguments: u8,
    stack: Vec<u16>,
    result: Option<StoreResult>,
    return_address: usize,
}

impl From<&Stk> for Frame {
    fn from(stk: &Stk) -> Self {
        // Flag bit 4 marks a call that discards its result
        let result = match stk.flags() & 0x10 {
            0 => Some(StoreResult::new(0, stk.result_variable())),
            _ => None,
        };
        Frame::new(
            0,
            0,
            stk.variables(),
            stk.arguments(),
            stk.stack(),
            result,
            stk.return_address() as usize,
        )
    }
}

impl From<&Stks> for Vec<Frame> {
    fn from(stks: &Stks) -> Self {
        stks.stks().iter().map(Frame::from).collect()
    }
}

impl Frame {
    pub fn new(
        address: usize,
        pc: usize,
        locals: &[u16],
        arguments: u8,
        stack: &[u16],
        result: Option<StoreResult>,
        return_address: usize,
    ) -> Frame {
        Frame {
            address,
            pc,
            locals: locals.to_vec(),
            arguments,
            stack: stack.to_vec(),
            result,
            return_address,
        }
    }

    /// New frame for a routine call, copying arguments over the initial
    /// local variable values.  Surplus arguments are discarded.
    pub fn call_routine(
        address: usize,
        initial_pc: usize,
        arguments: &[u16],
        locals: Vec<u16>,
        result: Option<StoreResult>,
        return_address: usize,
    ) -> Frame {
        let mut locals = locals;
        let n = arguments.len().min(locals.len());
        locals[..n].copy_from_slice(&arguments[..n]);

        Frame::new(
            address,
            initial_pc,
            &locals,
            arguments.len() as u8,
            &[],
            result,
            return_address,
        )
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn set_pc(&mut self, pc: usize) {
        self.pc = pc;
    }

    pub fn local_variables(&self) -> &Vec<u16> {
        &self.locals
    }

    pub fn argument_count(&self) -> u8 {
        self.arguments
    }

    pub fn stack(&self) -> &Vec<u16> {
        &self.stack
    }

    pub fn result(&self) -> Option<&StoreResult> {
        self.result.as_ref()
    }

    pub fn return_address(&self) -> usize {
        self.return_address
    }

    pub fn pop(&mut self) -> Result<u16, RuntimeError> {
        match self.stack.pop() {
            Some(v) => {
                debug!(target: "app::state", "Pop {:04x} [{}]", v, self.stack.len());
                Ok(v)
            }
            None => fatal_error!(ErrorCode::EmptyStack, "Popped an empty stack"),
        }
    }

    pub fn peek(&self) -> Result<u16, RuntimeError> {
        match self.stack.last() {
            Some(v) => Ok(*v),
            None => fatal_error!(ErrorCode::EmptyStack, "Peeked an empty stack"),
        }
    }

    pub fn push(&mut self, value: u16) {
        self.stack.push(value);
        debug!(target: "app::state", "Push {:04x} [{}]", value, self.stack.len());
    }

    /// Variable 0 pops the stack, 1..=n read locals.
    pub fn local_variable(&mut self, variable: u8) -> Result<u16, RuntimeError> {
        match variable as usize {
            0 => self.pop(),
            v if v <= self.locals.len() => Ok(self.locals[v - 1]),
            _ => fatal_error!(
                ErrorCode::InvalidLocalVariable,
                "Read of local variable {} out of range ({})",
                variable,
                self.locals.len()
            ),
        }
    }

    /// Like [Self::local_variable], but variable 0 leaves the stack as-is.
    pub fn peek_local_variable(&self, variable: u8) -> Result<u16, RuntimeError> {
        match variable as usize {
            0 => self.peek(),
            v if v <= self.locals.len() => Ok(self.locals[v - 1]),
            _ => fatal_error!(
                ErrorCode::InvalidLocalVariable,
                "Peek of local variable {} out of range ({})",
                variable,
                self.locals.len()
            ),
        }
    }

    pub fn set_local_variable(&mut self, variable: u8, value: u16) -> Result<(), RuntimeError> {
        match variable as usize {
            0 => {
                self.push(value);
                Ok(())
            }
            v if v <= self.locals.len() => {
                self.locals[v - 1] = value;
                Ok(())
            }
            _ => fatal_error!(
                ErrorCode::InvalidLocalVariable,
                "Write to local variable {} out of range ({})",
                variable,
                self.locals.len()
            ),
        }
    }

    /// Indirect writes to variable 0 replace the top of stack instead of
    /// pushing.
    pub fn set_local_variable_indirect(
        &mut self,
        variable: u8,
        value: u16,
    ) -> Result<(), RuntimeError> {
        if variable == 0 {
            self.pop()?;
        }
        self.set_local_variable(variable, value)
    }
}
