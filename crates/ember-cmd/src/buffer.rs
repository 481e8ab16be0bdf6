//! # Command Buffers
//!
//! Host-side recording with the usual lifecycle:
//!
//! ```text
//!            begin            end            submit
//! Initial ─────────► Recording ────► Executable ─────► Pending
//!    ▲                                   ▲                │
//!    │               reset               │   complete     │
//!    └───────────────────────────────────┴────────────────┤
//!                                          (one-time)     ▼
//!                                                      Invalid
//! ```

use alloc::vec::Vec;

use ember_core::{
    BufferCopy, BufferHandle, CommandBufferHandle, CommandBufferUsageFlags, CommandPoolHandle,
    Error, RecordedCommand, Result, Submission,
};

/// Command buffer lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferState {
    /// Freshly allocated or reset
    Initial,
    /// Between `begin` and `end`
    Recording,
    /// Ended and ready to submit
    Executable,
    /// Submitted, not yet known complete
    Pending,
    /// One-time buffer that has completed; must be reset
    Invalid,
}

/// A primary command buffer allocated from a [`CommandPool`](crate::CommandPool)
///
/// The buffer does not free itself; it goes back to its pool through
/// [`CommandPool::free`](crate::CommandPool::free) or when the pool is
/// destroyed.
#[derive(Debug)]
pub struct CommandBuffer {
    handle: CommandBufferHandle,
    pool: CommandPoolHandle,
    state: CommandBufferState,
    usage: CommandBufferUsageFlags,
    commands: Vec<RecordedCommand>,
}

impl CommandBuffer {
    pub(crate) fn new(handle: CommandBufferHandle, pool: CommandPoolHandle) -> Self {
        Self {
            handle,
            pool,
            state: CommandBufferState::Initial,
            usage: CommandBufferUsageFlags::empty(),
            commands: Vec::new(),
        }
    }

    /// Driver handle
    #[inline]
    pub fn handle(&self) -> CommandBufferHandle {
        self.handle
    }

    /// Pool this buffer was allocated from
    #[inline]
    pub fn pool(&self) -> CommandPoolHandle {
        self.pool
    }

    /// Current state
    #[inline]
    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    /// Commands recorded so far
    #[inline]
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Start recording
    pub fn begin(&mut self, usage: CommandBufferUsageFlags) -> Result<()> {
        if self.state != CommandBufferState::Initial {
            return Err(Error::InvalidCommandBufferState);
        }
        self.usage = usage;
        self.state = CommandBufferState::Recording;
        Ok(())
    }

    /// Record a buffer-to-buffer copy
    pub fn copy_buffer(
        &mut self,
        src: BufferHandle,
        dst: BufferHandle,
        region: BufferCopy,
    ) -> Result<()> {
        if self.state != CommandBufferState::Recording {
            return Err(Error::InvalidCommandBufferState);
        }
        if src.is_null() || dst.is_null() {
            return Err(Error::InvalidHandle);
        }
        self.commands.push(RecordedCommand::CopyBuffer { src, dst, region });
        Ok(())
    }

    /// Finish recording
    pub fn end(&mut self) -> Result<()> {
        if self.state != CommandBufferState::Recording {
            return Err(Error::InvalidCommandBufferState);
        }
        self.state = CommandBufferState::Executable;
        Ok(())
    }

    /// Drop recorded commands and return to `Initial`
    ///
    /// Fails while the buffer is pending.
    pub fn reset(&mut self) -> Result<()> {
        if self.state == CommandBufferState::Pending {
            return Err(Error::InvalidCommandBufferState);
        }
        self.commands.clear();
        self.usage = CommandBufferUsageFlags::empty();
        self.state = CommandBufferState::Initial;
        Ok(())
    }

    pub(crate) fn submission(&self) -> Result<Submission<'_>> {
        if self.state != CommandBufferState::Executable {
            return Err(Error::InvalidCommandBufferState);
        }
        Ok(Submission {
            command_buffer: self.handle,
            commands: &self.commands,
        })
    }

    pub(crate) fn mark_pending(&mut self) {
        self.state = CommandBufferState::Pending;
    }

    /// Give up on a submission whose completion cannot be observed
    ///
    /// The buffer becomes `Invalid`; [`reset`](Self::reset) makes it usable
    /// again.
    pub(crate) fn mark_invalid(&mut self) {
        self.state = CommandBufferState::Invalid;
    }

    /// Record that the last submission finished executing
    pub fn mark_complete(&mut self) {
        if self.state != CommandBufferState::Pending {
            return;
        }
        self.state = if self.usage.contains(CommandBufferUsageFlags::ONE_TIME_SUBMIT) {
            CommandBufferState::Invalid
        } else {
            CommandBufferState::Executable
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> CommandBuffer {
        CommandBuffer::new(CommandBufferHandle::new(1), CommandPoolHandle::new(1))
    }

    #[test]
    fn test_record_lifecycle() {
        let mut cb = buffer();
        assert_eq!(cb.state(), CommandBufferState::Initial);
        cb.begin(CommandBufferUsageFlags::ONE_TIME_SUBMIT).unwrap();
        cb.copy_buffer(BufferHandle::new(1), BufferHandle::new(2), BufferCopy::new(0, 0, 16))
            .unwrap();
        cb.end().unwrap();
        assert_eq!(cb.state(), CommandBufferState::Executable);
        assert_eq!(cb.commands().len(), 1);

        cb.mark_pending();
        assert_eq!(cb.reset(), Err(Error::InvalidCommandBufferState));
        cb.mark_complete();
        assert_eq!(cb.state(), CommandBufferState::Invalid);

        cb.reset().unwrap();
        assert_eq!(cb.state(), CommandBufferState::Initial);
        assert!(cb.commands().is_empty());
    }

    #[test]
    fn test_record_outside_recording() {
        let mut cb = buffer();
        let region = BufferCopy::new(0, 0, 4);
        assert_eq!(
            cb.copy_buffer(BufferHandle::new(1), BufferHandle::new(2), region),
            Err(Error::InvalidCommandBufferState)
        );
        assert_eq!(cb.end(), Err(Error::InvalidCommandBufferState));
        cb.begin(CommandBufferUsageFlags::empty()).unwrap();
        assert_eq!(
            cb.begin(CommandBufferUsageFlags::empty()),
            Err(Error::InvalidCommandBufferState)
        );
        assert_eq!(
            cb.copy_buffer(BufferHandle::null(), BufferHandle::new(2), region),
            Err(Error::InvalidHandle)
        );
    }

    #[test]
    fn test_reusable_buffer_returns_to_executable() {
        let mut cb = buffer();
        cb.begin(CommandBufferUsageFlags::empty()).unwrap();
        cb.end().unwrap();
        cb.mark_pending();
        cb.mark_complete();
        assert_eq!(cb.state(), CommandBufferState::Executable);
        assert!(cb.submission().is_ok());
    }
}
