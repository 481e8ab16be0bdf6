//! # Soft Driver
//!
//! All driver state sits behind one spin lock. Mapped pointers handed out
//! by [`map_memory`](DeviceDriver::map_memory) point straight into the
//! backing blocks and stay valid until unmap or free.

use alloc::vec::Vec;
use core::fmt;
use core::ptr::NonNull;

use arrayvec::ArrayVec;
use ember_core::*;
use hashbrown::{HashMap, HashSet};
use spin::Mutex;

use crate::block::RawBlock;
use crate::config::SoftDeviceConfig;

// =============================================================================
// STATISTICS
// =============================================================================

/// Object counts and traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoftStats {
    /// Buffers not yet destroyed
    pub live_buffers: usize,
    /// Memory objects not yet freed
    pub live_allocations: usize,
    /// Memory objects currently mapped
    pub live_mappings: usize,
    /// Command pools not yet destroyed
    pub live_command_pools: usize,
    /// Command buffers not yet freed
    pub live_command_buffers: usize,
    /// Fences not yet destroyed
    pub live_fences: usize,
    /// Buffers ever created
    pub buffers_created: u64,
    /// Memory objects ever allocated
    pub allocations: u64,
    /// Successful map calls
    pub map_calls: u64,
    /// Ranges flushed
    pub flushes: u64,
    /// Ranges invalidated
    pub invalidations: u64,
    /// Queue submissions executed
    pub submissions: u64,
    /// Bytes moved by copy commands
    pub bytes_copied: u64,
    /// Memory freed while still mapped
    pub implicit_unmaps: u64,
}

// =============================================================================
// OBJECTS
// =============================================================================

struct SoftBuffer {
    size: DeviceSize,
    usage: BufferUsageFlags,
    binding: Option<(MemoryHandle, DeviceSize)>,
}

struct SoftMemory {
    type_index: u32,
    heap_index: usize,
    size: DeviceSize,
    storage: RawBlock,
    /// Host view of non-coherent memory
    shadow: Option<RawBlock>,
    mapped: bool,
}

struct SoftPool {
    family: u32,
    buffers: HashSet<CommandBufferHandle>,
}

struct State {
    next_id: u64,
    buffers: HashMap<BufferHandle, SoftBuffer>,
    memories: HashMap<MemoryHandle, SoftMemory>,
    pools: HashMap<CommandPoolHandle, SoftPool>,
    command_buffers: HashMap<CommandBufferHandle, CommandPoolHandle>,
    fences: HashMap<FenceHandle, bool>,
    heap_usage: ArrayVec<DeviceSize, MAX_MEMORY_HEAPS>,
    stats: SoftStats,
    /// Fence waits fail once set
    lost: bool,
}

impl State {
    fn next_handle<T>(&mut self) -> Handle<T> {
        self.next_id += 1;
        Handle::new(self.next_id)
    }

    /// Backing memory, base offset and size of a bound buffer
    fn bound(
        &self,
        buffer: BufferHandle,
        usage: BufferUsageFlags,
    ) -> Result<(MemoryHandle, DeviceSize, DeviceSize)> {
        let buf = self.buffers.get(&buffer).ok_or(Error::InvalidHandle)?;
        if !buf.usage.contains(usage) {
            return Err(Error::InvalidUsage);
        }
        let (memory, offset) = buf.binding.ok_or(Error::InvalidHandle)?;
        Ok((memory, offset, buf.size))
    }

    fn execute_copy(&mut self, src: BufferHandle, dst: BufferHandle, region: BufferCopy) -> Result<()> {
        let (src_mem, src_base, src_size) = self.bound(src, BufferUsageFlags::TRANSFER_SRC)?;
        let (dst_mem, dst_base, dst_size) = self.bound(dst, BufferUsageFlags::TRANSFER_DST)?;
        if !region.fits(src_size, dst_size) {
            return Err(Error::CopyOutOfBounds);
        }

        let src_ptr = self.memories.get(&src_mem).ok_or(Error::InvalidHandle)?.storage.ptr();
        let dst_ptr = self.memories.get(&dst_mem).ok_or(Error::InvalidHandle)?.storage.ptr();
        // SAFETY: both ranges were checked against the buffer sizes, and
        // binding checked buffer ranges against their memory blocks
        unsafe {
            core::ptr::copy(
                src_ptr.as_ptr().add((src_base + region.src_offset) as usize),
                dst_ptr.as_ptr().add((dst_base + region.dst_offset) as usize),
                region.size as usize,
            );
        }
        self.stats.bytes_copied += region.size;
        Ok(())
    }
}

fn resolve_range(total: DeviceSize, offset: DeviceSize, size: DeviceSize) -> Result<(usize, usize)> {
    if offset > total {
        return Err(Error::InvalidParameter);
    }
    let len = if size == WHOLE_SIZE { total - offset } else { size };
    match offset.checked_add(len) {
        Some(end) if end <= total => Ok((offset as usize, len as usize)),
        _ => Err(Error::InvalidParameter),
    }
}

// =============================================================================
// SOFT DRIVER
// =============================================================================

/// In-process driver
pub struct SoftDriver {
    name: &'static str,
    properties: MemoryProperties,
    families: ArrayVec<QueueFamilyProperties, MAX_QUEUE_FAMILIES>,
    alignment: DeviceSize,
    type_bits: u32,
    state: Mutex<State>,
}

impl SoftDriver {
    /// Create a driver with the given layout
    pub fn new(config: SoftDeviceConfig) -> Self {
        let mut properties = MemoryProperties::new();
        properties.memory_types = config.memory_types;
        properties.memory_heaps = config.memory_heaps;

        let type_count = properties.memory_types.len() as u32;
        let all_types = if type_count >= 32 { u32::MAX } else { (1u32 << type_count) - 1 };
        let heap_usage = properties.memory_heaps.iter().map(|_| 0).collect();

        log::debug!(
            "{}: {} memory types, {} heaps, {} queue families",
            config.name,
            type_count,
            properties.memory_heaps.len(),
            config.queue_families.len()
        );

        Self {
            name: config.name,
            properties,
            families: config.queue_families,
            alignment: config.alignment.max(1),
            type_bits: config.memory_type_bits & all_types,
            state: Mutex::new(State {
                next_id: 0,
                buffers: HashMap::new(),
                memories: HashMap::new(),
                pools: HashMap::new(),
                command_buffers: HashMap::new(),
                fences: HashMap::new(),
                heap_usage,
                stats: SoftStats::default(),
                lost: false,
            }),
        }
    }

    /// Current statistics
    pub fn stats(&self) -> SoftStats {
        let state = self.state.lock();
        SoftStats {
            live_buffers: state.buffers.len(),
            live_allocations: state.memories.len(),
            live_mappings: state.memories.values().filter(|m| m.mapped).count(),
            live_command_pools: state.pools.len(),
            live_command_buffers: state.command_buffers.len(),
            live_fences: state.fences.len(),
            ..state.stats
        }
    }

    /// Bytes the device sees for a bound buffer
    ///
    /// For non-coherent memory this is the device side, not the host shadow.
    pub fn read_buffer(&self, buffer: BufferHandle) -> Result<Vec<u8>> {
        let state = self.state.lock();
        let (memory, offset, size) = state.bound(buffer, BufferUsageFlags::empty())?;
        let mem = state.memories.get(&memory).ok_or(Error::InvalidHandle)?;
        let (start, len) = resolve_range(mem.size, offset, size)?;
        // SAFETY: range checked against the allocation size
        let bytes = unsafe { core::slice::from_raw_parts(mem.storage.ptr().as_ptr().add(start), len) };
        Ok(bytes.to_vec())
    }

    /// Simulate a lost device: every later fence wait fails with
    /// [`Error::DeviceLost`]
    pub fn lose_device(&self) {
        log::warn!("{}: device marked lost", self.name);
        self.state.lock().lost = true;
    }

    /// Usage a buffer was created with
    pub fn buffer_usage(&self, buffer: BufferHandle) -> Option<BufferUsageFlags> {
        self.state.lock().buffers.get(&buffer).map(|b| b.usage)
    }

    /// Bytes currently in use on one heap
    pub fn heap_usage(&self, heap_index: usize) -> DeviceSize {
        self.state.lock().heap_usage.get(heap_index).copied().unwrap_or(0)
    }

    fn decode_queue(&self, queue: QueueHandle) -> Result<u32> {
        let raw = queue.id().checked_sub(1).ok_or(Error::InvalidHandle)?;
        let family = (raw >> 16) as u32;
        let index = (raw & 0xffff) as u32;
        match self.families.get(family as usize) {
            Some(props) if index < props.queue_count => Ok(family),
            _ => Err(Error::InvalidHandle),
        }
    }
}

impl fmt::Debug for SoftDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftDriver")
            .field("name", &self.name)
            .field("stats", &self.stats())
            .finish()
    }
}

impl DeviceDriver for SoftDriver {
    fn name(&self) -> &str {
        self.name
    }

    fn memory_properties(&self) -> &MemoryProperties {
        &self.properties
    }

    fn queue_family_properties(&self) -> &[QueueFamilyProperties] {
        &self.families
    }

    // =========================================================================
    // Buffers and memory
    // =========================================================================

    fn create_buffer(&self, info: &BufferCreateInfo) -> Result<BufferHandle> {
        if info.size == 0 || info.usage.is_empty() {
            return Err(Error::InvalidParameter);
        }
        let mut state = self.state.lock();
        let handle = state.next_handle();
        state.buffers.insert(
            handle,
            SoftBuffer {
                size: info.size,
                usage: info.usage,
                binding: None,
            },
        );
        state.stats.buffers_created += 1;
        Ok(handle)
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        if self.state.lock().buffers.remove(&buffer).is_none() {
            log::warn!("{}: destroy of unknown buffer {:?}", self.name, buffer);
        }
    }

    fn buffer_memory_requirements(&self, buffer: BufferHandle) -> Result<MemoryRequirements> {
        let state = self.state.lock();
        let buf = state.buffers.get(&buffer).ok_or(Error::InvalidHandle)?;
        Ok(MemoryRequirements {
            size: align_up(buf.size, self.alignment),
            alignment: self.alignment,
            memory_type_bits: self.type_bits,
        })
    }

    fn allocate_memory(&self, info: &MemoryAllocateInfo) -> Result<MemoryHandle> {
        let ty = self
            .properties
            .memory_type(info.memory_type_index)
            .ok_or(Error::InvalidParameter)?;
        if info.allocation_size == 0 {
            return Err(Error::InvalidParameter);
        }
        let heap_index = ty.heap_index as usize;
        let heap_size = self
            .properties
            .memory_heaps
            .get(heap_index)
            .map(|h| h.size)
            .ok_or(Error::InvalidParameter)?;

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let used = state.heap_usage.get(heap_index).copied().unwrap_or(0);
        if used.saturating_add(info.allocation_size) > heap_size {
            log::debug!(
                "{}: heap {} exhausted ({} + {} > {})",
                self.name,
                heap_index,
                used,
                info.allocation_size,
                heap_size
            );
            return Err(Error::OutOfDeviceMemory);
        }

        let len = usize::try_from(info.allocation_size).map_err(|_| Error::OutOfHostMemory)?;
        let storage = RawBlock::zeroed(len)?;
        let flags = ty.property_flags;
        let shadow = if flags.is_host_visible() && !flags.is_host_coherent() {
            Some(RawBlock::zeroed(len)?)
        } else {
            None
        };

        if let Some(slot) = state.heap_usage.get_mut(heap_index) {
            *slot += info.allocation_size;
        }
        let handle = state.next_handle();
        state.memories.insert(
            handle,
            SoftMemory {
                type_index: info.memory_type_index,
                heap_index,
                size: info.allocation_size,
                storage,
                shadow,
                mapped: false,
            },
        );
        state.stats.allocations += 1;
        Ok(handle)
    }

    fn free_memory(&self, memory: MemoryHandle) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(mem) = state.memories.remove(&memory) else {
            log::warn!("{}: free of unknown memory {:?}", self.name, memory);
            return;
        };
        if mem.mapped {
            log::warn!("{}: memory {:?} freed while mapped", self.name, memory);
            state.stats.implicit_unmaps += 1;
        }
        if let Some(slot) = state.heap_usage.get_mut(mem.heap_index) {
            *slot = slot.saturating_sub(mem.size);
        }
    }

    fn bind_buffer_memory(
        &self,
        buffer: BufferHandle,
        memory: MemoryHandle,
        offset: DeviceSize,
    ) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mem = state.memories.get(&memory).ok_or(Error::InvalidHandle)?;
        let buf = state.buffers.get_mut(&buffer).ok_or(Error::InvalidHandle)?;
        if buf.binding.is_some() || offset % self.alignment != 0 {
            return Err(Error::InvalidParameter);
        }
        if self.type_bits & (1 << mem.type_index) == 0 {
            return Err(Error::InvalidParameter);
        }
        match offset.checked_add(buf.size) {
            Some(end) if end <= mem.size => {},
            _ => return Err(Error::InvalidParameter),
        }
        buf.binding = Some((memory, offset));
        Ok(())
    }

    fn map_memory(
        &self,
        memory: MemoryHandle,
        offset: DeviceSize,
        size: DeviceSize,
    ) -> Result<NonNull<u8>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mem = state.memories.get_mut(&memory).ok_or(Error::InvalidHandle)?;
        let flags = self
            .properties
            .memory_type(mem.type_index)
            .map(|t| t.property_flags)
            .unwrap_or_default();
        if !flags.is_host_visible() {
            log::warn!("{}: map of non host-visible memory {:?}", self.name, memory);
            return Err(Error::MemoryMapFailed);
        }
        if mem.mapped {
            return Err(Error::MemoryMapFailed);
        }
        let (start, _) = resolve_range(mem.size, offset, size)?;
        let base = mem.shadow.as_ref().unwrap_or(&mem.storage).ptr();
        mem.mapped = true;
        state.stats.map_calls += 1;
        // SAFETY: start is within the block
        Ok(unsafe { base.add(start) })
    }

    fn unmap_memory(&self, memory: MemoryHandle) {
        let mut state = self.state.lock();
        match state.memories.get_mut(&memory) {
            Some(mem) if mem.mapped => mem.mapped = false,
            _ => log::warn!("{}: unmap of unmapped memory {:?}", self.name, memory),
        }
    }

    fn flush_mapped_memory_ranges(&self, ranges: &[MappedMemoryRange]) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        for range in ranges {
            let mem = state.memories.get(&range.memory).ok_or(Error::InvalidHandle)?;
            if !mem.mapped {
                return Err(Error::NotMapped);
            }
            let (start, len) = resolve_range(mem.size, range.offset, range.size)?;
            if let Some(shadow) = &mem.shadow {
                // SAFETY: range checked against the allocation size
                unsafe { mem.storage.copy_from(shadow, start, len) };
            }
            state.stats.flushes += 1;
        }
        Ok(())
    }

    fn invalidate_mapped_memory_ranges(&self, ranges: &[MappedMemoryRange]) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        for range in ranges {
            let mem = state.memories.get(&range.memory).ok_or(Error::InvalidHandle)?;
            if !mem.mapped {
                return Err(Error::NotMapped);
            }
            let (start, len) = resolve_range(mem.size, range.offset, range.size)?;
            if let Some(shadow) = &mem.shadow {
                // SAFETY: range checked against the allocation size
                unsafe { shadow.copy_from(&mem.storage, start, len) };
            }
            state.stats.invalidations += 1;
        }
        Ok(())
    }

    // =========================================================================
    // Commands
    // =========================================================================

    fn create_command_pool(
        &self,
        queue_family: u32,
        _flags: CommandPoolFlags,
    ) -> Result<CommandPoolHandle> {
        if queue_family as usize >= self.families.len() {
            return Err(Error::NoQueueFamily);
        }
        let mut state = self.state.lock();
        let handle = state.next_handle();
        state.pools.insert(
            handle,
            SoftPool {
                family: queue_family,
                buffers: HashSet::new(),
            },
        );
        Ok(handle)
    }

    fn destroy_command_pool(&self, pool: CommandPoolHandle) {
        let mut state = self.state.lock();
        let Some(removed) = state.pools.remove(&pool) else {
            log::warn!("{}: destroy of unknown command pool {:?}", self.name, pool);
            return;
        };
        for buffer in removed.buffers {
            state.command_buffers.remove(&buffer);
        }
    }

    fn allocate_command_buffer(&self, pool: CommandPoolHandle) -> Result<CommandBufferHandle> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !state.pools.contains_key(&pool) {
            return Err(Error::InvalidHandle);
        }
        let handle = state.next_handle();
        state.command_buffers.insert(handle, pool);
        if let Some(p) = state.pools.get_mut(&pool) {
            p.buffers.insert(handle);
        }
        Ok(handle)
    }

    fn free_command_buffer(&self, pool: CommandPoolHandle, buffer: CommandBufferHandle) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.command_buffers.get(&buffer) != Some(&pool) {
            log::warn!("{}: free of unknown command buffer {:?}", self.name, buffer);
            return;
        }
        state.command_buffers.remove(&buffer);
        if let Some(p) = state.pools.get_mut(&pool) {
            p.buffers.remove(&buffer);
        }
    }

    fn get_queue(&self, family: u32, index: u32) -> Result<QueueHandle> {
        let props = self.families.get(family as usize).ok_or(Error::NoQueueFamily)?;
        if index >= props.queue_count || index > 0xffff {
            return Err(Error::InvalidParameter);
        }
        Ok(Handle::new((((family as u64) << 16) | index as u64) + 1))
    }

    fn queue_submit(
        &self,
        queue: QueueHandle,
        submission: &Submission<'_>,
        fence: Option<FenceHandle>,
    ) -> Result<()> {
        let family = self.decode_queue(queue)?;
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let pool = state
            .command_buffers
            .get(&submission.command_buffer)
            .ok_or(Error::InvalidHandle)?;
        let pool_family = state.pools.get(pool).map(|p| p.family);
        if pool_family != Some(family) {
            log::error!(
                "{}: {:?} from family {:?} submitted to family {}",
                self.name,
                submission.command_buffer,
                pool_family,
                family
            );
            return Err(Error::SubmissionFailed);
        }
        if let Some(f) = fence {
            match state.fences.get(&f) {
                Some(false) => {},
                Some(true) => return Err(Error::InvalidParameter),
                None => return Err(Error::InvalidHandle),
            }
        }

        for command in submission.commands {
            match *command {
                RecordedCommand::CopyBuffer { src, dst, region } => {
                    state.execute_copy(src, dst, region)?;
                },
                _ => return Err(Error::SubmissionFailed),
            }
        }

        state.stats.submissions += 1;
        if let Some(f) = fence {
            state.fences.insert(f, true);
        }
        Ok(())
    }

    // =========================================================================
    // Synchronization
    // =========================================================================

    fn create_fence(&self) -> Result<FenceHandle> {
        let mut state = self.state.lock();
        let handle = state.next_handle();
        state.fences.insert(handle, false);
        Ok(handle)
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        if self.state.lock().fences.remove(&fence).is_none() {
            log::warn!("{}: destroy of unknown fence {:?}", self.name, fence);
        }
    }

    fn reset_fence(&self, fence: FenceHandle) -> Result<()> {
        let mut state = self.state.lock();
        let signaled = state.fences.get_mut(&fence).ok_or(Error::InvalidHandle)?;
        *signaled = false;
        Ok(())
    }

    fn fence_status(&self, fence: FenceHandle) -> Result<bool> {
        self.state.lock().fences.get(&fence).copied().ok_or(Error::InvalidHandle)
    }

    fn wait_for_fence(&self, fence: FenceHandle) -> Result<()> {
        if self.state.lock().lost {
            return Err(Error::DeviceLost);
        }
        if self.fence_status(fence)? {
            return Ok(());
        }
        // Work executes at submit time, so an unsignaled fence never signals.
        log::error!("{}: wait on fence {:?} with no pending work", self.name, fence);
        Err(Error::DeviceLost)
    }
}

impl Drop for SoftDriver {
    fn drop(&mut self) {
        let stats = self.stats();
        if stats.live_buffers + stats.live_allocations > 0 {
            log::warn!(
                "{}: dropped with {} buffers and {} allocations alive",
                self.name,
                stats.live_buffers,
                stats.live_allocations
            );
        }
        log::debug!("{} destroyed: {:?}", self.name, stats);
    }
}
