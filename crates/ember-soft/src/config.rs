//! # Soft Device Configuration
//!
//! Presets describing the memory and queue layout the soft driver reports.

use arrayvec::ArrayVec;
use ember_core::{
    DeviceSize, MemoryHeap, MemoryHeapFlags, MemoryPropertyFlags, MemoryType,
    QueueFamilyProperties, QueueFlags, MAX_MEMORY_HEAPS, MAX_MEMORY_TYPES, MAX_QUEUE_FAMILIES,
};

const MIB: DeviceSize = 1024 * 1024;

/// Soft device layout
#[derive(Debug, Clone)]
pub struct SoftDeviceConfig {
    /// Name reported by the driver
    pub name: &'static str,
    /// Memory types, fastest first
    pub memory_types: ArrayVec<MemoryType, MAX_MEMORY_TYPES>,
    /// Memory heaps
    pub memory_heaps: ArrayVec<MemoryHeap, MAX_MEMORY_HEAPS>,
    /// Queue families
    pub queue_families: ArrayVec<QueueFamilyProperties, MAX_QUEUE_FAMILIES>,
    /// Buffer memory alignment
    pub alignment: DeviceSize,
    /// Mask applied to every buffer's `memory_type_bits`
    pub memory_type_bits: u32,
}

impl SoftDeviceConfig {
    /// Discrete GPU
    ///
    /// ```text
    /// type 0  DEVICE_LOCAL                              heap 0 (VRAM)
    /// type 1  HOST_VISIBLE | HOST_COHERENT              heap 1 (sysmem)
    /// type 2  HOST_VISIBLE | HOST_CACHED  (no coherency) heap 1
    /// type 3  DEVICE_LOCAL | HOST_VISIBLE | HOST_COHERENT heap 0 (BAR)
    ///
    /// family 0  GRAPHICS | COMPUTE | TRANSFER
    /// family 1  COMPUTE | TRANSFER
    /// family 2  TRANSFER
    /// ```
    pub fn discrete() -> Self {
        let mut config = Self::empty("ember-soft discrete");
        config.push_heap(256 * MIB, MemoryHeapFlags::DEVICE_LOCAL);
        config.push_heap(256 * MIB, MemoryHeapFlags::empty());
        config.push_type(MemoryPropertyFlags::DEVICE_LOCAL, 0);
        config.push_type(
            MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT,
            1,
        );
        config.push_type(
            MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_CACHED,
            1,
        );
        config.push_type(
            MemoryPropertyFlags::DEVICE_LOCAL
                | MemoryPropertyFlags::HOST_VISIBLE
                | MemoryPropertyFlags::HOST_COHERENT,
            0,
        );
        config.push_family(QueueFlags::GRAPHICS | QueueFlags::COMPUTE | QueueFlags::TRANSFER, 16);
        config.push_family(QueueFlags::COMPUTE | QueueFlags::TRANSFER, 8);
        config.push_family(QueueFlags::TRANSFER, 2);
        config
    }

    /// Integrated GPU: one unified heap, every type host visible, one family
    pub fn integrated() -> Self {
        let mut config = Self::empty("ember-soft integrated");
        config.push_heap(512 * MIB, MemoryHeapFlags::DEVICE_LOCAL);
        config.push_type(
            MemoryPropertyFlags::DEVICE_LOCAL
                | MemoryPropertyFlags::HOST_VISIBLE
                | MemoryPropertyFlags::HOST_COHERENT,
            0,
        );
        config.push_type(
            MemoryPropertyFlags::DEVICE_LOCAL
                | MemoryPropertyFlags::HOST_VISIBLE
                | MemoryPropertyFlags::HOST_CACHED,
            0,
        );
        config.push_family(QueueFlags::GRAPHICS | QueueFlags::COMPUTE | QueueFlags::TRANSFER, 4);
        config
    }

    /// CPU implementation: no device-local memory at all
    pub fn host_only() -> Self {
        let mut config = Self::empty("ember-soft host");
        config.push_heap(256 * MIB, MemoryHeapFlags::empty());
        config.push_type(
            MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT,
            0,
        );
        config.push_type(
            MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_CACHED,
            0,
        );
        config.push_family(QueueFlags::COMPUTE | QueueFlags::TRANSFER, 1);
        config
    }

    /// Cap every heap at `bytes`
    pub fn with_memory_budget(mut self, bytes: DeviceSize) -> Self {
        for heap in &mut self.memory_heaps {
            heap.size = heap.size.min(bytes);
        }
        self
    }

    /// Restrict which memory types buffers may use
    pub fn with_memory_type_bits(mut self, bits: u32) -> Self {
        self.memory_type_bits = bits;
        self
    }

    /// Buffer memory alignment (power of two)
    pub fn with_alignment(mut self, alignment: DeviceSize) -> Self {
        self.alignment = alignment.max(1).next_power_of_two();
        self
    }

    /// Replace the queue families
    pub fn with_queue_families(mut self, families: &[QueueFamilyProperties]) -> Self {
        self.queue_families.clear();
        for family in families.iter().take(MAX_QUEUE_FAMILIES) {
            self.queue_families.push(*family);
        }
        self
    }

    fn empty(name: &'static str) -> Self {
        Self {
            name,
            memory_types: ArrayVec::new(),
            memory_heaps: ArrayVec::new(),
            queue_families: ArrayVec::new(),
            alignment: 256,
            memory_type_bits: u32::MAX,
        }
    }

    fn push_heap(&mut self, size: DeviceSize, flags: MemoryHeapFlags) {
        self.memory_heaps.push(MemoryHeap::new(size, flags));
    }

    fn push_type(&mut self, flags: MemoryPropertyFlags, heap_index: u32) {
        self.memory_types.push(MemoryType::new(flags, heap_index));
    }

    fn push_family(&mut self, flags: QueueFlags, count: u32) {
        self.queue_families.push(QueueFamilyProperties::new(flags, count));
    }
}

impl Default for SoftDeviceConfig {
    fn default() -> Self {
        Self::discrete()
    }
}
