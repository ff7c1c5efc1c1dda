/// Per-sample dependency flags as written into `trun` and `sdtp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleFlags {
    /// Sample comes before the sync sample it depends on
    pub is_leading: u8,
    /// 2 for an intra picture, 1 otherwise
    pub depends_on: u8,
    /// Other samples reference this one
    pub is_depended_on: u8,
    /// Redundant coding present
    pub has_redundancy: u8,
    /// Always 0
    pub degradation_priority: u16,
    /// 1 for every sample but keyframes
    pub is_non_sync_sample: u8,
}

impl Default for SampleFlags {
    fn default() -> Self {
        Self {
            is_leading: 0,
            depends_on: 1,
            is_depended_on: 0,
            has_redundancy: 0,
            degradation_priority: 0,
            is_non_sync_sample: 1,
        }
    }
}

impl SampleFlags {
    /// Flags of a sync sample that depends on nothing
    pub fn key_frame() -> Self {
        Self {
            depends_on: 2,
            is_non_sync_sample: 0,
            ..Self::default()
        }
    }
}

/// One entry of a `trun` box.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sample {
    /// Ticks in the track timescale
    pub duration: u32,
    /// Bytes in `mdat`
    pub size: u32,
    /// Presentation minus decode time
    pub composition_time_offset: i32,
    /// Dependency flags
    pub flags: SampleFlags,
    /// Offset into the `mdat` payload, 0 when unused
    pub data_offset: u32,
}

impl Sample {
    /// Creates a sample with default dependency flags
    pub fn new(size: u32, duration: u32) -> Self {
        Self {
            size,
            duration,
            ..Default::default()
        }
    }

    /// Sets `composition_time_offset`
    pub fn with_composition_time_offset(mut self, offset: i32) -> Self {
        self.composition_time_offset = offset;
        self
    }

    /// Sets `flags`
    pub fn with_flags(mut self, flags: SampleFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets `data_offset`
    pub fn with_data_offset(mut self, offset: u32) -> Self {
        self.data_offset = offset;
        self
    }

    /// A sync sample
    pub fn is_key_frame(&self) -> bool {
        self.flags.is_non_sync_sample == 0
    }
}
