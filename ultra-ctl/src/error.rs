/// Errors raised while building a control stream or its launch plan.
///
/// Geometry mistakes (zero sizes, strides that do not match the shape) are
/// not represented here: the caller validates the problem before compiling,
/// and a bad geometry only yields a meaningless buffer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// More records than the 32-bit tag field can number.
    #[error("{records} work records do not fit the 32-bit record tag")]
    TagOverflow { records: usize },

    /// Interleaving needs at least one worker group and a non-zero stride.
    #[error("invalid schedule: {groups} worker groups, interleave factor {interleave}")]
    InvalidSchedule { groups: u32, interleave: u32 },

    /// A derived pitch does not fit the kernel's signed 32-bit argument.
    #[error("pitch {name} = {value} does not fit in i32")]
    PitchOverflow { name: &'static str, value: i64 },

    /// Tuning string could not be parsed or is not valid for the device.
    #[error("invalid tuning config: {0}")]
    InvalidTuning(String),

    /// Serialized control data is not a whole number of blocks.
    #[error("control data of {len} bytes is not a whole number of 256-byte blocks")]
    Truncated { len: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
