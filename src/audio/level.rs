// ABOUTME: LTC output level
// ABOUTME: Converts a dBFS setting into the peak sample amplitude used by the encoder

use crate::error::Error;
use std::fmt;

/// Quietest level accepted; anything lower is inaudible on real decoders.
pub const MIN_LEVEL_DBFS: f64 = -60.0;

/// Peak output level of the LTC square wave.
#[derive(Clone, Copy, PartialEq)]
pub struct OutputLevel {
    dbfs: f64,
}

impl OutputLevel {
    /// Full scale.
    pub const FULL_SCALE: Self = Self { dbfs: 0.0 };

    /// Level in dBFS, in `[MIN_LEVEL_DBFS, 0]`.
    pub fn from_dbfs(dbfs: f64) -> Result<Self, Error> {
        if !dbfs.is_finite() || dbfs > 0.0 || dbfs < MIN_LEVEL_DBFS {
            return Err(Error::Config(format!(
                "output level {dbfs} dBFS outside [{MIN_LEVEL_DBFS}, 0]"
            )));
        }
        Ok(Self { dbfs })
    }

    pub fn dbfs(&self) -> f64 {
        self.dbfs
    }

    /// Linear gain, `(0, 1]`.
    pub fn gain(&self) -> f64 {
        10f64.powf(self.dbfs / 20.0)
    }

    /// Peak amplitude for signed 16-bit samples.
    pub fn amplitude(&self) -> i16 {
        (i16::MAX as f64 * self.gain()).round().clamp(1.0, i16::MAX as f64) as i16
    }
}

impl Default for OutputLevel {
    fn default() -> Self {
        Self::FULL_SCALE
    }
}

impl fmt::Debug for OutputLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputLevel")
            .field("dbfs", &self.dbfs)
            .field("amplitude", &self.amplitude())
            .finish()
    }
}

impl fmt::Display for OutputLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} dBFS", self.dbfs)
    }
}
