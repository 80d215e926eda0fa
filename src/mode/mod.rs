use crate::error::Result;
use crate::Reading;

mod blocking;
pub use blocking::{Blocking, WaitPolicy};
mod split;
pub use split::Split;

pub trait Aht20Reader {
    /// Read the sensor readings, `None` when the sensor reported it was still busy
    fn read(&mut self) -> Result<Option<Reading>>;
}

pub trait Aht20Measure {
    /// Commence measuring
    fn measure(&mut self) -> Result<()>;
}
