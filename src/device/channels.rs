use tracing::trace;

use crate::core::{ChannelError, Level};

/// Hardware seam: drives one PWM output per channel
pub trait OutputDriver: Send {
    /// Sets the duty cycle of one output
    fn set_duty(&mut self, channel: usize, level: Level);

    /// Shows whether a controller is currently bound
    fn set_link_indicator(&mut self, _on: bool) {}
}

/// Driver that only traces writes, for hosts without outputs
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDriver;

impl OutputDriver for NullDriver {
    fn set_duty(&mut self, channel: usize, level: Level) {
        trace!(channel, level = level.value(), "set_duty");
    }
}

/// Fixed set of output channels
pub struct ChannelBank {
    levels: Vec<Level>,
    driver: Box<dyn OutputDriver>,
}

impl ChannelBank {
    /// Creates `count` idle channels and drives them all to idle
    pub fn new(count: usize, driver: impl OutputDriver + 'static) -> Self {
        let mut bank = ChannelBank {
            levels: vec![Level::IDLE; count],
            driver: Box::new(driver),
        };
        bank.idle_all();
        bank
    }

    /// Number of channels
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Returns whether the bank has no channels
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Current levels in channel order
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Level of one channel
    pub fn level(&self, index: usize) -> Option<Level> {
        self.levels.get(index).copied()
    }

    /// Returns whether every channel is idle
    pub fn all_idle(&self) -> bool {
        self.levels.iter().all(Level::is_idle)
    }

    /// Sets a channel, clamping `raw` into range. Returns the applied level.
    pub fn set_channel(&mut self, index: usize, raw: i64) -> Result<Level, ChannelError> {
        let count = self.levels.len();
        let slot = self
            .levels
            .get_mut(index)
            .ok_or(ChannelError::OutOfRange { index, count })?;

        let level = Level::clamped(raw);
        *slot = level;
        self.driver.set_duty(index, level);
        Ok(level)
    }

    /// Drives every channel to idle
    pub fn idle_all(&mut self) {
        for (index, slot) in self.levels.iter_mut().enumerate() {
            *slot = Level::IDLE;
            self.driver.set_duty(index, Level::IDLE);
        }
    }

    /// Forwards the link state to the driver's indicator
    pub fn set_link_indicator(&mut self, on: bool) {
        self.driver.set_link_indicator(on);
    }
}

impl std::fmt::Debug for ChannelBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelBank")
            .field("levels", &self.levels)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::test_driver::RecordingDriver;
    use super::*;
    use rand::Rng;

    #[test]
    fn test_boot_idles_outputs() {
        let driver = RecordingDriver::default();
        let bank = ChannelBank::new(3, driver.clone());
        assert_eq!(bank.len(), 3);
        assert!(bank.all_idle());
        assert_eq!(driver.0.lock().unwrap().writes.len(), 3);
    }

    #[test]
    fn test_set_channel_clamps() {
        let mut bank = ChannelBank::new(2, NullDriver);
        assert_eq!(bank.set_channel(0, 100), Ok(Level(100)));
        assert_eq!(bank.set_channel(1, -5), Ok(Level(0)));
        assert_eq!(bank.set_channel(1, 1023), Ok(Level(255)));
        assert_eq!(bank.levels(), &[Level(100), Level(255)]);
    }

    #[test]
    fn test_out_of_range_index() {
        let driver = RecordingDriver::default();
        let mut bank = ChannelBank::new(2, driver.clone());
        let writes_before = driver.0.lock().unwrap().writes.len();

        assert_eq!(
            bank.set_channel(2, 10),
            Err(ChannelError::OutOfRange { index: 2, count: 2 })
        );
        assert!(bank.all_idle());
        assert_eq!(driver.0.lock().unwrap().writes.len(), writes_before);
    }

    #[test]
    fn test_idle_all_from_random_levels() {
        let mut rng = rand::thread_rng();
        let mut bank = ChannelBank::new(8, NullDriver);
        for i in 0..bank.len() {
            bank.set_channel(i, rng.gen_range(-100..400)).unwrap();
        }
        bank.idle_all();
        assert!(bank.all_idle());
        assert_eq!(bank.level(7), Some(Level::IDLE));
        assert_eq!(bank.level(8), None);
    }

    #[test]
    fn test_link_indicator_forwarded() {
        let driver = RecordingDriver::default();
        let mut bank = ChannelBank::new(1, driver.clone());
        bank.set_link_indicator(true);
        bank.set_link_indicator(false);
        assert_eq!(driver.0.lock().unwrap().indicator, vec![true, false]);
    }
}
