//! Software-driven outputs

use pseudochron_hal::{Level, ManualOutputs};

/// Records every software drive of an output pin
#[derive(Debug, Default)]
pub struct SimOutputs {
    log: Vec<(u8, Level)>,
}

impl SimOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last level driven on `pin`, if it was ever driven
    pub fn level(&self, pin: u8) -> Option<Level> {
        self.log
            .iter()
            .rev()
            .find(|(p, _)| *p == pin)
            .map(|(_, level)| *level)
    }

    /// Every drive so far, oldest first
    pub fn log(&self) -> &[(u8, Level)] {
        &self.log
    }

    pub fn clear(&mut self) {
        self.log.clear();
    }
}

impl ManualOutputs for SimOutputs {
    fn drive(&mut self, pin: u8, level: Level) {
        self.log.push((pin, level));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_tracks_last_drive() {
        let mut outputs = SimOutputs::new();
        assert_eq!(outputs.level(4), None);

        outputs.set_high(4);
        outputs.set_low(6);
        outputs.set_low(4);
        assert_eq!(outputs.level(4), Some(Level::Low));
        assert_eq!(outputs.level(6), Some(Level::Low));
        assert_eq!(outputs.log().len(), 3);

        outputs.clear();
        assert!(outputs.log().is_empty());
    }
}
