use tap_types::GameError;

/// Round score accumulator. Only grows; sealed once the round is handed off.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScoreLedger {
    score: u32,
    sealed: bool,
}

impl ScoreLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.score = 0;
        self.sealed = false;
    }

    pub fn add(&mut self, points: u32) -> Result<u32, GameError> {
        if self.sealed {
            return Err(GameError::LedgerSealed);
        }
        if points == 0 {
            return Err(GameError::InvalidDelta);
        }

        self.score = self.score.saturating_add(points);
        Ok(self.score)
    }

    /// Freezes the ledger and returns the final score. Sealing twice returns
    /// the same value.
    pub fn seal(&mut self) -> u32 {
        self.sealed = true;
        self.score
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_positive_deltas() {
        let mut ledger = ScoreLedger::new();
        assert_eq!(ledger.add(1).unwrap(), 1);
        assert_eq!(ledger.add(5).unwrap(), 6);
        assert_eq!(ledger.score(), 6);
    }

    #[test]
    fn test_rejects_zero_delta() {
        let mut ledger = ScoreLedger::new();
        assert_eq!(ledger.add(0), Err(GameError::InvalidDelta));
        assert_eq!(ledger.score(), 0);
    }

    #[test]
    fn test_sealed_ledger_is_frozen() {
        let mut ledger = ScoreLedger::new();
        ledger.add(3).unwrap();

        assert_eq!(ledger.seal(), 3);
        assert_eq!(ledger.add(1), Err(GameError::LedgerSealed));
        assert_eq!(ledger.seal(), 3);

        ledger.reset();
        assert!(!ledger.is_sealed());
        assert_eq!(ledger.score(), 0);
    }
}
