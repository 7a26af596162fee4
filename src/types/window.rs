use serde::Serialize;

const SECONDS_PER_DAY: u64 = 86_400;

/// Step sizes (in blocks) for the backward scan: month, week and day.
///
/// The scan only ever moves down this ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepSchedule {
    pub day: u64,
    pub week: u64,
    pub month: u64,
}

impl StepSchedule {
    pub fn from_block_time(block_time_seconds: u64) -> Self {
        let block_time = block_time_seconds.max(1);
        let day = (SECONDS_PER_DAY / block_time).max(1);
        Self {
            day,
            week: day * 7,
            month: day * 30,
        }
    }

    pub fn initial(&self) -> u64 {
        self.month
    }

    pub fn minimum(&self) -> u64 {
        self.day
    }

    /// One notch down: MONTH -> WEEK -> DAY, never below DAY.
    pub fn shrink(&self, current: u64) -> u64 {
        if current > self.week {
            self.week
        } else {
            self.day
        }
    }
}

impl Default for StepSchedule {
    fn default() -> Self {
        Self::from_block_time(12)
    }
}

/// Scanning cursor over `[from_block, to_block]`. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventWindow {
    pub from_block: u64,
    pub to_block: u64,
    pub step_size: u64,
}

impl EventWindow {
    pub fn ending_at(to_block: u64, step_size: u64) -> Self {
        Self {
            from_block: to_block.saturating_sub(step_size),
            to_block,
            step_size,
        }
    }

    /// Next older window after a successful, empty query.
    pub fn slide_back(&self) -> Self {
        Self::ending_at(self.from_block, self.step_size)
    }

    /// Same `to_block` with a smaller step.
    pub fn with_step(&self, step_size: u64) -> Self {
        Self::ending_at(self.to_block, step_size)
    }

    /// The window reaching genesis is the last one.
    pub fn reaches_genesis(&self) -> bool {
        self.from_block == 0
    }

    pub fn span(&self) -> u64 {
        self.to_block - self.from_block
    }
}
