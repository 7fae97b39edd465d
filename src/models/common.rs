use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider: String,
}

/// Observable progress of one submission. `WarmingUp` is the only
/// intermediate state callers act on (loading spinners, retry hints);
/// terminal results travel through the returned `Result` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerationStatus {
    Idle,
    Requesting,
    WarmingUp { attempt: u32 },
    Done,
}

impl GenerationStatus {
    pub fn is_warming_up(&self) -> bool {
        matches!(self, GenerationStatus::WarmingUp { .. })
    }
}
