//! Pipeline output — the unit of ordered emission.

use serde::{Deserialize, Serialize};

use crate::ids::GameId;
use crate::narration::{AudioSegment, NarrationBatch};
use crate::projection::BoardProjection;
use crate::time::GameTime;

/// Everything produced for one snapshot, released in game-time order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    /// Game identity.
    pub game_id: GameId,
    /// Snapshot coordinate this output narrates.
    pub game_time: GameTime,
    /// The narration batch.
    pub narration: NarrationBatch,
    /// Rendered audio, index-ordered to match the narration.
    pub audio: Vec<AudioSegment>,
    /// Board projection at the time the stages ran.
    pub board_projection: BoardProjection,
    /// Monotonic emission sequence number, assigned by the ordering queue.
    #[serde(default)]
    pub sequence_number: u64,
}
